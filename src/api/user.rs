use serde::{Deserialize, Serialize};

pub use crate::store::user::ADMIN;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: String,
    pub display_name: String,
}
