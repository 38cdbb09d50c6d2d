use serde::{Deserialize, Serialize};

/// The distinguished administrator account. It exists even when the users
/// table carries no such row, and it is never a required approver.
pub const ADMIN: &str = "admin";

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct User {
    pub username: String,
    pub display_name: String,
    /// `None` means no password is required to log in.
    pub password: Option<String>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.username == ADMIN
    }
}

pub fn find<'u>(users: &'u [User], username: &str) -> Option<&'u User> {
    users.iter().find(|user| user.username == username)
}
