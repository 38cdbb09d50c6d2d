use serde::{Deserialize, Serialize};

/// Per-user dashboard row.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub username: String,
    pub display_name: String,
    pub active_yellows: usize,
    pub active_reds: usize,
    /// Active Yellow cards inside the warning window.
    pub expiring_soon: usize,
    pub total_yellows: usize,
    pub total_reds: usize,
    /// All-time standing; Red cards weigh three times a Yellow.
    pub slacker_score: usize,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub users: Vec<UserSummary>,
}
