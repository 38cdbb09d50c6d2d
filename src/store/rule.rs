use std::collections::BTreeSet;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Rule {
    pub id: Id,
    pub text: String,
    pub created_by: String,
    pub status: Status,
    /// Usernames that approved the pending action.
    #[serde(default, with = "approvals")]
    pub approvals: BTreeSet<String>,
    /// Username that initiated the pending action. Empty when the rule is
    /// not pending.
    #[serde(default)]
    pub proposed_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Display, Eq, Hash, PartialEq,
    Serialize,
)]
pub struct Id(Uuid);

impl Id {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl From<u128> for Id {
    fn from(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// In force. A card can name this rule as the breached one.
    Active,

    /// Proposed addition awaiting unanimous approval.
    PendingAdd,

    /// Proposed removal awaiting unanimous approval. The text stays
    /// visible until the removal fully resolves.
    PendingRemove,

    /// Terminal. A fresh proposal is the only way back.
    Rejected,
}

/// Approvals are persisted as a semicolon-joined sorted set of usernames;
/// null or empty means the empty set.
mod approvals {
    use std::collections::BTreeSet;

    use itertools::Itertools as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        set: &BTreeSet<String>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&set.iter().join(";"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeSet<String>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw
            .unwrap_or_default()
            .split(';')
            .map(str::trim)
            .filter(|username| !username.is_empty())
            .map(str::to_owned)
            .collect())
    }
}
