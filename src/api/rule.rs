use itertools::Itertools as _;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{governance, store};

pub use crate::store::rule::{Id, Status};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: Id,
    pub text: String,
    pub created_by: String,
    pub status: Status,
    pub approvals: Vec<String>,
    pub proposed_by: Option<String>,
    /// Who still has a say; empty for rules that are not pending.
    pub required_approvers: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl Rule {
    pub fn from_store(rule: &store::Rule, users: &[store::User]) -> Self {
        let pending = matches!(
            rule.status,
            Status::PendingAdd | Status::PendingRemove,
        );
        Self {
            id: rule.id,
            text: rule.text.clone(),
            created_by: rule.created_by.clone(),
            status: rule.status,
            approvals: rule.approvals.iter().cloned().collect(),
            proposed_by: pending.then(|| rule.proposed_by.clone()),
            required_approvers: if pending {
                governance::required_approvers(users, &rule.proposed_by)
                    .into_iter()
                    .collect()
            } else {
                Vec::new()
            },
            timestamp: rule.timestamp,
        }
    }
}

/// Rules grouped the way the dashboard presents them; rejected rules are
/// not shown.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub active: Vec<Rule>,
    pub pending_additions: Vec<Rule>,
    pub pending_removals: Vec<Rule>,
}

impl List {
    pub fn from_store(
        rules: &[store::Rule],
        users: &[store::User],
    ) -> Self {
        let group = |status: Status| {
            rules
                .iter()
                .filter(|rule| rule.status == status)
                .map(|rule| Rule::from_store(rule, users))
                .collect_vec()
        };
        Self {
            active: group(Status::Active),
            pending_additions: group(Status::PendingAdd),
            pending_removals: group(Status::PendingRemove),
        }
    }
}
