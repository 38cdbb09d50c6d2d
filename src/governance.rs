//! House-rule governance: proposed additions and removals resolve once
//! every user other than the admin and the proposer has approved.

use std::collections::BTreeSet;

use time::OffsetDateTime;

use crate::store::{
    rule::{Id, Rule, Status},
    user::ADMIN,
    User,
};

/// What an operation did to the rule table. Invalid actions degrade to
/// [`Outcome::Unchanged`] rather than failing; the table is never left
/// half-updated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    Changed,
    Unchanged,
    NotFound,
}

/// Everyone who must approve an action by `proposer`: all known usernames
/// except the admin and the proposer, in canonical order.
pub fn required_approvers(
    users: &[User],
    proposer: &str,
) -> BTreeSet<String> {
    users
        .iter()
        .map(|user| user.username.as_str())
        .filter(|&username| username != ADMIN && username != proposer)
        .map(str::to_owned)
        .collect()
}

pub fn is_fully_approved(
    users: &[User],
    approvals: &BTreeSet<String>,
    proposer: &str,
) -> bool {
    required_approvers(users, proposer).is_subset(approvals)
}

/// Creates a new rule. Admin proposals, and proposals with nobody left to
/// ask, take effect immediately; everything else starts a vote.
pub fn propose_addition(
    rules: &mut Vec<Rule>,
    users: &[User],
    text: String,
    proposer: &str,
    now: OffsetDateTime,
) -> Id {
    let immediate = proposer == ADMIN
        || required_approvers(users, proposer).is_empty();
    let rule = Rule {
        id: Id::new(),
        text,
        created_by: proposer.to_owned(),
        status: if immediate {
            Status::Active
        } else {
            Status::PendingAdd
        },
        approvals: BTreeSet::new(),
        proposed_by: if immediate {
            String::new()
        } else {
            proposer.to_owned()
        },
        timestamp: now,
    };
    let id = rule.id;
    rules.insert(0, rule);
    id
}

/// Starts (or short-circuits) a removal. The admin deletes outright, as
/// does anyone with nobody left to ask; otherwise the rule moves to
/// `pending_remove` with a fresh proposer and an empty approval set,
/// overriding any pending state it was in before.
pub fn propose_removal(
    rules: &mut Vec<Rule>,
    users: &[User],
    id: Id,
    proposer: &str,
) -> Outcome {
    let Some(position) = rules.iter().position(|rule| rule.id == id) else {
        return Outcome::NotFound;
    };

    if proposer == ADMIN || required_approvers(users, proposer).is_empty() {
        rules.remove(position);
    } else {
        let rule = &mut rules[position];
        rule.status = Status::PendingRemove;
        rule.proposed_by = proposer.to_owned();
        rule.approvals.clear();
    }
    Outcome::Changed
}

/// Records a vote. Only required approvers count, and only once; a full
/// approval set resolves the pending action (activation for additions,
/// deletion for removals).
pub fn approve(
    rules: &mut Vec<Rule>,
    users: &[User],
    id: Id,
    voter: &str,
) -> Outcome {
    let Some(position) = rules.iter().position(|rule| rule.id == id) else {
        return Outcome::NotFound;
    };

    let rule = &mut rules[position];
    let removal = match rule.status {
        Status::PendingAdd => false,
        Status::PendingRemove => true,
        Status::Active | Status::Rejected => return Outcome::Unchanged,
    };

    let required = required_approvers(users, &rule.proposed_by);
    if !required.contains(voter) || rule.approvals.contains(voter) {
        return Outcome::Unchanged;
    }
    rule.approvals.insert(voter.to_owned());

    if is_fully_approved(users, &rule.approvals, &rule.proposed_by) {
        if removal {
            rules.remove(position);
        } else {
            let rule = &mut rules[position];
            rule.status = Status::Active;
            rule.proposed_by.clear();
            rule.approvals.clear();
        }
    }
    Outcome::Changed
}

/// Abandons a pending action. A rejected addition is terminal; a rejected
/// removal restores the rule untouched. Valid for the admin and for any
/// required approver.
pub fn reject(
    rules: &mut Vec<Rule>,
    users: &[User],
    id: Id,
    actor: &str,
) -> Outcome {
    let Some(rule) = rules.iter_mut().find(|rule| rule.id == id) else {
        return Outcome::NotFound;
    };

    let next_status = match rule.status {
        Status::PendingAdd => Status::Rejected,
        Status::PendingRemove => Status::Active,
        Status::Active | Status::Rejected => return Outcome::Unchanged,
    };
    if actor != ADMIN
        && !required_approvers(users, &rule.proposed_by)
            .contains(actor)
    {
        return Outcome::Unchanged;
    }

    rule.status = next_status;
    rule.proposed_by.clear();
    rule.approvals.clear();
    Outcome::Changed
}

/// Admin override: activates a pending rule regardless of the vote state.
pub fn force_activate(rules: &mut [Rule], id: Id) -> Outcome {
    let Some(rule) = rules.iter_mut().find(|rule| rule.id == id) else {
        return Outcome::NotFound;
    };
    match rule.status {
        Status::PendingAdd | Status::PendingRemove => {}
        Status::Active | Status::Rejected => return Outcome::Unchanged,
    }

    rule.status = Status::Active;
    rule.proposed_by.clear();
    rule.approvals.clear();
    Outcome::Changed
}

/// Admin override: deletes a rule regardless of the vote state.
pub fn force_delete(rules: &mut Vec<Rule>, id: Id) -> Outcome {
    let Some(position) = rules.iter().position(|rule| rule.id == id) else {
        return Outcome::NotFound;
    };
    rules.remove(position);
    Outcome::Changed
}
