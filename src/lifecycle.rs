//! Card lifecycle: expiry of stale Yellow cards and escalation of
//! accumulated Yellow cards into Red ones.

use itertools::Itertools as _;
use serde::Deserialize;
use time::{Date, Duration};

use crate::store::ticket::{CardType, Id, Status, Ticket, SYSTEM};

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct Params {
    /// A Yellow card expires once it is strictly older than this many days.
    pub expire_days: i64,
    /// This many active Yellow cards convert into one Red card.
    pub convert_threshold: usize,
    /// Dashboard warning window for Yellow cards close to expiry.
    pub warning_days: i64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            expire_days: 30,
            convert_threshold: 3,
            warning_days: 7,
        }
    }
}

/// Applies expiry and escalation to the ticket table in place.
///
/// Expired and converted cards never match again, so running this twice
/// with the same `today` leaves the table untouched the second time. Cards
/// without a usable `date_received` are left alone entirely. Returns
/// whether anything changed, so callers can skip an unnecessary write.
pub fn process(
    tickets: &mut Vec<Ticket>,
    today: Date,
    params: &Params,
) -> bool {
    let mut changed = false;

    let cutoff = today - Duration::days(params.expire_days);
    for ticket in tickets.iter_mut() {
        if ticket.card_type == CardType::Yellow
            && ticket.status == Status::Active
            && ticket.date_received.is_some_and(|date| date < cutoff)
        {
            ticket.status = Status::Expired;
            changed = true;
        }
    }

    if params.convert_threshold == 0 {
        return changed;
    }

    let receivers: Vec<String> = tickets
        .iter()
        .map(|ticket| ticket.receiver.clone())
        .unique()
        .collect();
    for receiver in receivers {
        loop {
            let mut eligible: Vec<usize> = tickets
                .iter()
                .enumerate()
                .filter(|(_, ticket)| {
                    ticket.receiver == receiver
                        && ticket.card_type == CardType::Yellow
                        && ticket.status == Status::Active
                        && ticket.date_received.is_some()
                })
                .map(|(index, _)| index)
                .collect();
            if eligible.len() < params.convert_threshold {
                break;
            }

            // Stable by date, so ties keep their table order.
            eligible.sort_by_key(|&index| tickets[index].date_received);
            for &index in &eligible[..params.convert_threshold] {
                tickets[index].status = Status::Converted;
            }

            tickets.insert(
                0,
                Ticket {
                    id: Id::new(),
                    receiver: receiver.clone(),
                    card_type: CardType::Red,
                    date_received: Some(today),
                    submitted_by: SYSTEM.to_owned(),
                    status: Status::Active,
                    note: Some(format!(
                        "Auto-converted from {} yellows",
                        params.convert_threshold,
                    )),
                },
            );
            changed = true;
        }
    }

    changed
}

/// Days left until a Yellow card expires; negative once it is past due.
pub fn days_until_expiry(
    date_received: Option<Date>,
    today: Date,
    params: &Params,
) -> Option<i64> {
    let received = date_received?;
    let expires_at = received + Duration::days(params.expire_days);
    Some((expires_at - today).whole_days())
}
