use serde::{Deserialize, Serialize};
use time::Date;

use crate::{lifecycle, store};

pub use crate::store::ticket::{CardType, Id, Status};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Id,
    pub receiver: String,
    pub card_type: CardType,
    #[serde(default, with = "crate::store::ticket::approx_date")]
    pub date_received: Option<Date>,
    pub submitted_by: String,
    pub status: Status,
    pub note: Option<String>,
    /// Only populated for active Yellow cards.
    pub days_until_expiry: Option<i64>,
}

impl Ticket {
    pub fn from_store(
        ticket: &store::Ticket,
        today: Date,
        params: &lifecycle::Params,
    ) -> Self {
        let days_until_expiry = (ticket.card_type == CardType::Yellow
            && ticket.status == Status::Active)
            .then(|| {
                lifecycle::days_until_expiry(
                    ticket.date_received,
                    today,
                    params,
                )
            })
            .flatten();
        Self {
            id: ticket.id,
            receiver: ticket.receiver.clone(),
            card_type: ticket.card_type,
            date_received: ticket.date_received,
            submitted_by: ticket.submitted_by.clone(),
            status: ticket.status,
            note: ticket.note.clone(),
            days_until_expiry,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub tickets: Vec<Ticket>,
    pub total_count: usize,
}
