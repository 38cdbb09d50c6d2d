use derive_more::Display;
use serde::{Deserialize, Serialize};
use time::Date;
use uuid::Uuid;

/// `submitted_by` value of cards synthesized by the lifecycle engine.
pub const SYSTEM: &str = "system";

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Ticket {
    pub id: Id,
    pub receiver: String,
    pub card_type: CardType,
    #[serde(default, with = "approx_date")]
    pub date_received: Option<Date>,
    pub submitted_by: String,
    pub status: Status,
    pub note: Option<String>,
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
pub enum CardType {
    /// A warning. Expires after the configured window, and escalates into
    /// a [`CardType::Red`] once enough of them accumulate.
    Yellow,

    /// A penalty. Never expires on its own.
    Red,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Counts toward expiry and escalation.
    Active,

    /// A Yellow that outlived the expiry window.
    Expired,

    /// A Yellow consumed by an escalation. Never reactivated.
    Converted,
}

/// Calendar-date (de)serialization for `date_received`.
///
/// Dates are persisted as `YYYY-MM-DD`. Reading is lenient: any trailing
/// time-of-day is dropped (dates are normalized to midnight), and a value
/// that still fails to parse becomes `None`, which keeps the record out of
/// expiry/escalation matching instead of failing the whole table.
pub mod approx_date {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::{
        format_description::BorrowedFormatItem, macros::format_description,
        Date,
    };

    const FORMAT: &[BorrowedFormatItem<'static>] =
        format_description!("[year]-[month]-[day]");

    pub fn serialize<S: Serializer>(
        date: &Option<Date>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match date {
            Some(date) => {
                let formatted = date
                    .format(FORMAT)
                    .map_err(serde::ser::Error::custom)?;
                serializer.serialize_some(&formatted)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Date>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(parse))
    }

    pub fn parse(raw: &str) -> Option<Date> {
        let day = raw.trim().get(..10)?;
        Date::parse(day, FORMAT).ok()
    }
}
