#[cfg(feature = "rules")]
pub mod rule;
pub mod summary;
pub mod ticket;
pub mod user;

#[cfg(feature = "rules")]
pub use self::rule::Rule;
pub use self::{ticket::Ticket, user::User};
