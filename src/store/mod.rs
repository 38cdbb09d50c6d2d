#[cfg(feature = "rules")]
pub mod rule;
pub mod ticket;
pub mod user;

use std::{io, path::PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;

#[cfg(feature = "rules")]
pub use self::rule::Rule;
pub use self::{ticket::Ticket, user::User};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("storage i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode the primary table format: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to encode the fallback table format: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// File-backed table storage.
///
/// Each table lives under the data directory as `<table>.json` (primary)
/// with `<table>.yaml` as a hand-editable plain-text fallback. A corrupt or
/// missing primary never fails a load: the fallback is tried next, and the
/// empty table is the last resort.
pub struct Store {
    data_dir: PathBuf,
}

impl Store {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub async fn load_users(&self) -> Result<Vec<User>, Error> {
        self.load_table("users").await
    }

    pub async fn load_tickets(&self) -> Result<Vec<Ticket>, Error> {
        self.load_table("tickets").await
    }

    pub async fn save_tickets(
        &self,
        tickets: &[Ticket],
    ) -> Result<(), Error> {
        self.save_table("tickets", tickets).await
    }

    #[cfg(feature = "rules")]
    pub async fn load_rules(&self) -> Result<Vec<Rule>, Error> {
        self.load_table("rules").await
    }

    #[cfg(feature = "rules")]
    pub async fn save_rules(&self, rules: &[Rule]) -> Result<(), Error> {
        self.save_table("rules", rules).await
    }

    async fn load_table<T>(&self, name: &str) -> Result<Vec<T>, Error>
    where
        T: DeserializeOwned + Serialize,
    {
        let json_path = self.data_dir.join(format!("{name}.json"));
        match fs::read(&json_path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(rows) => return Ok(rows),
                Err(e) => {
                    tracing::warn!("unreadable {name}.json, trying the fallback: {e}");
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!("unreadable {name}.json, trying the fallback: {e}");
            }
        }

        let yaml_path = self.data_dir.join(format!("{name}.yaml"));
        let rows = match fs::read(&yaml_path).await {
            Ok(bytes) => match serde_yaml::from_slice::<Vec<T>>(&bytes) {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::warn!(
                        "unreadable {name}.yaml, starting from an empty table: {e}"
                    );
                    return Ok(Vec::new());
                }
            },
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(
                        "unreadable {name}.yaml, starting from an empty table: {e}"
                    );
                }
                return Ok(Vec::new());
            }
        };

        // Best effort: the fallback copy stays authoritative until the next
        // successful save.
        if let Ok(bytes) = serde_json::to_vec_pretty(&rows) {
            let _ = fs::write(&json_path, bytes).await;
        }

        Ok(rows)
    }

    async fn save_table<T: Serialize>(
        &self,
        name: &str,
        rows: &[T],
    ) -> Result<(), Error> {
        let bytes = serde_json::to_vec_pretty(rows)?;
        let json_path = self.data_dir.join(format!("{name}.json"));
        if let Err(e) = fs::write(&json_path, bytes).await {
            tracing::warn!("failed to write {name}.json, falling back: {e}");
            let yaml = serde_yaml::to_string(rows)?;
            fs::write(self.data_dir.join(format!("{name}.yaml")), yaml)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::{
        ticket::{CardType, Status},
        *,
    };

    fn store(dir: &tempfile::TempDir) -> Store {
        Store::new(dir.path())
    }

    fn ticket(n: u128) -> Ticket {
        Ticket {
            id: ticket::Id::from(n),
            receiver: "alice".to_owned(),
            card_type: CardType::Yellow,
            date_received: Some(date!(2024 - 06 - 01)),
            submitted_by: "bob".to_owned(),
            status: Status::Active,
            note: None,
        }
    }

    #[tokio::test]
    async fn absent_files_yield_empty_tables() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(store(&dir).load_tickets().await.unwrap(), vec![]);
        assert_eq!(store(&dir).load_users().await.unwrap(), vec![]);
    }

    #[tokio::test]
    async fn tickets_round_trip_through_the_primary_format() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let tickets = vec![ticket(1), ticket(2)];
        store.save_tickets(&tickets).await.unwrap();
        assert_eq!(store.load_tickets().await.unwrap(), tickets);
    }

    #[tokio::test]
    async fn corrupt_primary_falls_back_to_plain_text() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let tickets = vec![ticket(1)];
        let yaml = serde_yaml::to_string(&tickets).unwrap();
        std::fs::write(dir.path().join("tickets.yaml"), yaml).unwrap();
        std::fs::write(dir.path().join("tickets.json"), b"{oops").unwrap();

        assert_eq!(store.load_tickets().await.unwrap(), tickets);
    }

    #[tokio::test]
    async fn fallback_read_regenerates_the_primary() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let tickets = vec![ticket(1)];
        let yaml = serde_yaml::to_string(&tickets).unwrap();
        std::fs::write(dir.path().join("tickets.yaml"), yaml).unwrap();

        assert_eq!(store.load_tickets().await.unwrap(), tickets);

        let regenerated =
            std::fs::read(dir.path().join("tickets.json")).unwrap();
        let parsed: Vec<Ticket> =
            serde_json::from_slice(&regenerated).unwrap();
        assert_eq!(parsed, tickets);
    }

    #[tokio::test]
    async fn corrupt_primary_and_fallback_yield_the_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tickets.json"), b"{oops").unwrap();
        std::fs::write(dir.path().join("tickets.yaml"), b"[oops").unwrap();

        assert_eq!(store(&dir).load_tickets().await.unwrap(), vec![]);
    }

    #[cfg(feature = "rules")]
    #[tokio::test]
    async fn rules_round_trip() {
        use std::collections::BTreeSet;

        use time::macros::datetime;

        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let rules = vec![Rule {
            id: rule::Id::from(1),
            text: "Quiet hours after 23:00".to_owned(),
            created_by: "alice".to_owned(),
            status: rule::Status::PendingAdd,
            approvals: BTreeSet::from(["bob".to_owned()]),
            proposed_by: "alice".to_owned(),
            timestamp: datetime!(2024-06-01 12:00:00 UTC),
        }];
        store.save_rules(&rules).await.unwrap();
        assert_eq!(store.load_rules().await.unwrap(), rules);
    }
}
