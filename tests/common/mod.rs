use std::sync::Arc;

use card_tracker::{api, app, lifecycle, store};
use jsonwebtoken::{DecodingKey, EncodingKey};
use reqwest::StatusCode;
use serde_json::json;
use tempfile::TempDir;
use time::{macros::format_description, Duration, OffsetDateTime};
use tokio::{net, sync::Mutex};

const JWT_SECRET: &str = "test-secret";

pub const ADMIN_PASSWORD: &str = "adminpw";

/// Seeded through the store's plain-text fallback format, the way a fresh
/// household would hand-author its roster.
const USERS_YAML: &str = "\
- username: alice
  display_name: Alice
  password: password
- username: bob
  display_name: Bob
  password: password
- username: charlie
  display_name: Charlie
  password: null
";

pub struct TestApp {
    pub base_url: String,
    _data_dir: TempDir,
}

pub async fn spawn() -> TestApp {
    let data_dir = tempfile::tempdir().expect("failed to create a data dir");
    std::fs::write(data_dir.path().join("users.yaml"), USERS_YAML)
        .expect("failed to seed users");

    let store = store::Store::new(data_dir.path());
    let users = store.load_users().await.expect("failed to load users");
    let tickets = store.load_tickets().await.expect("failed to load tickets");
    #[cfg(feature = "rules")]
    let rules = store.load_rules().await.expect("failed to load rules");

    let state = Arc::new(app::AppState {
        store,
        users,
        tickets: Mutex::new(tickets),
        #[cfg(feature = "rules")]
        rules: Mutex::new(rules),
        lifecycle: lifecycle::Params::default(),
        admin_password: ADMIN_PASSWORD.to_owned(),
        jwt_expiration_time: std::time::Duration::from_secs(3600),
        jwt_decoding_key: DecodingKey::from_secret(JWT_SECRET.as_bytes()),
        jwt_encoding_key: EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    });

    let listener = net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind a port");
    let addr = listener.local_addr().expect("failed to get the local addr");
    tokio::spawn(async move {
        axum::serve(listener, app::router().with_state(state))
            .await
            .expect("server failed");
    });

    TestApp {
        base_url: format!("http://{addr}"),
        _data_dir: data_dir,
    }
}

impl TestApp {
    pub fn client(&self) -> Client {
        Client {
            base_url: self.base_url.clone(),
            inner: reqwest::Client::new(),
            auth_token: None,
        }
    }
}

/// `date_received` for a card issued this many days ago.
pub fn days_ago(days: i64) -> String {
    let date = OffsetDateTime::now_utc().date() - Duration::days(days);
    date.format(format_description!("[year]-[month]-[day]"))
        .expect("failed to format a date")
}

pub struct Client {
    base_url: String,
    inner: reqwest::Client,
    pub auth_token: Option<String>,
}

impl Client {
    pub async fn auth(mut self, login: &str, password: &str) -> Self {
        self.auth_token = Some(
            self.try_auth(login, password)
                .await
                .expect("failed to authenticate"),
        );
        self
    }

    pub async fn try_auth(
        &self,
        login: &str,
        password: &str,
    ) -> Result<String, StatusCode> {
        Ok(self
            .inner
            .post(format!("{}/auth", self.base_url))
            .json(&json!({
                "login": login,
                "password": password,
            }))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .text()
            .await
            .expect("failed to get a response"))
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.with_token(self.inner.get(format!("{}{path}", self.base_url)))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.with_token(self.inner.post(format!("{}{path}", self.base_url)))
    }

    fn patch(&self, path: &str) -> reqwest::RequestBuilder {
        self.with_token(self.inner.patch(format!("{}{path}", self.base_url)))
    }

    fn delete(&self, path: &str) -> reqwest::RequestBuilder {
        self.with_token(self.inner.delete(format!("{}{path}", self.base_url)))
    }

    fn with_token(
        &self,
        req: reqwest::RequestBuilder,
    ) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => {
                req.header("Authorization", format!("Bearer {token}"))
            }
            None => req,
        }
    }

    pub async fn user(&self) -> Result<api::User, StatusCode> {
        Ok(self
            .get("/user")
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json()
            .await
            .expect("failed to get a response"))
    }

    pub async fn get_tickets(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<api::ticket::List, StatusCode> {
        Ok(self
            .get(&format!("/ticket?offset={offset}&limit={limit}"))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json()
            .await
            .expect("failed to get a response"))
    }

    pub async fn add_ticket(
        &self,
        receiver: &str,
        card_type: &str,
        date_received: Option<&str>,
        note: Option<&str>,
    ) -> Result<api::Ticket, StatusCode> {
        Ok(self
            .post("/ticket")
            .json(&json!({
                "receiver": receiver,
                "cardType": card_type,
                "dateReceived": date_received,
                "note": note,
            }))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json()
            .await
            .expect("failed to get a response"))
    }

    pub async fn get_ticket(
        &self,
        id: api::ticket::Id,
    ) -> Result<api::Ticket, StatusCode> {
        Ok(self
            .get(&format!("/ticket/{id}"))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json()
            .await
            .expect("failed to get a response"))
    }

    pub async fn edit_ticket_status(
        &self,
        id: api::ticket::Id,
        status: &str,
    ) -> Result<api::Ticket, StatusCode> {
        Ok(self
            .patch(&format!("/ticket/{id}"))
            .json(&json!({
                "op": "editStatus",
                "data": {
                    "status": status,
                }
            }))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json()
            .await
            .expect("failed to get a response"))
    }

    pub async fn edit_ticket_receiver(
        &self,
        id: api::ticket::Id,
        receiver: &str,
    ) -> Result<api::Ticket, StatusCode> {
        Ok(self
            .patch(&format!("/ticket/{id}"))
            .json(&json!({
                "op": "editReceiver",
                "data": {
                    "receiver": receiver,
                }
            }))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json()
            .await
            .expect("failed to get a response"))
    }

    pub async fn delete_ticket(
        &self,
        id: api::ticket::Id,
    ) -> Result<(), StatusCode> {
        self.delete(&format!("/ticket/{id}"))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?;
        Ok(())
    }

    pub async fn summary(&self) -> Result<api::summary::List, StatusCode> {
        Ok(self
            .get("/summary")
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json()
            .await
            .expect("failed to get a response"))
    }
}

#[cfg(feature = "rules")]
impl Client {
    pub async fn get_rules(&self) -> Result<api::rule::List, StatusCode> {
        Ok(self
            .get("/rule")
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json()
            .await
            .expect("failed to get a response"))
    }

    pub async fn propose_rule(
        &self,
        text: &str,
    ) -> Result<api::rule::List, StatusCode> {
        Ok(self
            .post("/rule")
            .json(&json!({ "text": text }))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json()
            .await
            .expect("failed to get a response"))
    }

    pub async fn rule_op(
        &self,
        id: api::rule::Id,
        op: &str,
    ) -> Result<api::rule::List, StatusCode> {
        Ok(self
            .patch(&format!("/rule/{id}"))
            .json(&json!({ "op": op }))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json()
            .await
            .expect("failed to get a response"))
    }

    pub async fn delete_rule(
        &self,
        id: api::rule::Id,
    ) -> Result<api::rule::List, StatusCode> {
        Ok(self
            .delete(&format!("/rule/{id}"))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json()
            .await
            .expect("failed to get a response"))
    }
}
