use std::{cmp, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, RequestPartsExt as _, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use derive_more::From;
use jsonwebtoken::{
    decode, encode, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use tokio::sync::Mutex;

#[cfg(feature = "rules")]
use crate::governance;
use crate::{
    api, lifecycle,
    store::{self, user::ADMIN},
};

pub type SharedAppState = Arc<AppState>;

pub struct AppState {
    pub store: store::Store,

    /// Loaded once at startup; this core never mutates the users table.
    pub users: Vec<store::User>,

    pub tickets: Mutex<Vec<store::Ticket>>,

    #[cfg(feature = "rules")]
    pub rules: Mutex<Vec<store::Rule>>,

    pub lifecycle: lifecycle::Params,

    pub admin_password: String,

    pub jwt_expiration_time: Duration,

    pub jwt_decoding_key: DecodingKey,

    pub jwt_encoding_key: EncodingKey,
}

pub fn router() -> Router<SharedAppState> {
    let router = Router::new()
        .route("/auth", post(auth))
        .route("/user", get(get_user))
        .route("/summary", get(get_summary))
        .route("/ticket", get(list_tickets).post(add_ticket))
        .route(
            "/ticket/:id",
            get(get_ticket).patch(edit_ticket).delete(delete_ticket),
        );

    #[cfg(feature = "rules")]
    let router = router
        .route("/rule", get(list_rules).post(propose_rule))
        .route(
            "/rule/:id",
            axum::routing::patch(edit_rule).delete(delete_rule),
        );

    router
}

fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

/// Resolves the session user, synthesizing the implicit `admin` account
/// when the users table has no such row.
fn session_user(
    state: &AppState,
    claims: &AuthClaims,
) -> Option<store::User> {
    store::user::find(&state.users, &claims.username)
        .cloned()
        .or_else(|| {
            (claims.username == ADMIN).then(|| store::User {
                username: ADMIN.to_owned(),
                display_name: ADMIN.to_owned(),
                password: None,
            })
        })
}

#[derive(Deserialize)]
struct AuthInput {
    login: String,
    password: String,
}

async fn auth(
    State(state): State<SharedAppState>,
    Json(AuthInput { login, password }): Json<AuthInput>,
) -> Result<String, AuthError> {
    use AuthError as E;

    let valid = match store::user::find(&state.users, &login) {
        Some(user) => user
            .password
            .as_deref()
            .map_or(true, |expected| expected == password),
        None => login == ADMIN && password == state.admin_password,
    };
    if !valid {
        return Err(E::WrongLoginOrPassword);
    }

    let expires_at = OffsetDateTime::now_utc() + state.jwt_expiration_time;
    encode(
        &Header::default(),
        &AuthClaims {
            username: login,
            exp: expires_at.unix_timestamp(),
        },
        &state.jwt_encoding_key,
    )
    .map_err(|_| E::InvalidToken)
}

#[derive(Debug)]
pub enum AuthError {
    InvalidToken,
    WrongLoginOrPassword,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::WrongLoginOrPassword => StatusCode::FORBIDDEN,
        }
        .into_response()
    }
}

async fn get_user(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
) -> Result<Json<api::User>, GetUserError> {
    use GetUserError as E;

    let my = session_user(&state, &auth_claims).ok_or(E::UserNotFound)?;

    Ok(Json(api::User {
        username: my.username,
        display_name: my.display_name,
    }))
}

#[derive(Debug)]
pub enum GetUserError {
    UserNotFound,
}

impl IntoResponse for GetUserError {
    fn into_response(self) -> Response {
        match self {
            Self::UserNotFound => StatusCode::INTERNAL_SERVER_ERROR,
        }
        .into_response()
    }
}

#[derive(Deserialize)]
struct ListTicketsInput {
    offset: usize,
    limit: usize,
}

async fn list_tickets(
    State(state): State<SharedAppState>,
    _: AuthClaims,
    Query(ListTicketsInput { offset, limit }): Query<ListTicketsInput>,
) -> Json<api::ticket::List> {
    let today = today();
    let tickets = state.tickets.lock().await;

    let mut rows: Vec<&store::Ticket> = tickets.iter().collect();
    // Newest first; undated cards sink to the end.
    rows.sort_by_key(|ticket| cmp::Reverse(ticket.date_received));

    Json(api::ticket::List {
        total_count: rows.len(),
        tickets: rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|ticket| {
                api::Ticket::from_store(ticket, today, &state.lifecycle)
            })
            .collect(),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddTicketInput {
    receiver: String,
    card_type: api::ticket::CardType,
    #[serde(default, with = "crate::store::ticket::approx_date")]
    date_received: Option<Date>,
    #[serde(default)]
    note: Option<String>,
}

async fn add_ticket(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Json(input): Json<AddTicketInput>,
) -> Result<Json<api::Ticket>, AddTicketError> {
    use AddTicketError as E;

    let my = session_user(&state, &auth_claims).ok_or(E::UserNotFound)?;
    if store::user::find(&state.users, &input.receiver).is_none() {
        return Err(E::ReceiverNotFound);
    }

    let today = today();
    let ticket = store::Ticket {
        id: store::ticket::Id::new(),
        receiver: input.receiver,
        card_type: input.card_type,
        date_received: Some(input.date_received.unwrap_or(today)),
        submitted_by: my.username,
        status: store::ticket::Status::Active,
        note: input.note,
    };
    let id = ticket.id;

    let mut tickets = state.tickets.lock().await;
    tickets.insert(0, ticket);
    lifecycle::process(&mut tickets, today, &state.lifecycle);
    state.store.save_tickets(&tickets).await?;

    // The new card may already have been consumed by an escalation.
    let stored = tickets
        .iter()
        .find(|ticket| ticket.id == id)
        .ok_or(E::TicketNotFound)?;
    Ok(Json(api::Ticket::from_store(stored, today, &state.lifecycle)))
}

#[derive(Debug, From)]
pub enum AddTicketError {
    #[from]
    StoreError(store::Error),
    ReceiverNotFound,
    TicketNotFound,
    UserNotFound,
}

impl IntoResponse for AddTicketError {
    fn into_response(self) -> Response {
        match self {
            Self::ReceiverNotFound => StatusCode::BAD_REQUEST,
            Self::StoreError(_)
            | Self::TicketNotFound
            | Self::UserNotFound => StatusCode::INTERNAL_SERVER_ERROR,
        }
        .into_response()
    }
}

async fn get_ticket(
    State(state): State<SharedAppState>,
    _: AuthClaims,
    Path(id): Path<api::ticket::Id>,
) -> Result<Json<api::Ticket>, GetTicketError> {
    use GetTicketError as E;

    let today = today();
    let tickets = state.tickets.lock().await;

    let ticket = tickets
        .iter()
        .find(|ticket| ticket.id == id)
        .ok_or(E::TicketNotFound)?;
    Ok(Json(api::Ticket::from_store(ticket, today, &state.lifecycle)))
}

#[derive(Debug)]
pub enum GetTicketError {
    TicketNotFound,
}

impl IntoResponse for GetTicketError {
    fn into_response(self) -> Response {
        match self {
            Self::TicketNotFound => StatusCode::NOT_FOUND,
        }
        .into_response()
    }
}

#[derive(Deserialize)]
#[serde(content = "data", rename_all = "camelCase", tag = "op")]
enum EditTicketInput {
    EditReceiver {
        receiver: String,
    },
    #[serde(rename_all = "camelCase")]
    EditCardType {
        card_type: api::ticket::CardType,
    },
    #[serde(rename_all = "camelCase")]
    EditDateReceived {
        #[serde(default, with = "crate::store::ticket::approx_date")]
        date_received: Option<Date>,
    },
    EditStatus {
        status: api::ticket::Status,
    },
    EditNote {
        note: Option<String>,
    },
}

async fn edit_ticket(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Path(id): Path<api::ticket::Id>,
    Json(op): Json<EditTicketInput>,
) -> Result<Json<api::Ticket>, EditTicketError> {
    use EditTicketError as E;
    use EditTicketInput as Op;

    let my = session_user(&state, &auth_claims).ok_or(E::UserNotFound)?;
    if !my.is_admin() {
        return Err(E::TicketCannotBeModified);
    }

    let today = today();
    let mut tickets = state.tickets.lock().await;
    let position = tickets
        .iter()
        .position(|ticket| ticket.id == id)
        .ok_or(E::TicketNotFound)?;

    match op {
        Op::EditReceiver { receiver } => {
            tickets[position].receiver = receiver;
        }
        Op::EditCardType { card_type } => {
            tickets[position].card_type = card_type;
        }
        Op::EditDateReceived { date_received } => {
            tickets[position].date_received = date_received;
        }
        Op::EditStatus { status } => {
            tickets[position].status = status;
        }
        Op::EditNote { note } => {
            tickets[position].note = note;
        }
    }

    // An edit can complete a convertible set, so re-run the lifecycle.
    lifecycle::process(&mut tickets, today, &state.lifecycle);
    state.store.save_tickets(&tickets).await?;

    let stored = tickets
        .iter()
        .find(|ticket| ticket.id == id)
        .ok_or(E::TicketNotFound)?;
    Ok(Json(api::Ticket::from_store(stored, today, &state.lifecycle)))
}

#[derive(Debug, From)]
pub enum EditTicketError {
    #[from]
    StoreError(store::Error),
    TicketCannotBeModified,
    TicketNotFound,
    UserNotFound,
}

impl IntoResponse for EditTicketError {
    fn into_response(self) -> Response {
        match self {
            Self::TicketCannotBeModified => StatusCode::BAD_REQUEST,
            Self::TicketNotFound => StatusCode::NOT_FOUND,
            Self::StoreError(_) | Self::UserNotFound => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
        .into_response()
    }
}

async fn delete_ticket(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Path(id): Path<api::ticket::Id>,
) -> Result<StatusCode, DeleteTicketError> {
    use DeleteTicketError as E;

    let my = session_user(&state, &auth_claims).ok_or(E::UserNotFound)?;
    if !my.is_admin() {
        return Err(E::TicketCannotBeDeleted);
    }

    let mut tickets = state.tickets.lock().await;
    let before = tickets.len();
    tickets.retain(|ticket| ticket.id != id);
    if tickets.len() == before {
        return Err(E::TicketNotFound);
    }
    state.store.save_tickets(&tickets).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, From)]
pub enum DeleteTicketError {
    #[from]
    StoreError(store::Error),
    TicketCannotBeDeleted,
    TicketNotFound,
    UserNotFound,
}

impl IntoResponse for DeleteTicketError {
    fn into_response(self) -> Response {
        match self {
            Self::TicketCannotBeDeleted => StatusCode::BAD_REQUEST,
            Self::TicketNotFound => StatusCode::NOT_FOUND,
            Self::StoreError(_) | Self::UserNotFound => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
        .into_response()
    }
}

async fn get_summary(
    State(state): State<SharedAppState>,
    _: AuthClaims,
) -> Json<api::summary::List> {
    use store::ticket::{CardType, Status};

    let today = today();
    let tickets = state.tickets.lock().await;

    let mut users: Vec<api::summary::UserSummary> = state
        .users
        .iter()
        .map(|user| {
            let mut row = api::summary::UserSummary {
                username: user.username.clone(),
                display_name: user.display_name.clone(),
                ..Default::default()
            };
            for ticket in tickets
                .iter()
                .filter(|ticket| ticket.receiver == user.username)
            {
                let active = ticket.status == Status::Active;
                match ticket.card_type {
                    CardType::Yellow => {
                        row.total_yellows += 1;
                        if active {
                            row.active_yellows += 1;
                            let expiring = lifecycle::days_until_expiry(
                                ticket.date_received,
                                today,
                                &state.lifecycle,
                            )
                            .is_some_and(|days| {
                                0 < days
                                    && days <= state.lifecycle.warning_days
                            });
                            if expiring {
                                row.expiring_soon += 1;
                            }
                        }
                    }
                    CardType::Red => {
                        row.total_reds += 1;
                        if active {
                            row.active_reds += 1;
                        }
                    }
                }
            }
            row.slacker_score = row.total_yellows + 3 * row.total_reds;
            row
        })
        .collect();
    users.sort_by_key(|row| cmp::Reverse(row.slacker_score));

    Json(api::summary::List { users })
}

#[cfg(feature = "rules")]
async fn list_rules(
    State(state): State<SharedAppState>,
    _: AuthClaims,
) -> Json<api::rule::List> {
    let rules = state.rules.lock().await;
    Json(api::rule::List::from_store(&rules, &state.users))
}

#[cfg(feature = "rules")]
#[derive(Deserialize)]
struct ProposeRuleInput {
    text: String,
}

#[cfg(feature = "rules")]
async fn propose_rule(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Json(ProposeRuleInput { text }): Json<ProposeRuleInput>,
) -> Result<Json<api::rule::List>, ProposeRuleError> {
    use ProposeRuleError as E;

    let my = session_user(&state, &auth_claims).ok_or(E::UserNotFound)?;
    let text = text.trim().to_owned();
    if text.is_empty() {
        return Err(E::EmptyText);
    }

    let mut rules = state.rules.lock().await;
    governance::propose_addition(
        &mut rules,
        &state.users,
        text,
        &my.username,
        OffsetDateTime::now_utc(),
    );
    state.store.save_rules(&rules).await?;

    Ok(Json(api::rule::List::from_store(&rules, &state.users)))
}

#[cfg(feature = "rules")]
#[derive(Debug, From)]
pub enum ProposeRuleError {
    #[from]
    StoreError(store::Error),
    EmptyText,
    UserNotFound,
}

#[cfg(feature = "rules")]
impl IntoResponse for ProposeRuleError {
    fn into_response(self) -> Response {
        match self {
            Self::EmptyText => StatusCode::BAD_REQUEST,
            Self::StoreError(_) | Self::UserNotFound => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
        .into_response()
    }
}

#[cfg(feature = "rules")]
#[derive(Deserialize)]
#[serde(content = "data", rename_all = "camelCase", tag = "op")]
enum EditRuleInput {
    ProposeRemoval,
    Approve,
    Reject,
    Activate,
}

#[cfg(feature = "rules")]
async fn edit_rule(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Path(id): Path<api::rule::Id>,
    Json(op): Json<EditRuleInput>,
) -> Result<Json<api::rule::List>, EditRuleError> {
    use EditRuleError as E;
    use EditRuleInput as Op;

    let my = session_user(&state, &auth_claims).ok_or(E::UserNotFound)?;
    let mut rules = state.rules.lock().await;

    let outcome = match op {
        Op::ProposeRemoval => governance::propose_removal(
            &mut rules,
            &state.users,
            id,
            &my.username,
        ),
        Op::Approve => {
            governance::approve(&mut rules, &state.users, id, &my.username)
        }
        Op::Reject => {
            governance::reject(&mut rules, &state.users, id, &my.username)
        }
        Op::Activate => {
            if !my.is_admin() {
                return Err(E::RuleCannotBeActivated);
            }
            governance::force_activate(&mut rules, id)
        }
    };

    match outcome {
        governance::Outcome::NotFound => return Err(E::RuleNotFound),
        governance::Outcome::Changed => {
            state.store.save_rules(&rules).await?;
        }
        // Invalid votes are no-ops, not errors.
        governance::Outcome::Unchanged => {}
    }

    Ok(Json(api::rule::List::from_store(&rules, &state.users)))
}

#[cfg(feature = "rules")]
#[derive(Debug, From)]
pub enum EditRuleError {
    #[from]
    StoreError(store::Error),
    RuleCannotBeActivated,
    RuleNotFound,
    UserNotFound,
}

#[cfg(feature = "rules")]
impl IntoResponse for EditRuleError {
    fn into_response(self) -> Response {
        match self {
            Self::RuleCannotBeActivated => StatusCode::BAD_REQUEST,
            Self::RuleNotFound => StatusCode::NOT_FOUND,
            Self::StoreError(_) | Self::UserNotFound => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
        .into_response()
    }
}

#[cfg(feature = "rules")]
async fn delete_rule(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Path(id): Path<api::rule::Id>,
) -> Result<Json<api::rule::List>, DeleteRuleError> {
    use DeleteRuleError as E;

    let my = session_user(&state, &auth_claims).ok_or(E::UserNotFound)?;
    if !my.is_admin() {
        return Err(E::RuleCannotBeDeleted);
    }

    let mut rules = state.rules.lock().await;
    match governance::force_delete(&mut rules, id) {
        governance::Outcome::NotFound => return Err(E::RuleNotFound),
        _ => state.store.save_rules(&rules).await?,
    }

    Ok(Json(api::rule::List::from_store(&rules, &state.users)))
}

#[cfg(feature = "rules")]
#[derive(Debug, From)]
pub enum DeleteRuleError {
    #[from]
    StoreError(store::Error),
    RuleCannotBeDeleted,
    RuleNotFound,
    UserNotFound,
}

#[cfg(feature = "rules")]
impl IntoResponse for DeleteRuleError {
    fn into_response(self) -> Response {
        match self {
            Self::RuleCannotBeDeleted => StatusCode::BAD_REQUEST,
            Self::RuleNotFound => StatusCode::NOT_FOUND,
            Self::StoreError(_) | Self::UserNotFound => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
        .into_response()
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AuthClaims {
    username: String,
    exp: i64,
}

#[async_trait]
impl FromRequestParts<SharedAppState> for AuthClaims {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut request::Parts,
        state: &SharedAppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AuthError::InvalidToken)?;
        let token_data = decode::<Self>(
            bearer.token(),
            &state.jwt_decoding_key,
            &Validation::default(),
        )
        .map_err(|_| AuthError::InvalidToken)?;

        Ok(token_data.claims)
    }
}
