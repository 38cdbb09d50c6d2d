use std::{error::Error, sync::Arc};

use axum::http::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use jsonwebtoken::{DecodingKey, EncodingKey};
use time::OffsetDateTime;
use tokio::{fs, net, sync::Mutex};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{
    layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

use card_tracker::{app, lifecycle, store, Config};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = fs::read_to_string("config.toml").await?;
    let config = toml::from_str::<Config>(&config)?;

    let store = store::Store::new(&config.storage.data_dir);
    let users = store.load_users().await?;
    let mut tickets = store.load_tickets().await?;
    #[cfg(feature = "rules")]
    let rules = store.load_rules().await?;

    // The persisted table must always reflect post-processing results, so
    // sweep right after loading.
    let today = OffsetDateTime::now_utc().date();
    if lifecycle::process(&mut tickets, today, &config.lifecycle) {
        store.save_tickets(&tickets).await?;
        tracing::info!("lifecycle sweep updated the ticket table on load");
    }

    let mut cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);
    for origin in &config.http.cors.allowed_origins {
        cors = cors.allow_origin(origin.parse::<HeaderValue>()?);
    }

    let app = app::router().layer(cors).with_state(Arc::new(app::AppState {
        store,
        users,
        tickets: Mutex::new(tickets),
        #[cfg(feature = "rules")]
        rules: Mutex::new(rules),
        lifecycle: config.lifecycle,
        admin_password: config.auth.admin_password,
        jwt_expiration_time: config.jwt.expiration_time,
        jwt_decoding_key: DecodingKey::from_secret(
            config.jwt.secret.as_bytes(),
        ),
        jwt_encoding_key: EncodingKey::from_secret(
            config.jwt.secret.as_bytes(),
        ),
    }));

    let listener = net::TcpListener::bind(config.http.server.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
