use std::{net, path::PathBuf, time};

use serde::Deserialize;

use crate::lifecycle;

#[derive(Deserialize)]
pub struct Config {
    pub storage: Storage,
    pub http: Http,
    pub jwt: Jwt,
    pub auth: Auth,
    #[serde(default)]
    pub lifecycle: lifecycle::Params,
}

#[derive(Deserialize)]
pub struct Storage {
    pub data_dir: PathBuf,
}

#[derive(Deserialize)]
pub struct Http {
    pub server: Server,
    pub cors: Cors,
}

#[derive(Deserialize)]
pub struct Server {
    pub addr: net::SocketAddr,
}

#[derive(Deserialize)]
pub struct Cors {
    pub allowed_origins: Vec<String>,
}

#[derive(Deserialize)]
pub struct Auth {
    /// Fallback credential for the implicit `admin` account; a real
    /// `admin` row in the users table takes precedence.
    pub admin_password: String,
}

#[derive(Deserialize)]
pub struct Jwt {
    pub secret: String,
    #[serde(with = "humantime_serde")]
    pub expiration_time: time::Duration,
}
