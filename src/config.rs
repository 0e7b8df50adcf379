use std::env;
use std::net::SocketAddr;
use anyhow::{Context, Result};
use zeroize::Zeroizing;

use crate::validation::auth::{
    normalize_credential, parse_credentials_json, AdminCredential, CredentialConfig,
};

/// Minimum length of `SESSION_SECRET`.
pub const MIN_SESSION_SECRET_LENGTH: usize = 32;

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The address the server listens on.
    pub bind_addr: SocketAddr,
    /// The URL of the PostgreSQL database. Unset means in-memory storage.
    pub database_url: Option<String>,
    /// The URL of the Redis server used for rate-limit buckets.
    pub redis_url: Option<String>,
    /// The HMAC key for session cookies.
    pub session_secret: Zeroizing<Vec<u8>>,
    /// The admin logins.
    pub credentials: Vec<AdminCredential>,
    /// Marks cookies `Secure`.
    pub production: bool,
    /// Honour `x-forwarded-for` / `x-real-ip`.
    pub trust_proxy: bool,
    /// Origins allowed by CORS.
    pub cors_origins: Vec<String>,
}

fn flag(name: &str) -> bool {
    env::var(name)
        .map(|value| matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

impl Config {
    /// A development configuration with in-memory storage.
    pub fn new(session_secret: &[u8], credentials: Vec<AdminCredential>) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            database_url: None,
            redis_url: None,
            session_secret: Zeroizing::new(session_secret.to_vec()),
            credentials,
            production: false,
            trust_proxy: false,
            cors_origins: vec!["http://localhost:3000".to_string()],
        }
    }

    /// Creates a new `Config` from environment variables.
    pub fn from_env() -> Result<Self> {
        let session_secret = Zeroizing::new(
            env::var("SESSION_SECRET")
                .context("SESSION_SECRET must be set (generate with: openssl rand -hex 32)")?,
        );
        if session_secret.chars().count() < MIN_SESSION_SECRET_LENGTH {
            anyhow::bail!(
                "SESSION_SECRET must be at least {} characters",
                MIN_SESSION_SECRET_LENGTH
            );
        }

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
            .parse()
            .context("Invalid BIND_ADDR")?;

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            bind_addr,
            database_url: non_empty("DATABASE_URL"),
            redis_url: non_empty("REDIS_URL"),
            session_secret: Zeroizing::new(session_secret.as_bytes().to_vec()),
            credentials: credentials_from_env()?,
            production: env::var("APP_ENV").map(|v| v == "production").unwrap_or(false),
            trust_proxy: flag("TRUST_PROXY"),
            cors_origins,
        })
    }
}

/// Reads `ADMIN_CREDENTIALS`, falling back to `ADMIN_USERNAME` / `ADMIN_PASSWORD`.
fn credentials_from_env() -> Result<Vec<AdminCredential>> {
    if let Some(json) = non_empty("ADMIN_CREDENTIALS") {
        return parse_credentials_json(&json)
            .context("ADMIN_CREDENTIALS must be a JSON array of {username, password, role}");
    }

    let (Some(username), Some(password)) = (non_empty("ADMIN_USERNAME"), non_empty("ADMIN_PASSWORD"))
    else {
        return Ok(Vec::new());
    };

    let raw = CredentialConfig {
        username,
        password,
        role: None,
    };
    match normalize_credential(raw) {
        Ok(credential) => Ok(vec![credential]),
        Err(reason) => {
            tracing::warn!("ADMIN_USERNAME/ADMIN_PASSWORD ignored: {}", reason);
            Ok(Vec::new())
        }
    }
}
