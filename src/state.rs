use redis::aio::ConnectionManager;
use std::sync::Arc;

use crate::config::Config;
use crate::crypto::session::SessionCodec;
use crate::middleware_layer::rate_limit::{LoginLimiter, RateLimiter, RedisBucketStore};
use crate::repositories::{memory::MemoryStore, postgres::PgStore, store::NotebookStore};
use crate::services::auth::CredentialStore;

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Arc<Config>,
    /// Entries, portfolio data and settings.
    pub store: Arc<dyn NotebookStore>,
    /// Signs and verifies session cookies.
    pub sessions: SessionCodec,
    /// The admin logins.
    pub credentials: CredentialStore,
    /// Failed login attempts per IP.
    pub login_limiter: LoginLimiter,
    /// Per-action write limits per IP.
    pub rate_limiter: RateLimiter,
}

impl AppState {
    /// Builds the state from configuration, connecting to PostgreSQL and
    /// Redis when they are configured.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn NotebookStore> = match &config.database_url {
            Some(url) => {
                let pool = crate::db::create_pool(url)?;
                crate::db::run_migrations(&pool).await?;
                tracing::info!("✅ PostgreSQL pool initialized and migrations applied");
                Arc::new(PgStore::new(pool))
            }
            None => {
                tracing::warn!("⚠️ DATABASE_URL not set, using in-memory storage");
                Arc::new(MemoryStore::new())
            }
        };

        let (login_limiter, rate_limiter) = match &config.redis_url {
            Some(url) => {
                let client = redis::Client::open(url.as_str())?;
                let redis = ConnectionManager::new(client).await?;
                tracing::info!("✅ Redis Connection Manager initialized for rate limits");
                (
                    LoginLimiter::new(Arc::new(RedisBucketStore::new(redis.clone(), "ig:login"))),
                    RateLimiter::new(Arc::new(RedisBucketStore::new(redis, "ig:rate"))),
                )
            }
            None => (LoginLimiter::in_memory(), RateLimiter::in_memory()),
        };

        Ok(Self::with_parts(config, store, login_limiter, rate_limiter))
    }

    /// In-memory storage and limiters.
    pub fn in_memory(config: Config) -> Self {
        Self::with_parts(
            config,
            Arc::new(MemoryStore::new()),
            LoginLimiter::in_memory(),
            RateLimiter::in_memory(),
        )
    }

    pub fn with_parts(
        config: Config,
        store: Arc<dyn NotebookStore>,
        login_limiter: LoginLimiter,
        rate_limiter: RateLimiter,
    ) -> Self {
        let credentials = CredentialStore::new(config.credentials.clone());
        if credentials.is_empty() {
            tracing::warn!("⚠️ No admin credentials configured; write actions are disabled");
        } else {
            tracing::info!("✅ {} admin credential(s) loaded", credentials.len());
        }

        Self {
            sessions: SessionCodec::new(&config.session_secret),
            credentials,
            config: Arc::new(config),
            store,
            login_limiter,
            rate_limiter,
        }
    }
}
