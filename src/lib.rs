//! Personal investing notebook: journal, learning and resource entries,
//! portfolio snapshots and holdings, behind a small admin-authenticated API.

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use tower_cookies::CookieManagerLayer;

pub mod config;
pub mod db;
pub mod error;
pub mod state;

pub mod crypto {
    pub mod password;
    pub mod session;
}

pub mod models {
    pub mod entry;
    pub mod portfolio;
    pub mod session;
}

pub mod repositories {
    pub mod memory;
    pub mod postgres;
    pub mod store;
}

pub mod services {
    pub mod audit;
    pub mod auth;
    pub mod backup;
    pub mod metrics;
    pub mod stats;
}

pub mod handlers {
    pub mod auth;
    pub mod backup;
    pub mod entries;
    pub mod portfolio;
    pub mod settings;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod rate_limit;
}

pub mod validation {
    pub mod auth;
    pub mod entry;
    pub mod holdings_csv;
    pub mod portfolio;
}

use state::AppState;

/// Every `/api` route, with cookie handling and session loading applied.
///
/// Tracing, CORS, compression and flood protection are added by the binary.
pub fn router(state: AppState) -> Router {
    let backup_body_limit =
        DefaultBodyLimit::max(services::backup::MAX_BACKUP_BODY_BYTES as usize);

    Router::new()
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/session", get(handlers::auth::session_info))
        .route("/api/stats", get(handlers::settings::stats))
        .route(
            "/api/settings",
            get(handlers::settings::get_settings).put(handlers::settings::update_settings),
        )
        .route(
            "/api/portfolio/snapshots",
            get(handlers::portfolio::list_snapshots).post(handlers::portfolio::upsert_snapshot),
        )
        .route(
            "/api/portfolio/performance",
            get(handlers::portfolio::performance),
        )
        .route(
            "/api/portfolio/holdings",
            get(handlers::portfolio::list_holdings).post(handlers::portfolio::add_holdings),
        )
        .route(
            "/api/portfolio/holdings/import",
            post(handlers::portfolio::import_holdings_csv),
        )
        .route(
            "/api/portfolio/holdings/{id}",
            put(handlers::portfolio::update_holding).delete(handlers::portfolio::delete_holding),
        )
        .route(
            "/api/backup",
            get(handlers::backup::export_backup)
                .post(handlers::backup::restore_backup)
                .layer(backup_body_limit),
        )
        .route(
            "/api/{kind}",
            get(handlers::entries::list_entries).post(handlers::entries::create_entry),
        )
        .route(
            "/api/{kind}/{id}",
            get(handlers::entries::get_entry)
                .put(handlers::entries::update_entry)
                .delete(handlers::entries::delete_entry),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::load_session,
        ))
        .layer(CookieManagerLayer::new())
        .with_state(state)
}
