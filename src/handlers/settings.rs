use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::json;

use crate::{
    error::Result,
    handlers::entries::json_object,
    middleware_layer::{
        auth::CurrentSession,
        rate_limit::{ClientIp, SETTINGS_UPDATE},
    },
    services::{audit, stats::compute_stats},
    state::AppState,
    validation::portfolio::normalize_settings,
};

pub async fn get_settings(State(state): State<AppState>) -> Result<Response> {
    let settings = state.store.get_settings().await?;
    Ok(Json(settings).into_response())
}

pub async fn update_settings(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Extension(current): Extension<CurrentSession>,
    body: Bytes,
) -> Result<Response> {
    state
        .rate_limiter
        .enforce("settings:update", &ip, SETTINGS_UPDATE)
        .await?;
    let session = current.require_admin()?;

    let payload = json_object(&body)?;
    let settings = normalize_settings(&payload)?;
    let saved = state.store.update_settings(settings).await?;

    audit::log_event(
        "site_settings_updated",
        Some(&session),
        &ip,
        json!({ "headline": saved.headline, "focusAreas": saved.focus_areas.len() }),
    );
    Ok(Json(saved).into_response())
}

/// Entry analytics for the dashboard.
pub async fn stats(State(state): State<AppState>) -> Result<Response> {
    let entries = state.store.all_entries().await?;
    Ok(Json(compute_stats(&entries)).into_response())
}
