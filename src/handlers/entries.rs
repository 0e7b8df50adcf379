use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::{json, Map, Value};

use crate::{
    error::{AppError, Result},
    middleware_layer::{
        auth::CurrentSession,
        rate_limit::{ClientIp, ENTRY_CREATE, ENTRY_DELETE, ENTRY_UPDATE},
    },
    models::entry::EntryKind,
    services::audit,
    state::AppState,
    validation::entry::normalize_entry_input,
};

/// Parses a request body that must be a JSON object.
pub(crate) fn json_object(body: &[u8]) -> Result<Map<String, Value>> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(AppError::Validation("Invalid request body.".to_string())),
    }
}

fn parse_kind(kind: &str) -> Result<EntryKind> {
    kind.parse()
        .map_err(|_| AppError::NotFound("Not found".to_string()))
}

pub async fn list_entries(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Response> {
    let kind = parse_kind(&kind)?;
    let entries = state.store.list_entries(kind).await?;
    Ok(Json(entries).into_response())
}

pub async fn get_entry(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Response> {
    let kind = parse_kind(&kind)?;
    let entry = state
        .store
        .get_entry(kind, &id)
        .await?
        .ok_or_else(AppError::entry_not_found)?;
    Ok(Json(entry).into_response())
}

pub async fn create_entry(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Extension(current): Extension<CurrentSession>,
    Path(kind): Path<String>,
    body: Bytes,
) -> Result<Response> {
    let kind = parse_kind(&kind)?;
    state
        .rate_limiter
        .enforce(&format!("{}:create", kind), &ip, ENTRY_CREATE)
        .await?;
    let session = current.require_writer()?;

    let payload = json_object(&body)?;
    let input = normalize_entry_input(kind, &payload)?;
    let entry = state.store.create_entry(input).await?;

    audit::log_event(
        &format!("{}_created", kind.audit_noun()),
        Some(&session),
        &ip,
        json!({ "id": entry.id, "title": entry.fields.title() }),
    );
    Ok((StatusCode::CREATED, Json(entry)).into_response())
}

pub async fn update_entry(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Extension(current): Extension<CurrentSession>,
    Path((kind, id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response> {
    let kind = parse_kind(&kind)?;
    state
        .rate_limiter
        .enforce(&format!("{}:update", kind), &ip, ENTRY_UPDATE)
        .await?;
    let session = current.require_writer()?;

    let payload = json_object(&body)?;
    let input = normalize_entry_input(kind, &payload)?;
    let entry = state
        .store
        .update_entry(&id, input)
        .await?
        .ok_or_else(AppError::entry_not_found)?;

    audit::log_event(
        &format!("{}_updated", kind.audit_noun()),
        Some(&session),
        &ip,
        json!({ "id": entry.id, "title": entry.fields.title() }),
    );
    Ok(Json(entry).into_response())
}

pub async fn delete_entry(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Extension(current): Extension<CurrentSession>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Response> {
    let kind = parse_kind(&kind)?;
    state
        .rate_limiter
        .enforce(&format!("{}:delete", kind), &ip, ENTRY_DELETE)
        .await?;
    let session = current.require_writer()?;

    if !state.store.delete_entry(kind, &id).await? {
        return Err(AppError::entry_not_found());
    }

    audit::log_event(
        &format!("{}_deleted", kind.audit_noun()),
        Some(&session),
        &ip,
        json!({ "id": id }),
    );
    Ok(Json(json!({ "success": true })).into_response())
}
