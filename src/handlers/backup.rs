use axum::{
    body::to_bytes,
    extract::{multipart::MultipartError, FromRequest, Multipart, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::{AppError, Result},
    middleware_layer::{
        auth::CurrentSession,
        rate_limit::{ClientIp, BACKUP_EXPORT, BACKUP_RESTORE},
    },
    models::entry::EntrySet,
    services::{
        audit,
        backup::{
            encode_json, encode_zip, parse_backup_file, parse_backup_json, BackupError,
            JSON_FILENAME, MAX_BACKUP_BODY_BYTES, ZIP_FILENAME,
        },
    },
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

fn attachment(content_type: &'static str, filename: &str, body: Vec<u8>) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", filename);
    let mut response = body.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// Downloads every entry as pretty JSON, or as a ZIP with `?format=zip`.
pub async fn export_backup(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Extension(current): Extension<CurrentSession>,
    Query(query): Query<ExportQuery>,
) -> Result<Response> {
    state
        .rate_limiter
        .enforce("backup:export", &ip, BACKUP_EXPORT)
        .await?;
    let session = current.require_admin()?;

    let entries = state.store.all_entries().await?;
    let zip = query.format.as_deref() == Some("zip");
    let response = if zip {
        attachment("application/zip", ZIP_FILENAME, encode_zip(&entries)?)
    } else {
        attachment("application/json", JSON_FILENAME, encode_json(&entries)?)
    };

    audit::log_event(
        "backup_exported",
        Some(&session),
        &ip,
        json!({ "counts": entries.counts(), "format": if zip { "zip" } else { "json" } }),
    );
    Ok(response)
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        BackupError::FileTooLarge.into()
    } else {
        AppError::Validation(err.body_text())
    }
}

async fn read_multipart(state: &AppState, request: Request) -> Result<EntrySet> {
    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| AppError::Validation(e.body_text()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(multipart_error)?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(multipart_error)?;
        tracing::debug!(
            "📦 Backup upload {:?} ({} bytes)",
            filename.as_deref().unwrap_or("unnamed"),
            bytes.len()
        );
        return Ok(parse_backup_file(
            filename.as_deref(),
            content_type.as_deref(),
            &bytes,
            Utc::now(),
        )?);
    }

    Err(BackupError::MissingFile.into())
}

/// Replaces every entry with the contents of a validated backup.
pub async fn restore_backup(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Extension(current): Extension<CurrentSession>,
    request: Request,
) -> Result<Response> {
    state
        .rate_limiter
        .enforce("backup:restore", &ip, BACKUP_RESTORE)
        .await?;
    let session = current.require_admin()?;

    if content_length(request.headers()).is_some_and(|len| len > MAX_BACKUP_BODY_BYTES) {
        return Err(BackupError::FileTooLarge.into());
    }

    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let entries = if is_multipart {
        read_multipart(&state, request).await?
    } else {
        let body = to_bytes(request.into_body(), MAX_BACKUP_BODY_BYTES as usize)
            .await
            .map_err(|_| AppError::from(BackupError::FileTooLarge))?;
        parse_backup_json(&body, Utc::now())?
    };

    let counts = match state.store.replace_all_entries(entries).await {
        Ok(counts) => counts,
        Err(e) => {
            audit::log_failure(
                "backup_restored",
                &e.to_string(),
                Some(&session),
                &ip,
                json!({}),
            );
            return Err(e);
        }
    };

    tracing::info!("✅ Backup restored by {}", session.username);
    audit::log_event("backup_restored", Some(&session), &ip, json!({ "counts": counts }));
    Ok(Json(json!({ "success": true, "counts": counts })).into_response())
}
