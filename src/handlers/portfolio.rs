use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::{AppError, Result},
    handlers::entries::json_object,
    middleware_layer::{
        auth::CurrentSession,
        rate_limit::{ClientIp, HOLDINGS_WRITE, SNAPSHOTS_WRITE},
    },
    services::{
        audit,
        metrics::{performance_highlights, PortfolioPoint},
    },
    state::AppState,
    validation::{
        holdings_csv::parse_default,
        portfolio::{
            normalize_bulk_holdings, normalize_holding, normalize_holding_update,
            normalize_snapshot, parse_iso_date, PortfolioError,
        },
    },
};

pub async fn list_snapshots(State(state): State<AppState>) -> Result<Response> {
    let snapshots = state.store.list_snapshots().await?;
    Ok(Json(snapshots).into_response())
}

pub async fn upsert_snapshot(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Extension(current): Extension<CurrentSession>,
    body: Bytes,
) -> Result<Response> {
    state
        .rate_limiter
        .enforce("snapshots:write", &ip, SNAPSHOTS_WRITE)
        .await?;
    let session = current.require_writer()?;

    let payload = json_object(&body)?;
    let (date, value) = normalize_snapshot(&payload)?;
    let snapshot = state.store.upsert_snapshot(date, value).await?;

    audit::log_event(
        "portfolio_snapshot_saved",
        Some(&session),
        &ip,
        json!({ "date": snapshot.date, "value": snapshot.value }),
    );
    Ok(Json(snapshot).into_response())
}

#[derive(Debug, Deserialize)]
pub struct PerformanceQuery {
    pub today: Option<String>,
}

/// 7D / 30D / YTD changes and snapshot cadence.
pub async fn performance(
    State(state): State<AppState>,
    Query(query): Query<PerformanceQuery>,
) -> Result<Response> {
    let today = match query.today.as_deref() {
        Some(raw) => parse_iso_date(raw).ok_or_else(|| {
            AppError::Validation("today must be a YYYY-MM-DD date.".to_string())
        })?,
        None => Utc::now().date_naive(),
    };

    let snapshots = state.store.list_snapshots().await?;
    let points: Vec<PortfolioPoint> = snapshots.iter().map(PortfolioPoint::from).collect();
    Ok(Json(performance_highlights(&points, today)).into_response())
}

pub async fn list_holdings(State(state): State<AppState>) -> Result<Response> {
    let holdings = state.store.list_holdings().await?;
    Ok(Json(holdings).into_response())
}

/// Adds one holding, or up to 50 when the body carries a `holdings` array.
pub async fn add_holdings(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Extension(current): Extension<CurrentSession>,
    body: Bytes,
) -> Result<Response> {
    state
        .rate_limiter
        .enforce("holdings:write", &ip, HOLDINGS_WRITE)
        .await?;
    let session = current.require_writer()?;

    let payload = json_object(&body)?;

    if let Some(Value::Array(rows)) = payload.get("holdings") {
        let bulk = normalize_bulk_holdings(rows)?;
        let holdings = state.store.upsert_holdings(bulk.holdings).await?;
        audit::log_event(
            "portfolio_holdings_imported",
            Some(&session),
            &ip,
            json!({ "count": holdings.len(), "skipped": bulk.skipped }),
        );
        return Ok((
            StatusCode::CREATED,
            Json(json!({ "holdings": holdings, "skipped": bulk.skipped })),
        )
            .into_response());
    }

    let input = normalize_holding(&payload)?;
    let holding = state
        .store
        .upsert_holdings(vec![input])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Internal("Holding upsert returned no rows".to_string()))?;

    audit::log_event(
        "portfolio_holding_added",
        Some(&session),
        &ip,
        json!({ "id": holding.id, "ticker": holding.ticker }),
    );
    Ok((StatusCode::CREATED, Json(holding)).into_response())
}

/// Imports `ticker[,label]` lines from a plain-text CSV body.
pub async fn import_holdings_csv(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Extension(current): Extension<CurrentSession>,
    body: Bytes,
) -> Result<Response> {
    state
        .rate_limiter
        .enforce("holdings:write", &ip, HOLDINGS_WRITE)
        .await?;
    let session = current.require_writer()?;

    let text = std::str::from_utf8(&body)
        .map_err(|_| AppError::Validation("CSV must be UTF-8 text.".to_string()))?;
    let import = parse_default(text);

    if import.holdings.is_empty() {
        if import.errors.is_empty() {
            return Err(PortfolioError::EmptyImport.into());
        }
        return Err(AppError::ValidationDetails {
            message: "No valid holdings found in CSV.".to_string(),
            details: serde_json::to_value(&import.errors).unwrap_or_default(),
        });
    }

    let holdings = state.store.upsert_holdings(import.holdings.clone()).await?;
    audit::log_event(
        "portfolio_holdings_imported",
        Some(&session),
        &ip,
        json!({
            "count": holdings.len(),
            "skipped": import.skipped,
            "errors": import.errors.len(),
            "source": "csv",
        }),
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "holdings": holdings,
            "errors": import.errors,
            "skipped": import.skipped,
        })),
    )
        .into_response())
}

pub async fn update_holding(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response> {
    state
        .rate_limiter
        .enforce("holdings:write", &ip, HOLDINGS_WRITE)
        .await?;
    let session = current.require_writer()?;

    let payload = json_object(&body)?;
    let update = normalize_holding_update(&payload)?;
    let holding = state
        .store
        .update_holding(&id, update)
        .await?
        .ok_or_else(|| AppError::NotFound("Holding not found".to_string()))?;

    audit::log_event(
        "portfolio_holding_updated",
        Some(&session),
        &ip,
        json!({ "id": holding.id, "ticker": holding.ticker }),
    );
    Ok(Json(holding).into_response())
}

pub async fn delete_holding(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<String>,
) -> Result<Response> {
    state
        .rate_limiter
        .enforce("holdings:write", &ip, HOLDINGS_WRITE)
        .await?;
    let session = current.require_writer()?;

    if !state.store.delete_holding(&id).await? {
        return Err(AppError::NotFound("Holding not found".to_string()));
    }

    audit::log_event("portfolio_holding_deleted", Some(&session), &ip, json!({ "id": id }));
    Ok(Json(json!({ "success": true })).into_response())
}
