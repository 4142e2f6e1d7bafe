// BSD 3-Clause License
// Copyright (c) 2025, Shipyard Contributors
//
//! Route handlers — thin bindings from HTTP to Scheduler/Reaper/Router/Affinity
//! (spec 4.8), grounded in the teacher's handler shapes in `noxterm.rs`
//! (`health_check`, `detailed_health_check`, `prometheus_metrics`).

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::AppState;
use crate::error::ShipyardError;
use crate::model::{Ship, ShipSpec};

fn require_session_header(headers: &HeaderMap) -> Result<String, ShipyardError> {
    headers
        .get("X-SESSION-ID")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ShipyardError::InvalidArgument("missing X-SESSION-ID header".into()))
}

/// The Ship record JSON shape from spec.md 6, supplemented with
/// `max_session_num`/`spec` since the rest of this API already exposes them
/// and no Non-goal excludes it.
#[derive(Debug, Serialize)]
pub struct ShipRecord {
    pub id: Uuid,
    pub status: u8,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub container_id: Option<String>,
    pub ip_address: Option<String>,
    pub ttl: i64,
    pub max_session_num: i32,
    pub spec: ShipSpec,
}

impl From<Ship> for ShipRecord {
    fn from(s: Ship) -> Self {
        Self {
            id: s.id,
            status: if s.status == crate::model::ShipStatus::Running { 1 } else { 0 },
            created_at: s.created_at,
            updated_at: s.updated_at,
            container_id: s.container_id,
            ip_address: s.address,
            ttl: s.ttl_seconds,
            max_session_num: s.max_session_num,
            spec: s.spec,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateShipBody {
    pub ttl: i64,
    #[serde(default)]
    pub spec: ShipSpec,
    #[serde(default = "default_max_session_num")]
    pub max_session_num: i32,
}

fn default_max_session_num() -> i32 {
    1
}

pub async fn create_ship(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateShipBody>,
) -> Result<Json<ShipRecord>, ShipyardError> {
    let session = require_session_header(&headers)?;

    // Open question resolution (SPEC_FULL 9): POST /ship is affinity-first.
    if let Some(ship_id) = state.affinity.lookup(&session) {
        let existing = state.repository.get(ship_id).await?;
        if existing.status == crate::model::ShipStatus::Running {
            return Ok(Json(existing.into()));
        }
    }

    let cancel = tokio_util::sync::CancellationToken::new();
    let ship = state
        .scheduler
        .create_ship(&session, body.ttl, body.spec, body.max_session_num, &cancel)
        .await?;
    Ok(Json(ship.into()))
}

pub async fn get_ship(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ShipRecord>, ShipyardError> {
    let ship = state.repository.get(id).await?;
    Ok(Json(ship.into()))
}

pub async fn delete_ship(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ShipyardError> {
    state.reaper.stop_now(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn exec_operation(
    State(state): State<AppState>,
    Path((id, oper_endpoint)): Path<(Uuid, String)>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, ShipyardError> {
    let session = require_session_header(&headers)?;
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    let upstream = state
        .router
        .forward(id, &session, &oper_endpoint, body.to_vec(), content_type)
        .await?;

    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = (status, upstream.body).into_response();
    if let Some(ct) = upstream.content_type {
        if let Ok(value) = axum::http::HeaderValue::from_str(&ct) {
            response.headers_mut().insert(axum::http::header::CONTENT_TYPE, value);
        }
    }
    Ok(response)
}

/// Tails the last 64 KiB (SPEC_FULL 9's resolution of the unspecified default).
const LOG_TAIL_BYTES: usize = 64 * 1024;

pub async fn ship_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<String, ShipyardError> {
    let ship = state.repository.get(id).await?;
    let container_id = ship
        .container_id
        .ok_or_else(|| ShipyardError::IllegalState(format!("ship {id} has no container")))?;

    let logs = state.driver.logs(&container_id, Some(LOG_TAIL_BYTES)).await?;
    Ok(String::from_utf8_lossy(&logs).into_owned())
}

#[derive(Debug, Deserialize)]
pub struct ExtendTtlBody {
    pub ttl: i64,
}

pub async fn extend_ttl(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ExtendTtlBody>,
) -> Result<Json<ShipRecord>, ShipyardError> {
    let ship = state.reaper.extend_ttl(id, body.ttl).await?;
    Ok(Json(ship.into()))
}

pub async fn root() -> impl IntoResponse {
    Html("<h1>Shipyard</h1><p>Bay control plane</p>")
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn health_detailed(State(state): State<AppState>) -> impl IntoResponse {
    // inspect() on a name that can't exist still tells us whether the backend
    // itself is reachable: NotFound means it answered, BackendUnavailable means it didn't.
    let driver_ok = !matches!(
        state.driver.inspect("shipyard-health-probe").await,
        Err(crate::driver::DriverError::BackendUnavailable(_))
    );
    let repository_ok = state.repository.list_live().await.is_ok();

    let status = if driver_ok && repository_ok { "healthy" } else { "degraded" };

    Json(serde_json::json!({
        "status": status,
        "service": "shipyard-bay",
        "version": env!("CARGO_PKG_VERSION"),
        "build_time": env!("BUILD_TIME"),
        "git_hash": env!("GIT_HASH"),
        "components": {
            "driver": driver_ok,
            "repository": repository_ok,
        },
        "fleet": {
            "live_count": state.capacity.live_count(),
            "max_ship_num": state.capacity.max(),
            "waiters": state.capacity.waiter_count(),
        },
        "timestamp": chrono::Utc::now(),
    }))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let live_count = state.capacity.live_count();
    let max = state.capacity.max();
    let waiters = state.capacity.waiter_count();

    let body = format!(
        "# HELP shipyard_live_ships Number of ships counted against MAX_SHIP_NUM\n\
         # TYPE shipyard_live_ships gauge\n\
         shipyard_live_ships {live_count}\n\
         # HELP shipyard_max_ship_num Configured fleet capacity\n\
         # TYPE shipyard_max_ship_num gauge\n\
         shipyard_max_ship_num {max}\n\
         # HELP shipyard_capacity_waiters Callers blocked on the wait admission policy\n\
         # TYPE shipyard_capacity_waiters gauge\n\
         shipyard_capacity_waiters {waiters}\n"
    );

    (StatusCode::OK, [("content-type", "text/plain; charset=utf-8")], body)
}
