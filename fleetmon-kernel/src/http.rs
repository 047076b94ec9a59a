/**
 * REST API - Operator and automation surface of the kernel
 *
 * ROUTES :
 *   GET  /health              liveness, always open
 *   GET  /system/health       uptime, poll counters, MQTT status
 *   GET  /site                full site (configuration + runtime state)
 *   GET  /hosts               hosts with availability and statistics
 *   GET  /applications        applications with running counts
 *   POST /poll                runs a full refresh, returns the errors
 *   POST /instances/command   {command, instances[]}, returns the errors
 *
 * SECURITY : x-api-key header checked against FLEETMON_API_KEY on every
 * route except /health.
 */

use crate::envelope::Command;
use crate::errors::ErrorLog;
use crate::health::{HealthTracker, KernelHealth};
use crate::node::ControlNode;
use crate::poller::run_poll_cycle;
use crate::topology::{Application, Host, InstanceKey, Site};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

pub const API_KEY_ENV: &str = "FLEETMON_API_KEY";

async fn require_api_key(req: Request, next: Next) -> Result<Response, StatusCode> {
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let expected = std::env::var(API_KEY_ENV).unwrap_or_default();
    if expected.is_empty() {
        tracing::warn!("{API_KEY_ENV} not set, API access denied");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        tracing::warn!(path = %req.uri().path(), "rejected request without valid api key");
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

#[derive(Clone)]
pub struct AppState {
    pub node: ControlNode,
    pub health: HealthTracker,
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub command: Command,
    pub instances: Vec<InstanceKey>,
}

#[derive(Debug, Serialize)]
pub struct ErrorsView {
    pub ok: bool,
    pub errors: ErrorLog,
}

impl From<ErrorLog> for ErrorsView {
    fn from(errors: ErrorLog) -> Self {
        Self { ok: errors.is_empty(), errors }
    }
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/site", get(get_site))
        .route("/hosts", get(get_hosts))
        .route("/applications", get(get_applications))
        .route("/poll", post(poll_now))
        .route("/instances/command", post(command_instances))
        .with_state(app_state)
        .layer(middleware::from_fn(require_api_key))
}

async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    let site = app.node.site();
    let site = site.read().await;
    Json(app.health.get_health(&site))
}

async fn get_site(State(app): State<AppState>) -> Json<Site> {
    Json(app.node.snapshot().await)
}

async fn get_hosts(State(app): State<AppState>) -> Json<Vec<Host>> {
    Json(app.node.site().read().await.hosts().to_vec())
}

async fn get_applications(State(app): State<AppState>) -> Json<Vec<Application>> {
    Json(app.node.site().read().await.applications().to_vec())
}

// POST /poll
async fn poll_now(State(app): State<AppState>) -> Json<ErrorsView> {
    Json(run_poll_cycle(&app.node, &app.health).await.into())
}

// POST /instances/command
async fn command_instances(
    State(app): State<AppState>,
    Json(req): Json<CommandRequest>,
) -> Result<Json<ErrorsView>, StatusCode> {
    if req.instances.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let mut log = ErrorLog::new();
    app.node.command(req.command, &req.instances, &mut log).await;
    Ok(Json(log.into()))
}
