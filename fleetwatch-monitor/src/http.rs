/**
 * REST API - Operator surface of the fleet monitor
 *
 * ROLE:
 * Exposes the panel controller over HTTP: the node table, feed selection and
 * start/stop/restart commands, plus process health.
 *
 * OPERATION:
 * - Axum router with an x-api-key middleware (FLEETWATCH_API_KEY)
 * - /health stays open for probes
 * - Handler failures become `ApiError`, rendered as `{ ok: false, msg }`
 */

use crate::health::{HealthTracker, MonitorHealth};
use crate::mqtt::{FeedError, FeedSwitcher};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fleetwatch_core::{CommandError, FleetMonitor, FleetTable, NodeAction, NodeIdentity};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{error, warn};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error("{0}")]
    BadAction(String),
    /// The panel would not offer the command right now.
    #[error(transparent)]
    Refused(CommandError),
    #[error("Could not call start_stop service")]
    CommandFailed,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match self {
            ApiError::Feed(FeedError::Topic(_)) | ApiError::BadAction(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Refused(_) => StatusCode::CONFLICT,
            ApiError::Feed(FeedError::Subscribe(_)) | ApiError::CommandFailed => {
                StatusCode::BAD_GATEWAY
            }
        };
        (code, Json(serde_json::json!({ "ok": false, "msg": self.to_string() }))).into_response()
    }
}

async fn require_api_key(req: Request, next: Next) -> Result<Response, StatusCode> {
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let expected = std::env::var("FLEETWATCH_API_KEY").unwrap_or_default();
    if expected.is_empty() {
        error!("FLEETWATCH_API_KEY not set, API access denied");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);

    if !ok {
        warn!("rejected request to {} without a valid api key", req.uri().path());
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<FleetMonitor>,
    pub health: HealthTracker,
    pub feeds: Arc<FeedSwitcher>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct FeedView {
    pub topic: Option<String>,
    pub base_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedRequest {
    pub topic: String,
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub namespace: String,
    pub name: String,
    pub action: String,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/nodes", get(get_nodes))
        .route("/feed", get(get_feed).put(put_feed))
        .route("/commands", post(post_command))
        .with_state(app_state)
        .layer(middleware::from_fn(require_api_key))
}

fn feed_view(monitor: &FleetMonitor) -> FeedView {
    let feed = monitor.feed();
    FeedView {
        topic: feed.as_ref().map(|f| f.topic().to_string()),
        base_address: feed.as_ref().map(|f| f.base_address().to_string()),
    }
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<MonitorHealth> {
    Json(app.health.get_health(&app.monitor, OffsetDateTime::now_utc()))
}

// GET /nodes
async fn get_nodes(State(app): State<AppState>) -> Json<FleetTable> {
    Json(app.monitor.table(OffsetDateTime::now_utc()))
}

// GET /feed
async fn get_feed(State(app): State<AppState>) -> Json<FeedView> {
    Json(feed_view(&app.monitor))
}

// PUT /feed
async fn put_feed(
    State(app): State<AppState>,
    Json(req): Json<FeedRequest>,
) -> Result<Json<FeedView>, ApiError> {
    app.feeds.switch(&app.monitor, &req.topic).await?;
    Ok(Json(feed_view(&app.monitor)))
}

// POST /commands
async fn post_command(
    State(app): State<AppState>,
    Json(req): Json<CommandRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let action: NodeAction = req.action.parse().map_err(ApiError::BadAction)?;
    let node = NodeIdentity::new(req.namespace, req.name);

    match app.monitor.send_command(&node, action, OffsetDateTime::now_utc()).await {
        Ok(()) => Ok(Json(serde_json::json!({ "ok": true }))),
        Err(CommandError::Channel(e)) => {
            error!("{} {} failed: {e}", action.label(), node.full_name());
            Err(ApiError::CommandFailed)
        }
        Err(refused) => {
            warn!("{} {} refused: {refused}", action.label(), node.full_name());
            Err(ApiError::Refused(refused))
        }
    }
}
