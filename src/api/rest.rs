//! REST API Handlers
//!
//! Implements the `/v1` volume endpoints for a gateway bound to one driver
//! name, plus status, health and metrics endpoints.
//!
//! Transport failures (undecodable bodies, bad filters, unknown driver) are
//! reported with an HTTP status and an [`ApiErrorResponse`]. Failures of
//! create, update, delete and snapshot are embedded in the `error` field of
//! a 200 response.

use crate::api::metrics::GatewayMetrics;
use crate::domain::requests::{
    ApiErrorResponse, SnapCreateRequest, SnapCreateResponse, VolumeCreateRequest,
    VolumeCreateResponse, VolumeResponse, VolumeSetRequest, VolumeSetResponse,
};
use crate::domain::volume::{VolumeId, VolumeLocator};
use crate::drivers::{DriverHandle, DriverRegistry};
use crate::error::{Error, Result};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Json, Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Query parameter: name substring filter
pub const OPT_NAME: &str = "name";
/// Query parameter: JSON-encoded locator label filter
pub const OPT_LABEL: &str = "label";
/// Query parameter: JSON-encoded config label filter
pub const OPT_CONFIG_LABEL: &str = "configLabel";
/// Query parameter: volume id, may repeat
pub const OPT_VOLUME_ID: &str = "volumeID";

// =============================================================================
// Response Types
// =============================================================================

/// Body of `GET /v1/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverStatusResponse {
    pub driver: String,
    pub driver_type: String,
    pub capabilities: Vec<String>,
    pub status: Vec<(String, String)>,
}

// =============================================================================
// REST Router
// =============================================================================

/// Router builder for a gateway bound to one driver name
pub struct VolumeApi {
    registry: Arc<DriverRegistry>,
    driver: String,
    metrics: Arc<GatewayMetrics>,
}

impl VolumeApi {
    pub fn new(
        registry: Arc<DriverRegistry>,
        driver: impl Into<String>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            registry,
            driver: driver.into(),
            metrics,
        }
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            registry: self.registry,
            driver: Arc::from(self.driver),
            metrics: self.metrics,
        };

        Router::new()
            // Volume endpoints
            .route("/v1/volumes", post(create_volume).get(enumerate_volumes))
            .route(
                "/v1/volumes/:id",
                put(update_volume).get(inspect_volume).delete(delete_volume),
            )
            .route("/v1/volumes/stats", get(missing_volume_id))
            .route("/v1/volumes/stats/:id", get(volume_stats))
            .route("/v1/volumes/alerts", get(missing_volume_id))
            .route("/v1/volumes/alerts/:id", get(volume_alerts))
            .route("/v1/volumes/requests", get(missing_volume_id))
            .route("/v1/volumes/requests/:id", get(volume_requests))
            // Snapshot endpoints
            .route("/v1/snapshot", post(create_snapshot).get(enumerate_snapshots))
            // Driver status
            .route("/v1/status", get(driver_status))
            // Health and metrics
            .route("/health", get(health_check))
            .route("/metrics", get(metrics))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    registry: Arc<DriverRegistry>,
    driver: Arc<str>,
    metrics: Arc<GatewayMetrics>,
}

impl AppState {
    /// Resolve the bound driver, or the transport-level error response
    async fn resolve(&self, operation: &str) -> std::result::Result<DriverHandle, Response> {
        self.registry.get(&self.driver).await.map_err(|e| {
            warn!(driver = %self.driver, operation, error = %e, "driver unavailable");
            self.observe_error(operation, &e);
            let status = if e.is_not_found() {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            error_response(status, &e)
        })
    }

    fn log_request(&self, operation: &str, id: &str) {
        info!(driver = %self.driver, method = operation, volume_id = id, "request");
    }

    fn observe<T>(&self, operation: &str, result: &Result<T>) {
        match result {
            Ok(_) => self.metrics.observe(&self.driver, operation, "ok"),
            Err(e) => self.observe_error(operation, e),
        }
    }

    fn observe_error(&self, operation: &str, e: &Error) {
        self.metrics
            .observe(&self.driver, operation, &e.kind().to_string());
    }

    fn bad_request(&self, operation: &str, message: impl Into<String>) -> Response {
        let err = Error::BadRequest(message.into());
        debug!(driver = %self.driver, operation, error = %err, "rejected request");
        self.observe_error(operation, &err);
        error_response(StatusCode::BAD_REQUEST, &err)
    }
}

// =============================================================================
// Volume Handlers
// =============================================================================

/// Create a volume
async fn create_volume(
    State(state): State<AppState>,
    body: std::result::Result<Json<VolumeCreateRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(e) => return state.bad_request("create", e.body_text()),
    };
    let driver = match state.resolve("create").await {
        Ok(driver) => driver,
        Err(response) => return response,
    };
    info!(driver = %state.driver, method = "create", name = %request.locator.name, "request");

    let result = driver
        .create(request.locator, request.source, request.spec)
        .await;
    state.observe("create", &result);

    Json(VolumeCreateResponse {
        id: result.as_ref().map(|id| id.to_string()).unwrap_or_default(),
        response: VolumeResponse::from_result(&result),
    })
    .into_response()
}

/// Apply a compound update, returning the updated record on success
async fn update_volume(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: std::result::Result<Json<VolumeSetRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(e) => return state.bad_request("set", e.body_text()),
    };
    let driver = match state.resolve("set").await {
        Ok(driver) => driver,
        Err(response) => return response,
    };
    state.log_request("set", &id);

    let id = VolumeId::from(id);
    let result = match driver.update(&id, &request).await {
        Ok(_) => driver.inspect(&[id]).await.and_then(|mut volumes| {
            volumes
                .pop()
                .ok_or_else(|| Error::Internal("failed to inspect updated volume".into()))
        }),
        Err(e) => Err(e),
    };
    state.observe("set", &result);

    let response = VolumeResponse::from_result(&result);
    Json(VolumeSetResponse {
        volume: result.ok(),
        response,
    })
    .into_response()
}

/// Inspect a single volume
async fn inspect_volume(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let driver = match state.resolve("inspect").await {
        Ok(driver) => driver,
        Err(response) => return response,
    };
    state.log_request("inspect", &id);

    let result = driver.inspect(&[VolumeId::from(id)]).await;
    state.observe("inspect", &result);
    match result {
        Ok(volumes) => Json(volumes).into_response(),
        Err(e) => error_response(StatusCode::NOT_FOUND, &e),
    }
}

/// Delete a volume
async fn delete_volume(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let driver = match state.resolve("delete").await {
        Ok(driver) => driver,
        Err(response) => return response,
    };
    state.log_request("delete", &id);

    let result = driver.delete(&VolumeId::from(id)).await;
    state.observe("delete", &result);
    Json(VolumeResponse::from_result(&result)).into_response()
}

/// Enumerate volumes by locator and config labels, or inspect explicit ids
async fn enumerate_volumes(
    State(state): State<AppState>,
    query: std::result::Result<Query<QueryPairs>, QueryRejection>,
) -> Response {
    let params = match query_pairs(query) {
        Ok(params) => params,
        Err(message) => return state.bad_request("enumerate", message),
    };
    let driver = match state.resolve("enumerate").await {
        Ok(driver) => driver,
        Err(response) => return response,
    };

    let mut locator = VolumeLocator::default();
    if let Some(name) = first_param(&params, OPT_NAME) {
        locator.name = name.to_string();
    }
    if let Some(raw) = first_param(&params, OPT_LABEL) {
        match parse_labels(raw) {
            Ok(labels) => locator.volume_labels = labels,
            Err(e) => {
                return state.bad_request("enumerate", format!("failed to parse volume labels: {}", e))
            }
        }
    }
    let config_labels = match first_param(&params, OPT_CONFIG_LABEL).map(parse_labels) {
        Some(Ok(labels)) => labels,
        Some(Err(e)) => {
            return state.bad_request("enumerate", format!("failed to parse config labels: {}", e))
        }
        None => BTreeMap::new(),
    };

    let ids = volume_ids(&params);
    let result = if ids.is_empty() {
        driver.enumerate(&locator, &config_labels).await
    } else {
        driver.inspect(&ids).await
    };
    state.observe("enumerate", &result);

    match result {
        Ok(volumes) => Json(volumes).into_response(),
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e),
    }
}

/// Stub for introspection routes called without an id
async fn missing_volume_id() -> Response {
    error_response(
        StatusCode::BAD_REQUEST,
        &Error::BadRequest("could not parse volume ID".into()),
    )
}

async fn volume_stats(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let driver = match state.resolve("stats").await {
        Ok(driver) => driver,
        Err(response) => return response,
    };
    state.log_request("stats", &id);

    let result = driver.stats(&VolumeId::from(id)).await;
    state.observe("stats", &result);
    json_or_bad_request(result)
}

async fn volume_alerts(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let driver = match state.resolve("alerts").await {
        Ok(driver) => driver,
        Err(response) => return response,
    };
    state.log_request("alerts", &id);

    let result = driver.alerts(&VolumeId::from(id)).await;
    state.observe("alerts", &result);
    json_or_bad_request(result)
}

async fn volume_requests(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let driver = match state.resolve("requests").await {
        Ok(driver) => driver,
        Err(response) => return response,
    };
    state.log_request("requests", &id);

    let result = driver.dump_requests(&VolumeId::from(id)).await;
    state.observe("requests", &result);
    json_or_bad_request(result)
}

// =============================================================================
// Snapshot Handlers
// =============================================================================

async fn create_snapshot(
    State(state): State<AppState>,
    body: std::result::Result<Json<SnapCreateRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(e) => return state.bad_request("snap", e.body_text()),
    };
    let driver = match state.resolve("snap").await {
        Ok(driver) => driver,
        Err(response) => return response,
    };
    state.log_request("snap", request.id.as_str());

    let result = driver
        .snapshot(&request.id, request.readonly, request.locator)
        .await;
    state.observe("snap", &result);

    Json(SnapCreateResponse {
        volume_create_response: VolumeCreateResponse {
            id: result.as_ref().map(|id| id.to_string()).unwrap_or_default(),
            response: VolumeResponse::from_result(&result),
        },
    })
    .into_response()
}

async fn enumerate_snapshots(
    State(state): State<AppState>,
    query: std::result::Result<Query<QueryPairs>, QueryRejection>,
) -> Response {
    let params = match query_pairs(query) {
        Ok(params) => params,
        Err(message) => return state.bad_request("snapEnumerate", message),
    };
    let driver = match state.resolve("snapEnumerate").await {
        Ok(driver) => driver,
        Err(response) => return response,
    };

    let labels = match first_param(&params, OPT_LABEL).map(parse_labels) {
        Some(Ok(labels)) => labels,
        Some(Err(e)) => {
            return state.bad_request(
                "snapEnumerate",
                format!("failed to parse volume labels: {}", e),
            )
        }
        None => BTreeMap::new(),
    };
    let ids = volume_ids(&params);

    let result = driver.snap_enumerate(&ids, &labels).await;
    state.observe("snapEnumerate", &result);
    json_or_bad_request(result)
}

// =============================================================================
// Status, Health and Metrics
// =============================================================================

async fn driver_status(State(state): State<AppState>) -> Response {
    let driver = match state.resolve("status").await {
        Ok(driver) => driver,
        Err(response) => return response,
    };

    Json(DriverStatusResponse {
        driver: driver.name().to_string(),
        driver_type: driver.driver_type().to_string(),
        capabilities: driver
            .capabilities()
            .iter()
            .map(|c| c.to_string())
            .collect(),
        status: driver.status(),
    })
    .into_response()
}

/// Health check
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.encode() {
        Ok((content_type, body)) => {
            (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e),
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

fn error_response(status: StatusCode, err: &Error) -> Response {
    (
        status,
        Json(ApiErrorResponse {
            error: err.kind().to_string(),
            message: err.to_string(),
            details: None,
        }),
    )
        .into_response()
}

fn json_or_bad_request<T: Serialize>(result: Result<T>) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e),
    }
}

/// Decode a JSON object of string labels
fn parse_labels(raw: &str) -> Result<BTreeMap<String, String>> {
    Ok(serde_json::from_str(raw)?)
}

/// Decoded query pairs in request order; keys may repeat
type QueryPairs = Vec<(String, String)>;

/// Accept a decoded query unless a key or value was not valid UTF-8
fn query_pairs(
    query: std::result::Result<Query<QueryPairs>, QueryRejection>,
) -> std::result::Result<QueryPairs, String> {
    let Query(pairs) = query.map_err(|e| e.body_text())?;
    // Form decoding is lossy: invalid UTF-8 turns into U+FFFD
    let lossy = pairs.iter().any(|(key, value)| {
        key.contains(char::REPLACEMENT_CHARACTER) || value.contains(char::REPLACEMENT_CHARACTER)
    });
    if lossy {
        return Err("failed to parse query: invalid UTF-8".into());
    }
    Ok(pairs)
}

fn first_param<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn volume_ids(pairs: &[(String, String)]) -> Vec<VolumeId> {
    pairs
        .iter()
        .filter(|(k, _)| k == OPT_VOLUME_ID)
        .map(|(_, v)| VolumeId::from(v.as_str()))
        .collect()
}
