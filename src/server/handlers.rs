//! HTTP endpoint handler functions.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, warn};

use crate::predictor::PredictError;
use crate::profile::{FieldError, UserProfile};

use super::logging::Endpoint;
use super::types::*;
use super::ServerState;

/// Maximum request body size in bytes (1 MB).
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

pub const SERVICE_NAME: &str = "nutrient-prediction-api";

pub const MODELS_NOT_LOADED: &str =
    "Models not loaded. Please ensure trained models are in the model directory";

static OPENAPI_JSON: &str = include_str!("../../static/openapi.json");

fn detail(status: StatusCode, detail: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            detail: detail.into(),
        }),
    )
        .into_response()
}

fn unprocessable(errors: Vec<FieldError>) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ValidationErrorResponse { detail: errors }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn root_handler() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Nutrient Deficiency Prediction API".to_string(),
        status: "active".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        documentation: "/docs".to_string(),
    })
}

pub async fn health_handler(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    state.usage.hit(Endpoint::Health);
    Json(HealthResponse {
        status: "healthy".to_string(),
        models_loaded: state.predictor.is_ready(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_hash: state.predictor.model_hash().map(str::to_string),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

/// Validate the profile, then predict, explain and recommend.
///
/// Validation runs before the readiness check so malformed input is always a 422.
pub async fn predict_handler(State(state): State<Arc<ServerState>>, body: axum::body::Bytes) -> Response {
    let start = Instant::now();
    state.usage.hit(Endpoint::Predict);

    let value: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            state.usage.record_error();
            return unprocessable(vec![FieldError {
                field: "body".to_string(),
                message: format!("invalid JSON: {e}"),
            }]);
        }
    };

    let profile = match UserProfile::from_json(&value) {
        Ok(p) => p,
        Err(e) => {
            state.usage.record_error();
            warn!(errors = e.errors.len(), "rejected invalid profile");
            return unprocessable(e.errors);
        }
    };

    if !state.predictor.is_ready() {
        state.usage.record_error();
        return detail(StatusCode::SERVICE_UNAVAILABLE, MODELS_NOT_LOADED);
    }

    match crate::assess(&state.predictor, &profile) {
        Ok(response) => {
            state.usage.record_prediction(
                &response.predictions,
                response.overall_health_score,
                start.elapsed().as_millis() as u64,
            );
            Json(response).into_response()
        }
        Err(PredictError::NotLoaded) => {
            state.usage.record_error();
            detail(StatusCode::SERVICE_UNAVAILABLE, MODELS_NOT_LOADED)
        }
        Err(e) => {
            state.usage.record_error();
            error!(error = %e, "prediction failed");
            detail(StatusCode::INTERNAL_SERVER_ERROR, format!("Prediction error: {e}"))
        }
    }
}

pub async fn features_handler(State(state): State<Arc<ServerState>>) -> Response {
    state.usage.hit(Endpoint::Features);
    match state.predictor.feature_info() {
        Ok(info) => Json(info).into_response(),
        Err(_) => detail(StatusCode::SERVICE_UNAVAILABLE, "Models not loaded"),
    }
}

pub async fn stats_handler(State(state): State<Arc<ServerState>>) -> Json<StatsResponse> {
    state.usage.hit(Endpoint::Stats);
    let usage = &state.usage;
    Json(StatsResponse {
        uptime_seconds: state.start_time.elapsed().as_secs(),
        model_hash: state.predictor.model_hash().map(str::to_string),
        requests: RequestStats {
            total: usage.total_requests.load(Ordering::Relaxed),
            errors: usage.total_errors.load(Ordering::Relaxed),
        },
        risk_categories: RiskCategoryStats {
            low: usage.low.load(Ordering::Relaxed),
            moderate: usage.moderate.load(Ordering::Relaxed),
            high: usage.high.load(Ordering::Relaxed),
        },
        endpoints: EndpointStats {
            predict: usage.ep_predict.load(Ordering::Relaxed),
            features: usage.ep_features.load(Ordering::Relaxed),
            health: usage.ep_health.load(Ordering::Relaxed),
            stats: usage.ep_stats.load(Ordering::Relaxed),
        },
    })
}

pub async fn openapi_handler() -> ([(&'static str, &'static str); 1], &'static str) {
    ([("content-type", "application/json")], OPENAPI_JSON)
}

/// Minimal HTML page pointing a browser at the OpenAPI document.
pub async fn docs_handler() -> axum::response::Html<&'static str> {
    axum::response::Html(concat!(
        "<!doctype html><html><head><title>Nutrient Deficiency Prediction API</title></head>",
        "<body><h1>Nutrient Deficiency Prediction API</h1>",
        "<p>The OpenAPI document is served at <a href=\"/openapi.json\">/openapi.json</a>.</p>",
        "<ul><li><code>POST /api/predict</code></li><li><code>GET /api/features</code></li>",
        "<li><code>GET /health</code></li><li><code>GET /stats</code></li></ul>",
        "</body></html>"
    ))
}
