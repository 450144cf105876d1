//! HTTP server for the nutrient-deficiency prediction service.
//!
//! Features:
//! - `POST /api/predict`, `GET /api/features`, `GET /health`, `GET /stats`
//! - JSONL access logging with size-based rotation (configurable via `max_access_log_bytes`)
//! - Periodic persistence of usage counters to `metrics.json`
//! - CORS restricted to the configured browser origins
//! - Structured logging via [`tracing`]

pub mod handlers;
pub mod logging;
pub mod middleware;
pub mod types;

pub use handlers::MAX_BODY_BYTES;
pub use logging::{Endpoint, UsageMetrics, METRICS_PERSIST_INTERVAL_SECS};
pub use types::{
    EndpointStats, ErrorResponse, HealthResponse, RequestStats, RiskCategoryStats, RootResponse,
    ServerConfig, StatsResponse, ValidationErrorResponse, DEFAULT_CORS_ORIGINS, DEFAULT_MODEL_DIR,
};

use std::sync::Arc;
use std::time::Instant;

use axum::http::HeaderValue;
use eyre::{Result, WrapErr};
use tracing::{info, warn};

use crate::predictor::PredictorService;

// ---------------------------------------------------------------------------
// Server state
// ---------------------------------------------------------------------------

pub struct ServerState {
    pub config: ServerConfig,
    pub predictor: PredictorService,
    pub start_time: Instant,
    pub usage: UsageMetrics,
}

impl ServerState {
    /// Assemble state around an already-constructed predictor.
    pub fn new(config: ServerConfig, predictor: PredictorService) -> Self {
        let usage = UsageMetrics::new(
            &config.access_log_path,
            config.max_access_log_bytes,
            &config.data_dir,
        );
        Self {
            config,
            predictor,
            start_time: Instant::now(),
            usage,
        }
    }

    /// Load models from `config.model_dir`. An unloadable directory still yields
    /// a serving state that answers 503 on prediction endpoints.
    pub fn load(config: ServerConfig) -> Self {
        let predictor = PredictorService::load(&config.model_dir);
        if !predictor.is_ready() {
            warn!(
                model_dir = %config.model_dir.display(),
                "serving without models; prediction endpoints will return 503"
            );
        }
        Self::new(config, predictor)
    }
}

// ---------------------------------------------------------------------------
// HTTP server
// ---------------------------------------------------------------------------

fn cors_layer(origins: &[String]) -> Result<tower_http::cors::CorsLayer> {
    use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

    let origins = origins
        .iter()
        .map(|o| {
            o.parse::<HeaderValue>()
                .wrap_err_with(|| format!("Invalid CORS origin: {o}"))
        })
        .collect::<Result<Vec<_>>>()?;

    // Credentials rule out wildcards, so methods and headers mirror the preflight.
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

/// Build the application router over shared state.
pub fn router(state: Arc<ServerState>) -> Result<axum::Router> {
    use axum::{
        extract::DefaultBodyLimit,
        middleware as axum_mw,
        routing::{get, post},
        Router,
    };

    let cors = cors_layer(&state.config.cors_origins)?;

    let app = Router::new()
        .route("/", get(handlers::root_handler))
        .route("/health", get(handlers::health_handler))
        .route("/stats", get(handlers::stats_handler))
        .route("/docs", get(handlers::docs_handler))
        .route("/openapi.json", get(handlers::openapi_handler))
        .route("/api/predict", post(handlers::predict_handler))
        .route("/api/features", get(handlers::features_handler))
        .layer(axum_mw::from_fn(middleware::request_logger))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state);

    Ok(app)
}

/// Serve on an already-bound listener until `shutdown` resolves.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: Arc<ServerState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = router(state.clone())?;

    // Spawn background task to persist metrics to disk periodically
    let metrics_state = state.clone();
    let persist = tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            METRICS_PERSIST_INTERVAL_SECS,
        ));
        loop {
            interval.tick().await;
            metrics_state.usage.persist_to_disk();
        }
    });

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .wrap_err("HTTP server error");

    persist.abort();
    // Persist metrics before exiting
    state.usage.persist_to_disk();
    result
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down gracefully"),
        _ = sigterm => info!("received SIGTERM, shutting down gracefully"),
    }
}

/// Run the HTTP server (blocking)
pub async fn run_server(config: ServerConfig) -> Result<()> {
    let bind_addr = config.bind_addr;
    let access_log = config.access_log_path.clone();
    let state = Arc::new(ServerState::load(config));

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .wrap_err_with(|| format!("Failed to bind {bind_addr}"))?;
    info!(bind = %bind_addr, models_loaded = state.predictor.is_ready(), "nutrient prediction server listening");
    info!("Endpoints: GET /, GET /health, GET /stats, GET /docs, GET /openapi.json, POST /api/predict, GET /api/features");
    info!(access_log = %access_log);

    serve(listener, state, shutdown_signal()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cors_origins() {
        let config = ServerConfig::default();
        assert_eq!(config.cors_origins, DEFAULT_CORS_ORIGINS);
        assert!(cors_layer(&config.cors_origins).is_ok());
    }

    #[test]
    fn test_invalid_cors_origin_is_rejected() {
        assert!(cors_layer(&["bad\norigin".to_string()]).is_err());
    }

    #[test]
    fn test_stats_response_serialization() {
        let response = StatsResponse {
            uptime_seconds: 3600,
            model_hash: Some("sha256:abc".to_string()),
            requests: RequestStats {
                total: 100,
                errors: 2,
            },
            risk_categories: RiskCategoryStats {
                low: 150,
                moderate: 100,
                high: 44,
            },
            endpoints: EndpointStats {
                predict: 98,
                features: 1,
                health: 30,
                stats: 5,
            },
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"total\":100"));
        assert!(json.contains("\"moderate\":100"));
        assert!(json.contains("\"predict\":98"));
    }
}
