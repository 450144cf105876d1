//! Response types and configuration for the prediction server.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::profile::FieldError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (defaults to 127.0.0.1:8000; use 0.0.0.0 to expose externally)
    pub bind_addr: SocketAddr,
    /// Directory holding `feature_names.json` and the per-target artifacts
    pub model_dir: PathBuf,
    /// Path for JSONL access log
    pub access_log_path: String,
    /// Maximum access log file size in bytes before rotation (0 = no limit)
    pub max_access_log_bytes: u64,
    /// Directory for `metrics.json` persistence.
    pub data_dir: String,
    /// Browser origins allowed by CORS.
    pub cors_origins: Vec<String>,
}

pub const DEFAULT_MODEL_DIR: &str = "models";
pub const DEFAULT_DATA_DIR: &str = ".";
pub const DEFAULT_CORS_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://localhost:5173"];

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            access_log_path: "nutripredict-access.jsonl".to_string(),
            max_access_log_bytes: 50 * 1024 * 1024, // 50 MB
            data_dir: DEFAULT_DATA_DIR.to_string(),
            cors_origins: DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Error body shared by every failing endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

/// 422 body: one entry per rejected field.
#[derive(Debug, Serialize, Deserialize)]
pub struct ValidationErrorResponse {
    pub detail: Vec<FieldError>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
    pub status: String,
    pub version: String,
    pub documentation: String,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub models_loaded: bool,
    pub service: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_hash: Option<String>,
    pub uptime_seconds: u64,
}

/// Stats response
#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub uptime_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_hash: Option<String>,
    pub requests: RequestStats,
    pub risk_categories: RiskCategoryStats,
    pub endpoints: EndpointStats,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RequestStats {
    pub total: u64,
    pub errors: u64,
}

/// Counts over every individual nutrient prediction served.
#[derive(Debug, Serialize, Deserialize)]
pub struct RiskCategoryStats {
    pub low: u64,
    pub moderate: u64,
    pub high: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EndpointStats {
    pub predict: u64,
    pub features: u64,
    pub health: u64,
    pub stats: u64,
}
