//! Usage metrics, access logging, and metrics persistence.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{info, warn};

use crate::predictor::NutrientPrediction;
use crate::scores::RiskCategory;

/// Maximum number of rotated access log files to keep.
const MAX_ACCESS_LOG_ROTATIONS: usize = 5;

/// Interval in seconds between metrics persistence to disk.
pub const METRICS_PERSIST_INTERVAL_SECS: u64 = 60;

/// Endpoints with their own request counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Predict,
    Features,
    Health,
    Stats,
}

pub struct UsageMetrics {
    pub total_requests: AtomicU64,
    pub total_errors: AtomicU64,

    pub low: AtomicU64,
    pub moderate: AtomicU64,
    pub high: AtomicU64,

    pub ep_predict: AtomicU64,
    pub ep_features: AtomicU64,
    pub ep_health: AtomicU64,
    pub ep_stats: AtomicU64,

    access_log: std::sync::Mutex<Option<File>>,
    access_log_path: String,
    access_log_bytes: AtomicU64,
    max_access_log_bytes: u64,
    metrics_path: String,
}

impl UsageMetrics {
    pub fn new(access_log_path: &str, max_access_log_bytes: u64, data_dir: &str) -> Self {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(access_log_path)
            .ok();
        if file.is_none() {
            warn!(path = access_log_path, "could not open access log");
        }
        let current_size = std::fs::metadata(access_log_path)
            .map(|m| m.len())
            .unwrap_or(0);

        let metrics_path = Path::new(data_dir).join("metrics.json");
        let restored = std::fs::read(&metrics_path)
            .ok()
            .and_then(|data| serde_json::from_slice::<serde_json::Value>(&data).ok());
        if restored.is_some() {
            info!(path = %metrics_path.display(), "restored usage metrics");
        }
        let v = |field: &str| -> AtomicU64 {
            AtomicU64::new(
                restored
                    .as_ref()
                    .and_then(|j| j.get(field))
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0),
            )
        };

        Self {
            total_requests: v("total_requests"),
            total_errors: v("total_errors"),
            low: v("low"),
            moderate: v("moderate"),
            high: v("high"),
            ep_predict: v("ep_predict"),
            ep_features: v("ep_features"),
            ep_health: v("ep_health"),
            ep_stats: v("ep_stats"),
            access_log: std::sync::Mutex::new(file),
            access_log_path: access_log_path.to_string(),
            access_log_bytes: AtomicU64::new(current_size),
            max_access_log_bytes,
            metrics_path: metrics_path.to_string_lossy().to_string(),
        }
    }

    pub fn hit(&self, endpoint: Endpoint) {
        let counter = match endpoint {
            Endpoint::Predict => &self.ep_predict,
            Endpoint::Features => &self.ep_features,
            Endpoint::Health => &self.ep_health,
            Endpoint::Stats => &self.ep_stats,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a successful assessment and append it to the access log.
    ///
    /// Only categories and scores are logged; the profile itself never is.
    pub fn record_prediction(
        &self,
        predictions: &[NutrientPrediction],
        overall_health_score: f64,
        processing_time_ms: u64,
    ) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        for p in predictions {
            let counter = match p.risk_category {
                RiskCategory::Low => &self.low,
                RiskCategory::Moderate => &self.moderate,
                RiskCategory::High => &self.high,
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }

        let risks: serde_json::Map<String, serde_json::Value> = predictions
            .iter()
            .map(|p| (p.nutrient.clone(), p.risk_category.as_str().into()))
            .collect();
        let entry = serde_json::json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "endpoint": "/api/predict",
            "risk_categories": risks,
            "overall_health_score": overall_health_score,
            "processing_time_ms": processing_time_ms,
        });
        self.append_access_log(entry);
    }

    pub fn record_error(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn append_access_log(&self, entry: serde_json::Value) {
        let Ok(mut guard) = self.access_log.try_lock() else {
            return;
        };
        let Some(file) = guard.as_mut() else {
            return;
        };

        let mut line = entry.to_string();
        line.push('\n');
        let line_len = line.len() as u64;
        if let Err(e) = file.write_all(line.as_bytes()) {
            warn!(error = %e, "failed to write access log entry");
        }
        let new_size = self.access_log_bytes.fetch_add(line_len, Ordering::Relaxed) + line_len;

        // Rotate if over size limit (0 = no limit)
        if self.max_access_log_bytes > 0 && new_size >= self.max_access_log_bytes {
            for i in (1..MAX_ACCESS_LOG_ROTATIONS).rev() {
                let from = format!("{}.{}", self.access_log_path, i);
                let to = format!("{}.{}", self.access_log_path, i + 1);
                if Path::new(&from).exists() {
                    if let Err(e) = std::fs::rename(&from, &to) {
                        warn!(from = %from, to = %to, error = %e, "log rotation rename failed");
                    }
                }
            }
            let rotated = format!("{}.1", self.access_log_path);
            if let Err(e) = std::fs::rename(&self.access_log_path, &rotated) {
                warn!(from = %self.access_log_path, to = %rotated, error = %e, "log rotation rename failed");
            }
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.access_log_path)
            {
                Ok(new_file) => {
                    *file = new_file;
                    self.access_log_bytes.store(0, Ordering::Relaxed);
                }
                Err(e) => warn!(path = %self.access_log_path, error = %e, "failed to reopen access log"),
            }
        }
    }

    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "total_requests": self.total_requests.load(Ordering::Relaxed),
            "total_errors": self.total_errors.load(Ordering::Relaxed),
            "low": self.low.load(Ordering::Relaxed),
            "moderate": self.moderate.load(Ordering::Relaxed),
            "high": self.high.load(Ordering::Relaxed),
            "ep_predict": self.ep_predict.load(Ordering::Relaxed),
            "ep_features": self.ep_features.load(Ordering::Relaxed),
            "ep_health": self.ep_health.load(Ordering::Relaxed),
            "ep_stats": self.ep_stats.load(Ordering::Relaxed),
        })
    }

    /// Persist current metrics snapshot to disk so they survive restarts.
    pub fn persist_to_disk(&self) {
        match serde_json::to_vec_pretty(&self.snapshot()) {
            Ok(data) => {
                if let Err(e) = std::fs::write(&self.metrics_path, &data) {
                    warn!(path = %self.metrics_path, error = %e, "failed to persist metrics");
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to serialize metrics snapshot");
            }
        }
    }
}
