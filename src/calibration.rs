//! Post-hoc probability calibration layered over a base ensemble.
//!
//! `sigmoid` (Platt scaling) maps the base decision function through
//! `1 / (1 + exp(a * f + b))`. `isotonic` interpolates the base probability
//! along a non-decreasing step function, clipping outside the fitted range.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::{ModelError, ProbabilityModel, Result, TreeEnsemble};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum Calibrator {
    Sigmoid { a: f64, b: f64 },
    Isotonic { x: Vec<f64>, y: Vec<f64> },
}

impl Calibrator {
    pub fn validate(&self, name: &str) -> Result<()> {
        match self {
            Self::Sigmoid { a, b } => {
                if !a.is_finite() || !b.is_finite() {
                    return Err(ModelError::invalid(name, "sigmoid parameters must be finite"));
                }
            }
            Self::Isotonic { x, y } => {
                if x.is_empty() {
                    return Err(ModelError::invalid(name, "isotonic table is empty"));
                }
                if x.len() != y.len() {
                    return Err(ModelError::invalid(
                        name,
                        format!("isotonic table has {} thresholds but {} values", x.len(), y.len()),
                    ));
                }
                if x.windows(2).any(|w| !(w[0] <= w[1])) {
                    return Err(ModelError::invalid(name, "isotonic thresholds must be non-decreasing"));
                }
            }
        }
        Ok(())
    }

    /// Calibrated probability given the base model's raw output and probability.
    fn apply(&self, decision: f64, proba: f64) -> f64 {
        let p = match self {
            Self::Sigmoid { a, b } => 1.0 / (1.0 + (a * decision + b).exp()),
            Self::Isotonic { x, y } => interpolate(x, y, proba),
        };
        p.clamp(0.0, 1.0)
    }
}

fn interpolate(x: &[f64], y: &[f64], v: f64) -> f64 {
    let last = x.len() - 1;
    if v <= x[0] {
        return y[0];
    }
    if v >= x[last] {
        return y[last];
    }
    // First threshold strictly above v; v > x[0] so idx >= 1.
    let idx = x.partition_point(|t| *t <= v);
    let (x0, x1) = (x[idx - 1], x[idx]);
    let (y0, y1) = (y[idx - 1], y[idx]);
    if x1 == x0 {
        return y1;
    }
    y0 + (y1 - y0) * (v - x0) / (x1 - x0)
}

/// A base ensemble with a calibration map on top.
#[derive(Debug, Clone)]
pub struct CalibratedModel {
    base: Arc<TreeEnsemble>,
    calibrator: Calibrator,
}

impl CalibratedModel {
    pub fn new(base: Arc<TreeEnsemble>, calibrator: Calibrator) -> Self {
        Self { base, calibrator }
    }
}

impl ProbabilityModel for CalibratedModel {
    fn decision_function(&self, x: &[f64]) -> Result<f64> {
        self.base.decision_function(x)
    }

    fn predict_proba(&self, x: &[f64]) -> Result<f64> {
        let decision = self.base.decision_function(x)?;
        let proba = self.base.predict_proba(x)?;
        Ok(self.calibrator.apply(decision, proba))
    }
}
