//! NutriPredict: nutrient-deficiency risk screening from demographic data.
//!
//! A profile (age, gender, race/ethnicity, weight, height, education, marital
//! status, country of birth) is mapped onto NHANES survey variables and scored
//! by three tree-ensemble classifiers:
//! - **Vitamin B12** deficiency
//! - **Anemia Risk** (hemoglobin-based proxy for iron deficiency)
//! - **Diabetes Risk (Limited)**, demographic-only
//!
//! Each prediction carries a calibrated risk score, a Low/Moderate/High
//! category and a confidence band. Tree SHAP attributions explain which
//! features drove the result, and a rule table turns the predictions into
//! recommendations.
//!
//! This is a screening aid, not a diagnostic tool.
//!
//! Uses structured logging via [`tracing`]. Set the `RUST_LOG` environment
//! variable to control log verbosity (e.g., `RUST_LOG=nutripredict=debug`).

pub mod calibration;
pub mod explain;
pub mod features;
pub mod model;
pub mod predictor;
pub mod profile;
pub mod recommendations;
pub mod scaler;
pub mod scores;
pub mod server;

use serde::{Deserialize, Serialize};

use crate::predictor::{FeatureContribution, NutrientPrediction, PredictError, PredictorService};
use crate::profile::UserProfile;
use crate::recommendations::{generate_recommendations, Recommendation};

/// Full result of one assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predictions: Vec<NutrientPrediction>,
    pub top_features: Vec<FeatureContribution>,
    pub recommendations: Vec<Recommendation>,
    pub overall_health_score: f64,
}

/// Predict, explain and recommend for a single validated profile.
pub fn assess(service: &PredictorService, profile: &UserProfile) -> Result<PredictionResponse, PredictError> {
    let (predictions, top_features) = service.predict(profile)?;
    let recommendations = generate_recommendations(&predictions, profile);
    let overall_health_score = scores::overall_health_score(&predictions);

    tracing::debug!(
        health_score = overall_health_score,
        high = predictions
            .iter()
            .filter(|p| p.risk_category == scores::RiskCategory::High)
            .count(),
        recommendations = recommendations.len(),
        "assessment complete"
    );

    Ok(PredictionResponse {
        predictions,
        top_features,
        recommendations,
        overall_health_score,
    })
}
