//! The prediction service: artifact loading and the per-nutrient pipeline.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::calibration::{CalibratedModel, Calibrator};
use crate::explain::TreeExplainer;
use crate::features::{build_feature_vector, describe_feature};
use crate::model::{self, Explainer, ModelError, ProbabilityModel, TreeEnsemble};
use crate::profile::UserProfile;
use crate::scaler::StandardScaler;
use crate::scores::{ConfidenceBand, RiskCategory};

/// Number of ranked feature contributions returned per request.
pub const TOP_FEATURES: usize = 5;

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NutrientTarget {
    /// Artifact file prefix.
    pub key: &'static str,
    pub display_name: &'static str,
    pub note: &'static str,
}

pub const TARGETS: [NutrientTarget; 3] = [
    NutrientTarget {
        key: "b12_deficient",
        display_name: "Vitamin B12",
        note: "Based on demographic and health indicators. This prediction does not diagnose B12 deficiency. Next step: If high risk → request serum B12 (and MMA) from GP.",
    },
    NutrientTarget {
        key: "iron_deficient",
        display_name: "Anemia Risk",
        note: "Based on hemoglobin levels (WHO criteria). Not iron deficiency specifically. Next step: Confirm with lab Hb test; if low, clinician should check ferritin.",
    },
    NutrientTarget {
        key: "diabetes_risk",
        display_name: "Diabetes Risk (Limited)",
        note: "Based on demographic indicators only. This prediction has very limited accuracy for diabetes screening. Next step: Consult healthcare provider for proper diabetes screening (HbA1c, fasting glucose).",
    },
];

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutrientPrediction {
    pub nutrient: String,
    pub risk_score: f64,
    pub risk_category: RiskCategory,
    pub confidence: f64,
    pub confidence_lower: f64,
    pub confidence_upper: f64,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub feature: String,
    pub feature_name: String,
    /// Unscaled feature value
    pub value: f64,
    pub impact: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDescription {
    pub code: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureInfo {
    pub features: Vec<FeatureDescription>,
    pub total_features: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("Models not loaded")]
    NotLoaded,

    #[error(transparent)]
    Model(#[from] ModelError),
}

// ---------------------------------------------------------------------------
// Loaded artifacts
// ---------------------------------------------------------------------------

/// Everything needed to score one target.
#[derive(Clone)]
pub struct NutrientModels {
    pub target: NutrientTarget,
    pub model: Arc<dyn ProbabilityModel>,
    pub calibrated: Arc<dyn ProbabilityModel>,
    pub scaler: Arc<StandardScaler>,
    pub explainer: Arc<dyn Explainer>,
}

impl NutrientModels {
    /// Wire a base ensemble with its optional calibrator and its scaler.
    pub fn new(
        target: NutrientTarget,
        ensemble: TreeEnsemble,
        calibrator: Option<Calibrator>,
        scaler: Arc<StandardScaler>,
    ) -> Self {
        let base = Arc::new(ensemble);
        let calibrated: Arc<dyn ProbabilityModel> = match calibrator {
            Some(c) => Arc::new(CalibratedModel::new(base.clone(), c)),
            None => base.clone(),
        };
        Self {
            target,
            explainer: Arc::new(TreeExplainer::new(base.clone())),
            model: base,
            calibrated,
            scaler,
        }
    }
}

impl std::fmt::Debug for NutrientModels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NutrientModels")
            .field("target", &self.target.key)
            .field("features", &self.scaler.len())
            .finish_non_exhaustive()
    }
}

/// Reads artifacts while hashing their bytes in load order.
struct ArtifactReader<'a> {
    dir: &'a Path,
    hasher: Sha256,
}

impl ArtifactReader<'_> {
    fn read<T: serde::de::DeserializeOwned>(&mut self, name: &str) -> model::Result<T> {
        let path = self.dir.join(name);
        let bytes = std::fs::read(&path).map_err(|source| ModelError::Io {
            path: path.clone(),
            source,
        })?;
        self.hasher.update(name.as_bytes());
        self.hasher.update(&bytes);
        model::parse_json(&path, &bytes)
    }

    fn read_optional<T: serde::de::DeserializeOwned>(&mut self, name: &str) -> model::Result<Option<T>> {
        if self.dir.join(name).is_file() {
            self.read(name).map(Some)
        } else {
            Ok(None)
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedModels {
    pub feature_names: Vec<String>,
    pub nutrients: Vec<NutrientModels>,
    /// `sha256:<hex>` over every artifact read; `None` for in-memory models.
    pub model_hash: Option<String>,
}

impl LoadedModels {
    /// Load all targets from a model directory.
    pub fn load(dir: &Path) -> model::Result<Self> {
        let mut reader = ArtifactReader {
            dir,
            hasher: Sha256::new(),
        };

        let feature_names: Vec<String> = reader.read("feature_names.json")?;
        if feature_names.is_empty() {
            return Err(ModelError::invalid("feature_names.json", "no feature names"));
        }
        let n_features = feature_names.len();

        let mut shared_scaler: Option<Arc<StandardScaler>> = None;
        let mut nutrients = Vec::with_capacity(TARGETS.len());

        for target in TARGETS {
            let model_name = format!("{}_model.json", target.key);
            let ensemble: TreeEnsemble = reader.read(&model_name)?;
            ensemble.validate(&model_name)?;
            if ensemble.n_features != n_features {
                return Err(ModelError::invalid(
                    &model_name,
                    format!(
                        "model expects {} features but feature_names.json lists {n_features}",
                        ensemble.n_features
                    ),
                ));
            }

            let calibrated_name = format!("{}_calibrated_model.json", target.key);
            let calibrator: Option<Calibrator> = reader.read_optional(&calibrated_name)?;
            match &calibrator {
                Some(c) => c.validate(&calibrated_name)?,
                None => warn!(
                    nutrient = target.key,
                    "calibrated model not found, using base model"
                ),
            }

            let scaler_name = format!("{}_scaler.json", target.key);
            let scaler = match reader.read_optional::<StandardScaler>(&scaler_name)? {
                Some(s) => {
                    s.validate(&scaler_name, n_features)?;
                    Arc::new(s)
                }
                None => {
                    warn!(nutrient = target.key, "individual scaler not found, using scaler.json");
                    match &shared_scaler {
                        Some(s) => s.clone(),
                        None => {
                            let s: StandardScaler = reader.read("scaler.json")?;
                            s.validate("scaler.json", n_features)?;
                            let s = Arc::new(s);
                            shared_scaler = Some(s.clone());
                            s
                        }
                    }
                }
            };

            nutrients.push(NutrientModels::new(target, ensemble, calibrator, scaler));
        }

        let model_hash = format!("sha256:{}", hex::encode(reader.hasher.finalize()));
        Ok(Self {
            feature_names,
            nutrients,
            model_hash: Some(model_hash),
        })
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Owns the loaded models for the lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct PredictorService {
    models: Option<Arc<LoadedModels>>,
}

impl PredictorService {
    /// Load artifacts from `dir`. Failures are logged and leave the service unloaded.
    pub fn load(dir: &Path) -> Self {
        match LoadedModels::load(dir) {
            Ok(models) => {
                info!(
                    dir = %dir.display(),
                    features = models.feature_names.len(),
                    hash = models.model_hash.as_deref().unwrap_or(""),
                    "models loaded"
                );
                Self::from_models(models)
            }
            Err(e) => {
                error!(dir = %dir.display(), error = %e, "failed to load models");
                Self::default()
            }
        }
    }

    pub fn from_models(models: LoadedModels) -> Self {
        Self {
            models: Some(Arc::new(models)),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.models.is_some()
    }

    pub fn model_hash(&self) -> Option<&str> {
        self.models.as_ref()?.model_hash.as_deref()
    }

    pub fn predict(
        &self,
        profile: &UserProfile,
    ) -> Result<(Vec<NutrientPrediction>, Vec<FeatureContribution>), PredictError> {
        let models = self.models.as_ref().ok_or(PredictError::NotLoaded)?;
        let features = build_feature_vector(profile, &models.feature_names);

        let mut predictions = Vec::with_capacity(models.nutrients.len());
        let mut impact_sum = vec![0.0; features.len()];

        for nutrient in &models.nutrients {
            let scaled = nutrient.scaler.transform(features.values())?;
            let calibrated = nutrient.calibrated.predict_proba(&scaled)?;
            let uncalibrated = nutrient.model.predict_proba(&scaled)?;
            let band = ConfidenceBand::around(calibrated, uncalibrated);

            predictions.push(NutrientPrediction {
                nutrient: nutrient.target.display_name.to_string(),
                risk_score: calibrated,
                risk_category: RiskCategory::from_probability(calibrated),
                confidence: calibrated,
                confidence_lower: band.lower,
                confidence_upper: band.upper,
                note: nutrient.target.note.to_string(),
            });

            let shap = nutrient.explainer.shap_values(&scaled)?.positive_class()?;
            model::check_width(features.len(), &shap)?;
            for (acc, v) in impact_sum.iter_mut().zip(&shap) {
                *acc += v;
            }
        }

        let n = models.nutrients.len().max(1) as f64;
        let mut contributions: Vec<FeatureContribution> = features
            .iter()
            .zip(&impact_sum)
            .map(|((code, value), sum)| FeatureContribution {
                feature: code.to_string(),
                feature_name: describe_feature(code).to_string(),
                value,
                impact: sum / n,
            })
            .collect();
        contributions.sort_by(|a, b| b.impact.abs().total_cmp(&a.impact.abs()));
        contributions.truncate(TOP_FEATURES);

        Ok((predictions, contributions))
    }

    pub fn feature_info(&self) -> Result<FeatureInfo, PredictError> {
        let models = self.models.as_ref().ok_or(PredictError::NotLoaded)?;
        let features: Vec<FeatureDescription> = models
            .feature_names
            .iter()
            .map(|code| FeatureDescription {
                code: code.clone(),
                description: describe_feature(code).to_string(),
            })
            .collect();
        Ok(FeatureInfo {
            total_features: features.len(),
            features,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{CountryOfBirth, Education, Gender, MaritalStatus, Race};
    use serde_json::json;

    const SCHEMA: [&str; 6] = ["RIDAGEYR", "RIAGENDR", "BMXBMI", "BMXWT", "DMDEDUC2", "UNKNOWN1"];

    fn profile() -> UserProfile {
        UserProfile::new(
            45,
            Gender::Female,
            Race::NonHispanicWhite,
            70.0,
            165.0,
            Education::SomeCollege,
            MaritalStatus::Married,
            CountryOfBirth::Us,
        )
        .unwrap()
    }

    fn identity_scaler() -> StandardScaler {
        StandardScaler {
            mean: vec![0.0; SCHEMA.len()],
            scale: vec![1.0; SCHEMA.len()],
        }
    }

    /// Boosted stumps on age and gender.
    fn boosted() -> serde_json::Value {
        json!({
            "kind": "gradient_boosting",
            "n_features": SCHEMA.len(),
            "base_score": -2.0,
            "trees": [
                { "nodes": [
                    { "feature": 0, "threshold": 50.0, "left": 1, "right": 2, "cover": 10.0 },
                    { "value": -0.5, "cover": 6.0 },
                    { "value": 1.0, "cover": 4.0 }
                ] },
                { "nodes": [
                    { "feature": 1, "threshold": 1.5, "left": 1, "right": 2, "cover": 10.0 },
                    { "value": -0.2, "cover": 5.0 },
                    { "value": 2.5, "cover": 5.0 }
                ] }
            ]
        })
    }

    fn forest() -> serde_json::Value {
        json!({
            "kind": "random_forest",
            "n_features": SCHEMA.len(),
            "trees": [
                { "nodes": [
                    { "feature": 2, "threshold": 25.0, "left": 1, "right": 2, "cover": 8.0 },
                    { "value": 0.1, "cover": 5.0 },
                    { "value": 0.6, "cover": 3.0 }
                ] }
            ]
        })
    }

    fn in_memory() -> LoadedModels {
        let scaler = Arc::new(identity_scaler());
        let nutrients = TARGETS
            .iter()
            .enumerate()
            .map(|(i, target)| {
                let ensemble: TreeEnsemble =
                    serde_json::from_value(if i == 1 { forest() } else { boosted() }).unwrap();
                let calibrator = (i == 0).then_some(Calibrator::Isotonic {
                    x: vec![0.0, 1.0],
                    y: vec![0.0, 0.5],
                });
                NutrientModels::new(*target, ensemble, calibrator, scaler.clone())
            })
            .collect();
        LoadedModels {
            feature_names: SCHEMA.iter().map(|s| s.to_string()).collect(),
            nutrients,
            model_hash: None,
        }
    }

    fn write(dir: &Path, name: &str, value: &serde_json::Value) {
        std::fs::write(dir.join(name), serde_json::to_vec(value).unwrap()).unwrap();
    }

    fn write_artifacts(dir: &Path) {
        write(dir, "feature_names.json", &json!(SCHEMA));
        write(dir, "scaler.json", &serde_json::to_value(identity_scaler()).unwrap());
        for target in TARGETS {
            write(dir, &format!("{}_model.json", target.key), &boosted());
        }
    }

    #[test]
    fn test_unloaded_service() {
        let svc = PredictorService::default();
        assert!(!svc.is_ready());
        assert!(matches!(svc.predict(&profile()), Err(PredictError::NotLoaded)));
        assert!(matches!(svc.feature_info(), Err(PredictError::NotLoaded)));
        assert_eq!(svc.model_hash(), None);
    }

    #[test]
    fn test_predictions_follow_target_order() {
        let svc = PredictorService::from_models(in_memory());
        let (preds, top) = svc.predict(&profile()).unwrap();
        let names: Vec<_> = preds.iter().map(|p| p.nutrient.as_str()).collect();
        assert_eq!(names, ["Vitamin B12", "Anemia Risk", "Diabetes Risk (Limited)"]);
        for p in &preds {
            assert!((0.0..=1.0).contains(&p.risk_score));
            assert_eq!(p.confidence, p.risk_score);
            assert!(p.confidence_lower <= p.risk_score && p.risk_score <= p.confidence_upper);
            assert_eq!(p.risk_category, RiskCategory::from_probability(p.risk_score));
        }
        assert!(preds[0].note.contains("serum B12"));
        assert_eq!(top.len(), TOP_FEATURES);
    }

    #[test]
    fn test_uncalibrated_band_uses_floor() {
        let svc = PredictorService::from_models(in_memory());
        let (preds, _) = svc.predict(&profile()).unwrap();
        // diabetes target has no calibrator
        let p = &preds[2];
        assert!((p.confidence_upper - p.confidence_lower - 0.1).abs() < 1e-9);
        // b12 is calibrated to half the base probability, so the band widens
        let b12 = &preds[0];
        assert!(b12.confidence_upper - b12.confidence_lower > 0.1);
    }

    #[test]
    fn test_contributions_ranked_by_magnitude() {
        let svc = PredictorService::from_models(in_memory());
        let (_, top) = svc.predict(&profile()).unwrap();
        for pair in top.windows(2) {
            assert!(pair[0].impact.abs() >= pair[1].impact.abs());
        }
        // female gender is the largest driver in the boosted fixtures
        assert_eq!(top[0].feature, "RIAGENDR");
        assert_eq!(top[0].feature_name, "Gender");
        assert_eq!(top[0].value, 2.0);
        let unknown = top.iter().find(|c| c.feature == "UNKNOWN1");
        if let Some(c) = unknown {
            assert_eq!(c.impact, 0.0);
            assert_eq!(c.feature_name, "UNKNOWN1");
        }
    }

    #[test]
    fn test_short_schema_returns_every_feature() {
        let schema = ["RIDAGEYR", "RIAGENDR", "BMXBMI"];
        let scaler = Arc::new(StandardScaler {
            mean: vec![0.0; schema.len()],
            scale: vec![1.0; schema.len()],
        });
        let nutrients = TARGETS
            .iter()
            .map(|target| {
                let ensemble: TreeEnsemble = serde_json::from_value(json!({
                    "kind": "gradient_boosting",
                    "n_features": schema.len(),
                    "base_score": -1.0,
                    "trees": [
                        { "nodes": [
                            { "feature": 1, "threshold": 1.5, "left": 1, "right": 2, "cover": 10.0 },
                            { "value": -0.5, "cover": 5.0 },
                            { "value": 0.5, "cover": 5.0 }
                        ] }
                    ]
                }))
                .unwrap();
                NutrientModels::new(*target, ensemble, None, scaler.clone())
            })
            .collect();
        let svc = PredictorService::from_models(LoadedModels {
            feature_names: schema.iter().map(|s| s.to_string()).collect(),
            nutrients,
            model_hash: None,
        });

        let (_, top) = svc.predict(&profile()).unwrap();
        assert_eq!(top.len(), schema.len());
        assert_eq!(top[0].feature, "RIAGENDR");
    }

    #[test]
    fn test_feature_info() {
        let svc = PredictorService::from_models(in_memory());
        let info = svc.feature_info().unwrap();
        assert_eq!(info.total_features, SCHEMA.len());
        assert_eq!(info.features[0].code, "RIDAGEYR");
        assert_eq!(info.features[0].description, "Age (years)");
        assert_eq!(info.features[5].description, "UNKNOWN1");
    }

    #[test]
    fn test_load_with_shared_scaler() {
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(dir.path());
        let svc = PredictorService::load(dir.path());
        assert!(svc.is_ready());
        let hash = svc.model_hash().unwrap();
        assert!(hash.starts_with("sha256:"));
        assert_eq!(hash.len(), "sha256:".len() + 64);

        // same bytes → same hash
        let again = PredictorService::load(dir.path());
        assert_eq!(again.model_hash(), svc.model_hash());
    }

    #[test]
    fn test_load_prefers_individual_scaler() {
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(dir.path());
        let shifted = StandardScaler {
            mean: vec![100.0; SCHEMA.len()],
            scale: vec![1.0; SCHEMA.len()],
        };
        write(dir.path(), "b12_deficient_scaler.json", &serde_json::to_value(shifted).unwrap());
        let models = LoadedModels::load(dir.path()).unwrap();
        assert_eq!(models.nutrients[0].scaler.mean[0], 100.0);
        assert_eq!(models.nutrients[1].scaler.mean[0], 0.0);
    }

    #[test]
    fn test_load_failures_leave_service_unloaded() {
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(dir.path());
        std::fs::remove_file(dir.path().join("scaler.json")).unwrap();
        assert!(LoadedModels::load(dir.path()).is_err());
        assert!(!PredictorService::load(dir.path()).is_ready());

        let empty = tempfile::tempdir().unwrap();
        assert!(!PredictorService::load(empty.path()).is_ready());
    }

    #[test]
    fn test_load_rejects_width_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(dir.path());
        write(dir.path(), "feature_names.json", &json!(["RIDAGEYR", "RIAGENDR"]));
        let err = LoadedModels::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("features"), "{err}");
    }
}
