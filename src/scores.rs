//! Risk categories, confidence bands and the overall health score.

use serde::{Deserialize, Serialize};

use crate::predictor::NutrientPrediction;

/// Probabilities strictly below this are `Low`.
pub const LOW_RISK_CEILING: f64 = 0.15;
/// Probabilities strictly below this (and not `Low`) are `Moderate`.
pub const MODERATE_RISK_CEILING: f64 = 0.4;

/// Minimum half-width of the confidence band.
///
/// The calibrated/uncalibrated gap is zero whenever no calibrated artifact was
/// shipped, so the band never collapses to a point.
pub const UNCERTAINTY_FLOOR: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskCategory {
    Low,
    Moderate,
    High,
}

impl RiskCategory {
    pub fn from_probability(p: f64) -> Self {
        if p < LOW_RISK_CEILING {
            Self::Low
        } else if p < MODERATE_RISK_CEILING {
            Self::Moderate
        } else {
            Self::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Moderate => "Moderate",
            Self::High => "High",
        }
    }

    /// Moderate and High risks trigger nutrient-specific advice.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Self::Moderate | Self::High)
    }
}

/// Heuristic interval around a calibrated probability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceBand {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceBand {
    /// Half-width is `|calibrated - uncalibrated| + UNCERTAINTY_FLOOR`,
    /// bounds clamped to [0, 1].
    pub fn around(calibrated: f64, uncalibrated: f64) -> Self {
        let uncertainty = (calibrated - uncalibrated).abs() + UNCERTAINTY_FLOOR;
        Self {
            lower: (calibrated - uncertainty).max(0.0),
            upper: (calibrated + uncertainty).min(1.0),
        }
    }

    pub fn contains(&self, p: f64) -> bool {
        self.lower <= p && p <= self.upper
    }
}

/// `max(0, 1 - mean(risk_score))`. An empty slice scores a perfect 1.0.
pub fn overall_health_score(predictions: &[NutrientPrediction]) -> f64 {
    if predictions.is_empty() {
        return 1.0;
    }
    let mean = predictions.iter().map(|p| p.risk_score).sum::<f64>() / predictions.len() as f64;
    (1.0 - mean).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(risk_score: f64) -> NutrientPrediction {
        NutrientPrediction {
            nutrient: "Vitamin B12".into(),
            risk_score,
            risk_category: RiskCategory::from_probability(risk_score),
            confidence: risk_score,
            confidence_lower: risk_score,
            confidence_upper: risk_score,
            note: String::new(),
        }
    }

    #[test]
    fn test_category_boundaries() {
        assert_eq!(RiskCategory::from_probability(0.0), RiskCategory::Low);
        assert_eq!(RiskCategory::from_probability(0.149_999_999), RiskCategory::Low);
        assert_eq!(RiskCategory::from_probability(0.15), RiskCategory::Moderate);
        assert_eq!(RiskCategory::from_probability(0.399_999_999), RiskCategory::Moderate);
        assert_eq!(RiskCategory::from_probability(0.4), RiskCategory::High);
        assert_eq!(RiskCategory::from_probability(1.0), RiskCategory::High);
    }

    #[test]
    fn test_elevated() {
        assert!(!RiskCategory::Low.is_elevated());
        assert!(RiskCategory::Moderate.is_elevated());
        assert!(RiskCategory::High.is_elevated());
    }

    #[test]
    fn test_band_uses_floor_when_uncalibrated() {
        let band = ConfidenceBand::around(0.3, 0.3);
        assert!((band.lower - 0.25).abs() < 1e-12);
        assert!((band.upper - 0.35).abs() < 1e-12);
    }

    #[test]
    fn test_band_widens_with_calibration_gap() {
        let band = ConfidenceBand::around(0.5, 0.7);
        assert!((band.lower - 0.25).abs() < 1e-12);
        assert!((band.upper - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_band_is_clamped_and_contains_score() {
        for &(cal, uncal) in &[(0.01, 0.4), (0.99, 0.2), (0.0, 0.0), (1.0, 1.0), (0.5, 0.5)] {
            let band = ConfidenceBand::around(cal, uncal);
            assert!(band.lower >= 0.0 && band.upper <= 1.0);
            assert!(band.contains(cal), "{cal} not in {band:?}");
        }
    }

    #[test]
    fn test_health_score_is_one_minus_mean() {
        let preds = vec![prediction(0.1), prediction(0.2), prediction(0.3)];
        assert!((overall_health_score(&preds) - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_health_score_floor_and_empty() {
        assert_eq!(overall_health_score(&[prediction(1.0), prediction(1.0)]), 0.0);
        assert_eq!(overall_health_score(&[]), 1.0);
    }

    #[test]
    fn test_category_serializes_as_label() {
        assert_eq!(
            serde_json::to_string(&RiskCategory::Moderate).unwrap(),
            "\"Moderate\""
        );
    }
}
