//! Per-feature standardization fitted at training time.

use serde::{Deserialize, Serialize};

use crate::model::{check_width, ModelError, Result};

/// `(x - mean) / scale`, column by column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn validate(&self, name: &str, n_features: usize) -> Result<()> {
        if self.mean.len() != n_features || self.scale.len() != n_features {
            return Err(ModelError::invalid(
                name,
                format!(
                    "scaler has {} means and {} scales for {n_features} features",
                    self.mean.len(),
                    self.scale.len()
                ),
            ));
        }
        if self.mean.iter().chain(&self.scale).any(|v| !v.is_finite()) {
            return Err(ModelError::invalid(name, "scaler parameters must be finite"));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    pub fn transform(&self, x: &[f64]) -> Result<Vec<f64>> {
        check_width(self.mean.len(), x)?;
        Ok(x.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (mean, scale))| {
                // constant columns were fitted with zero variance
                let scale = if *scale == 0.0 { 1.0 } else { *scale };
                (v - mean) / scale
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform() {
        let s = StandardScaler {
            mean: vec![10.0, 0.0, 5.0],
            scale: vec![2.0, 1.0, 0.0],
        };
        assert_eq!(s.transform(&[14.0, -3.0, 7.0]).unwrap(), vec![2.0, -3.0, 2.0]);
    }

    #[test]
    fn test_width_mismatch() {
        let s = StandardScaler {
            mean: vec![0.0; 2],
            scale: vec![1.0; 2],
        };
        assert!(s.transform(&[1.0]).is_err());
        assert!(s.validate("s", 3).is_err());
        assert!(s.validate("s", 2).is_ok());
    }
}
