//! Tree-ensemble binary classifiers loaded from JSON artifacts.
//!
//! Two ensemble flavours are supported:
//! - `gradient_boosting`: leaf values are log-odds increments; the output is
//!   `sigmoid(base_score + Σ leaf)`.
//! - `random_forest`: leaf values are positive-class probabilities; the output
//!   is their mean.
//!
//! Split rule for every node is `x <= threshold` → left. NaN inputs follow the
//! node's `default_left` flag.
//!
//! Artifact layout:
//!
//! ```json
//! {
//!   "kind": "gradient_boosting",
//!   "n_features": 3,
//!   "base_score": -1.2,
//!   "trees": [
//!     { "nodes": [
//!         { "feature": 0, "threshold": 0.5, "left": 1, "right": 2, "cover": 100.0 },
//!         { "value": -0.4, "cover": 60.0 },
//!         { "value": 0.7, "cover": 40.0 }
//!     ] }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures while loading or evaluating model artifacts.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("failed to read artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse artifact {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid artifact {name}: {reason}")]
    Invalid { name: String, reason: String },

    #[error("expected {expected} features, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("explainer returned {classes} class outputs, expected a positive class")]
    MissingPositiveClass { classes: usize },
}

impl ModelError {
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = ModelError> = std::result::Result<T, E>;

/// Check an input row against the width a model was trained on.
pub fn check_width(expected: usize, x: &[f64]) -> Result<()> {
    if x.len() == expected {
        Ok(())
    } else {
        Err(ModelError::DimensionMismatch {
            expected,
            got: x.len(),
        })
    }
}

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// A binary classifier over a scaled feature row.
pub trait ProbabilityModel: Send + Sync {
    /// Raw model output: log-odds for boosted ensembles, probability for forests.
    fn decision_function(&self, x: &[f64]) -> Result<f64>;

    /// Probability of the positive (deficient) class.
    fn predict_proba(&self, x: &[f64]) -> Result<f64>;
}

/// Per-feature attributions, either a single output or one vector per class.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapValues {
    Single(Vec<f64>),
    PerClass(Vec<Vec<f64>>),
}

impl ShapValues {
    /// The attribution for the positive class (index 1 of a per-class output).
    pub fn positive_class(self) -> Result<Vec<f64>> {
        match self {
            Self::Single(v) => Ok(v),
            Self::PerClass(mut classes) => {
                if classes.len() < 2 {
                    return Err(ModelError::MissingPositiveClass {
                        classes: classes.len(),
                    });
                }
                Ok(classes.swap_remove(1))
            }
        }
    }
}

/// Produces feature attributions for a single scaled row.
pub trait Explainer: Send + Sync {
    fn shap_values(&self, x: &[f64]) -> Result<ShapValues>;
}

// ---------------------------------------------------------------------------
// Trees
// ---------------------------------------------------------------------------

fn default_left() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        cover: f64,
        #[serde(default = "default_left")]
        default_left: bool,
    },
    Leaf {
        value: f64,
        cover: f64,
    },
}

impl Node {
    pub fn cover(&self) -> f64 {
        match self {
            Self::Split { cover, .. } | Self::Leaf { cover, .. } => *cover,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    /// Child taken by `x` at a split node.
    pub(crate) fn next_node(
        x: &[f64],
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        default_left: bool,
    ) -> usize {
        let v = x[feature];
        let go_left = if v.is_nan() { default_left } else { v <= threshold };
        if go_left {
            left
        } else {
            right
        }
    }

    /// Leaf value reached by `x`. `x` must already be width-checked.
    pub fn leaf_value(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value, .. } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                    ..
                } => idx = Self::next_node(x, *feature, *threshold, *left, *right, *default_left),
            }
        }
    }

    /// Children must point strictly forward so every walk terminates.
    fn validate(&self, n_features: usize) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".into());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if let Node::Split {
                feature,
                left,
                right,
                cover,
                ..
            } = node
            {
                if *feature >= n_features {
                    return Err(format!("node {i} splits on feature {feature} of {n_features}"));
                }
                for child in [*left, *right] {
                    if child <= i || child >= self.nodes.len() {
                        return Err(format!("node {i} has invalid child {child}"));
                    }
                }
                if !(*cover > 0.0) {
                    return Err(format!("split node {i} has non-positive cover"));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Ensemble
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleKind {
    GradientBoosting,
    RandomForest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub kind: EnsembleKind,
    pub n_features: usize,
    #[serde(default)]
    pub base_score: f64,
    pub trees: Vec<Tree>,
}

pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl TreeEnsemble {
    /// Structural checks run once at load time.
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.trees.is_empty() {
            return Err(ModelError::invalid(name, "ensemble has no trees"));
        }
        for (t, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features)
                .map_err(|reason| ModelError::invalid(name, format!("tree {t}: {reason}")))?;
        }
        Ok(())
    }
}

impl ProbabilityModel for TreeEnsemble {
    fn decision_function(&self, x: &[f64]) -> Result<f64> {
        check_width(self.n_features, x)?;
        let sum: f64 = self.trees.iter().map(|t| t.leaf_value(x)).sum();
        Ok(match self.kind {
            EnsembleKind::GradientBoosting => self.base_score + sum,
            EnsembleKind::RandomForest => sum / self.trees.len() as f64,
        })
    }

    fn predict_proba(&self, x: &[f64]) -> Result<f64> {
        let raw = self.decision_function(x)?;
        Ok(match self.kind {
            EnsembleKind::GradientBoosting => sigmoid(raw),
            EnsembleKind::RandomForest => raw.clamp(0.0, 1.0),
        })
    }
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(path: &Path, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|source| ModelError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
