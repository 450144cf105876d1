//! Exact path-dependent Tree SHAP over [`TreeEnsemble`]s.
//!
//! Follows Lundberg et al., "Consistent Individualized Feature Attribution for
//! Tree Ensembles" (Algorithm 2). Node covers stand in for the training
//! distribution, so attributions satisfy local accuracy:
//! `expected_value + Σ φ = model output` in the explained space.
//!
//! Boosted ensembles are explained in log-odds space and yield
//! [`ShapValues::Single`]. Forests are explained in probability space and
//! yield [`ShapValues::PerClass`] as `[negative, positive]`.

use std::sync::Arc;

use crate::model::{check_width, EnsembleKind, Explainer, Node, Result, ShapValues, Tree, TreeEnsemble};

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    weight: f64,
}

fn extend_path(path: &mut Vec<PathElement>, zero_fraction: f64, one_fraction: f64, feature: Option<usize>) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        weight: if depth == 0 { 1.0 } else { 0.0 },
    });
    let denom = (depth + 1) as f64;
    for i in (0..depth).rev() {
        path[i + 1].weight += one_fraction * path[i].weight * (i + 1) as f64 / denom;
        path[i].weight = zero_fraction * path[i].weight * (depth - i) as f64 / denom;
    }
}

/// Remove element `index` from the path, undoing its `extend_path`.
fn unwind_path(path: &mut Vec<PathElement>, index: usize) {
    let depth = path.len() - 1;
    let PathElement {
        zero_fraction,
        one_fraction,
        ..
    } = path[index];
    let denom = (depth + 1) as f64;
    let mut next = path[depth].weight;
    for i in (0..depth).rev() {
        if one_fraction != 0.0 {
            let tmp = path[i].weight;
            path[i].weight = next * denom / ((i + 1) as f64 * one_fraction);
            next = tmp - path[i].weight * zero_fraction * (depth - i) as f64 / denom;
        } else {
            path[i].weight = path[i].weight * denom / (zero_fraction * (depth - i) as f64);
        }
    }
    for i in index..depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
    path.pop();
}

/// Total weight of the path with element `index` unwound, without mutating it.
fn unwound_sum(path: &[PathElement], index: usize) -> f64 {
    let depth = path.len() - 1;
    let PathElement {
        zero_fraction,
        one_fraction,
        ..
    } = path[index];
    let mut total = 0.0;
    if one_fraction != 0.0 {
        let mut next = path[depth].weight;
        for i in (0..depth).rev() {
            let tmp = next / ((i + 1) as f64 * one_fraction);
            total += tmp;
            next = path[i].weight - tmp * zero_fraction * (depth - i) as f64;
        }
    } else {
        for i in (0..depth).rev() {
            total += path[i].weight / (zero_fraction * (depth - i) as f64);
        }
    }
    total * (depth + 1) as f64
}

struct Walk<'a> {
    tree: &'a Tree,
    x: &'a [f64],
    phi: &'a mut [f64],
    scale: f64,
}

impl Walk<'_> {
    fn recurse(
        &mut self,
        node: usize,
        mut path: Vec<PathElement>,
        zero_fraction: f64,
        one_fraction: f64,
        feature: Option<usize>,
    ) {
        extend_path(&mut path, zero_fraction, one_fraction, feature);

        let tree = self.tree;
        match &tree.nodes[node] {
            Node::Leaf { value, .. } => {
                for i in 1..path.len() {
                    let el = path[i];
                    let w = unwound_sum(&path, i);
                    if let Some(f) = el.feature {
                        self.phi[f] += w * (el.one_fraction - el.zero_fraction) * value * self.scale;
                    }
                }
            }
            Node::Split {
                feature: split,
                threshold,
                left,
                right,
                cover,
                default_left,
            } => {
                let hot = Tree::next_node(self.x, *split, *threshold, *left, *right, *default_left);
                let cold = if hot == *left { *right } else { *left };

                let mut incoming_zero = 1.0;
                let mut incoming_one = 1.0;
                if let Some(k) = (1..path.len()).find(|&k| path[k].feature == Some(*split)) {
                    incoming_zero = path[k].zero_fraction;
                    incoming_one = path[k].one_fraction;
                    unwind_path(&mut path, k);
                }

                let hot_zero = incoming_zero * tree.nodes[hot].cover() / cover;
                let cold_zero = incoming_zero * tree.nodes[cold].cover() / cover;

                self.recurse(hot, path.clone(), hot_zero, incoming_one, Some(*split));
                // A cold branch with no cover contributes nothing.
                if cold_zero > 0.0 {
                    self.recurse(cold, path, cold_zero, 0.0, Some(*split));
                }
            }
        }
    }
}

/// Cover-weighted mean output of a single tree.
fn tree_expected_value(tree: &Tree, node: usize) -> f64 {
    match &tree.nodes[node] {
        Node::Leaf { value, .. } => *value,
        Node::Split {
            left, right, cover, ..
        } => {
            let l = &tree.nodes[*left];
            let r = &tree.nodes[*right];
            (l.cover() * tree_expected_value(tree, *left) + r.cover() * tree_expected_value(tree, *right))
                / cover
        }
    }
}

/// Accumulate one tree's attributions into `phi`, scaled by `scale`.
pub fn tree_shap(tree: &Tree, x: &[f64], phi: &mut [f64], scale: f64) {
    let mut walk = Walk { tree, x, phi, scale };
    walk.recurse(0, Vec::with_capacity(16), 1.0, 1.0, None);
}

/// Tree SHAP explainer over a shared ensemble.
#[derive(Debug, Clone)]
pub struct TreeExplainer {
    ensemble: Arc<TreeEnsemble>,
}

impl TreeExplainer {
    pub fn new(ensemble: Arc<TreeEnsemble>) -> Self {
        Self { ensemble }
    }

    /// Scale applied to each tree's leaf values.
    fn tree_scale(&self) -> f64 {
        match self.ensemble.kind {
            EnsembleKind::GradientBoosting => 1.0,
            EnsembleKind::RandomForest => 1.0 / self.ensemble.trees.len() as f64,
        }
    }

    /// Baseline output of the positive class in the explained space.
    pub fn expected_value(&self) -> f64 {
        let scale = self.tree_scale();
        let trees: f64 = self
            .ensemble
            .trees
            .iter()
            .map(|t| tree_expected_value(t, 0) * scale)
            .sum();
        match self.ensemble.kind {
            EnsembleKind::GradientBoosting => self.ensemble.base_score + trees,
            EnsembleKind::RandomForest => trees,
        }
    }
}

impl Explainer for TreeExplainer {
    fn shap_values(&self, x: &[f64]) -> Result<ShapValues> {
        check_width(self.ensemble.n_features, x)?;
        let scale = self.tree_scale();
        let mut phi = vec![0.0; self.ensemble.n_features];
        for tree in &self.ensemble.trees {
            tree_shap(tree, x, &mut phi, scale);
        }
        Ok(match self.ensemble.kind {
            EnsembleKind::GradientBoosting => ShapValues::Single(phi),
            EnsembleKind::RandomForest => {
                let negative = phi.iter().map(|v| -v).collect();
                ShapValues::PerClass(vec![negative, phi])
            }
        })
    }
}
