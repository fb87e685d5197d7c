//! Tree ensembles exported from training in flat array form: node `i` has
//! children `children_left[i]` / `children_right[i]` (`-1` for a leaf) and
//! routes left when `x[feature[i]] <= threshold[i]`.

use crate::error::InferenceError;
use crate::model::{check_width, AnomalyDetector, Classifier, Verdict};
use serde::{Deserialize, Serialize};

const TREE_LEAF: i64 = -1;
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    /// Training samples that reached each node (isolation trees).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub n_node_samples: Vec<u64>,
    /// Per-class counts or fractions at each node (classification trees).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub value: Vec<Vec<f64>>,
    /// Input columns this tree was fit on, when bagging drew a feature subset.
    /// `feature[i]` then indexes into this list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<usize>>,
}

impl DecisionTree {
    pub fn node_count(&self) -> usize {
        self.children_left.len()
    }

    fn is_leaf(&self, node: usize) -> bool {
        self.children_left[node] == TREE_LEAF
    }

    pub fn validate(&self, n_features: usize) -> Result<(), String> {
        let n = self.node_count();
        if n == 0 {
            return Err("tree has no nodes".into());
        }
        if self.children_right.len() != n || self.feature.len() != n || self.threshold.len() != n {
            return Err("tree arrays have inconsistent lengths".into());
        }
        for node in 0..n {
            if self.is_leaf(node) {
                continue;
            }
            let (left, right) = (self.children_left[node], self.children_right[node]);
            // Exported trees are stored parent-before-child; this also rules out cycles.
            for child in [left, right] {
                if child <= node as i64 || child >= n as i64 {
                    return Err(format!("node {node} has out-of-range child {child}"));
                }
            }
            let f = self.feature[node];
            let column = match (&self.features, usize::try_from(f)) {
                (_, Err(_)) => return Err(format!("node {node} has negative feature {f}")),
                (Some(subset), Ok(f)) => match subset.get(f) {
                    Some(c) => *c,
                    None => return Err(format!("node {node} feature {f} outside subset")),
                },
                (None, Ok(f)) => f,
            };
            if column >= n_features {
                return Err(format!(
                    "node {node} reads column {column} of {n_features}"
                ));
            }
        }
        Ok(())
    }

    /// Walk from the root to the leaf reached by `x`, returning the leaf
    /// index and its depth (number of edges traversed).
    pub fn apply(&self, x: &[f64]) -> (usize, usize) {
        let mut node = 0usize;
        let mut depth = 0usize;
        while !self.is_leaf(node) {
            let f = self.feature[node] as usize;
            let column = match &self.features {
                Some(subset) => subset[f],
                None => f,
            };
            node = if x[column] <= self.threshold[node] {
                self.children_left[node] as usize
            } else {
                self.children_right[node] as usize
            };
            depth += 1;
        }
        (node, depth)
    }
}

/// Average path length of an unsuccessful search in a binary search tree
/// built from `n` points; normalises isolation depths.
pub fn average_path_length(n: f64) -> f64 {
    if n <= 1.0 {
        0.0
    } else if n <= 2.0 {
        1.0
    } else {
        2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
    }
}

/// Isolation forest anomaly detector.
///
/// `score_samples(x) = -2^(-E[h(x)] / c(max_samples))`; a sample is an
/// anomaly when `score_samples(x) - offset < 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    pub n_features: usize,
    pub max_samples: usize,
    pub offset: f64,
    pub trees: Vec<DecisionTree>,
}

impl IsolationForest {
    pub fn validate(&self) -> Result<(), String> {
        if self.trees.is_empty() {
            return Err("isolation forest has no trees".into());
        }
        if self.max_samples == 0 {
            return Err("max_samples must be positive".into());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features)
                .map_err(|e| format!("tree {i}: {e}"))?;
            if tree.n_node_samples.len() != tree.node_count() {
                return Err(format!("tree {i}: n_node_samples missing"));
            }
        }
        Ok(())
    }

    pub fn score_samples(&self, x: &[f64]) -> Result<f64, InferenceError> {
        check_width("isolation forest", self.n_features, x.len())?;
        let total_depth: f64 = self
            .trees
            .iter()
            .map(|tree| {
                let (leaf, depth) = tree.apply(x);
                depth as f64 + average_path_length(tree.n_node_samples[leaf] as f64)
            })
            .sum();
        let mean_depth = total_depth / self.trees.len() as f64;
        let normaliser = average_path_length(self.max_samples as f64);
        let score = if normaliser > 0.0 {
            2f64.powf(-mean_depth / normaliser)
        } else {
            1.0
        };
        Ok(-score)
    }

    pub fn decision_function(&self, x: &[f64]) -> Result<f64, InferenceError> {
        Ok(self.score_samples(x)? - self.offset)
    }
}

impl AnomalyDetector for IsolationForest {
    fn n_features(&self) -> Option<usize> {
        Some(self.n_features)
    }

    fn score(&self, scaled: &[f64]) -> Result<Verdict, InferenceError> {
        if self.decision_function(scaled)? < 0.0 {
            Ok(Verdict::Anomaly)
        } else {
            Ok(Verdict::Normal)
        }
    }
}

/// Random forest failure classifier (binary).
///
/// Class probabilities are the mean over trees of the normalised leaf class
/// distribution; the label is the arg-max class, class 0 winning ties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    pub n_features: usize,
    pub trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn validate(&self) -> Result<(), String> {
        if self.trees.is_empty() {
            return Err("random forest has no trees".into());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features)
                .map_err(|e| format!("tree {i}: {e}"))?;
            if tree.value.len() != tree.node_count() {
                return Err(format!("tree {i}: class values missing"));
            }
            for (node, v) in tree.value.iter().enumerate() {
                if tree.is_leaf(node) && (v.len() != 2 || v.iter().sum::<f64>() <= 0.0) {
                    return Err(format!("tree {i}: leaf {node} must hold two positive-sum class weights"));
                }
            }
        }
        Ok(())
    }

    /// `[p(class 0), p(class 1)]`.
    pub fn class_probabilities(&self, x: &[f64]) -> Result<[f64; 2], InferenceError> {
        check_width("random forest", self.n_features, x.len())?;
        let mut acc = [0.0, 0.0];
        for tree in &self.trees {
            let (leaf, _) = tree.apply(x);
            let counts = &tree.value[leaf];
            let total: f64 = counts.iter().sum();
            acc[0] += counts[0] / total;
            acc[1] += counts[1] / total;
        }
        let n = self.trees.len() as f64;
        Ok([acc[0] / n, acc[1] / n])
    }
}

impl Classifier for RandomForest {
    fn n_features(&self) -> Option<usize> {
        Some(self.n_features)
    }

    fn predict_proba(&self, scaled: &[f64]) -> Result<f64, InferenceError> {
        Ok(self.class_probabilities(scaled)?[1])
    }

    fn predict(&self, scaled: &[f64]) -> Result<u8, InferenceError> {
        let [p0, p1] = self.class_probabilities(scaled)?;
        Ok(u8::from(p1 > p0))
    }
}
