//! Isolation forest outlier scoring.
//!
//! Each tree isolates a random subsample by recursive random splits; points
//! that isolate in few splits are abnormal. The forest score is
//! `s(x) = −2^(−E[h(x)] / c(ψ))` where `h` is the path length (plus the
//! expected remaining depth at the leaf) and `c(ψ)` the average path length of
//! an unsuccessful BST search over `ψ` samples. Lower scores are more abnormal.
//!
//! The decision function subtracts the `contamination` quantile of the training
//! scores, so `decision(x) < 0` marks the expected fraction of outliers.
//!
//! Trees are grown in parallel. Each tree draws from its own RNG stream derived
//! from the master seed and the tree index, so results do not depend on the
//! thread pool.

use rand::rngs::StdRng;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{check_matrix, check_row, ModelError};
use crate::rng::{RngHierarchy, DEFAULT_SEED};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Subsample cap used when `max_samples` is not set.
const AUTO_MAX_SAMPLES: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForestParams {
    pub n_estimators: usize,
    /// Expected outlier fraction, in (0, 0.5].
    pub contamination: f64,
    /// Subsample size per tree; `None` means `min(256, n)`.
    pub max_samples: Option<usize>,
    pub seed: u64,
}

impl Default for IsolationForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            contamination: 0.2,
            max_samples: None,
            seed: DEFAULT_SEED,
        }
    }
}

impl IsolationForestParams {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.n_estimators == 0 {
            return Err(ModelError::InvalidParameter(
                "n_estimators must be at least 1".into(),
            ));
        }
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(ModelError::InvalidParameter(format!(
                "contamination must lie in (0, 0.5], got {}",
                self.contamination
            )));
        }
        if self.max_samples == Some(0) {
            return Err(ModelError::InvalidParameter(
                "max_samples must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

/// One isolation tree stored as a node arena; node 0 is the root.
#[derive(Debug, Clone)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn grow(rows: &[Vec<f64>], sample: Vec<usize>, max_depth: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow_node(rows, sample, 0, max_depth, rng);
        tree
    }

    fn grow_node(
        &mut self,
        rows: &[Vec<f64>],
        indices: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            size: indices.len(),
        });
        if depth >= max_depth || indices.len() <= 1 {
            return id;
        }

        // Only features that still vary inside this node can split it.
        let width = rows[indices[0]].len();
        let candidates: Vec<(usize, f64, f64)> = (0..width)
            .filter_map(|feature| {
                let (min, max) = indices.iter().fold(
                    (f64::INFINITY, f64::NEG_INFINITY),
                    |(lo, hi), &i| (lo.min(rows[i][feature]), hi.max(rows[i][feature])),
                );
                (max > min).then_some((feature, min, max))
            })
            .collect();
        if candidates.is_empty() {
            return id;
        }

        let (feature, min, max) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = rng.gen_range(min..max);
        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| rows[i][feature] <= threshold);

        let left = self.grow_node(rows, left, depth + 1, max_depth, rng);
        let right = self.grow_node(rows, right, depth + 1, max_depth, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    fn path_length(&self, x: &[f64]) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match self.nodes[node] {
                Node::Leaf { size } => return depth + average_path_length(size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x[feature] <= threshold { left } else { right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// Fitted isolation forest.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
    n_features: usize,
    offset: f64,
}

impl IsolationForest {
    /// Fit on `rows` and calibrate the decision offset on the same rows.
    pub fn fit(rows: &[Vec<f64>], params: &IsolationForestParams) -> Result<Self, ModelError> {
        params.validate()?;
        let n_features = check_matrix(rows)?;
        let n = rows.len();
        if n < 2 {
            return Err(ModelError::NotEnoughSamples { needed: 2, got: n });
        }

        let sample_size = params.max_samples.unwrap_or(AUTO_MAX_SAMPLES).min(n);
        let max_depth = (sample_size.max(2) as f64).log2().ceil() as usize;
        let hierarchy = RngHierarchy::new(params.seed);

        let trees: Vec<IsolationTree> = (0..params.n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut rng = hierarchy.rng_for("isolation_forest", t as u64);
                let sample = rand::seq::index::sample(&mut rng, n, sample_size).into_vec();
                IsolationTree::grow(rows, sample, max_depth, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            sample_size,
            n_features,
            offset: 0.0,
        };
        let scores = forest.score_samples(rows)?;
        forest.offset = percentile(&scores, 100.0 * params.contamination);

        tracing::debug!(
            trees = forest.trees.len(),
            sample_size,
            max_depth,
            offset = forest.offset,
            "isolation forest fitted"
        );
        Ok(forest)
    }

    /// Raw abnormality score in [−1, 0); lower is more abnormal.
    pub fn score_samples(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        rows.iter().map(|row| self.score_row(row)).collect()
    }

    pub fn score_row(&self, row: &[f64]) -> Result<f64, ModelError> {
        check_row(row, self.n_features)?;
        let total: f64 = self.trees.iter().map(|t| t.path_length(row)).sum();
        let mean_depth = total / self.trees.len() as f64;
        Ok(-(2f64.powf(-mean_depth / average_path_length(self.sample_size))))
    }

    /// Score shifted by the contamination offset; negative means outlier.
    pub fn decision_function(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        Ok(self
            .score_samples(rows)?
            .into_iter()
            .map(|s| s - self.offset)
            .collect())
    }

    /// `-1` for outliers, `1` for inliers.
    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<i8>, ModelError> {
        Ok(self
            .decision_function(rows)?
            .into_iter()
            .map(|d| if d < 0.0 { -1 } else { 1 })
            .collect())
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

/// Average path length of an unsuccessful search in a BST of `n` nodes.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolated percentile (`q` in [0, 100]) of `values`.
fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}
