//! Isolation-forest outlier model
//!
//! Anomalies are few and different, so random axis-aligned splits isolate them
//! in fewer steps than normal points. Each tree is grown on a random subsample
//! to a depth limit of `ceil(log2(psi))`; a point's anomaly score is derived
//! from its average path length normalised by `c(psi)`, the expected path
//! length of an unsuccessful BST search:
//!
//! ```text
//! c(n)  = 2 * (ln(n - 1) + 0.5772...) - 2 * (n - 1) / n
//! score = -2^(-E[h(x)] / c(psi))
//! decision = score - offset      (offset = contamination percentile of training scores)
//! ```
//!
//! Negative decisions are outliers. Features are standardised first.
//!
//! Fitted on a single vector (which is how audio spoof scoring uses it) every
//! tree is a lone leaf, the score equals the offset and the decision is 0:
//! an inlier on the boundary.

use crate::capabilities::{OutlierModel, OutlierVerdict};
use crate::config::ForestConfig;
use crate::dsp;
use crate::error::CapabilityError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Expected path length of an unsuccessful search in a BST of `n` nodes.
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

// =============================================================================
// SCALER
// =============================================================================

/// Zero-mean unit-variance scaling; constant columns get scale 1.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let dims = rows.first().map_or(0, Vec::len);
        let mut mean = Vec::with_capacity(dims);
        let mut scale = Vec::with_capacity(dims);
        for d in 0..dims {
            let column: Vec<f64> = rows.iter().map(|r| r[d]).collect();
            mean.push(dsp::mean(&column));
            let sd = dsp::std_dev(&column);
            scale.push(if sd > 0.0 { sd } else { 1.0 });
        }
        Self { mean, scale }
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }
}

// =============================================================================
// FOREST
// =============================================================================

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn path_length(&self, x: &[f64], depth: usize) -> f64 {
        match self {
            Node::Leaf { size } => depth as f64 + average_path_length(*size),
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if x[*feature] < *threshold {
                    left.path_length(x, depth + 1)
                } else {
                    right.path_length(x, depth + 1)
                }
            }
        }
    }
}

fn grow(rows: &[&[f64]], depth: usize, max_depth: usize, rng: &mut StdRng) -> Node {
    if rows.len() <= 1 || depth >= max_depth {
        return Node::Leaf { size: rows.len() };
    }

    let dims = rows[0].len();
    let splittable: Vec<(usize, f64, f64)> = (0..dims)
        .filter_map(|d| {
            let column: Vec<f64> = rows.iter().map(|r| r[d]).collect();
            let (lo, hi) = dsp::min_max(&column);
            (hi > lo).then_some((d, lo, hi))
        })
        .collect();

    if splittable.is_empty() {
        return Node::Leaf { size: rows.len() };
    }

    let (feature, lo, hi) = splittable[rng.random_range(0..splittable.len())];
    let threshold = rng.random_range(lo..hi);
    let (left, right): (Vec<&[f64]>, Vec<&[f64]>) =
        rows.iter().copied().partition(|r| r[feature] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(grow(&left, depth + 1, max_depth, rng)),
        right: Box::new(grow(&right, depth + 1, max_depth, rng)),
    }
}

/// Numpy-style linear-interpolated percentile, `q` in [0, 100].
fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<Node>,
    subsample: usize,
    offset: f64,
}

impl IsolationForest {
    pub fn fit(rows: &[Vec<f64>], config: &ForestConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let subsample = config.max_samples.min(rows.len()).max(1);
        let max_depth = (subsample.max(2) as f64).log2().ceil() as usize;

        let trees = (0..config.n_trees.max(1))
            .map(|_| {
                let picked: Vec<&[f64]> = if rows.is_empty() {
                    Vec::new()
                } else {
                    rand::seq::index::sample(&mut rng, rows.len(), subsample.min(rows.len()))
                        .into_iter()
                        .map(|i| rows[i].as_slice())
                        .collect()
                };
                grow(&picked, 0, max_depth, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            subsample,
            offset: 0.0,
        };
        let training: Vec<f64> = rows.iter().map(|r| forest.score_sample(r)).collect();
        forest.offset = percentile(&training, 100.0 * config.contamination);
        forest
    }

    /// Opposite of the anomaly score: in [-1, 0), lower is more abnormal.
    pub fn score_sample(&self, x: &[f64]) -> f64 {
        let mean_depth = self
            .trees
            .iter()
            .map(|t| t.path_length(x, 0))
            .sum::<f64>()
            / self.trees.len() as f64;
        let norm = average_path_length(self.subsample);
        let ratio = if norm > 0.0 { mean_depth / norm } else { 1.0 };
        -(2f64.powf(-ratio))
    }

    pub fn decision_function(&self, x: &[f64]) -> f64 {
        self.score_sample(x) - self.offset
    }

    pub fn is_outlier(&self, x: &[f64]) -> bool {
        self.decision_function(x) < 0.0
    }
}

/// [`OutlierModel`] that standardises and fits a fresh forest on each call.
#[derive(Debug, Clone, Default)]
pub struct IsolationForestModel {
    pub config: ForestConfig,
}

impl IsolationForestModel {
    pub fn new(config: ForestConfig) -> Self {
        Self { config }
    }
}

impl OutlierModel for IsolationForestModel {
    fn name(&self) -> &str {
        "isolation-forest"
    }

    fn fit_score(&self, features: &[f64]) -> Result<OutlierVerdict, CapabilityError> {
        if features.is_empty() {
            return Err(CapabilityError::Failed {
                capability: "isolation-forest",
                message: "empty feature vector".to_string(),
            });
        }
        if features.iter().any(|v| !v.is_finite()) {
            return Err(CapabilityError::Failed {
                capability: "isolation-forest",
                message: "non-finite feature".to_string(),
            });
        }

        let rows = vec![features.to_vec()];
        let scaler = StandardScaler::fit(&rows);
        let scaled: Vec<Vec<f64>> = rows.iter().map(|r| scaler.transform(r)).collect();
        let forest = IsolationForest::fit(&scaled, &self.config);
        let decision = forest.decision_function(&scaled[0]);

        Ok(OutlierVerdict {
            decision,
            is_outlier: decision < 0.0,
        })
    }
}
