//! Least-squares regression tree (CART).
//!
//! Nodes live in a flat vector with the root at index 0. A split sends a row left when its
//! feature value is `<= threshold` or NaN, right otherwise. Thresholds sit halfway between
//! two distinct neighbouring training values.

use serde::{Deserialize, Serialize};

use super::check_training_data;
use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        n_samples: usize,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

/// Row indices sorted by each feature, computed once and shared across every tree of an
/// ensemble fit on the same matrix.
pub(crate) struct SortedColumns {
    order: Vec<Vec<usize>>,
}

impl SortedColumns {
    pub(crate) fn new(x: &[&[f64]], n_features: usize) -> Self {
        let order = (0..n_features)
            .map(|f| {
                let mut idx: Vec<usize> = (0..x.len()).collect();
                idx.sort_by(|a, b| x[*a][f].total_cmp(&x[*b][f]));
                idx
            })
            .collect();
        Self { order }
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct TreeBuilder<'a> {
    x: &'a [&'a [f64]],
    y: &'a [f64],
    sorted: &'a SortedColumns,
    params: &'a TreeParams,
    in_node: Vec<bool>,
    importances: &'a mut [f64],
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    pub fn fit(x: &[&[f64]], y: &[f64], params: &TreeParams) -> Result<Self, PipelineError> {
        let n_features = check_training_data(x, y)?;
        let sorted = SortedColumns::new(x, n_features);
        let samples: Vec<usize> = (0..x.len()).collect();
        let mut importances = vec![0.0; n_features];
        Ok(Self::grow(x, y, &samples, &sorted, params, &mut importances))
    }

    /// Grow a tree on `samples`, adding each split's squared-error reduction to
    /// `importances[feature]`. Inputs are assumed validated.
    pub(crate) fn grow(
        x: &[&[f64]],
        y: &[f64],
        samples: &[usize],
        sorted: &SortedColumns,
        params: &TreeParams,
        importances: &mut [f64],
    ) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let mut builder = TreeBuilder {
            x,
            y,
            sorted,
            params,
            in_node: vec![false; x.len()],
            importances,
            nodes: Vec::new(),
        };
        builder.build(samples.to_vec(), 0);
        Self {
            nodes: builder.nodes,
        }
    }

    pub fn predict(&self, features: &[f64]) -> f64 {
        if self.nodes.is_empty() {
            return 0.0;
        }
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    let v = features.get(*feature).copied().unwrap_or(f64::NAN);
                    idx = if v.is_nan() || v <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }

    /// Number of split levels on the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], idx: usize) -> usize {
            match &nodes[idx] {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }
}

impl TreeBuilder<'_> {
    fn build(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let n = samples.len();
        let (sum, sum_sq) = samples.iter().fold((0.0, 0.0), |(s, sq), &i| {
            let v = self.y[i];
            (s + v, sq + v * v)
        });
        let idx = self.nodes.len();
        self.nodes.push(TreeNode::Leaf {
            value: sum / n as f64,
            n_samples: n,
        });

        let sse = (sum_sq - sum * sum / n as f64).max(0.0);
        let min_leaf = self.params.min_samples_leaf.max(1);
        if depth >= self.params.max_depth
            || n < self.params.min_samples_split.max(2)
            || n < 2 * min_leaf
            || sse <= 1e-12 * (1.0 + sum_sq)
        {
            return idx;
        }

        let Some(split) = self.best_split(&samples, sum, min_leaf) else {
            return idx;
        };
        self.importances[split.feature] += split.gain;

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .iter()
            .partition(|&&i| self.x[i][split.feature] <= split.threshold);
        let left = self.build(left, depth + 1);
        let right = self.build(right, depth + 1);
        self.nodes[idx] = TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
            n_samples: n,
        };
        idx
    }

    fn best_split(
        &mut self,
        samples: &[usize],
        sum: f64,
        min_leaf: usize,
    ) -> Option<SplitCandidate> {
        for &i in samples {
            self.in_node[i] = true;
        }
        let n = samples.len();
        let parent_term = sum * sum / n as f64;
        let mut best: Option<SplitCandidate> = None;

        for (feature, order) in self.sorted.order.iter().enumerate() {
            let mut left_n = 0usize;
            let mut left_sum = 0.0;
            let mut prev: Option<f64> = None;
            for &i in order {
                if !self.in_node[i] {
                    continue;
                }
                let v = self.x[i][feature];
                if let Some(pv) = prev {
                    let right_n = n - left_n;
                    if v > pv && left_n >= min_leaf && right_n >= min_leaf {
                        let right_sum = sum - left_sum;
                        let gain = left_sum * left_sum / left_n as f64
                            + right_sum * right_sum / right_n as f64
                            - parent_term;
                        if gain > 0.0 && best.as_ref().map_or(true, |b| gain > b.gain) {
                            let mut threshold = pv + (v - pv) / 2.0;
                            if threshold >= v {
                                threshold = pv;
                            }
                            best = Some(SplitCandidate {
                                feature,
                                threshold,
                                gain,
                            });
                        }
                    }
                }
                left_n += 1;
                left_sum += self.y[i];
                prev = Some(v);
            }
        }

        for &i in samples {
            self.in_node[i] = false;
        }
        best
    }
}
