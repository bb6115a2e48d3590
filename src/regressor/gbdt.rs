use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::linear::LinearBaseline;
use super::tree::{RegressionTree, SortedColumns, TreeParams};
use super::{check_training_data, Regressor};
use crate::error::PipelineError;

/// Starting estimate the trees correct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseEstimator {
    /// Mean of the training targets.
    Mean,
    /// Ridge linear fit on standardized features.
    #[default]
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GbdtParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Fraction of rows drawn without replacement for each stage.
    pub subsample: f64,
    pub seed: u64,
    pub base: BaseEstimator,
    pub ridge_alpha: f64,
}

impl Default for GbdtParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 1,
            subsample: 1.0,
            seed: 42,
            base: BaseEstimator::Linear,
            ridge_alpha: 1e-3,
        }
    }
}

impl GbdtParams {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(PipelineError::Config(format!(
                "model.learning_rate must be in (0, 1], got {}",
                self.learning_rate
            )));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(PipelineError::Config(format!(
                "model.subsample must be in (0, 1], got {}",
                self.subsample
            )));
        }
        if self.max_depth == 0 {
            return Err(PipelineError::Config(
                "model.max_depth must be at least 1".to_string(),
            ));
        }
        if !self.ridge_alpha.is_finite() || self.ridge_alpha < 0.0 {
            return Err(PipelineError::Config(format!(
                "model.ridge_alpha must be finite and non-negative, got {}",
                self.ridge_alpha
            )));
        }
        Ok(())
    }

    pub fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum BaseModel {
    Constant { value: f64 },
    Linear(LinearBaseline),
}

impl BaseModel {
    fn predict(&self, features: &[f64]) -> f64 {
        match self {
            BaseModel::Constant { value } => *value,
            BaseModel::Linear(model) => model.predict(features),
        }
    }
}

/// Least-squares gradient boosting over shallow regression trees.
///
/// `predict(x) = base(x) + learning_rate * sum(tree_m(x))`. Fitting is fully deterministic
/// for a given `seed`; the RNG is only consulted when `subsample < 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedRegressor {
    params: GbdtParams,
    base: Option<BaseModel>,
    trees: Vec<RegressionTree>,
    n_features: usize,
    feature_importances: Vec<f64>,
}

impl GradientBoostedRegressor {
    pub fn new(params: GbdtParams) -> Self {
        Self {
            params,
            base: None,
            trees: Vec::new(),
            n_features: 0,
            feature_importances: Vec::new(),
        }
    }

    pub fn params(&self) -> &GbdtParams {
        &self.params
    }

    pub fn is_fitted(&self) -> bool {
        self.base.is_some()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    /// Total split gain per feature, normalized to sum to 1. All zeros when no tree split.
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }
}

impl Default for GradientBoostedRegressor {
    fn default() -> Self {
        Self::new(GbdtParams::default())
    }
}

impl Regressor for GradientBoostedRegressor {
    fn fit(&mut self, x: &[&[f64]], y: &[f64]) -> Result<(), PipelineError> {
        self.params.validate()?;
        let n_features = check_training_data(x, y)?;
        let n = x.len();

        let base = match self.params.base {
            BaseEstimator::Mean => BaseModel::Constant {
                value: y.iter().sum::<f64>() / n as f64,
            },
            BaseEstimator::Linear => {
                BaseModel::Linear(LinearBaseline::fit(x, y, self.params.ridge_alpha)?)
            }
        };
        let mut current: Vec<f64> = x.iter().map(|row| base.predict(row)).collect();

        let sorted = SortedColumns::new(x, n_features);
        let tree_params = self.params.tree_params();
        let lr = self.params.learning_rate;
        let mut rng = ChaCha8Rng::seed_from_u64(self.params.seed);
        let sample_size = ((n as f64 * self.params.subsample).round() as usize).clamp(1, n);
        let all: Vec<usize> = (0..n).collect();
        let mut subset: Vec<usize> = Vec::with_capacity(n);

        let mut importances = vec![0.0; n_features];
        let mut residuals = vec![0.0; n];
        let mut trees = Vec::with_capacity(self.params.n_estimators);
        for _ in 0..self.params.n_estimators {
            for ((r, target), pred) in residuals.iter_mut().zip(y).zip(&current) {
                *r = target - pred;
            }
            let samples: &[usize] = if sample_size < n {
                subset.clear();
                subset.extend_from_slice(&all);
                subset.shuffle(&mut rng);
                subset.truncate(sample_size);
                subset.sort_unstable();
                &subset
            } else {
                &all
            };

            let tree = RegressionTree::grow(
                x,
                &residuals,
                samples,
                &sorted,
                &tree_params,
                &mut importances,
            );
            for (pred, row) in current.iter_mut().zip(x) {
                *pred += lr * tree.predict(row);
            }
            trees.push(tree);
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for v in &mut importances {
                *v /= total;
            }
        }

        self.base = Some(base);
        self.trees = trees;
        self.n_features = n_features;
        self.feature_importances = importances;
        Ok(())
    }

    fn predict(&self, features: &[f64]) -> f64 {
        let Some(base) = &self.base else {
            return 0.0;
        };
        let boost: f64 = self.trees.iter().map(|t| t.predict(features)).sum();
        base.predict(features) + self.params.learning_rate * boost
    }
}
