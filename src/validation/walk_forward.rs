//! Expanding-window walk-forward cross-validation.
//!
//! The chronological index range is cut into `n_splits + 1` contiguous blocks; the first block
//! absorbs the remainder. Fold `i` trains on every row before block `i + 1` and tests on it.

use std::ops::Range;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::metrics::r2_score;
use crate::error::PipelineError;
use crate::model::{design_matrix, FeatureRow};
use crate::regressor::Regressor;

pub const DEFAULT_N_SPLITS: usize = 5;
pub const DEFAULT_MIN_ROWS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub index: usize,
    pub train: Range<usize>,
    pub test: Range<usize>,
}

impl Fold {
    pub fn is_empty(&self) -> bool {
        self.train.is_empty() || self.test.is_empty()
    }
}

/// Fold boundaries for `n_rows` chronologically ordered rows.
///
/// Always returns `n_splits` folds. Folds with an empty side are kept so the caller can tell
/// how many were requested versus evaluated.
pub fn walk_forward_folds(n_rows: usize, n_splits: usize) -> Vec<Fold> {
    let test_size = n_rows / (n_splits + 1);
    (0..n_splits)
        .map(|i| {
            let test_start = n_rows - (n_splits - i) * test_size;
            Fold {
                index: i,
                train: 0..test_start,
                test: test_start..test_start + test_size,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldScore {
    pub fold: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub train_end: NaiveDate,
    pub test_start: NaiveDate,
    pub r2: f64,
}

/// Out-of-fold scores of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvSummary {
    pub folds_requested: usize,
    pub fold_scores: Vec<FoldScore>,
    /// Mean R² over evaluated folds; absent when none could be evaluated.
    pub mean_r2: Option<f64>,
}

impl CvSummary {
    pub fn folds_evaluated(&self) -> usize {
        self.fold_scores.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkForwardValidator {
    n_splits: usize,
    min_rows: usize,
}

impl Default for WalkForwardValidator {
    fn default() -> Self {
        Self {
            n_splits: DEFAULT_N_SPLITS,
            min_rows: DEFAULT_MIN_ROWS,
        }
    }
}

impl WalkForwardValidator {
    pub fn new(n_splits: usize, min_rows: usize) -> Result<Self, PipelineError> {
        if n_splits == 0 {
            return Err(PipelineError::Config(
                "training.n_splits must be at least 1".to_string(),
            ));
        }
        Ok(Self { n_splits, min_rows })
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    pub fn min_rows(&self) -> usize {
        self.min_rows
    }

    /// Score a fresh model per fold on `rows`, which must be one entity's rows in date order.
    pub fn validate<R, F>(
        &self,
        entity_id: &str,
        rows: &[FeatureRow],
        model_factory: F,
    ) -> Result<CvSummary, PipelineError>
    where
        R: Regressor,
        F: Fn() -> R,
    {
        if rows.len() < self.min_rows {
            return Err(PipelineError::InsufficientData {
                entity_id: entity_id.to_string(),
                rows: rows.len(),
                min_rows: self.min_rows,
            });
        }

        let mut fold_scores = Vec::with_capacity(self.n_splits);
        for fold in walk_forward_folds(rows.len(), self.n_splits) {
            if fold.is_empty() {
                tracing::debug!(
                    entity = %entity_id,
                    fold = fold.index,
                    rows = rows.len(),
                    "Skipping empty walk-forward fold"
                );
                continue;
            }
            let train = &rows[fold.train.clone()];
            let test = &rows[fold.test.clone()];

            let (x_train, y_train) = design_matrix(train);
            let mut model = model_factory();
            model.fit(&x_train, &y_train)?;

            let (x_test, y_test) = design_matrix(test);
            let predicted = model.predict_batch(&x_test);
            let Some(r2) = r2_score(&y_test, &predicted) else {
                continue;
            };
            fold_scores.push(FoldScore {
                fold: fold.index,
                train_rows: train.len(),
                test_rows: test.len(),
                train_end: train[train.len() - 1].observation_date,
                test_start: test[0].observation_date,
                r2,
            });
        }

        let mean_r2 = if fold_scores.is_empty() {
            None
        } else {
            Some(fold_scores.iter().map(|f| f.r2).sum::<f64>() / fold_scores.len() as f64)
        };
        Ok(CvSummary {
            folds_requested: self.n_splits,
            fold_scores,
            mean_r2,
        })
    }
}
