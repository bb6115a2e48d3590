use std::collections::{BTreeSet, HashSet};

use crate::error::PipelineError;

pub const DAILY_RETURN: &str = "daily_return";
pub const TARGET_RETURN: &str = "target_return";

pub const DEFAULT_PREDICTORS: [&str; 6] = [
    DAILY_RETURN,
    "fifty_day_moving_avg",
    "two_hundred_day_moving_avg",
    "thirty_day_volatility",
    "ten_year_treasury_yield",
    "fed_funds_rate",
];
pub const DEFAULT_LAGS: [usize; 3] = [1, 5, 10];

pub fn lag_column_name(lag: usize) -> String {
    format!("return_lag_{}", lag)
}

/// Validated, ordered description of the model inputs.
///
/// Every stage receives the same schema, so a column mismatch surfaces once when the schema
/// is bound to an input table instead of deep inside model fitting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    predictors: Vec<String>,
    lags: Vec<usize>,
    columns: Vec<String>,
}

/// Where a predictor value is read from on an observation row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PredictorSource {
    DailyReturn,
    Column(usize),
}

impl FeatureSchema {
    pub fn new(predictors: Vec<String>, lags: Vec<usize>) -> Result<Self, PipelineError> {
        let mut seen = HashSet::new();
        let mut cleaned = Vec::with_capacity(predictors.len());
        for name in predictors {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(PipelineError::Schema(
                    "predictor names must not be empty".to_string(),
                ));
            }
            if name == TARGET_RETURN {
                return Err(PipelineError::Schema(format!(
                    "'{}' is the label and cannot be used as a predictor",
                    TARGET_RETURN
                )));
            }
            if !seen.insert(name.clone()) {
                return Err(PipelineError::Schema(format!(
                    "predictor '{}' is listed more than once",
                    name
                )));
            }
            cleaned.push(name);
        }

        if let Some(bad) = lags.iter().find(|k| **k == 0) {
            return Err(PipelineError::Schema(format!(
                "lag {} is invalid: lags must be positive",
                bad
            )));
        }
        let lags: Vec<usize> = lags.into_iter().collect::<BTreeSet<_>>().into_iter().collect();

        let mut columns = cleaned.clone();
        for lag in &lags {
            let name = lag_column_name(*lag);
            if !seen.insert(name.clone()) {
                return Err(PipelineError::Schema(format!(
                    "predictor '{}' collides with a generated lag column",
                    name
                )));
            }
            columns.push(name);
        }

        if columns.is_empty() {
            return Err(PipelineError::Schema(
                "feature schema needs at least one predictor or lag".to_string(),
            ));
        }

        Ok(Self {
            predictors: cleaned,
            lags,
            columns,
        })
    }

    /// The predictor set and lags of the market performance table.
    pub fn market_default() -> Self {
        Self {
            predictors: DEFAULT_PREDICTORS.iter().map(|s| s.to_string()).collect(),
            lags: DEFAULT_LAGS.to_vec(),
            columns: DEFAULT_PREDICTORS
                .iter()
                .map(|s| s.to_string())
                .chain(DEFAULT_LAGS.iter().map(|k| lag_column_name(*k)))
                .collect(),
        }
    }

    pub fn predictors(&self) -> &[String] {
        &self.predictors
    }

    /// Lags in ascending order, without duplicates.
    pub fn lags(&self) -> &[usize] {
        &self.lags
    }

    pub fn max_lag(&self) -> usize {
        self.lags.last().copied().unwrap_or(0)
    }

    /// Ordered model input names: predictors, then `return_lag_k` by ascending `k`.
    pub fn feature_columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Predictors other than `daily_return`, which every observation carries natively.
    pub fn table_predictors(&self) -> impl Iterator<Item = &str> {
        self.predictors
            .iter()
            .map(String::as_str)
            .filter(|p| *p != DAILY_RETURN)
    }

    pub(crate) fn bind(
        &self,
        table_columns: &[String],
    ) -> Result<Vec<PredictorSource>, PipelineError> {
        let mut missing = Vec::new();
        let mut sources = Vec::with_capacity(self.predictors.len());
        for name in &self.predictors {
            if name == DAILY_RETURN {
                sources.push(PredictorSource::DailyReturn);
                continue;
            }
            match table_columns.iter().position(|c| c == name) {
                Some(idx) => sources.push(PredictorSource::Column(idx)),
                None => missing.push(name.as_str()),
            }
        }
        if !missing.is_empty() {
            return Err(PipelineError::Schema(format!(
                "input table is missing required predictor column(s): {}",
                missing.join(", ")
            )));
        }
        Ok(sources)
    }
}
