use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::features::{FeatureSchema, DEFAULT_LAGS, DEFAULT_PREDICTORS};
use crate::regressor::{BaseEstimator, GbdtParams};
use crate::trainer::EntityTrainer;
use crate::validation::walk_forward::{DEFAULT_MIN_ROWS, DEFAULT_N_SPLITS};
use crate::validation::WalkForwardValidator;

pub const CONFIG_PATH_ENV: &str = "MARKET_FORECAST_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub db_path: PathBuf,
    pub table: String,
    pub entity_column: String,
    pub date_column: String,
    pub return_column: String,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("financial_models/dev.duckdb"),
            table: "fct_market_performance".to_string(),
            entity_column: "ticker".to_string(),
            date_column: "price_date".to_string(),
            return_column: "daily_return".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    pub predictors: Vec<String>,
    pub lags: Vec<usize>,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            predictors: DEFAULT_PREDICTORS.iter().map(|s| s.to_string()).collect(),
            lags: DEFAULT_LAGS.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub n_splits: usize,
    pub min_rows: usize,
    /// Entities trained at the same time.
    pub max_parallel: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_splits: DEFAULT_N_SPLITS,
            min_rows: DEFAULT_MIN_ROWS,
            max_parallel: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub subsample: f64,
    pub seed: u64,
    pub base: BaseEstimator,
    pub ridge_alpha: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let p = GbdtParams::default();
        Self {
            n_estimators: p.n_estimators,
            learning_rate: p.learning_rate,
            max_depth: p.max_depth,
            min_samples_split: p.min_samples_split,
            min_samples_leaf: p.min_samples_leaf,
            subsample: p.subsample,
            seed: p.seed,
            base: p.base,
            ridge_alpha: p.ridge_alpha,
        }
    }
}

impl ModelConfig {
    pub fn gbdt_params(&self) -> GbdtParams {
        GbdtParams {
            n_estimators: self.n_estimators,
            learning_rate: self.learning_rate,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            subsample: self.subsample,
            seed: self.seed,
            base: self.base,
            ridge_alpha: self.ridge_alpha,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub models_dir: PathBuf,
    pub run_db_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("trained_models"),
            run_db_path: PathBuf::from("data/training_runs.sqlite"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Log file; stderr when unset.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Load `.env`, then the TOML file named by `MARKET_FORECAST_CONFIG`
    /// (default `config/default.toml`).
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let config = Self::from_toml_str(&config_str)
            .with_context(|| format!("invalid config in {}", config_path.display()))?;
        Ok(config)
    }

    pub fn from_toml_str(toml_str: &str) -> Result<Self, PipelineError> {
        let config: Config =
            toml::from_str(toml_str).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.training.n_splits == 0 {
            return Err(PipelineError::Config(
                "training.n_splits must be at least 1".to_string(),
            ));
        }
        if self.features.predictors.is_empty() && self.features.lags.is_empty() {
            return Err(PipelineError::Config(
                "features.predictors and features.lags are both empty".to_string(),
            ));
        }
        if self.features.lags.contains(&0) {
            return Err(PipelineError::Config(
                "features.lags must be positive".to_string(),
            ));
        }
        for (key, value) in [
            ("warehouse.table", &self.warehouse.table),
            ("warehouse.entity_column", &self.warehouse.entity_column),
            ("warehouse.date_column", &self.warehouse.date_column),
            ("warehouse.return_column", &self.warehouse.return_column),
        ] {
            if value.trim().is_empty() {
                return Err(PipelineError::Config(format!("{} must not be empty", key)));
            }
        }
        self.model.gbdt_params().validate()?;
        self.feature_schema()?;
        Ok(())
    }

    pub fn feature_schema(&self) -> Result<FeatureSchema, PipelineError> {
        FeatureSchema::new(self.features.predictors.clone(), self.features.lags.clone())
            .map_err(|e| PipelineError::Config(e.to_string()))
    }

    pub fn trainer(&self) -> Result<EntityTrainer, PipelineError> {
        let validator = WalkForwardValidator::new(self.training.n_splits, self.training.min_rows)?;
        EntityTrainer::new(validator, self.model.gbdt_params())
    }

    pub fn max_parallel(&self) -> usize {
        self.training.max_parallel.max(1)
    }
}
