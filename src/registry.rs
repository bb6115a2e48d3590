use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::regressor::{GradientBoostedRegressor, Regressor};
use crate::sink::ModelSink;
use crate::validation::CvSummary;

/// A deployed per-entity model plus the metadata it was produced with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub entity_id: String,
    pub feature_columns: Vec<String>,
    pub cv: CvSummary,
    /// Rows in the full-history fit.
    pub trained_rows: usize,
    pub trained_at: DateTime<Utc>,
    pub regressor: GradientBoostedRegressor,
}

impl TrainedModel {
    pub fn predict(&self, features: &[f64]) -> Result<f64, PipelineError> {
        if features.len() != self.feature_columns.len() {
            return Err(PipelineError::Model(format!(
                "model for {} expects {} features ({}), got {}",
                self.entity_id,
                self.feature_columns.len(),
                self.feature_columns.join(", "),
                features.len()
            )));
        }
        Ok(self.regressor.predict(features))
    }

    pub fn cv_mean(&self) -> Option<f64> {
        self.cv.mean_r2
    }

    /// `(feature name, importance)` pairs in schema order.
    pub fn feature_importances(&self) -> Vec<(&str, f64)> {
        self.feature_columns
            .iter()
            .map(String::as_str)
            .zip(self.regressor.feature_importances().iter().copied())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistReport {
    pub written: usize,
    pub failed: Vec<String>,
}

/// Trained models of one pipeline run, keyed by entity.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, TrainedModel>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `model` under `entity_id`, replacing any earlier model for that entity.
    pub fn register(&mut self, entity_id: &str, model: TrainedModel) -> Option<TrainedModel> {
        self.models.insert(entity_id.to_string(), model)
    }

    pub fn get(&self, entity_id: &str) -> Result<&TrainedModel, PipelineError> {
        self.models
            .get(entity_id)
            .ok_or_else(|| PipelineError::ModelNotFound(entity_id.to_string()))
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.models.contains_key(entity_id)
    }

    pub fn all(&self) -> &BTreeMap<String, TrainedModel> {
        &self.models
    }

    pub fn entity_ids(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Hand every model to `sink`. A failed write is logged and counted; the rest still run.
    pub fn persist(&self, sink: &mut dyn ModelSink) -> PersistReport {
        let mut report = PersistReport::default();
        for (entity_id, model) in &self.models {
            match sink.write(entity_id, model) {
                Ok(()) => report.written += 1,
                Err(e) => {
                    tracing::error!(entity = %entity_id, error = %e, "Failed to persist model");
                    report.failed.push(entity_id.clone());
                }
            }
        }
        tracing::info!(
            written = report.written,
            failed = report.failed.len(),
            "Persisted trained models"
        );
        report
    }
}
