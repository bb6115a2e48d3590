use chrono::Utc;

use crate::error::PipelineError;
use crate::features::FeatureSchema;
use crate::model::{design_matrix, FeatureRow};
use crate::registry::TrainedModel;
use crate::regressor::{GbdtParams, GradientBoostedRegressor, Regressor};
use crate::validation::WalkForwardValidator;

/// Fits the deployed model of one entity and records its walk-forward diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct EntityTrainer {
    validator: WalkForwardValidator,
    params: GbdtParams,
}

impl Default for EntityTrainer {
    fn default() -> Self {
        Self {
            validator: WalkForwardValidator::default(),
            params: GbdtParams::default(),
        }
    }
}

impl EntityTrainer {
    pub fn new(validator: WalkForwardValidator, params: GbdtParams) -> Result<Self, PipelineError> {
        params.validate()?;
        Ok(Self { validator, params })
    }

    pub fn validator(&self) -> &WalkForwardValidator {
        &self.validator
    }

    pub fn params(&self) -> &GbdtParams {
        &self.params
    }

    /// Train `entity_id` on its feature rows.
    ///
    /// Returns `Ok(None)` when the entity has too little history to validate. The
    /// walk-forward score is recorded on the model but never decides whether it is trained.
    pub fn train(
        &self,
        entity_id: &str,
        rows: &[FeatureRow],
        schema: &FeatureSchema,
    ) -> Result<Option<TrainedModel>, PipelineError> {
        if let Some(stray) = rows.iter().find(|r| r.entity_id != entity_id) {
            return Err(PipelineError::Schema(format!(
                "row for {} on {} passed to trainer for {}",
                stray.entity_id, stray.observation_date, entity_id
            )));
        }
        if let Some(bad) = rows.iter().find(|r| r.features.len() != schema.n_features()) {
            return Err(PipelineError::Schema(format!(
                "row for {} on {} has {} features, schema has {}",
                entity_id,
                bad.observation_date,
                bad.features.len(),
                schema.n_features()
            )));
        }

        let params = self.params;
        let cv = match self
            .validator
            .validate(entity_id, rows, || GradientBoostedRegressor::new(params))
        {
            Ok(cv) => cv,
            Err(PipelineError::InsufficientData { rows, min_rows, .. }) => {
                tracing::warn!(
                    entity = %entity_id,
                    rows,
                    min_rows,
                    "Insufficient data, skipping"
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let (x, y) = design_matrix(rows);
        let mut regressor = GradientBoostedRegressor::new(params);
        regressor.fit(&x, &y)?;

        tracing::info!(
            entity = %entity_id,
            rows = rows.len(),
            cv_mean_r2 = ?cv.mean_r2,
            folds_evaluated = cv.folds_evaluated(),
            "Trained entity model"
        );
        Ok(Some(TrainedModel {
            entity_id: entity_id.to_string(),
            feature_columns: schema.feature_columns().to_vec(),
            cv,
            trained_rows: rows.len(),
            trained_at: Utc::now(),
            regressor,
        }))
    }
}
