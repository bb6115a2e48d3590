use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::config::Config;
use crate::error::PipelineError;
use crate::features::{engineer, FeatureSchema};
use crate::model::{FeatureRow, ObservationTable};
use crate::registry::{ModelRegistry, TrainedModel};
use crate::trainer::EntityTrainer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityOutcome {
    Trained,
    Skipped,
    Failed,
}

impl EntityOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityOutcome::Trained => "trained",
            EntityOutcome::Skipped => "skipped",
            EntityOutcome::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "trained" => Some(EntityOutcome::Trained),
            "skipped" => Some(EntityOutcome::Skipped),
            "failed" => Some(EntityOutcome::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityReport {
    pub entity_id: String,
    pub outcome: EntityOutcome,
    /// Usable feature rows.
    pub rows: usize,
    pub cv_mean_r2: Option<f64>,
    pub folds_evaluated: usize,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub entities_trained: usize,
    pub entities_skipped: usize,
    pub entities_failed: usize,
    /// One report per entity, ordered by entity id.
    pub reports: Vec<EntityReport>,
}

impl RunSummary {
    pub fn report(&self, entity_id: &str) -> Option<&EntityReport> {
        self.reports.iter().find(|r| r.entity_id == entity_id)
    }
}

#[derive(Debug)]
pub struct PipelineRun {
    pub registry: ModelRegistry,
    pub summary: RunSummary,
}

/// Feature engineering, per-entity training and registration for one run.
#[derive(Debug, Clone)]
pub struct Pipeline {
    schema: Arc<FeatureSchema>,
    trainer: EntityTrainer,
    max_parallel: usize,
}

impl Pipeline {
    pub fn new(schema: FeatureSchema, trainer: EntityTrainer, max_parallel: usize) -> Self {
        Self {
            schema: Arc::new(schema),
            trainer,
            max_parallel: max_parallel.max(1),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        Ok(Self::new(
            config.feature_schema()?,
            config.trainer()?,
            config.max_parallel(),
        ))
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Train every entity present in `table`.
    ///
    /// Only schema-level problems with the table itself are returned as errors. Per-entity
    /// failures, panics and skips end up in the summary.
    pub async fn run(&self, table: &ObservationTable) -> Result<PipelineRun, PipelineError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(
            run_id = %run_id,
            observations = table.len(),
            max_parallel = self.max_parallel,
            "Starting training run"
        );

        let rows = engineer(table, &self.schema)?;
        let mut by_entity: BTreeMap<String, Vec<FeatureRow>> = table
            .entity_ids()
            .into_iter()
            .map(|id| (id, Vec::new()))
            .collect();
        for row in rows {
            by_entity.entry(row.entity_id.clone()).or_default().push(row);
        }

        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut tasks = Vec::with_capacity(by_entity.len());
        for (entity_id, rows) in by_entity {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| PipelineError::Model(format!("training pool closed: {}", e)))?;
            let trainer = self.trainer;
            let schema = Arc::clone(&self.schema);
            let task_entity = entity_id.clone();
            let n_rows = rows.len();
            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                trainer.train(&task_entity, &rows, &schema)
            });
            tasks.push((entity_id, n_rows, handle));
        }

        let mut registry = ModelRegistry::new();
        let mut reports = Vec::with_capacity(tasks.len());
        for (entity_id, n_rows, handle) in tasks {
            let report = match handle.await {
                Ok(Ok(Some(model))) => {
                    let report = trained_report(&model);
                    registry.register(&entity_id, model);
                    report
                }
                Ok(Ok(None)) => EntityReport {
                    entity_id: entity_id.clone(),
                    outcome: EntityOutcome::Skipped,
                    rows: n_rows,
                    cv_mean_r2: None,
                    folds_evaluated: 0,
                    detail: Some(format!(
                        "{} usable rows, need at least {}",
                        n_rows,
                        self.trainer.validator().min_rows()
                    )),
                },
                Ok(Err(e)) => {
                    tracing::error!(entity = %entity_id, error = %e, "Entity training failed");
                    failed_report(&entity_id, n_rows, e.to_string())
                }
                Err(e) => {
                    tracing::error!(
                        entity = %entity_id,
                        error = %e,
                        "Entity training task aborted"
                    );
                    failed_report(&entity_id, n_rows, format!("training task aborted: {}", e))
                }
            };
            reports.push(report);
        }

        let count = |outcome: EntityOutcome| {
            reports.iter().filter(|r| r.outcome == outcome).count()
        };
        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            entities_trained: count(EntityOutcome::Trained),
            entities_skipped: count(EntityOutcome::Skipped),
            entities_failed: count(EntityOutcome::Failed),
            reports,
        };
        tracing::info!(
            run_id = %summary.run_id,
            entities_trained = summary.entities_trained,
            entities_skipped = summary.entities_skipped,
            entities_failed = summary.entities_failed,
            "Training run finished"
        );
        Ok(PipelineRun { registry, summary })
    }
}

fn trained_report(model: &TrainedModel) -> EntityReport {
    EntityReport {
        entity_id: model.entity_id.clone(),
        outcome: EntityOutcome::Trained,
        rows: model.trained_rows,
        cv_mean_r2: model.cv_mean(),
        folds_evaluated: model.cv.folds_evaluated(),
        detail: None,
    }
}

fn failed_report(entity_id: &str, rows: usize, detail: String) -> EntityReport {
    EntityReport {
        entity_id: entity_id.to_string(),
        outcome: EntityOutcome::Failed,
        rows,
        cv_mean_r2: None,
        folds_evaluated: 0,
        detail: Some(detail),
    }
}
