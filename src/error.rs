use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("schema error: {0}")]
    Schema(String),

    #[error("insufficient data for {entity_id}: {rows} usable rows, need at least {min_rows}")]
    InsufficientData {
        entity_id: String,
        rows: usize,
        min_rows: usize,
    },

    #[error("duplicate observation for {entity_id} on {date}")]
    DuplicateObservation { entity_id: String, date: NaiveDate },

    #[error("no trained model registered for entity {0}")]
    ModelNotFound(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("warehouse error: {0}")]
    Warehouse(#[from] duckdb::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Errors that must abort the whole run rather than a single entity.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::Schema(_)
                | PipelineError::DuplicateObservation { .. }
                | PipelineError::Config(_)
                | PipelineError::Warehouse(_)
        )
    }
}
