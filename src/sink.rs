use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::registry::TrainedModel;

/// Durable destination for trained models, keyed by entity.
pub trait ModelSink {
    fn write(&mut self, entity_id: &str, model: &TrainedModel) -> Result<()>;
}

/// Writes one `<entity>_model.json` file per entity into a directory.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ModelSink for JsonFileSink {
    fn write(&mut self, entity_id: &str, model: &TrainedModel) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = model_path(&self.dir, entity_id);
        let body = serde_json::to_vec_pretty(model)
            .with_context(|| format!("failed to serialize model for {}", entity_id))?;
        std::fs::write(&path, body)
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::debug!(entity = %entity_id, path = %path.display(), "Wrote model artifact");
        Ok(())
    }
}

/// Artifact path for `entity_id`. Characters outside `[A-Za-z0-9._-]` become `_`.
pub fn model_path(dir: &Path, entity_id: &str) -> PathBuf {
    let stem: String = entity_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    dir.join(format!("{}_model.json", stem))
}

pub fn load_model(dir: &Path, entity_id: &str) -> Result<TrainedModel> {
    let path = model_path(dir, entity_id);
    let body = std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let model: TrainedModel = serde_json::from_slice(&body)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    anyhow::ensure!(
        model.entity_id == entity_id,
        "{} holds a model for {}, not {}",
        path.display(),
        model.entity_id,
        entity_id
    );
    Ok(model)
}
