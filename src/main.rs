use anyhow::{Context, Result};

use market_forecast::config::Config;
use market_forecast::orchestrator::Pipeline;
use market_forecast::run_store;
use market_forecast::sink::JsonFileSink;
use market_forecast::warehouse::{DuckDbSource, ObservationSource};

fn init_tracing(config: &Config) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        config
            .logging
            .level
            .parse()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    });
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .json();

    match &config.logging.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let log_file = std::fs::File::create(path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            builder.with_writer(log_file).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            std::process::exit(1);
        }
    };
    init_tracing(&config)?;

    tracing::info!(
        db_path = %config.warehouse.db_path.display(),
        table = %config.warehouse.table,
        models_dir = %config.output.models_dir.display(),
        "Starting market-forecast"
    );

    let pipeline = Pipeline::from_config(&config)?;
    let schema = pipeline.schema().clone();
    let source = DuckDbSource::new(config.warehouse.clone());
    let table = tokio::task::spawn_blocking(move || source.load(&schema))
        .await
        .context("warehouse load task failed")??;

    let run = pipeline.run(&table).await?;
    let summary = run.summary;
    if summary.entities_trained == 0 && summary.entities_skipped > 0 {
        tracing::warn!(
            entities_skipped = summary.entities_skipped,
            min_rows = config.training.min_rows,
            "No entity had enough history to train"
        );
    }

    let registry = run.registry;
    let models_dir = config.output.models_dir.clone();
    let persisted = tokio::task::spawn_blocking(move || {
        let mut sink = JsonFileSink::new(models_dir);
        registry.persist(&mut sink)
    })
    .await
    .context("model persist task failed")?;

    let run_db_path = config.output.run_db_path.clone();
    let stored = summary.clone();
    let stored_result =
        tokio::task::spawn_blocking(move || run_store::persist_run_summary(&run_db_path, &stored))
            .await
            .context("run store task failed")?;
    if let Err(e) = stored_result {
        tracing::error!(error = %format!("{:#}", e), "Failed to record run summary");
    }

    for report in &summary.reports {
        tracing::info!(
            entity = %report.entity_id,
            outcome = report.outcome.as_str(),
            rows = report.rows,
            cv_mean_r2 = ?report.cv_mean_r2,
            folds_evaluated = report.folds_evaluated,
            "Entity result"
        );
    }
    tracing::info!(
        run_id = %summary.run_id,
        entities_trained = summary.entities_trained,
        entities_skipped = summary.entities_skipped,
        entities_failed = summary.entities_failed,
        models_written = persisted.written,
        models_failed = persisted.failed.len(),
        "Run complete"
    );
    Ok(())
}
