use std::path::Path;

use anyhow::Result;
use rusqlite::{params, Connection};

use crate::orchestrator::{EntityOutcome, RunSummary};

/// One entity's result in a past training run.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRunRecord {
    pub run_id: String,
    pub started_at_ms: i64,
    pub outcome: EntityOutcome,
    pub rows: usize,
    pub cv_mean_r2: Option<f64>,
    pub folds_evaluated: usize,
    pub detail: Option<String>,
}

fn open(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS training_runs (
            run_id TEXT PRIMARY KEY,
            started_at_ms INTEGER NOT NULL,
            finished_at_ms INTEGER NOT NULL,
            entities_trained INTEGER NOT NULL,
            entities_skipped INTEGER NOT NULL,
            entities_failed INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS training_run_entities (
            run_id TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            outcome TEXT NOT NULL,
            usable_rows INTEGER NOT NULL,
            cv_mean_r2 REAL,
            folds_evaluated INTEGER NOT NULL,
            detail TEXT,
            PRIMARY KEY(run_id, entity_id)
        );
        "#,
    )?;
    Ok(conn)
}

pub fn persist_run_summary(db_path: &Path, summary: &RunSummary) -> Result<()> {
    let mut conn = open(db_path)?;
    let run_id = summary.run_id.to_string();
    let tx = conn.transaction()?;

    tx.execute(
        r#"
        INSERT INTO training_runs (
            run_id, started_at_ms, finished_at_ms,
            entities_trained, entities_skipped, entities_failed
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(run_id) DO UPDATE SET
            started_at_ms = excluded.started_at_ms,
            finished_at_ms = excluded.finished_at_ms,
            entities_trained = excluded.entities_trained,
            entities_skipped = excluded.entities_skipped,
            entities_failed = excluded.entities_failed
        "#,
        params![
            run_id,
            summary.started_at.timestamp_millis(),
            summary.finished_at.timestamp_millis(),
            summary.entities_trained as i64,
            summary.entities_skipped as i64,
            summary.entities_failed as i64,
        ],
    )?;

    for r in &summary.reports {
        tx.execute(
            r#"
            INSERT INTO training_run_entities (
                run_id, entity_id, outcome, usable_rows, cv_mean_r2, folds_evaluated, detail
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(run_id, entity_id) DO UPDATE SET
                outcome = excluded.outcome,
                usable_rows = excluded.usable_rows,
                cv_mean_r2 = excluded.cv_mean_r2,
                folds_evaluated = excluded.folds_evaluated,
                detail = excluded.detail
            "#,
            params![
                run_id,
                r.entity_id,
                r.outcome.as_str(),
                r.rows as i64,
                r.cv_mean_r2,
                r.folds_evaluated as i64,
                r.detail,
            ],
        )?;
    }

    tx.commit()?;
    tracing::debug!(
        run_id = %run_id,
        entities = summary.reports.len(),
        path = %db_path.display(),
        "Stored run summary"
    );
    Ok(())
}

/// Past results for `entity_id`, oldest run first.
pub fn load_entity_history(db_path: &Path, entity_id: &str) -> Result<Vec<EntityRunRecord>> {
    let conn = open(db_path)?;
    let mut stmt = conn.prepare(
        r#"
        SELECT e.run_id, r.started_at_ms, e.outcome, e.usable_rows,
               e.cv_mean_r2, e.folds_evaluated, e.detail
        FROM training_run_entities e
        JOIN training_runs r ON r.run_id = e.run_id
        WHERE e.entity_id = ?1
        ORDER BY r.started_at_ms ASC, e.run_id ASC
        "#,
    )?;

    let rows = stmt.query_map([entity_id], |row| {
        let outcome: String = row.get(2)?;
        Ok((
            EntityRunRecord {
                run_id: row.get(0)?,
                started_at_ms: row.get(1)?,
                outcome: EntityOutcome::Failed,
                rows: row.get::<_, i64>(3)? as usize,
                cv_mean_r2: row.get(4)?,
                folds_evaluated: row.get::<_, i64>(5)? as usize,
                detail: row.get(6)?,
            },
            outcome,
        ))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (mut record, outcome) = row?;
        record.outcome = EntityOutcome::parse(&outcome)
            .ok_or_else(|| anyhow::anyhow!("unknown outcome '{}' in run store", outcome))?;
        records.push(record);
    }
    Ok(records)
}
