//! Loading the analytical market table out of DuckDB.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::NaiveDate;
use duckdb::{params, AccessMode, Connection};

use crate::config::WarehouseConfig;
use crate::error::PipelineError;
use crate::features::FeatureSchema;
use crate::model::{Observation, ObservationTable};

/// Anything that can produce the observation table for a schema.
pub trait ObservationSource {
    fn load(&self, schema: &FeatureSchema) -> Result<ObservationTable, PipelineError>;
}

#[derive(Debug, Clone)]
pub struct DuckDbSource {
    db_path: PathBuf,
    layout: WarehouseConfig,
}

impl DuckDbSource {
    pub fn new(layout: WarehouseConfig) -> Self {
        Self {
            db_path: layout.db_path.clone(),
            layout,
        }
    }

    /// Read the configured table through an already-open connection.
    pub fn load_from(
        conn: &Connection,
        layout: &WarehouseConfig,
        schema: &FeatureSchema,
    ) -> Result<ObservationTable, PipelineError> {
        let available = table_columns(conn, &layout.table)?;
        if available.is_empty() {
            return Err(PipelineError::Schema(format!(
                "table '{}' not found in warehouse",
                layout.table
            )));
        }

        let predictor_columns: Vec<String> =
            schema.table_predictors().map(str::to_string).collect();
        let required: Vec<&str> = [
            layout.entity_column.as_str(),
            layout.date_column.as_str(),
            layout.return_column.as_str(),
        ]
        .into_iter()
        .chain(predictor_columns.iter().map(String::as_str))
        .collect();
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|c| !available.contains(*c))
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::Schema(format!(
                "table '{}' is missing required column(s): {}",
                layout.table,
                missing.join(", ")
            )));
        }

        let mut select = vec![
            format!("CAST({} AS VARCHAR)", quote_ident(&layout.entity_column)),
            format!(
                "strftime(CAST({} AS DATE), '%Y-%m-%d')",
                quote_ident(&layout.date_column)
            ),
            format!("CAST({} AS DOUBLE)", quote_ident(&layout.return_column)),
        ];
        select.extend(
            predictor_columns
                .iter()
                .map(|c| format!("CAST({} AS DOUBLE)", quote_ident(c))),
        );
        let sql = format!(
            "SELECT {} FROM {} ORDER BY 1, 2",
            select.join(", "),
            quote_ident(&layout.table)
        );

        let n_predictors = predictor_columns.len();
        let mut stmt = conn.prepare(&sql)?;
        let raw = stmt.query_map(params![], |row| {
            let entity: Option<String> = row.get(0)?;
            let date: Option<String> = row.get(1)?;
            let daily_return: Option<f64> = row.get(2)?;
            let mut predictors = Vec::with_capacity(n_predictors);
            for i in 0..n_predictors {
                let v: Option<f64> = row.get(3 + i)?;
                predictors.push(v.unwrap_or(f64::NAN));
            }
            Ok((entity, date, daily_return.unwrap_or(f64::NAN), predictors))
        })?;

        let mut table = ObservationTable::new(predictor_columns);
        let mut dropped = 0usize;
        for item in raw {
            let (entity, date, daily_return, predictors) = item?;
            let (Some(entity_id), Some(date)) = (entity, date) else {
                dropped += 1;
                continue;
            };
            let observation_date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| {
                PipelineError::Schema(format!(
                    "column '{}' holds unparseable date '{}': {}",
                    layout.date_column, date, e
                ))
            })?;
            table.push(Observation {
                entity_id,
                observation_date,
                daily_return,
                predictors,
            })?;
        }

        if dropped > 0 {
            tracing::warn!(
                table = %layout.table,
                dropped,
                "Dropped rows with NULL entity or date"
            );
        }
        tracing::info!(
            table = %layout.table,
            rows = table.len(),
            entities = table.entity_ids().len(),
            "Loaded observations"
        );
        Ok(table)
    }
}

impl ObservationSource for DuckDbSource {
    fn load(&self, schema: &FeatureSchema) -> Result<ObservationTable, PipelineError> {
        let config = duckdb::Config::default().access_mode(AccessMode::ReadOnly)?;
        let conn = Connection::open_with_flags(&self.db_path, config)?;
        Self::load_from(&conn, &self.layout, schema)
    }
}

fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>, PipelineError> {
    let mut stmt =
        conn.prepare("SELECT column_name FROM information_schema.columns WHERE table_name = ?")?;
    let names = stmt
        .query_map(params![table], |row| row.get::<_, String>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(names)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
