use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// One row of the analytical market table: a single entity on a single trading day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub entity_id: String,
    pub observation_date: NaiveDate,
    pub daily_return: f64,
    /// Values aligned with [`ObservationTable::predictor_columns`]; NaN marks a missing value.
    pub predictors: Vec<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservationTable {
    predictor_columns: Vec<String>,
    rows: Vec<Observation>,
}

impl ObservationTable {
    pub fn new(predictor_columns: Vec<String>) -> Self {
        Self {
            predictor_columns,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(
        predictor_columns: Vec<String>,
        rows: Vec<Observation>,
    ) -> Result<Self, PipelineError> {
        let mut table = Self::new(predictor_columns);
        table.rows.reserve(rows.len());
        for row in rows {
            table.push(row)?;
        }
        Ok(table)
    }

    pub fn push(&mut self, row: Observation) -> Result<(), PipelineError> {
        if row.predictors.len() != self.predictor_columns.len() {
            return Err(PipelineError::Schema(format!(
                "row for {} on {} has {} predictor values, table declares {} columns",
                row.entity_id,
                row.observation_date,
                row.predictors.len(),
                self.predictor_columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn predictor_columns(&self) -> &[String] {
        &self.predictor_columns
    }

    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct entity ids in lexical order.
    pub fn entity_ids(&self) -> BTreeSet<String> {
        self.rows.iter().map(|r| r.entity_id.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.predictor_columns.iter().position(|c| c == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(entity: &str, day: u32, predictors: Vec<f64>) -> Observation {
        Observation {
            entity_id: entity.to_string(),
            observation_date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            daily_return: 0.01,
            predictors,
        }
    }

    #[test]
    fn push_rejects_misaligned_predictor_vector() {
        let mut table = ObservationTable::new(vec!["a".to_string(), "b".to_string()]);
        assert!(table.push(obs("AAPL", 2, vec![1.0, 2.0])).is_ok());
        let err = table.push(obs("AAPL", 3, vec![1.0])).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn entity_ids_are_distinct_and_sorted() {
        let table = ObservationTable::with_rows(
            Vec::new(),
            vec![obs("MSFT", 2, vec![]), obs("AAPL", 2, vec![]), obs("MSFT", 3, vec![])],
        )
        .unwrap();
        let ids: Vec<String> = table.entity_ids().into_iter().collect();
        assert_eq!(ids, vec!["AAPL".to_string(), "MSFT".to_string()]);
    }
}
