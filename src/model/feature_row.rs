use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A supervised example derived from one observation.
///
/// `features` follows the column order of the [`FeatureSchema`](crate::features::FeatureSchema)
/// that produced it: predictors first, then `return_lag_k` columns by ascending `k`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub entity_id: String,
    pub observation_date: NaiveDate,
    pub daily_return: f64,
    pub features: Vec<f64>,
    /// `daily_return` of the entity's next chronological row.
    pub target_return: f64,
}

/// Borrowed design matrix and label vector for a slice of rows.
pub fn design_matrix(rows: &[FeatureRow]) -> (Vec<&[f64]>, Vec<f64>) {
    let x = rows.iter().map(|r| r.features.as_slice()).collect();
    let y = rows.iter().map(|r| r.target_return).collect();
    (x, y)
}
