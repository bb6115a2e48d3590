pub mod gbdt;
pub mod linear;
pub mod tree;

pub use gbdt::{BaseEstimator, GbdtParams, GradientBoostedRegressor};
pub use linear::LinearBaseline;
pub use tree::{RegressionTree, TreeNode, TreeParams};

use crate::error::PipelineError;

/// A trainable single-output regression model.
pub trait Regressor: Send {
    fn fit(&mut self, x: &[&[f64]], y: &[f64]) -> Result<(), PipelineError>;

    fn predict(&self, features: &[f64]) -> f64;

    fn predict_batch(&self, x: &[&[f64]]) -> Vec<f64> {
        x.iter().map(|row| self.predict(row)).collect()
    }
}

/// Check shape and finiteness of a training set and return its feature count.
pub(crate) fn check_training_data(x: &[&[f64]], y: &[f64]) -> Result<usize, PipelineError> {
    if x.is_empty() {
        return Err(PipelineError::Model("cannot fit on zero rows".to_string()));
    }
    if x.len() != y.len() {
        return Err(PipelineError::Model(format!(
            "feature rows ({}) and targets ({}) differ in length",
            x.len(),
            y.len()
        )));
    }
    let n_features = x[0].len();
    if n_features == 0 {
        return Err(PipelineError::Model("cannot fit on zero features".to_string()));
    }
    for (i, row) in x.iter().enumerate() {
        if row.len() != n_features {
            return Err(PipelineError::Model(format!(
                "row {} has {} features, expected {}",
                i,
                row.len(),
                n_features
            )));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::Model(format!("row {} has a non-finite feature", i)));
        }
    }
    if let Some(i) = y.iter().position(|v| !v.is_finite()) {
        return Err(PipelineError::Model(format!("target {} is non-finite", i)));
    }
    Ok(n_features)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn training_data_checks() {
        let a: &[f64] = &[1.0, 2.0];
        let b: &[f64] = &[3.0];
        let nan: &[f64] = &[f64::NAN, 1.0];
        assert_eq!(check_training_data(&[a, a], &[0.0, 1.0]).unwrap(), 2);
        assert!(check_training_data(&[], &[]).is_err());
        assert!(check_training_data(&[a], &[0.0, 1.0]).is_err());
        assert!(check_training_data(&[a, b], &[0.0, 1.0]).is_err());
        assert!(check_training_data(&[a, nan], &[0.0, 1.0]).is_err());
        assert!(check_training_data(&[a], &[f64::INFINITY]).is_err());
    }
}
