use serde::{Deserialize, Serialize};

use super::check_training_data;
use crate::error::PipelineError;

/// Ridge-regularized least squares on standardized features.
///
/// Used as the starting estimate of the boosted ensemble so trend carries past the edge of
/// the training window; trees can only repeat values they have seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearBaseline {
    intercept: f64,
    /// Coefficients on the standardized scale; zero for constant columns.
    coefficients: Vec<f64>,
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl LinearBaseline {
    pub fn fit(x: &[&[f64]], y: &[f64], alpha: f64) -> Result<Self, PipelineError> {
        let n_features = check_training_data(x, y)?;
        if !alpha.is_finite() || alpha < 0.0 {
            return Err(PipelineError::Model(format!(
                "ridge alpha must be a finite non-negative number, got {}",
                alpha
            )));
        }
        let n = x.len() as f64;

        let mut means = vec![0.0; n_features];
        for row in x {
            for (m, v) in means.iter_mut().zip(row.iter()) {
                *m += v;
            }
        }
        for m in &mut means {
            *m /= n;
        }
        let mut scales = vec![0.0; n_features];
        for row in x {
            for j in 0..n_features {
                let d = row[j] - means[j];
                scales[j] += d * d;
            }
        }
        for s in &mut scales {
            *s = (*s / n).sqrt();
            if *s <= 1e-12 {
                *s = 0.0;
            }
        }

        let y_mean = y.iter().sum::<f64>() / n;
        let active: Vec<usize> = (0..n_features).filter(|j| scales[*j] > 0.0).collect();
        let mut coefficients = vec![0.0; n_features];
        if active.is_empty() {
            return Ok(Self {
                intercept: y_mean,
                coefficients,
                means,
                scales,
            });
        }

        let q = active.len();
        let mut gram = vec![vec![0.0; q]; q];
        let mut rhs = vec![0.0; q];
        let mut z = vec![0.0; q];
        for (row, target) in x.iter().zip(y.iter()) {
            for (k, j) in active.iter().enumerate() {
                z[k] = (row[*j] - means[*j]) / scales[*j];
            }
            let yc = target - y_mean;
            for a in 0..q {
                rhs[a] += z[a] * yc;
                for b in a..q {
                    gram[a][b] += z[a] * z[b];
                }
            }
        }
        for a in 0..q {
            for b in 0..a {
                gram[a][b] = gram[b][a];
            }
            gram[a][a] += alpha;
        }

        let beta = solve_dense(gram, rhs)?;
        for (k, j) in active.iter().enumerate() {
            coefficients[*j] = beta[k];
        }

        Ok(Self {
            intercept: y_mean,
            coefficients,
            means,
            scales,
        })
    }

    pub fn predict(&self, features: &[f64]) -> f64 {
        let mut out = self.intercept;
        for (j, coef) in self.coefficients.iter().enumerate() {
            if self.scales[j] == 0.0 {
                continue;
            }
            let v = features.get(j).copied().unwrap_or(self.means[j]);
            out += coef * (v - self.means[j]) / self.scales[j];
        }
        out
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }
}

/// Gaussian elimination with partial pivoting.
fn solve_dense(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>, PipelineError> {
    let n = b.len();
    let scale = a
        .iter()
        .enumerate()
        .map(|(i, row)| row[i].abs())
        .fold(0.0_f64, f64::max)
        .max(1.0);

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|r1, r2| a[*r1][col].abs().total_cmp(&a[*r2][col].abs()))
            .unwrap_or(col);
        if a[pivot_row][col].abs() <= 1e-12 * scale {
            return Err(PipelineError::Model(
                "linear baseline is singular; increase model.ridge_alpha".to_string(),
            ));
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut acc = b[row];
        for k in (row + 1)..n {
            acc -= a[row][k] * x[k];
        }
        x[row] = acc / a[row][row];
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(PipelineError::Model(
            "linear baseline produced non-finite coefficients".to_string(),
        ));
    }
    Ok(x)
}
