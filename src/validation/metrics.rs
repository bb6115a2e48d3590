/// Coefficient of determination of `predicted` against `actual`.
///
/// When `actual` has zero variance the score is 1.0 for exact predictions and 0.0 otherwise.
/// Returns `None` for empty or mismatched inputs.
pub fn r2_score(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    if actual.is_empty() || actual.len() != predicted.len() {
        return None;
    }
    let n = actual.len() as f64;
    let mean = actual.iter().sum::<f64>() / n;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();

    if ss_tot <= f64::EPSILON {
        return Some(if ss_res <= f64::EPSILON { 1.0 } else { 0.0 });
    }
    Some(1.0 - ss_res / ss_tot)
}

pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    if actual.is_empty() || actual.len() != predicted.len() {
        return None;
    }
    let total: f64 = actual.iter().zip(predicted).map(|(a, p)| (a - p).abs()).sum();
    Some(total / actual.len() as f64)
}
