use crate::error::PipelineError;
use crate::features::schema::{FeatureSchema, PredictorSource};
use crate::model::{FeatureRow, Observation, ObservationTable};

/// Turn an observation table into leakage-safe supervised rows.
///
/// Rows are grouped per entity and ordered by date. Lags and the next-day target are only
/// ever read from the same entity's series, and rows whose lags, target or predictors are
/// undefined or non-finite are dropped.
pub fn engineer(
    table: &ObservationTable,
    schema: &FeatureSchema,
) -> Result<Vec<FeatureRow>, PipelineError> {
    if table.is_empty() {
        return Ok(Vec::new());
    }
    let sources = schema.bind(table.predictor_columns())?;

    let mut ordered: Vec<&Observation> = table.rows().iter().collect();
    ordered.sort_by(|a, b| {
        a.entity_id
            .cmp(&b.entity_id)
            .then(a.observation_date.cmp(&b.observation_date))
    });

    let mut out = Vec::with_capacity(ordered.len());
    for series in ordered.chunk_by(|a, b| a.entity_id == b.entity_id) {
        engineer_series(series, schema, &sources, &mut out)?;
    }

    tracing::debug!(
        observations = table.len(),
        feature_rows = out.len(),
        "Engineered feature rows"
    );
    Ok(out)
}

fn engineer_series(
    series: &[&Observation],
    schema: &FeatureSchema,
    sources: &[PredictorSource],
    out: &mut Vec<FeatureRow>,
) -> Result<(), PipelineError> {
    if let Some(pair) = series
        .windows(2)
        .find(|w| w[0].observation_date == w[1].observation_date)
    {
        return Err(PipelineError::DuplicateObservation {
            entity_id: pair[0].entity_id.clone(),
            date: pair[0].observation_date,
        });
    }

    let returns: Vec<f64> = series.iter().map(|o| o.daily_return).collect();
    let first = schema.max_lag();
    let last = series.len().saturating_sub(1);

    for t in first..last {
        let obs = series[t];
        let target_return = returns[t + 1];
        if !target_return.is_finite() {
            continue;
        }

        let mut features = Vec::with_capacity(schema.n_features());
        for source in sources {
            features.push(match source {
                PredictorSource::DailyReturn => obs.daily_return,
                PredictorSource::Column(idx) => obs.predictors[*idx],
            });
        }
        for lag in schema.lags() {
            features.push(returns[t - lag]);
        }
        if features.iter().any(|v| !v.is_finite()) {
            continue;
        }

        out.push(FeatureRow {
            entity_id: obs.entity_id.clone(),
            observation_date: obs.observation_date,
            daily_return: obs.daily_return,
            features,
            target_return,
        });
    }
    Ok(())
}
