use chrono::{Duration, NaiveDate};
use market_forecast::error::PipelineError;
use market_forecast::features::{engineer, lag_column_name, FeatureSchema, DAILY_RETURN};
use market_forecast::model::{Observation, ObservationTable};

fn day(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 3, 1).unwrap() + Duration::days(i as i64)
}

fn entity_rows(entity: &str, base: f64, n: usize) -> Vec<Observation> {
    (0..n)
        .map(|i| Observation {
            entity_id: entity.to_string(),
            observation_date: day(i),
            daily_return: base + i as f64,
            predictors: vec![base * 10.0 + i as f64],
        })
        .collect()
}

fn interleaved_table() -> ObservationTable {
    let mut rows = entity_rows("AAA", 100.0, 15);
    rows.extend(entity_rows("BBB", 200.0, 15));
    rows.reverse();
    ObservationTable::with_rows(vec!["volume_z".to_string()], rows).unwrap()
}

fn schema() -> FeatureSchema {
    FeatureSchema::new(
        vec![DAILY_RETURN.to_string(), "volume_z".to_string()],
        vec![1, 5, 10],
    )
    .unwrap()
}

#[test]
/// Verifies the label is the same entity's next-day return, even when the input table has
/// entities interleaved and in reverse date order.
fn target_is_next_return_of_same_entity() {
    let rows = engineer(&interleaved_table(), &schema()).unwrap();
    assert!(!rows.is_empty());
    for row in &rows {
        let base = if row.entity_id == "AAA" { 100.0 } else { 200.0 };
        let t = (row.daily_return - base) as usize;
        assert_eq!(row.observation_date, day(t));
        assert_eq!(row.target_return, base + (t + 1) as f64);
    }
}

#[test]
/// Verifies lag columns read `daily_return[t-k]` and that rows without full lag history, or
/// without a next day, are dropped.
fn lags_and_boundaries() {
    let schema = schema();
    let rows = engineer(&interleaved_table(), &schema).unwrap();

    // 15 rows per entity, max lag 10, last row has no target.
    assert_eq!(rows.len(), 2 * 4);
    let lag5 = schema.column_index(&lag_column_name(5)).unwrap();
    let lag10 = schema.column_index(&lag_column_name(10)).unwrap();
    for row in &rows {
        assert_eq!(row.features[lag5], row.daily_return - 5.0);
        assert_eq!(row.features[lag10], row.daily_return - 10.0);
        assert_ne!(row.observation_date, day(14));
        assert!(row.observation_date >= day(10));
    }
}

#[test]
/// Verifies the feature vector follows schema order: predictors, then lags ascending.
fn feature_vector_follows_schema_order() {
    let schema = schema();
    assert_eq!(
        schema.feature_columns(),
        &[
            "daily_return".to_string(),
            "volume_z".to_string(),
            "return_lag_1".to_string(),
            "return_lag_5".to_string(),
            "return_lag_10".to_string(),
        ]
    );
    let rows = engineer(&interleaved_table(), &schema).unwrap();
    let first = rows
        .iter()
        .find(|r| r.entity_id == "AAA" && r.observation_date == day(10))
        .unwrap();
    assert_eq!(first.features, vec![110.0, 1010.0, 109.0, 105.0, 100.0]);
}

#[test]
/// Verifies output is grouped by entity and ascending by date.
fn output_is_sorted_by_entity_then_date() {
    let rows = engineer(&interleaved_table(), &schema()).unwrap();
    let keys: Vec<(String, NaiveDate)> = rows
        .iter()
        .map(|r| (r.entity_id.clone(), r.observation_date))
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
/// Verifies a schema naming a column the table lacks is rejected with every missing name.
fn missing_predictor_column_is_schema_error() {
    let schema = FeatureSchema::new(
        vec!["volume_z".to_string(), "fed_funds_rate".to_string(), "vix".to_string()],
        vec![1],
    )
    .unwrap();
    let err = engineer(&interleaved_table(), &schema).unwrap_err();
    match err {
        PipelineError::Schema(msg) => {
            assert!(msg.contains("fed_funds_rate"));
            assert!(msg.contains("vix"));
        }
        other => panic!("expected schema error, got {other:?}"),
    }
}

#[test]
/// Verifies an empty table is not an error.
fn empty_input_yields_empty_output() {
    let table = ObservationTable::new(vec!["volume_z".to_string()]);
    assert!(engineer(&table, &schema()).unwrap().is_empty());
}

#[test]
/// Verifies a missing predictor value drops only the row that carries it.
fn nan_predictor_drops_only_its_row() {
    let mut rows = entity_rows("AAA", 100.0, 15);
    rows[11].predictors[0] = f64::NAN;
    let table = ObservationTable::with_rows(vec!["volume_z".to_string()], rows).unwrap();
    let out = engineer(&table, &schema()).unwrap();
    let dates: Vec<NaiveDate> = out.iter().map(|r| r.observation_date).collect();
    assert_eq!(dates, vec![day(10), day(12), day(13)]);
}

#[test]
/// Verifies two rows for one entity on one date abort engineering.
fn duplicate_dates_abort() {
    let mut rows = entity_rows("AAA", 100.0, 15);
    rows.push(Observation {
        entity_id: "AAA".to_string(),
        observation_date: day(3),
        daily_return: 0.0,
        predictors: vec![0.0],
    });
    let table = ObservationTable::with_rows(vec!["volume_z".to_string()], rows).unwrap();
    let err = engineer(&table, &schema()).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::DuplicateObservation { ref entity_id, date } if entity_id == "AAA" && date == day(3)
    ));
    assert!(err.is_fatal());
}
