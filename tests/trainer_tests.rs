use chrono::{Duration, NaiveDate};
use market_forecast::error::PipelineError;
use market_forecast::features::{engineer, FeatureSchema, DAILY_RETURN};
use market_forecast::model::{FeatureRow, Observation, ObservationTable};
use market_forecast::regressor::GbdtParams;
use market_forecast::trainer::EntityTrainer;
use market_forecast::validation::WalkForwardValidator;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn observations(entity: &str, returns: &[f64]) -> ObservationTable {
    let start = NaiveDate::from_ymd_opt(2019, 6, 3).unwrap();
    let rows = returns
        .iter()
        .enumerate()
        .map(|(i, r)| Observation {
            entity_id: entity.to_string(),
            observation_date: start + Duration::days(i as i64),
            daily_return: *r,
            predictors: Vec::new(),
        })
        .collect();
    ObservationTable::with_rows(Vec::new(), rows).unwrap()
}

fn noise(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(-0.02..0.02)).collect()
}

fn returns_only_schema(lags: Vec<usize>) -> FeatureSchema {
    FeatureSchema::new(vec![DAILY_RETURN.to_string()], lags).unwrap()
}

fn feature_rows(entity: &str, returns: &[f64], schema: &FeatureSchema) -> Vec<FeatureRow> {
    engineer(&observations(entity, returns), schema).unwrap()
}

#[test]
/// Verifies the 100-row minimum: 99 usable rows are skipped, 100 are trained.
fn minimum_row_boundary() {
    let schema = returns_only_schema(vec![1]);
    let trainer = EntityTrainer::default();

    let short = feature_rows("XYZ", &noise(101, 5), &schema);
    assert_eq!(short.len(), 99);
    assert!(trainer.train("XYZ", &short, &schema).unwrap().is_none());

    let enough = feature_rows("XYZ", &noise(102, 5), &schema);
    assert_eq!(enough.len(), 100);
    let model = trainer.train("XYZ", &enough, &schema).unwrap().unwrap();
    assert_eq!(model.trained_rows, 100);
    assert_eq!(model.cv.folds_evaluated(), 5);
}

#[test]
/// Verifies the trend sanity case: `daily_return[t] = t` over 200 days is learned almost
/// exactly in sample and scores above 0.9 out of fold.
fn linear_trend_is_learned() {
    let schema = returns_only_schema(vec![1, 5, 10]);
    let returns: Vec<f64> = (0..200).map(|t| t as f64).collect();
    let rows = feature_rows("TREND", &returns, &schema);

    let model = EntityTrainer::default()
        .train("TREND", &rows, &schema)
        .unwrap()
        .unwrap();

    let mae = rows
        .iter()
        .map(|r| (model.predict(&r.features).unwrap() - r.target_return).abs())
        .sum::<f64>()
        / rows.len() as f64;
    assert!(mae < 0.05, "in-sample mae = {mae}");

    let cv_mean = model.cv_mean().unwrap();
    assert!(cv_mean > 0.9, "cv mean r2 = {cv_mean}");
    assert_eq!(
        model.feature_columns,
        vec!["daily_return", "return_lag_1", "return_lag_5", "return_lag_10"]
    );
}

#[test]
/// Verifies a poor walk-forward score does not stop the full-history model from training.
fn cv_score_does_not_gate_training() {
    let schema = returns_only_schema(vec![1, 5]);
    let rows = feature_rows("NOISE", &noise(300, 11), &schema);
    let model = EntityTrainer::default()
        .train("NOISE", &rows, &schema)
        .unwrap()
        .unwrap();
    assert!(model.cv_mean().unwrap() < 0.5);
    assert_eq!(model.trained_rows, rows.len());
}

#[test]
/// Verifies the same rows and seed give identical predictions.
fn training_is_deterministic() {
    let schema = returns_only_schema(vec![1, 5, 10]);
    let rows = feature_rows("DET", &noise(250, 3), &schema);
    let trainer = EntityTrainer::new(
        WalkForwardValidator::default(),
        GbdtParams {
            subsample: 0.7,
            ..GbdtParams::default()
        },
    )
    .unwrap();

    let a = trainer.train("DET", &rows, &schema).unwrap().unwrap();
    let b = trainer.train("DET", &rows, &schema).unwrap().unwrap();
    let probe = [0.01, -0.004, 0.002, 0.0];
    assert_eq!(
        a.predict(&probe).unwrap().to_bits(),
        b.predict(&probe).unwrap().to_bits()
    );
    assert_eq!(a.cv, b.cv);
}

#[test]
/// Verifies rows of a different entity are rejected rather than silently mixed in.
fn foreign_rows_are_rejected() {
    let schema = returns_only_schema(vec![1]);
    let mut rows = feature_rows("AAA", &noise(150, 1), &schema);
    rows[7].entity_id = "BBB".to_string();
    let err = EntityTrainer::default()
        .train("AAA", &rows, &schema)
        .unwrap_err();
    assert!(matches!(err, PipelineError::Schema(_)));
}

#[test]
/// Verifies a model refuses inputs whose width differs from its schema.
fn prediction_checks_feature_width() {
    let schema = returns_only_schema(vec![1]);
    let rows = feature_rows("AAA", &noise(150, 2), &schema);
    let model = EntityTrainer::default()
        .train("AAA", &rows, &schema)
        .unwrap()
        .unwrap();
    assert!(model.predict(&[0.01, 0.02]).is_ok());
    assert!(matches!(
        model.predict(&[0.01]),
        Err(PipelineError::Model(_))
    ));
}

#[test]
/// Verifies invalid hyperparameters are rejected when the trainer is built.
fn trainer_rejects_invalid_params() {
    let err = EntityTrainer::new(
        WalkForwardValidator::default(),
        GbdtParams {
            subsample: 1.5,
            ..GbdtParams::default()
        },
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
}
