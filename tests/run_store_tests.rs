use std::path::PathBuf;

use chrono::{Duration, TimeZone, Utc};
use market_forecast::orchestrator::{EntityOutcome, EntityReport, RunSummary};
use market_forecast::run_store::{load_entity_history, persist_run_summary};
use uuid::Uuid;

fn db_path() -> PathBuf {
    std::env::temp_dir()
        .join(format!("market-forecast-runs-{}", Uuid::new_v4()))
        .join("training_runs.sqlite")
}

fn summary(day: i64, aapl: EntityOutcome, cv: Option<f64>) -> RunSummary {
    let started_at = Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap() + Duration::days(day);
    let reports = vec![
        EntityReport {
            entity_id: "AAPL".to_string(),
            outcome: aapl,
            rows: 480,
            cv_mean_r2: cv,
            folds_evaluated: if cv.is_some() { 5 } else { 0 },
            detail: None,
        },
        EntityReport {
            entity_id: "NEWCO".to_string(),
            outcome: EntityOutcome::Skipped,
            rows: 12,
            cv_mean_r2: None,
            folds_evaluated: 0,
            detail: Some("12 usable rows, need at least 100".to_string()),
        },
    ];
    RunSummary {
        run_id: Uuid::new_v4(),
        started_at,
        finished_at: started_at + Duration::minutes(3),
        entities_trained: usize::from(aapl == EntityOutcome::Trained),
        entities_skipped: 1,
        entities_failed: usize::from(aapl == EntityOutcome::Failed),
        reports,
    }
}

#[test]
/// Verifies per-entity history comes back oldest run first with every field intact.
fn entity_history_round_trip() {
    let path = db_path();
    let later = summary(2, EntityOutcome::Failed, None);
    let earlier = summary(0, EntityOutcome::Trained, Some(0.12));
    persist_run_summary(&path, &later).expect("persist later run");
    persist_run_summary(&path, &earlier).expect("persist earlier run");

    let history = load_entity_history(&path, "AAPL").expect("load history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].run_id, earlier.run_id.to_string());
    assert_eq!(history[0].outcome, EntityOutcome::Trained);
    assert_eq!(history[0].cv_mean_r2, Some(0.12));
    assert_eq!(history[0].folds_evaluated, 5);
    assert_eq!(history[1].outcome, EntityOutcome::Failed);
    assert_eq!(history[1].cv_mean_r2, None);
    assert_eq!(history[1].started_at_ms, later.started_at.timestamp_millis());

    let newco = load_entity_history(&path, "NEWCO").unwrap();
    assert_eq!(newco.len(), 2);
    assert_eq!(
        newco[0].detail.as_deref(),
        Some("12 usable rows, need at least 100")
    );
    std::fs::remove_dir_all(path.parent().unwrap()).ok();
}

#[test]
/// Verifies writing the same run twice updates it in place instead of duplicating rows.
fn rewriting_a_run_is_an_upsert() {
    let path = db_path();
    let mut run = summary(0, EntityOutcome::Trained, Some(0.3));
    persist_run_summary(&path, &run).unwrap();
    run.reports[0].cv_mean_r2 = Some(0.4);
    persist_run_summary(&path, &run).unwrap();

    let history = load_entity_history(&path, "AAPL").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].cv_mean_r2, Some(0.4));
    std::fs::remove_dir_all(path.parent().unwrap()).ok();
}

#[test]
/// Verifies an unknown entity has an empty history rather than an error.
fn unknown_entity_has_no_history() {
    let path = db_path();
    persist_run_summary(&path, &summary(0, EntityOutcome::Trained, Some(0.1))).unwrap();
    assert!(load_entity_history(&path, "ZZZZ").unwrap().is_empty());
    std::fs::remove_dir_all(path.parent().unwrap()).ok();
}
