//! Model lifecycle tests: training gates, forced training, failure
//! states, and prediction consistency.

use chrono::{Datelike, Duration, NaiveDate};
use glaudit_core::config::AnalysisOptions;
use glaudit_core::detector::Deadline;
use glaudit_core::duplicates::{DuplicateClassifier, DuplicateReport};
use glaudit_core::engine::AuditEngine;
use glaudit_core::error::AuditError;
use glaudit_core::model::{
    self, ModelState, ModelStatus, TrainingFailure, CONFIDENCE_CUTOFF, MIN_TRAINING_ROWS,
};
use glaudit_core::transaction::{Transaction, TransactionKind, TransactionSnapshot};
use std::collections::HashMap;

fn txn(id: &str, amount: f64, posting_date: NaiveDate) -> Transaction {
    Transaction {
        id: id.to_string(),
        gl_account: "400100".to_string(),
        amount,
        transaction_type: TransactionKind::Debit,
        currency: "USD".to_string(),
        posting_date,
        document_date: Some(posting_date),
        document_number: format!("D-{id}"),
        document_type: "SA".to_string(),
        reference: "INV-1".to_string(),
        vendor: "Acme Industrial Supply".to_string(),
        user_name: "JSMITH".to_string(),
        description: "Test posting".to_string(),
        fiscal_year: 2025,
        fiscal_period: posting_date.month() as u8,
    }
}

/// `unique` rows with pairwise-distinct amounts plus `dup_pairs`
/// planted identical pairs. Only the pairs ever group.
fn ledger(unique: usize, dup_pairs: usize) -> Vec<Transaction> {
    let start = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
    let mut batch: Vec<Transaction> = (0..unique)
        .map(|i| {
            let date = start + Duration::days((i % 10) as i64);
            txn(&format!("u-{i:04}"), 100.0 + 7.0 * i as f64, date)
        })
        .collect();
    for k in 0..dup_pairs {
        let amount = 5_000.0 + k as f64;
        let date = NaiveDate::from_ymd_opt(2025, 3, 5).unwrap();
        batch.push(txn(&format!("d-a-{k:02}"), amount, date));
        batch.push(txn(&format!("d-b-{k:02}"), amount, date));
    }
    batch
}

fn classify(snapshot: &TransactionSnapshot) -> DuplicateReport {
    DuplicateClassifier::from_options(&AnalysisOptions::default())
        .classify(snapshot, &Deadline::none())
        .unwrap()
}

#[test]
fn small_snapshot_never_auto_trains() {
    let engine = AuditEngine::in_memory();
    let report = engine.analyze("model-small", ledger(40, 5)).unwrap();

    assert_eq!(report.model_status, ModelStatus::Untrained);
    assert!(
        report.predictions.is_empty(),
        "no model, no predictions, got {}",
        report.predictions.len()
    );
    let state = engine.cached_model("model-small").unwrap().unwrap();
    assert_eq!(state.status, ModelStatus::Untrained);
}

#[test]
fn auto_train_fires_on_big_snapshot() {
    let engine = AuditEngine::in_memory();
    let batch = ledger(100, 10);
    let rows = batch.len();
    let report = engine.analyze("model-big", batch).unwrap();

    assert_eq!(report.model_status, ModelStatus::Trained);
    assert_eq!(
        report.predictions.len(),
        rows,
        "one prediction per well-formed row"
    );
    for p in &report.predictions {
        assert!(
            (0.0..=1.0).contains(&p.confidence),
            "confidence out of range for {}: {}",
            p.transaction_id,
            p.confidence
        );
        assert_eq!(
            p.is_likely_duplicate,
            p.confidence >= CONFIDENCE_CUTOFF,
            "cutoff mismatch for {}",
            p.transaction_id
        );
    }
    // A posting in no group has rule score 0; its blend is pure model,
    // which tops out at 30 of 100.
    let loose = report
        .predictions
        .iter()
        .find(|p| p.transaction_id == "u-0000")
        .unwrap();
    assert!(
        loose.blended_risk <= 30,
        "rule-less blend capped at 30, got {}",
        loose.blended_risk
    );

    let state = engine.cached_model("model-big").unwrap().unwrap();
    assert!(state.is_trained());
    assert_eq!(state.training_rows, 120);
    assert_eq!(state.positive_labels, 20, "ten pairs, both members flagged");
}

#[test]
fn force_train_rejects_small_snapshots() {
    let engine = AuditEngine::in_memory();
    match engine.force_train("model-forced", ledger(30, 5)) {
        Err(AuditError::InsufficientData { found, required }) => {
            assert_eq!(found, 40);
            assert_eq!(required, MIN_TRAINING_ROWS);
        }
        other => panic!("expected InsufficientData, got {other:?}"),
    }
    // The failure is recorded against the dataset all the same.
    let state = engine.cached_model("model-forced").unwrap().unwrap();
    assert_eq!(state.status, ModelStatus::Failed);
    assert_eq!(state.failure, Some(TrainingFailure::NoData));

    // Reloading enough rows under the same key trains cleanly.
    let state = engine.force_train("model-forced", ledger(140, 10)).unwrap();
    assert!(state.is_trained());
    assert_eq!(state.training_rows, 160);
}

#[test]
fn force_train_without_duplicates_records_failure() {
    let engine = AuditEngine::in_memory();
    let state = engine.force_train("model-clean", ledger(120, 0)).unwrap();

    assert_eq!(state.status, ModelStatus::Failed);
    assert_eq!(state.failure, Some(TrainingFailure::NoDuplicates));
    assert_eq!(state.failure.unwrap().code(), "NO_DUPLICATES");
    assert_eq!(state.training_rows, 120);
    assert_eq!(state.positive_labels, 0);
}

/// A recorded failure is sticky: analyze never retrains over it.
#[test]
fn failed_state_blocks_auto_retraining() {
    let engine = AuditEngine::in_memory();
    engine.force_train("model-stuck", ledger(120, 0)).unwrap();

    let report = engine.analyze("model-stuck", ledger(120, 10)).unwrap();
    assert_eq!(report.model_status, ModelStatus::Failed);
    assert!(report.predictions.is_empty());
}

#[test]
fn auto_train_can_be_switched_off() {
    let mut options = AnalysisOptions::default();
    options.auto_train = false;
    let engine = AuditEngine::with_options(options);

    let report = engine.analyze("model-optout", ledger(100, 10)).unwrap();
    assert_eq!(report.model_status, ModelStatus::Untrained);
    assert!(report.predictions.is_empty());
}

#[test]
fn training_is_deterministic() {
    let snapshot = TransactionSnapshot::new("model-det", ledger(110, 10));
    let duplicates = classify(&snapshot);

    let a = model::train(&snapshot, &duplicates, &Deadline::none()).unwrap();
    let b = model::train(&snapshot, &duplicates, &Deadline::none()).unwrap();
    let wa = a.weights.expect("first run trained");
    let wb = b.weights.expect("second run trained");

    assert_eq!(
        wa.coefficients, wb.coefficients,
        "same snapshot must learn identical coefficients"
    );
    assert_eq!(wa.intercept, wb.intercept);
    assert_eq!(wa.means, wb.means);
    assert_eq!(wa.stds, wb.stds);
}

#[test]
fn predict_requires_a_trained_model() {
    let snapshot = TransactionSnapshot::new("model-unready", ledger(10, 0));
    let rule_scores = HashMap::new();
    let result = model::predict(
        &ModelState::untrained(),
        &snapshot,
        &rule_scores,
        &Deadline::none(),
    );
    assert!(
        matches!(result, Err(AuditError::ModelUnavailable { .. })),
        "expected ModelUnavailable, got {result:?}"
    );
}

#[test]
fn auto_train_gate_needs_all_three_conditions() {
    let snapshot = TransactionSnapshot::new("model-gate", ledger(100, 10));
    let duplicates = classify(&snapshot);
    assert!(model::should_auto_train(
        &ModelState::untrained(),
        &duplicates,
        &snapshot
    ));

    let mut trained = ModelState::untrained();
    trained.status = ModelStatus::Trained;
    assert!(
        !model::should_auto_train(&trained, &duplicates, &snapshot),
        "anything but an untrained state blocks the gate"
    );

    let clean = TransactionSnapshot::new("model-gate-clean", ledger(120, 0));
    let clean_dups = classify(&clean);
    assert!(
        !model::should_auto_train(&ModelState::untrained(), &clean_dups, &clean),
        "no duplicate groups, nothing to learn"
    );

    let small = TransactionSnapshot::new("model-gate-small", ledger(50, 5));
    let small_dups = classify(&small);
    assert!(
        !model::should_auto_train(&ModelState::untrained(), &small_dups, &small),
        "60 rows is under the minimum"
    );
}

#[test]
fn training_respects_the_budget() {
    let snapshot = TransactionSnapshot::new("model-budget", ledger(100, 10));
    let duplicates = classify(&snapshot);
    let result = model::train(&snapshot, &duplicates, &Deadline::after_ms(0));
    assert!(
        matches!(result, Err(AuditError::DeadlineExceeded { .. })),
        "expected DeadlineExceeded, got {result:?}"
    );
}
