//! Learned duplicate model.
//!
//! A small logistic-regression classifier trained per dataset from the
//! rule-based duplicate labels, used to surface near-duplicates the six
//! fixed keys miss and to attach a confidence to every posting.
//!
//! 1. Labels: positive = posting belongs to at least one duplicate
//!    group, negative = everything else. The rules are ground truth.
//! 2. Auto-training fires at most once per dataset and only when the
//!    model is untrained, the classifier found at least one group, and
//!    the snapshot is big enough. Force-train skips the first two gates
//!    but never the size check.
//! 3. Training is deterministic: fixed seed, fixed epoch/batch schedule,
//!    so the same snapshot always learns the same weights.
//!
//! RULE: training failure is a recorded outcome (FAILED + reason), not
//! an error. Only a blown compute budget propagates as Err.

use crate::detector::{Deadline, DEADLINE_STRIDE};
use crate::duplicates::DuplicateReport;
use crate::error::{AuditError, AuditResult};
use crate::risk::clamp_score;
use crate::transaction::{Transaction, TransactionSnapshot};
use crate::types::TransactionId;
use chrono::{DateTime, Datelike, Utc};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Training schedule ──────────────────────────────────────────────

/// Snapshots below this size never train, auto or forced.
pub const MIN_TRAINING_ROWS: usize = 100;
pub const FEATURE_COUNT: usize = 9;
const EPOCHS: usize = 200;
const LEARNING_RATE: f64 = 0.1;
const BATCH_SIZE: usize = 32;
const TRAIN_SEED: u64 = 0x5EED;

/// Blend of rule score and model confidence in the final duplicate
/// risk. The rule side dominates: it is the label source.
const RULE_BLEND: f64 = 0.7;
const MODEL_BLEND: f64 = 0.3;
/// Confidence at or above this marks a posting as a likely duplicate.
pub const CONFIDENCE_CUTOFF: f64 = 0.5;

// ── State machine ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Untrained,
    Training,
    Trained,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrainingFailure {
    /// Fewer rows than [`MIN_TRAINING_ROWS`].
    NoData,
    /// Labels were single-class; with no duplicate groups there is
    /// nothing to separate.
    NoDuplicates,
    /// Weights went non-finite even after the halved-rate retry.
    Numeric,
}

impl TrainingFailure {
    pub fn code(&self) -> &'static str {
        match self {
            TrainingFailure::NoData => "NO_DATA",
            TrainingFailure::NoDuplicates => "NO_DUPLICATES",
            TrainingFailure::Numeric => "NUMERIC",
        }
    }
}

/// Learned parameters plus the standardization that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelWeights {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelState {
    pub status: ModelStatus,
    pub failure: Option<TrainingFailure>,
    pub trained_at: Option<DateTime<Utc>>,
    pub training_rows: usize,
    pub positive_labels: usize,
    pub weights: Option<ModelWeights>,
}

impl ModelState {
    pub fn untrained() -> Self {
        Self {
            status: ModelStatus::Untrained,
            failure: None,
            trained_at: None,
            training_rows: 0,
            positive_labels: 0,
            weights: None,
        }
    }

    pub fn failed(failure: TrainingFailure, training_rows: usize, positive_labels: usize) -> Self {
        Self {
            status: ModelStatus::Failed,
            failure: Some(failure),
            trained_at: None,
            training_rows,
            positive_labels,
            weights: None,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.status == ModelStatus::Trained && self.weights.is_some()
    }
}

/// Auto-train gate: untrained, at least one duplicate group, and a big
/// enough snapshot. All three must hold.
pub fn should_auto_train(
    state: &ModelState,
    duplicates: &DuplicateReport,
    snapshot: &TransactionSnapshot,
) -> bool {
    state.status == ModelStatus::Untrained
        && duplicates.has_groups()
        && snapshot.well_formed().count() >= MIN_TRAINING_ROWS
}

// ── Features ───────────────────────────────────────────────────────

fn feature_row(txn: &Transaction) -> [f64; FEATURE_COUNT] {
    [
        txn.amount,
        (txn.amount.abs() + 1.0).ln(),
        txn.account_key().len() as f64,
        txn.user_name.len() as f64,
        txn.weekday().num_days_from_monday() as f64,
        txn.posting_date.day() as f64,
        txn.posting_date.month() as f64,
        if txn.is_debit() { 1.0 } else { 0.0 },
        txn.description.len() as f64,
    ]
}

/// Column means and stds over the training rows. Stds are floored so a
/// constant column divides by something sane instead of zero.
fn fit_standardization(rows: &[[f64; FEATURE_COUNT]]) -> (Vec<f64>, Vec<f64>) {
    let n = rows.len() as f64;
    let mut means = vec![0.0; FEATURE_COUNT];
    for row in rows {
        for (m, v) in means.iter_mut().zip(row) {
            *m += v;
        }
    }
    for m in &mut means {
        *m /= n;
    }
    let mut stds = vec![0.0; FEATURE_COUNT];
    for row in rows {
        for ((s, v), m) in stds.iter_mut().zip(row).zip(&means) {
            *s += (v - m) * (v - m);
        }
    }
    for s in &mut stds {
        *s = (*s / n).sqrt().max(1e-9);
    }
    (means, stds)
}

fn standardize_row(
    row: &[f64; FEATURE_COUNT],
    means: &[f64],
    stds: &[f64],
) -> [f64; FEATURE_COUNT] {
    let mut out = [0.0; FEATURE_COUNT];
    for i in 0..FEATURE_COUNT {
        out[i] = (row[i] - means[i]) / stds[i];
    }
    out
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

// ── Training ───────────────────────────────────────────────────────

/// Train on the snapshot using duplicate-group membership as labels.
///
/// Gate failures come back as a FAILED state inside Ok; only a blown
/// deadline is an Err.
pub fn train(
    snapshot: &TransactionSnapshot,
    duplicates: &DuplicateReport,
    deadline: &Deadline,
) -> AuditResult<ModelState> {
    let mut rows = Vec::new();
    let mut labels = Vec::new();
    for (i, txn) in snapshot.well_formed().enumerate() {
        if i % DEADLINE_STRIDE == 0 {
            deadline.check()?;
        }
        rows.push(feature_row(txn));
        labels.push(if duplicates.flagged_transactions.contains(&txn.id) {
            1.0
        } else {
            0.0
        });
    }

    if rows.len() < MIN_TRAINING_ROWS {
        log::warn!(
            "dataset={} training skipped: {} rows, {} required",
            snapshot.dataset_key(),
            rows.len(),
            MIN_TRAINING_ROWS
        );
        return Ok(ModelState::failed(TrainingFailure::NoData, rows.len(), 0));
    }

    let positives = labels.iter().filter(|&&l| l == 1.0).count();
    if positives == 0 || positives == rows.len() {
        log::warn!(
            "dataset={} training skipped: single-class labels ({} of {} positive)",
            snapshot.dataset_key(),
            positives,
            rows.len()
        );
        return Ok(ModelState::failed(
            TrainingFailure::NoDuplicates,
            rows.len(),
            positives,
        ));
    }

    let (means, stds) = fit_standardization(&rows);
    let standardized: Vec<[f64; FEATURE_COUNT]> = rows
        .iter()
        .map(|r| standardize_row(r, &means, &stds))
        .collect();

    // One retry at half the rate if the weights blow up.
    let fitted = match fit(&standardized, &labels, LEARNING_RATE, deadline)? {
        Some(params) => Some(params),
        None => {
            log::warn!(
                "dataset={} non-finite weights at rate {LEARNING_RATE}, retrying at half",
                snapshot.dataset_key()
            );
            fit(&standardized, &labels, LEARNING_RATE / 2.0, deadline)?
        }
    };
    let Some((coefficients, intercept)) = fitted else {
        return Ok(ModelState::failed(
            TrainingFailure::Numeric,
            rows.len(),
            positives,
        ));
    };

    log::info!(
        "dataset={} model trained rows={} positives={}",
        snapshot.dataset_key(),
        rows.len(),
        positives
    );
    Ok(ModelState {
        status: ModelStatus::Trained,
        failure: None,
        trained_at: Some(Utc::now()),
        training_rows: rows.len(),
        positive_labels: positives,
        weights: Some(ModelWeights {
            means,
            stds,
            coefficients,
            intercept,
        }),
    })
}

/// Minibatch SGD over the standardized rows. Ok(None) means the
/// weights went non-finite at this learning rate.
fn fit(
    rows: &[[f64; FEATURE_COUNT]],
    labels: &[f64],
    rate: f64,
    deadline: &Deadline,
) -> AuditResult<Option<(Vec<f64>, f64)>> {
    let mut weights = vec![0.0; FEATURE_COUNT];
    let mut intercept = 0.0;
    let mut order: Vec<usize> = (0..rows.len()).collect();
    let mut rng = Pcg64Mcg::seed_from_u64(TRAIN_SEED);

    for _ in 0..EPOCHS {
        deadline.check()?;
        order.shuffle(&mut rng);
        for batch in order.chunks(BATCH_SIZE) {
            let mut grad = vec![0.0; FEATURE_COUNT];
            let mut grad_intercept = 0.0;
            for &idx in batch {
                let row = &rows[idx];
                let z = intercept
                    + weights.iter().zip(row.iter()).map(|(w, x)| w * x).sum::<f64>();
                let residual = sigmoid(z) - labels[idx];
                for (g, x) in grad.iter_mut().zip(row.iter()) {
                    *g += residual * x;
                }
                grad_intercept += residual;
            }
            let scale = rate / batch.len() as f64;
            for (w, g) in weights.iter_mut().zip(&grad) {
                *w -= scale * g;
            }
            intercept -= scale * grad_intercept;
        }
        if !intercept.is_finite() || weights.iter().any(|w| !w.is_finite()) {
            return Ok(None);
        }
    }
    Ok(Some((weights, intercept)))
}

// ── Prediction ─────────────────────────────────────────────────────

/// Model output for one posting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicatePrediction {
    pub transaction_id: TransactionId,
    /// Probability of being a duplicate, in [0, 1].
    pub confidence: f64,
    /// Confidence scaled to the shared 0..100 scale.
    pub ml_risk_score: u8,
    pub is_likely_duplicate: bool,
    /// Rule score blended with the model score, rule side dominant.
    pub blended_risk: u8,
}

/// Score every well-formed posting with a trained model.
///
/// Err(ModelUnavailable) unless the state is TRAINED; callers treat
/// that as "skip the prediction step", not as a run failure.
pub fn predict(
    state: &ModelState,
    snapshot: &TransactionSnapshot,
    rule_scores: &HashMap<TransactionId, u8>,
    deadline: &Deadline,
) -> AuditResult<Vec<DuplicatePrediction>> {
    let Some(weights) = state.weights.as_ref().filter(|_| state.is_trained()) else {
        let reason = match state.failure {
            Some(failure) => format!("training failed: {}", failure.code()),
            None => "model is not trained".to_string(),
        };
        return Err(AuditError::ModelUnavailable { reason });
    };

    let mut predictions = Vec::new();
    for (i, txn) in snapshot.well_formed().enumerate() {
        if i % DEADLINE_STRIDE == 0 {
            deadline.check()?;
        }
        let row = standardize_row(&feature_row(txn), &weights.means, &weights.stds);
        let z = weights.intercept
            + weights
                .coefficients
                .iter()
                .zip(row.iter())
                .map(|(w, x)| w * x)
                .sum::<f64>();
        let confidence = sigmoid(z);
        let rule = rule_scores.get(&txn.id).copied().unwrap_or(0);
        let blended =
            clamp_score(RULE_BLEND * rule as f64 + MODEL_BLEND * confidence * 100.0);
        predictions.push(DuplicatePrediction {
            transaction_id: txn.id.clone(),
            confidence,
            ml_risk_score: clamp_score(confidence * 100.0),
            is_likely_duplicate: confidence >= CONFIDENCE_CUTOFF,
            blended_risk: blended,
        });
    }
    Ok(predictions)
}
