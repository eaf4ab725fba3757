//! The audit engine — one call turns a batch of postings into a
//! cached risk report.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Snapshot build         (id sort, malformed triage)
//!   2. Duplicate classification
//!   3. Auto-train gate        (train at most once per dataset)
//!   4. Duplicate prediction   (skipped without a trained model)
//!   5. User activity profiling
//!   6. Temporal detectors     (backdated, closing, unusual day, holiday)
//!   7. Aggregation into the weighted report
//!
//! RULES:
//!   - Detectors read ONLY the immutable snapshot. None sees another's
//!     output before aggregation.
//!   - A dataset key computes once. Repeat calls return the cached
//!     report without touching the detectors.
//!   - The compute budget is checked cooperatively; a blown budget
//!     aborts the whole compute, never a partial report.
//!   - Training failures are recorded model state, not errors. Only
//!     force_train surfaces a too-small dataset to the caller.

use crate::{
    aggregator::{aggregate, RiskReport},
    backdated::BackdatedDetector,
    cache::AnalysisCache,
    closing::ClosingPeriodDetector,
    config::AnalysisOptions,
    detector::{AnomalyDetector, Deadline, DetectorKind},
    duplicates::DuplicateClassifier,
    error::{AuditError, AuditResult},
    holiday::HolidayDetector,
    model::{self, ModelState, TrainingFailure, MIN_TRAINING_ROWS},
    transaction::{Transaction, TransactionSnapshot},
    unusual_day::UnusualDayDetector,
    user_activity::UserActivityDetector,
};

pub struct AuditEngine {
    options: AnalysisOptions,
    cache: AnalysisCache,
}

impl AuditEngine {
    pub fn new(options: AnalysisOptions, cache: AnalysisCache) -> Self {
        Self { options, cache }
    }

    /// Engine with default options and a process-local cache. The usual
    /// constructor for tests and one-shot runs.
    pub fn in_memory() -> Self {
        Self::new(AnalysisOptions::default(), AnalysisCache::in_memory())
    }

    /// Engine with custom options over a process-local cache.
    pub fn with_options(options: AnalysisOptions) -> Self {
        Self::new(options, AnalysisCache::in_memory())
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    /// Analyze a batch of postings under the engine's options.
    ///
    /// The first call for a dataset key runs the full pipeline and
    /// caches the report; later calls for the same key return that
    /// report as-is, whatever transactions they carry.
    pub fn analyze(
        &self,
        dataset_key: &str,
        transactions: Vec<Transaction>,
    ) -> AuditResult<RiskReport> {
        self.analyze_with(dataset_key, transactions, self.options.clone())
    }

    /// Analyze with one-off options, bypassing the engine's defaults
    /// but not its cache.
    pub fn analyze_with(
        &self,
        dataset_key: &str,
        transactions: Vec<Transaction>,
        options: AnalysisOptions,
    ) -> AuditResult<RiskReport> {
        if transactions.is_empty() {
            return Err(AuditError::EmptySnapshot);
        }
        let snapshot = TransactionSnapshot::new(dataset_key, transactions);
        self.cache
            .get_or_compute(dataset_key, |model_state| {
                compute_report(&snapshot, &options, model_state)
            })
    }

    /// Train the dataset's model regardless of the already-trained and
    /// has-duplicates gates. The minimum-rows gate stays: too little
    /// data is an error here, where the caller explicitly asked, rather
    /// than a silent skip.
    ///
    /// Drops any cached report for the key; the next analyze recomputes
    /// against the new model.
    pub fn force_train(
        &self,
        dataset_key: &str,
        transactions: Vec<Transaction>,
    ) -> AuditResult<ModelState> {
        if transactions.is_empty() {
            return Err(AuditError::EmptySnapshot);
        }
        let snapshot = TransactionSnapshot::new(dataset_key, transactions);
        let options = self.options.clone();
        let state = self.cache.replace_model(dataset_key, |_| {
            let deadline = Deadline::from_options(&options);
            let duplicates =
                DuplicateClassifier::from_options(&options).classify(&snapshot, &deadline)?;
            model::train(&snapshot, &duplicates, &deadline)
        })?;
        if state.failure == Some(TrainingFailure::NoData) {
            return Err(AuditError::InsufficientData {
                found: snapshot.well_formed().count(),
                required: MIN_TRAINING_ROWS,
            });
        }
        Ok(state)
    }

    /// Drop the cached report and model for a dataset.
    pub fn invalidate(&self, dataset_key: &str) -> AuditResult<()> {
        self.cache.invalidate(dataset_key)
    }

    /// Stored model state for a key, if any compute or train has run.
    pub fn cached_model(&self, dataset_key: &str) -> AuditResult<Option<ModelState>> {
        Ok(self.cache.peek(dataset_key)?.map(|entry| entry.model))
    }
}

/// One full pipeline pass. Runs under the cache's per-key lock.
fn compute_report(
    snapshot: &TransactionSnapshot,
    options: &AnalysisOptions,
    mut model_state: ModelState,
) -> AuditResult<(RiskReport, ModelState)> {
    let deadline = Deadline::from_options(options);

    let duplicates = DuplicateClassifier::from_options(options).classify(snapshot, &deadline)?;

    if options.auto_train && model::should_auto_train(&model_state, &duplicates, snapshot) {
        log::info!(
            "dataset={} auto-training on {} rows",
            snapshot.dataset_key(),
            snapshot.well_formed().count()
        );
        model_state = model::train(snapshot, &duplicates, &deadline)?;
    }

    // Prediction is best-effort: an unusable model downgrades the
    // duplicate scores to pure rule scores instead of failing the run.
    let rule_scores = duplicates.rule_scores();
    let predictions = match model::predict(&model_state, snapshot, &rule_scores, &deadline) {
        Ok(predictions) => predictions,
        Err(AuditError::ModelUnavailable { reason }) => {
            log::debug!(
                "dataset={} prediction skipped: {reason}",
                snapshot.dataset_key()
            );
            Vec::new()
        }
        Err(other) => return Err(other),
    };

    let user_output = if options.is_skipped(DetectorKind::UserActivity) {
        None
    } else {
        Some(UserActivityDetector::scan(snapshot, options, &deadline)?)
    };

    let temporal: [&dyn AnomalyDetector; 4] = [
        &BackdatedDetector,
        &ClosingPeriodDetector,
        &UnusualDayDetector,
        &HolidayDetector,
    ];
    let mut detector_outputs = Vec::with_capacity(temporal.len());
    for detector in temporal {
        if options.is_skipped(detector.kind()) {
            log::debug!(
                "dataset={} detector {} skipped by options",
                snapshot.dataset_key(),
                detector.kind().name()
            );
            continue;
        }
        detector_outputs.push(detector.scan(snapshot, options, &deadline)?);
    }

    let status = model_state.status;
    let report = aggregate(
        snapshot,
        options,
        duplicates,
        detector_outputs,
        user_output,
        predictions,
        status,
    );
    Ok((report, model_state))
}
