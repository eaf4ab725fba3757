//! Closing-period entry detector.
//!
//! Flags postings close to a fiscal month boundary on either side: the
//! configured window of days running up to a month end, and the grace
//! days just after it (the spill-over when books close late). Scoring
//! is 50 base, up to 20 for proximity to the boundary, and 30 more for
//! high-value amounts.

use crate::config::AnalysisOptions;
use crate::detector::{
    AnomalyDetector, AnomalyFinding, Deadline, DetectorKind, DetectorOutput, FindingDetail,
    DEADLINE_STRIDE,
};
use crate::error::AuditResult;
use crate::risk::RiskLevel;
use crate::transaction::Transaction;
use crate::transaction::TransactionSnapshot;
use chrono::{Datelike, NaiveDate};

const BASE_SCORE: u8 = 50;
const PROXIMITY_SCORE_MAX: i64 = 20;
const HIGH_VALUE_BONUS: u8 = 30;

/// Last day of the month containing `date`.
pub fn month_end(date: NaiveDate) -> Option<NaiveDate> {
    let first_of_next = if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    };
    first_of_next.and_then(|d| d.pred_opt())
}

/// Closer to the boundary scores higher; at the far edge of the window
/// it contributes nothing.
fn proximity_score(distance: i64, span: i64) -> u8 {
    if span == 0 {
        PROXIMITY_SCORE_MAX as u8
    } else {
        ((span - distance) * PROXIMITY_SCORE_MAX / span) as u8
    }
}

pub struct ClosingPeriodDetector;

impl ClosingPeriodDetector {
    fn check_transaction(txn: &Transaction, options: &AnalysisOptions) -> Option<AnomalyFinding> {
        let posting = txn.posting_date;
        let own_end = month_end(posting)?;
        let window = options.closing_window_days as i64;
        let grace = options.closing_grace_days as i64;

        let days_to_end = own_end.signed_duration_since(posting).num_days();
        let (boundary, days_from_month_end, proximity) = if days_to_end <= window {
            (own_end, -days_to_end, proximity_score(days_to_end, window))
        } else {
            // Start of month: measure against the previous month's end.
            let prev_end = posting.with_day(1)?.pred_opt()?;
            let days_after = posting.signed_duration_since(prev_end).num_days();
            if days_after > grace {
                return None;
            }
            (prev_end, days_after, proximity_score(days_after, grace))
        };

        let high_value = txn.is_high_value(options.high_value_threshold);
        let mut risk_score = BASE_SCORE.saturating_add(proximity);
        if high_value {
            risk_score = risk_score.saturating_add(HIGH_VALUE_BONUS);
        }
        let risk_score = risk_score.min(100);

        Some(AnomalyFinding {
            detector: DetectorKind::ClosingPeriod,
            transaction_id: txn.id.clone(),
            amount: txn.amount,
            risk_score,
            risk_level: RiskLevel::from_score(risk_score),
            risk_factors: vec![
                "month-end closing period".to_string(),
                if high_value { "high value" } else { "normal value" }.to_string(),
            ],
            detail: FindingDetail::ClosingPeriod {
                month_end: boundary,
                days_from_month_end,
            },
        })
    }
}

impl AnomalyDetector for ClosingPeriodDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::ClosingPeriod
    }

    fn scan(
        &self,
        snapshot: &TransactionSnapshot,
        options: &AnalysisOptions,
        deadline: &Deadline,
    ) -> AuditResult<DetectorOutput> {
        let mut findings = Vec::new();
        for (i, txn) in snapshot.well_formed().enumerate() {
            if i % DEADLINE_STRIDE == 0 {
                deadline.check()?;
            }
            if let Some(finding) = Self::check_transaction(txn, options) {
                findings.push(finding);
            }
        }
        log::debug!(
            "dataset={} detector=closing_period findings={}",
            snapshot.dataset_key(),
            findings.len()
        );
        Ok(DetectorOutput::from_findings(
            DetectorKind::ClosingPeriod,
            findings,
        ))
    }
}
