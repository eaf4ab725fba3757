//! Holiday posting detector.
//!
//! Purely calendar-driven: a posting is flagged when its posting date
//! appears in the configured holiday set. No calendar configured means
//! no findings, never an error. Risk is mostly categorical, with a
//! high-value bonus as the only modifier.

use crate::config::AnalysisOptions;
use crate::detector::{
    AnomalyDetector, AnomalyFinding, Deadline, DetectorKind, DetectorOutput, FindingDetail,
    DEADLINE_STRIDE,
};
use crate::error::AuditResult;
use crate::risk::RiskLevel;
use crate::transaction::TransactionSnapshot;

const BASE_SCORE: u8 = 60;
const HIGH_VALUE_BONUS: u8 = 30;

pub struct HolidayDetector;

impl AnomalyDetector for HolidayDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Holiday
    }

    fn scan(
        &self,
        snapshot: &TransactionSnapshot,
        options: &AnalysisOptions,
        deadline: &Deadline,
    ) -> AuditResult<DetectorOutput> {
        let mut findings = Vec::new();
        if !options.holiday_calendar.is_empty() {
            for (i, txn) in snapshot.well_formed().enumerate() {
                if i % DEADLINE_STRIDE == 0 {
                    deadline.check()?;
                }
                if !options.holiday_calendar.contains(&txn.posting_date) {
                    continue;
                }
                let high_value = txn.is_high_value(options.high_value_threshold);
                let mut risk_score = BASE_SCORE;
                if high_value {
                    risk_score = risk_score.saturating_add(HIGH_VALUE_BONUS);
                }
                findings.push(AnomalyFinding {
                    detector: DetectorKind::Holiday,
                    transaction_id: txn.id.clone(),
                    amount: txn.amount,
                    risk_score,
                    risk_level: RiskLevel::from_score(risk_score),
                    risk_factors: vec![
                        format!("posted on holiday {}", txn.posting_date),
                        if high_value { "high value" } else { "normal value" }.to_string(),
                    ],
                    detail: FindingDetail::Holiday {
                        holiday: txn.posting_date,
                    },
                });
            }
        }
        log::debug!(
            "dataset={} detector=holiday findings={}",
            snapshot.dataset_key(),
            findings.len()
        );
        Ok(DetectorOutput::from_findings(DetectorKind::Holiday, findings))
    }
}
