//! Unusual posting-day detector.
//!
//! Flags postings whose weekday falls outside the expected business
//! pattern. The default pattern treats Saturday and Sunday as unusual;
//! engagements in regions with other working weeks override it.

use crate::config::AnalysisOptions;
use crate::detector::{
    AnomalyDetector, AnomalyFinding, Deadline, DetectorKind, DetectorOutput, FindingDetail,
    DEADLINE_STRIDE,
};
use crate::error::AuditResult;
use crate::risk::RiskLevel;
use crate::transaction::TransactionSnapshot;
use chrono::Weekday;

const BASE_SCORE: u8 = 40;
const HIGH_VALUE_BONUS: u8 = 25;

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

pub struct UnusualDayDetector;

impl AnomalyDetector for UnusualDayDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::UnusualDay
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
            let day = txn.weekday();
            if !options.unusual_days.contains(&day) {
                continue;
            }
            let high_value = txn.is_high_value(options.high_value_threshold);
            let mut risk_score = BASE_SCORE;
            if high_value {
                risk_score = risk_score.saturating_add(HIGH_VALUE_BONUS);
            }
            findings.push(AnomalyFinding {
                detector: DetectorKind::UnusualDay,
                transaction_id: txn.id.clone(),
                amount: txn.amount,
                risk_score,
                risk_level: RiskLevel::from_score(risk_score),
                risk_factors: vec![
                    format!("posted on {}", weekday_name(day)),
                    if high_value { "high value" } else { "normal value" }.to_string(),
                ],
                detail: FindingDetail::UnusualDay {
                    weekday: weekday_name(day).to_string(),
                },
            });
        }
        log::debug!(
            "dataset={} detector=unusual_day findings={}",
            snapshot.dataset_key(),
            findings.len()
        );
        Ok(DetectorOutput::from_findings(
            DetectorKind::UnusualDay,
            findings,
        ))
    }
}
