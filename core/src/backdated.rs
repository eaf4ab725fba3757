//! Backdated entry detector.
//!
//! A posting is backdated when it lands in the ledger strictly more
//! than the configured gap after its document date. Risk grows two
//! points per day late, capped at 100, so anything 20+ days late is
//! already MEDIUM and 35+ days is HIGH.

use crate::config::AnalysisOptions;
use crate::detector::{
    AnomalyDetector, AnomalyFinding, Deadline, DetectorKind, DetectorOutput, FindingDetail,
    DEADLINE_STRIDE,
};
use crate::error::AuditResult;
use crate::risk::RiskLevel;
use crate::transaction::TransactionSnapshot;

pub struct BackdatedDetector;

impl AnomalyDetector for BackdatedDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Backdated
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
            // No document date, nothing to compare against.
            let Some(document_date) = txn.document_date else {
                continue;
            };
            let days_late = txn
                .posting_date
                .signed_duration_since(document_date)
                .num_days();
            if days_late <= options.backdated_gap_days {
                continue;
            }
            let risk_score = days_late.saturating_mul(2).clamp(0, 100) as u8;
            findings.push(AnomalyFinding {
                detector: DetectorKind::Backdated,
                transaction_id: txn.id.clone(),
                amount: txn.amount,
                risk_score,
                risk_level: RiskLevel::from_score(risk_score),
                risk_factors: vec![format!("posted {days_late} days after document date")],
                detail: FindingDetail::Backdated {
                    posting_date: txn.posting_date,
                    document_date,
                    days_backdated: days_late,
                },
            });
        }
        log::debug!(
            "dataset={} detector=backdated findings={}",
            snapshot.dataset_key(),
            findings.len()
        );
        Ok(DetectorOutput::from_findings(DetectorKind::Backdated, findings))
    }
}
