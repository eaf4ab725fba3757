//! Shared contract for the temporal anomaly detectors.
//!
//! Each detector walks one snapshot, emits zero or more findings, and
//! reports a subscore equal to its single worst finding. Detectors never
//! see each other's output; the aggregator combines them.
//!
//! RULE: Detectors receive the snapshot read-only and must not mutate
//! analysis state. All tuning arrives through AnalysisOptions.

use crate::config::AnalysisOptions;
use crate::error::{AuditError, AuditResult};
use crate::risk::RiskLevel;
use crate::transaction::TransactionSnapshot;
use crate::types::TransactionId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

// ── Deadline ───────────────────────────────────────────────────────

/// Scan loops consult the deadline once per this many records.
pub const DEADLINE_STRIDE: usize = 256;

/// Cooperative compute budget for one analysis.
///
/// Checks are cheap (one clock read) but still batched behind
/// [`DEADLINE_STRIDE`] so tight loops stay tight.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    /// A deadline that never fires.
    pub fn none() -> Self {
        Self {
            started: Instant::now(),
            budget: None,
        }
    }

    /// A deadline that fires once `ms` milliseconds have elapsed.
    /// A budget of zero fires on the first check.
    pub fn after_ms(ms: u64) -> Self {
        Self {
            started: Instant::now(),
            budget: Some(Duration::from_millis(ms)),
        }
    }

    pub fn from_options(options: &AnalysisOptions) -> Self {
        match options.compute_budget_ms {
            Some(ms) => Self::after_ms(ms),
            None => Self::none(),
        }
    }

    /// Err(DeadlineExceeded) once the budget is spent.
    pub fn check(&self) -> AuditResult<()> {
        if let Some(budget) = self.budget {
            let elapsed = self.started.elapsed();
            if elapsed >= budget {
                return Err(AuditError::DeadlineExceeded {
                    elapsed_ms: elapsed.as_millis() as u64,
                });
            }
        }
        Ok(())
    }
}

// ── Detector identity ──────────────────────────────────────────────

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    Backdated,
    ClosingPeriod,
    UnusualDay,
    Holiday,
    UserActivity,
}

impl DetectorKind {
    pub fn name(&self) -> &'static str {
        match self {
            DetectorKind::Backdated => "backdated",
            DetectorKind::ClosingPeriod => "closing_period",
            DetectorKind::UnusualDay => "unusual_day",
            DetectorKind::Holiday => "holiday",
            DetectorKind::UserActivity => "user_activity",
        }
    }
}

// ── Findings ───────────────────────────────────────────────────────

/// Detector-specific evidence attached to a finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FindingDetail {
    Backdated {
        posting_date: NaiveDate,
        document_date: NaiveDate,
        days_backdated: i64,
    },
    ClosingPeriod {
        month_end: NaiveDate,
        /// Negative inside the pre-close window, positive in the grace
        /// days after it.
        days_from_month_end: i64,
    },
    UnusualDay {
        weekday: String,
    },
    Holiday {
        holiday: NaiveDate,
    },
}

/// One flagged posting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyFinding {
    pub detector: DetectorKind,
    pub transaction_id: TransactionId,
    pub amount: f64,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    /// Short human-readable reasons, e.g. "posted 40 days after document".
    pub risk_factors: Vec<String>,
    pub detail: FindingDetail,
}

/// Everything one detector produced for one snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorOutput {
    pub kind: DetectorKind,
    pub findings: Vec<AnomalyFinding>,
    /// Worst finding score, 0 when nothing was flagged.
    pub risk_score: u8,
    pub risk_level: RiskLevel,
}

impl DetectorOutput {
    pub fn from_findings(kind: DetectorKind, findings: Vec<AnomalyFinding>) -> Self {
        let risk_score = findings.iter().map(|f| f.risk_score).max().unwrap_or(0);
        Self {
            kind,
            findings,
            risk_score,
            risk_level: RiskLevel::from_score(risk_score),
        }
    }

    pub fn count(&self) -> usize {
        self.findings.len()
    }
}

// ── Contract ───────────────────────────────────────────────────────

pub trait AnomalyDetector: Send {
    fn kind(&self) -> DetectorKind;

    /// Scan the whole snapshot. Malformed records are already excluded
    /// by [`TransactionSnapshot::well_formed`].
    fn scan(
        &self,
        snapshot: &TransactionSnapshot,
        options: &AnalysisOptions,
        deadline: &Deadline,
    ) -> AuditResult<DetectorOutput>;
}
