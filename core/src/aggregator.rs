//! Risk aggregation.
//!
//! Merges the classifier, the model, and every detector into one
//! report with a single weighted score. Weights are relative, not
//! normalized: they sum to 83, so even a board of all-100 subscores
//! lands at 83 before the clamp. Keeping them as-is preserves the
//! scale audits have been calibrated against.
//!
//! RULE: report content is a pure function of (snapshot, options,
//! detector outputs). No timestamps, no randomness; identical inputs
//! must serialize to identical bytes.

use crate::config::AnalysisOptions;
use crate::detector::{AnomalyFinding, DetectorKind, DetectorOutput};
use crate::duplicates::DuplicateReport;
use crate::model::{DuplicatePrediction, ModelStatus};
use crate::risk::{clamp_score, RiskLevel};
use crate::transaction::TransactionSnapshot;
use crate::types::DatasetKey;
use crate::user_activity::{UserActivityFinding, UserActivityOutput};
use serde::{Deserialize, Serialize};

// ── Signal weights ─────────────────────────────────────────────────

const WEIGHT_DUPLICATES: u32 = 25;
const WEIGHT_BACKDATED: u32 = 20;
const WEIGHT_USER_ACTIVITY: u32 = 15;
const WEIGHT_CLOSING_PERIOD: u32 = 10;
const WEIGHT_UNUSUAL_DAY: u32 = 8;
const WEIGHT_HOLIDAY: u32 = 5;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskSignal {
    Duplicates,
    Backdated,
    UserActivity,
    ClosingPeriod,
    UnusualDay,
    Holiday,
}

impl RiskSignal {
    /// Weight order, heaviest first. Also the breakdown row order.
    pub const ALL: [RiskSignal; 6] = [
        RiskSignal::Duplicates,
        RiskSignal::Backdated,
        RiskSignal::UserActivity,
        RiskSignal::ClosingPeriod,
        RiskSignal::UnusualDay,
        RiskSignal::Holiday,
    ];

    pub fn weight(&self) -> u32 {
        match self {
            RiskSignal::Duplicates => WEIGHT_DUPLICATES,
            RiskSignal::Backdated => WEIGHT_BACKDATED,
            RiskSignal::UserActivity => WEIGHT_USER_ACTIVITY,
            RiskSignal::ClosingPeriod => WEIGHT_CLOSING_PERIOD,
            RiskSignal::UnusualDay => WEIGHT_UNUSUAL_DAY,
            RiskSignal::Holiday => WEIGHT_HOLIDAY,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RiskSignal::Duplicates => "duplicates",
            RiskSignal::Backdated => "backdated",
            RiskSignal::UserActivity => "user_activity",
            RiskSignal::ClosingPeriod => "closing_period",
            RiskSignal::UnusualDay => "unusual_day",
            RiskSignal::Holiday => "holiday",
        }
    }

    fn from_detector(kind: DetectorKind) -> RiskSignal {
        match kind {
            DetectorKind::Backdated => RiskSignal::Backdated,
            DetectorKind::ClosingPeriod => RiskSignal::ClosingPeriod,
            DetectorKind::UnusualDay => RiskSignal::UnusualDay,
            DetectorKind::Holiday => RiskSignal::Holiday,
            DetectorKind::UserActivity => RiskSignal::UserActivity,
        }
    }
}

// ── Report shape ───────────────────────────────────────────────────

/// One row per signal, fixed order, skipped signals included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalBreakdown {
    pub signal: RiskSignal,
    pub weight: u32,
    /// Groups for duplicates, findings otherwise.
    pub count: usize,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub skipped: bool,
}

/// One row in the ranked top-risk list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopRisk {
    pub signal: RiskSignal,
    /// Group key, transaction id, or user name depending on signal.
    pub reference: String,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub amount: f64,
    pub summary: String,
}

/// The engine's sole output. Callers own it outright; the engine keeps
/// nothing back except the cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskReport {
    pub dataset_key: DatasetKey,
    pub transaction_count: usize,
    /// Malformed records excluded from every detector.
    pub excluded_records: usize,
    pub overall_score: u8,
    pub overall_level: RiskLevel,
    pub breakdown: Vec<SignalBreakdown>,
    pub duplicates: DuplicateReport,
    /// Temporal findings flattened in detector order.
    pub findings: Vec<AnomalyFinding>,
    pub user_findings: Vec<UserActivityFinding>,
    /// Empty whenever no trained model was available.
    pub predictions: Vec<DuplicatePrediction>,
    pub model_status: ModelStatus,
    pub top_risks: Vec<TopRisk>,
}

// ── Aggregation ────────────────────────────────────────────────────

pub fn aggregate(
    snapshot: &TransactionSnapshot,
    options: &AnalysisOptions,
    duplicates: DuplicateReport,
    detector_outputs: Vec<DetectorOutput>,
    user_output: Option<UserActivityOutput>,
    predictions: Vec<DuplicatePrediction>,
    model_status: ModelStatus,
) -> RiskReport {
    // Duplicates lean on the blended scores when a model ran, otherwise
    // the pure rule scores.
    let duplicates_score = if predictions.is_empty() {
        duplicates.max_group_score()
    } else {
        predictions.iter().map(|p| p.blended_risk).max().unwrap_or(0)
    };

    let mut breakdown = Vec::with_capacity(RiskSignal::ALL.len());
    let mut weighted_sum = 0.0;
    for signal in RiskSignal::ALL {
        let (count, risk_score, skipped) = match signal {
            RiskSignal::Duplicates => (duplicates.group_count(), duplicates_score, false),
            RiskSignal::UserActivity => match &user_output {
                Some(output) => (output.findings.len(), output.risk_score, false),
                None => (0, 0, true),
            },
            _ => {
                let output = detector_outputs
                    .iter()
                    .find(|o| RiskSignal::from_detector(o.kind) == signal);
                match output {
                    Some(output) => (output.count(), output.risk_score, false),
                    None => (0, 0, true),
                }
            }
        };
        weighted_sum += signal.weight() as f64 * risk_score as f64 / 100.0;
        breakdown.push(SignalBreakdown {
            signal,
            weight: signal.weight(),
            count,
            risk_score,
            risk_level: RiskLevel::from_score(risk_score),
            skipped,
        });
    }
    let overall_score = clamp_score(weighted_sum);
    let overall_level = RiskLevel::from_score(overall_score);

    let findings: Vec<AnomalyFinding> = detector_outputs
        .into_iter()
        .flat_map(|o| o.findings)
        .collect();
    let user_findings = user_output.map(|o| o.findings).unwrap_or_default();
    let top_risks = rank_top_risks(&duplicates, &findings, &user_findings, options);

    log::info!(
        "dataset={} overall_score={} level={} groups={} findings={} flagged_users={}",
        snapshot.dataset_key(),
        overall_score,
        overall_level,
        duplicates.group_count(),
        findings.len(),
        user_findings.len()
    );

    RiskReport {
        dataset_key: snapshot.dataset_key().to_string(),
        transaction_count: snapshot.len(),
        excluded_records: snapshot.malformed_count(),
        overall_score,
        overall_level,
        breakdown,
        duplicates,
        findings,
        user_findings,
        predictions,
        model_status,
        top_risks,
    }
}

/// Rank groups, findings, and flagged users together: score first,
/// then amount magnitude, then reference for a stable total order.
fn rank_top_risks(
    duplicates: &DuplicateReport,
    findings: &[AnomalyFinding],
    user_findings: &[UserActivityFinding],
    options: &AnalysisOptions,
) -> Vec<TopRisk> {
    let mut risks = Vec::new();
    for group in &duplicates.groups {
        risks.push(TopRisk {
            signal: RiskSignal::Duplicates,
            reference: format!("{} {}", group.duplicate_type.code(), group.key),
            risk_score: group.risk_score,
            risk_level: group.risk_level,
            amount: group.total_amount,
            summary: format!(
                "{} postings sharing {}",
                group.member_count,
                group.duplicate_type.label()
            ),
        });
    }
    for finding in findings {
        risks.push(TopRisk {
            signal: RiskSignal::from_detector(finding.detector),
            reference: finding.transaction_id.clone(),
            risk_score: finding.risk_score,
            risk_level: finding.risk_level,
            amount: finding.amount,
            summary: finding.risk_factors.join(", "),
        });
    }
    for finding in user_findings {
        risks.push(TopRisk {
            signal: RiskSignal::UserActivity,
            reference: finding.user_name.clone(),
            risk_score: finding.risk_score,
            risk_level: finding.risk_level,
            amount: finding.stats.total_amount,
            summary: finding.risk_factors.join(", "),
        });
    }

    risks.sort_by(|a, b| {
        b.risk_score
            .cmp(&a.risk_score)
            .then_with(|| b.amount.abs().total_cmp(&a.amount.abs()))
            .then_with(|| a.reference.cmp(&b.reference))
    });
    risks.truncate(options.top_risks_limit);
    risks
}
