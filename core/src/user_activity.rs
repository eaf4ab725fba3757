//! Per-user activity profiling.
//!
//! Unlike the temporal detectors this one scores users, not postings:
//! it accumulates one profile per user name and flags profiles whose
//! combined behaviour crosses the volume, spread, or watch-list
//! checks. Scores are additive across checks and capped at 100.

use crate::config::AnalysisOptions;
use crate::detector::{Deadline, DEADLINE_STRIDE};
use crate::error::AuditResult;
use crate::risk::RiskLevel;
use crate::transaction::TransactionSnapshot;
use crate::types::UserName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::BTreeSet;

// ── Checks ─────────────────────────────────────────────────────────

const VOLUME_THRESHOLD: usize = 500;
const VOLUME_SCORE: u8 = 15;
const HIGH_VALUE_COUNT_THRESHOLD: usize = 25;
const HIGH_VALUE_COUNT_SCORE: u8 = 20;
const ACCOUNT_SPREAD_THRESHOLD: usize = 50;
const ACCOUNT_SPREAD_SCORE: u8 = 10;
const DOCUMENT_TYPE_THRESHOLD: usize = 20;
const DOCUMENT_TYPE_SCORE: u8 = 8;
const USER_OF_INTEREST_SCORE: u8 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserActivityStats {
    pub transaction_count: usize,
    pub total_amount: f64,
    pub unique_accounts: usize,
    pub unique_document_types: usize,
    pub high_value_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserActivityFinding {
    pub user_name: UserName,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub risk_factors: Vec<String>,
    pub stats: UserActivityStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserActivityOutput {
    /// Flagged users, worst first.
    pub findings: Vec<UserActivityFinding>,
    /// Worst flagged user, 0 when nobody crossed a check.
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    /// Distinct user names seen, flagged or not.
    pub profiled_users: usize,
}

#[derive(Default)]
struct Accum<'a> {
    count: usize,
    total_amount: f64,
    accounts: BTreeSet<&'a str>,
    document_types: BTreeSet<&'a str>,
    high_value_count: usize,
}

pub struct UserActivityDetector;

impl UserActivityDetector {
    pub fn scan(
        snapshot: &TransactionSnapshot,
        options: &AnalysisOptions,
        deadline: &Deadline,
    ) -> AuditResult<UserActivityOutput> {
        let mut profiles: BTreeMap<&str, Accum> = BTreeMap::new();
        for (i, txn) in snapshot.well_formed().enumerate() {
            if i % DEADLINE_STRIDE == 0 {
                deadline.check()?;
            }
            // A posting with no user carries no behaviour to profile.
            if txn.user_name.trim().is_empty() {
                continue;
            }
            let profile = profiles.entry(txn.user_name.as_str()).or_default();
            profile.count += 1;
            profile.total_amount += txn.amount;
            profile.accounts.insert(txn.account_key());
            profile.document_types.insert(txn.document_type.as_str());
            if txn.is_high_value(options.high_value_threshold) {
                profile.high_value_count += 1;
            }
        }

        let profiled_users = profiles.len();
        let mut findings = Vec::new();
        for (user, profile) in &profiles {
            let mut risk_score: u8 = 0;
            let mut risk_factors = Vec::new();

            if profile.count > VOLUME_THRESHOLD {
                risk_score += VOLUME_SCORE;
                risk_factors.push("very high transaction volume".to_string());
            }
            if profile.high_value_count > HIGH_VALUE_COUNT_THRESHOLD {
                risk_score += HIGH_VALUE_COUNT_SCORE;
                risk_factors.push("multiple high-value transactions".to_string());
            }
            if profile.accounts.len() > ACCOUNT_SPREAD_THRESHOLD {
                risk_score += ACCOUNT_SPREAD_SCORE;
                risk_factors.push("very wide account usage".to_string());
            }
            if profile.document_types.len() > DOCUMENT_TYPE_THRESHOLD {
                risk_score += DOCUMENT_TYPE_SCORE;
                risk_factors.push("multiple document types".to_string());
            }
            if options.users_of_interest.contains(*user) {
                risk_score += USER_OF_INTEREST_SCORE;
                risk_factors.push("user of interest".to_string());
            }

            if risk_score == 0 {
                continue;
            }
            let risk_score = risk_score.min(100);
            findings.push(UserActivityFinding {
                user_name: (*user).to_string(),
                risk_score,
                risk_level: RiskLevel::from_score(risk_score),
                risk_factors,
                stats: UserActivityStats {
                    transaction_count: profile.count,
                    total_amount: profile.total_amount,
                    unique_accounts: profile.accounts.len(),
                    unique_document_types: profile.document_types.len(),
                    high_value_count: profile.high_value_count,
                },
            });
        }

        findings.sort_by(|a, b| {
            b.risk_score
                .cmp(&a.risk_score)
                .then_with(|| a.user_name.cmp(&b.user_name))
        });
        let risk_score = findings.first().map(|f| f.risk_score).unwrap_or(0);
        log::debug!(
            "dataset={} detector=user_activity profiled={} flagged={}",
            snapshot.dataset_key(),
            profiled_users,
            findings.len()
        );
        Ok(UserActivityOutput {
            findings,
            risk_score,
            risk_level: RiskLevel::from_score(risk_score),
            profiled_users,
        })
    }
}
