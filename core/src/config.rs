//! Analysis options.
//!
//! One options value flows through the classifier, the model, and every
//! detector. Embedders and tests construct it directly; audit-runner can
//! also load it from a JSON file with missing fields taking defaults.

use crate::detector::DetectorKind;
use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ── Defaults ───────────────────────────────────────────────────────

/// Minimum group size for every duplicate type, and the floor applied
/// to configured thresholds. A posting is never a duplicate of itself.
pub const DEFAULT_DUPLICATE_THRESHOLD: usize = 2;
/// Absolute amounts above this count as high value for the temporal and
/// user-activity detectors.
pub const DEFAULT_HIGH_VALUE_THRESHOLD: f64 = 1_000_000.0;
/// Days before month end that fall in the closing window.
pub const DEFAULT_CLOSING_WINDOW_DAYS: u32 = 3;
/// Days after the previous month end that still count as closing.
pub const DEFAULT_CLOSING_GRACE_DAYS: u32 = 2;
/// Ranked entries kept in a report's top-risk list.
pub const DEFAULT_TOP_RISKS_LIMIT: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Minimum members for a duplicate group. Values below 2 are lifted
    /// to 2 by [`AnalysisOptions::effective_threshold`].
    pub duplicate_threshold: usize,
    /// A posting is backdated when it lands strictly more than this many
    /// days after its document date.
    pub backdated_gap_days: i64,
    pub closing_window_days: u32,
    pub closing_grace_days: u32,
    /// Posting weekdays considered unusual.
    pub unusual_days: Vec<Weekday>,
    /// Explicit holiday dates. Empty means the holiday detector finds
    /// nothing, which is not an error.
    pub holiday_calendar: BTreeSet<NaiveDate>,
    /// User names whose activity is always escalated.
    pub users_of_interest: BTreeSet<String>,
    pub high_value_threshold: f64,
    pub top_risks_limit: usize,
    /// Detectors to leave out of this analysis. A skipped detector scores
    /// zero and is marked as skipped in the report breakdown.
    pub skip_detectors: BTreeSet<DetectorKind>,
    /// When false, analyze() never trains the model on its own.
    /// Force-train is unaffected.
    pub auto_train: bool,
    /// Optional compute budget for one analysis. Scan loops check it
    /// cooperatively and the whole analysis aborts when it runs out.
    pub compute_budget_ms: Option<u64>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            duplicate_threshold: DEFAULT_DUPLICATE_THRESHOLD,
            backdated_gap_days: 0,
            closing_window_days: DEFAULT_CLOSING_WINDOW_DAYS,
            closing_grace_days: DEFAULT_CLOSING_GRACE_DAYS,
            unusual_days: vec![Weekday::Sat, Weekday::Sun],
            holiday_calendar: BTreeSet::new(),
            users_of_interest: BTreeSet::new(),
            high_value_threshold: DEFAULT_HIGH_VALUE_THRESHOLD,
            top_risks_limit: DEFAULT_TOP_RISKS_LIMIT,
            skip_detectors: BTreeSet::new(),
            auto_train: true,
            compute_budget_ms: None,
        }
    }
}

impl AnalysisOptions {
    /// Load options from a JSON file.
    /// In tests, use AnalysisOptions::default().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn is_skipped(&self, kind: DetectorKind) -> bool {
        self.skip_detectors.contains(&kind)
    }

    /// Configured duplicate threshold with the floor of 2 applied.
    pub fn effective_threshold(&self) -> usize {
        self.duplicate_threshold.max(DEFAULT_DUPLICATE_THRESHOLD)
    }
}
