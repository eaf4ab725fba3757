//! Shared risk-level thresholds.
//!
//! RULE: Every 0-100 score in the engine maps to a level through this
//! one ladder. A duplicate group, an anomaly finding, and the overall
//! report all mean the same thing by "high".

use serde::{Deserialize, Serialize};

pub const MEDIUM_FLOOR: u8 = 40;
pub const HIGH_FLOOR: u8 = 70;
pub const CRITICAL_FLOOR: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        if score >= CRITICAL_FLOOR {
            Self::Critical
        } else if score >= HIGH_FLOOR {
            Self::High
        } else if score >= MEDIUM_FLOOR {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Clamp a working score into the 0-100 integer range every report
/// field uses.
pub fn clamp_score(raw: f64) -> u8 {
    raw.clamp(0.0, 100.0).round() as u8
}
