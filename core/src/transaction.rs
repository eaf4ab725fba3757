//! Ledger transaction records and the immutable analysis snapshot.
//!
//! RULE: A snapshot is built once per dataset and never mutated.
//! Every detector and the model read the same ordered view, which is
//! what makes identical inputs produce identical reports.

use crate::types::{DatasetKey, TransactionId};
use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Grouping key part used when `gl_account` is blank. Blank accounts
/// collapse onto one sentinel, so unrelated missing-account postings can
/// end up in the same group.
pub const UNKNOWN_ACCOUNT: &str = "UNKNOWN";

/// How a blank account is rendered in group keys and findings. Never a
/// real account id.
pub const MISSING_ACCOUNT_LABEL: &str = "MISSING";

/// Debit/credit indicator as ingested. Independent of the amount's
/// sign: source systems post both sides with positive amounts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionKind {
    Debit,
    Credit,
    #[default]
    Unknown,
}

/// One posted ledger line, exactly as ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub gl_account: String,
    /// Signed amount in local currency.
    pub amount: f64,
    #[serde(default)]
    pub transaction_type: TransactionKind,
    pub currency: String,
    pub posting_date: NaiveDate,
    /// Source document date; absent for postings with no paper trail.
    pub document_date: Option<NaiveDate>,
    pub document_number: String,
    pub document_type: String,
    pub reference: String,
    pub vendor: String,
    pub user_name: String,
    pub description: String,
    pub fiscal_year: i32,
    pub fiscal_period: u8,
}

impl Transaction {
    pub fn is_debit(&self) -> bool {
        self.transaction_type == TransactionKind::Debit
    }

    pub fn is_credit(&self) -> bool {
        self.transaction_type == TransactionKind::Credit
    }

    /// Account value used inside grouping keys.
    pub fn account_key(&self) -> &str {
        if self.gl_account.trim().is_empty() {
            UNKNOWN_ACCOUNT
        } else {
            &self.gl_account
        }
    }

    /// Account string for reports and rendered keys.
    pub fn account_label(&self) -> &str {
        if self.gl_account.trim().is_empty() {
            MISSING_ACCOUNT_LABEL
        } else {
            &self.gl_account
        }
    }

    /// Minor-unit amount for grouping. f64 cannot be a map key; rounding
    /// to cents makes equal ledger amounts compare equal.
    pub fn amount_cents(&self) -> i64 {
        (self.amount * 100.0).round() as i64
    }

    pub fn is_high_value(&self, threshold: f64) -> bool {
        self.amount.abs() > threshold
    }

    /// A record no detector can score (non-finite amount).
    pub fn is_malformed(&self) -> bool {
        !self.amount.is_finite()
    }

    pub fn weekday(&self) -> Weekday {
        use chrono::Datelike;
        self.posting_date.weekday()
    }
}

/// Immutable, ordered view over one dataset's transactions.
#[derive(Debug, Clone)]
pub struct TransactionSnapshot {
    dataset_key: DatasetKey,
    transactions: Vec<Transaction>,
    malformed: usize,
}

impl TransactionSnapshot {
    /// Build a snapshot from an unordered batch. Sorting by id means two
    /// permutations of the same batch produce the same snapshot.
    pub fn new(dataset_key: impl Into<DatasetKey>, mut transactions: Vec<Transaction>) -> Self {
        let dataset_key = dataset_key.into();
        transactions.sort_by(|a, b| a.id.cmp(&b.id));
        let mut malformed = 0;
        for t in &transactions {
            if t.is_malformed() {
                malformed += 1;
                log::warn!(
                    "dataset={} transaction {} has a non-finite amount; detectors will skip it",
                    dataset_key,
                    t.id
                );
            }
        }
        Self {
            dataset_key,
            transactions,
            malformed,
        }
    }

    pub fn dataset_key(&self) -> &str {
        &self.dataset_key
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Records excluded from every detector (malformed on ingest).
    pub fn malformed_count(&self) -> usize {
        self.malformed
    }

    /// All records in id order, malformed included.
    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter()
    }

    /// Records that can be scored.
    pub fn well_formed(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter().filter(|t| !t.is_malformed())
    }
}
