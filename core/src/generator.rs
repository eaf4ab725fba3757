//! Synthetic ledger generation.
//!
//! Builds a deterministic ledger for a (seed, profile) pair: a base
//! population of ordinary postings plus a planted layer of duplicates
//! and backdated entries, so a generated dataset always gives the
//! detectors something to find.
//!
//! RULE: ledger content draws no platform RNG — every value flows
//! through LedgerRng streams. Dataset keys are identity, not content,
//! and are the one place a platform UUID is allowed.

use crate::rng::LedgerRng;
use crate::transaction::{Transaction, TransactionKind};
use crate::types::DatasetKey;
use chrono::{Datelike, Duration, NaiveDate};
use uuid::Uuid;

// Stable phase indices. Append only; reordering reshuffles every
// existing dataset.
const PHASE_BASE: u64 = 0;
const PHASE_DUPLICATES: u64 = 1;

const GL_ACCOUNTS: [&str; 8] = [
    "400100", "400200", "410500", "510300", "520100", "600250", "610400", "700800",
];
const USERS: [&str; 6] = [
    "JSMITH", "MALVAREZ", "TCHEN", "RPATEL", "DOKONKWO", "LNOVAK",
];
const VENDORS: [&str; 8] = [
    "Acme Industrial Supply",
    "Borealis Freight",
    "Cardinal Office Systems",
    "Delta Facilities Group",
    "Evergreen Catering",
    "Foxglove Consulting",
    "Granite IT Services",
    "Harbor Light Energy",
];
const DOCUMENT_TYPES: [&str; 5] = ["KR", "RE", "SA", "DR", "KG"];

#[derive(Debug, Clone)]
pub struct GeneratorProfile {
    pub transaction_count: usize,
    pub start: NaiveDate,
    /// Posting dates spread uniformly over this many days from start.
    pub days: u32,
    /// Fraction of the base population cloned as planted duplicates.
    pub duplicate_rate: f64,
    pub backdate_rate: f64,
    pub backdate_max_days: u64,
    pub high_value_rate: f64,
    pub missing_document_date_rate: f64,
    pub blank_account_rate: f64,
    pub credit_rate: f64,
    pub currency: String,
}

impl Default for GeneratorProfile {
    fn default() -> Self {
        Self {
            transaction_count: 500,
            start: NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid calendar date"),
            days: 90,
            duplicate_rate: 0.06,
            backdate_rate: 0.05,
            backdate_max_days: 45,
            high_value_rate: 0.02,
            missing_document_date_rate: 0.05,
            blank_account_rate: 0.01,
            credit_rate: 0.20,
            currency: "USD".to_string(),
        }
    }
}

/// Generate a full dataset. Identical (seed, profile) pairs produce
/// identical ledgers, planted anomalies included.
pub fn generate(seed: u64, profile: &GeneratorProfile) -> Vec<Transaction> {
    let mut base = LedgerRng::stream(seed, PHASE_BASE);
    let planted = (profile.transaction_count as f64 * profile.duplicate_rate).round() as usize;
    let mut transactions = Vec::with_capacity(profile.transaction_count + planted);

    for i in 0..profile.transaction_count {
        let offset = base.next_u64_below(profile.days.max(1) as u64) as i64;
        let posting_date = profile.start + Duration::days(offset);

        let magnitude = if base.chance(profile.high_value_rate) {
            base.pareto(1_200_000.0, 1.2).min(25_000_000.0)
        } else {
            base.pareto(50.0, 1.4).min(900_000.0)
        };
        let magnitude = (magnitude * 100.0).round() / 100.0;
        let is_credit = base.chance(profile.credit_rate);
        let amount = if is_credit { -magnitude } else { magnitude };

        // A slice of postings has no paper trail; a smaller slice is
        // genuinely backdated against its document.
        let document_date = if base.chance(profile.missing_document_date_rate) {
            None
        } else if base.chance(profile.backdate_rate) {
            let lag = 1 + base.next_u64_below(profile.backdate_max_days.max(1)) as i64;
            Some(posting_date - Duration::days(lag))
        } else {
            Some(posting_date)
        };

        let gl_account = if base.chance(profile.blank_account_rate) {
            String::new()
        } else {
            (*base.pick(&GL_ACCOUNTS)).to_string()
        };
        let vendor = *base.pick(&VENDORS);
        let document_type = *base.pick(&DOCUMENT_TYPES);

        transactions.push(Transaction {
            id: format!("txn-{i:06}"),
            gl_account,
            amount,
            transaction_type: if is_credit {
                TransactionKind::Credit
            } else {
                TransactionKind::Debit
            },
            currency: profile.currency.clone(),
            posting_date,
            document_date,
            document_number: format!("DOC-{:07}", i + 1),
            document_type: document_type.to_string(),
            reference: format!("INV-{:05}", base.next_u64_below(99_999)),
            vendor: vendor.to_string(),
            user_name: (*base.pick(&USERS)).to_string(),
            description: format!("{vendor} {document_type} posting"),
            fiscal_year: posting_date.year(),
            fiscal_period: posting_date.month() as u8,
        });
    }

    // Planted duplicates: clone live postings under fresh ids. Even
    // plants keep the original user (hits every key type), odd plants
    // re-post under another user (hits the user-free types only).
    let mut dup = LedgerRng::stream(seed, PHASE_DUPLICATES);
    for k in 0..planted {
        let source = dup.next_u64_below(transactions.len() as u64) as usize;
        let mut clone = transactions[source].clone();
        clone.id = format!("txn-d{k:04}");
        clone.document_number = format!("DOC-D{k:05}");
        if k % 2 == 1 {
            clone.user_name = (*dup.pick(&USERS)).to_string();
        }
        transactions.push(clone);
    }

    transactions
}

/// Process-unique key for ad hoc runs without a caller-supplied
/// dataset identifier.
pub fn fresh_dataset_key() -> DatasetKey {
    format!("dataset-{}", Uuid::new_v4())
}
