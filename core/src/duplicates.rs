//! Duplicate posting classifier.
//!
//! Six fixed key types, each grouping the snapshot by a different field
//! combination. A posting can sit in groups of several types at once;
//! that overlap is intentional and is why the per-type transaction
//! counts add up to more than the unique flagged count.
//!
//! RULE: grouping keys use the amount rounded to cents, never raw f64.
//! RULE: a group's risk is min(100, member_count * type weight).

use crate::config::AnalysisOptions;
use crate::detector::{Deadline, DEADLINE_STRIDE};
use crate::error::AuditResult;
use crate::risk::RiskLevel;
use crate::transaction::{Transaction, TransactionSnapshot, MISSING_ACCOUNT_LABEL, UNKNOWN_ACCOUNT};
use crate::types::TransactionId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

// ── Key types ──────────────────────────────────────────────────────

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum DuplicateType {
    T1,
    T2,
    T3,
    T4,
    T5,
    T6,
}

impl DuplicateType {
    pub const ALL: [DuplicateType; 6] = [
        DuplicateType::T1,
        DuplicateType::T2,
        DuplicateType::T3,
        DuplicateType::T4,
        DuplicateType::T5,
        DuplicateType::T6,
    ];

    /// Risk weight: score per member, hard-capped at 100.
    pub fn weight(&self) -> u32 {
        match self {
            DuplicateType::T1 => 10,
            DuplicateType::T2 => 12,
            DuplicateType::T3 => 15,
            DuplicateType::T4 => 18,
            DuplicateType::T5 => 20,
            DuplicateType::T6 => 25,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            DuplicateType::T1 => "T1",
            DuplicateType::T2 => "T2",
            DuplicateType::T3 => "T3",
            DuplicateType::T4 => "T4",
            DuplicateType::T5 => "T5",
            DuplicateType::T6 => "T6",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DuplicateType::T1 => "account + amount",
            DuplicateType::T2 => "account + document type + amount",
            DuplicateType::T3 => "account + user + amount",
            DuplicateType::T4 => "account + posting date + amount",
            DuplicateType::T5 => "account + document date + amount",
            DuplicateType::T6 => {
                "account + document date + posting date + user + document type + amount"
            }
        }
    }

    /// Grouping key for one posting, None when a required field is
    /// missing (postings without a document date never group under T5
    /// or T6).
    fn key_for(&self, txn: &Transaction) -> Option<GroupKey> {
        let mut key = GroupKey {
            account: txn.account_key().to_string(),
            amount_cents: txn.amount_cents(),
            ..GroupKey::default()
        };
        match self {
            DuplicateType::T1 => {}
            DuplicateType::T2 => key.document_type = Some(txn.document_type.clone()),
            DuplicateType::T3 => key.user = Some(txn.user_name.clone()),
            DuplicateType::T4 => key.posting_date = Some(txn.posting_date),
            DuplicateType::T5 => key.document_date = Some(txn.document_date?),
            DuplicateType::T6 => {
                key.document_date = Some(txn.document_date?);
                key.posting_date = Some(txn.posting_date);
                key.user = Some(txn.user_name.clone());
                key.document_type = Some(txn.document_type.clone());
            }
        }
        Some(key)
    }
}

/// Flat key covering all six types. Fields a type does not use stay
/// None; every type buckets in its own map, so unset fields never
/// collide across types.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct GroupKey {
    account: String,
    amount_cents: i64,
    document_type: Option<String>,
    user: Option<String>,
    posting_date: Option<NaiveDate>,
    document_date: Option<NaiveDate>,
}

impl GroupKey {
    /// Caller-facing rendering. The blank-account sentinel comes back
    /// as the missing marker, never as an empty string.
    fn render(&self) -> String {
        let account = if self.account == UNKNOWN_ACCOUNT {
            MISSING_ACCOUNT_LABEL
        } else {
            &self.account
        };
        let mut parts = vec![
            account.to_string(),
            format!("{:.2}", self.amount_cents as f64 / 100.0),
        ];
        if let Some(document_type) = &self.document_type {
            parts.push(document_type.clone());
        }
        if let Some(user) = &self.user {
            parts.push(user.clone());
        }
        if let Some(date) = self.posting_date {
            parts.push(date.to_string());
        }
        if let Some(date) = self.document_date {
            parts.push(date.to_string());
        }
        parts.join(" / ")
    }
}

// ── Groups ─────────────────────────────────────────────────────────

/// Postings sharing one key under one type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub duplicate_type: DuplicateType,
    /// Rendered key the members share.
    pub key: String,
    /// Member ids in snapshot order.
    pub transaction_ids: Vec<TransactionId>,
    pub member_count: usize,
    /// The per-posting amount every member shares.
    pub amount: f64,
    pub total_amount: f64,
    pub debit_count: usize,
    pub credit_count: usize,
    pub debit_amount: f64,
    pub credit_amount: f64,
    pub unique_users: usize,
    pub unique_documents: usize,
    pub first_posting: NaiveDate,
    pub last_posting: NaiveDate,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
}

fn build_group(dtype: DuplicateType, key: &GroupKey, members: &[&Transaction]) -> DuplicateGroup {
    let mut total_amount = 0.0;
    let mut debit_count = 0;
    let mut credit_count = 0;
    let mut debit_amount = 0.0;
    let mut credit_amount = 0.0;
    let mut users = BTreeSet::new();
    let mut documents = BTreeSet::new();
    let mut first_posting = members[0].posting_date;
    let mut last_posting = members[0].posting_date;

    for txn in members {
        total_amount += txn.amount;
        if txn.is_debit() {
            debit_count += 1;
            debit_amount += txn.amount;
        } else if txn.is_credit() {
            credit_count += 1;
            credit_amount += txn.amount;
        }
        users.insert(txn.user_name.as_str());
        documents.insert(txn.document_number.as_str());
        first_posting = first_posting.min(txn.posting_date);
        last_posting = last_posting.max(txn.posting_date);
    }

    let risk_score = (members.len() as u32 * dtype.weight()).min(100) as u8;
    DuplicateGroup {
        duplicate_type: dtype,
        key: key.render(),
        transaction_ids: members.iter().map(|t| t.id.clone()).collect(),
        member_count: members.len(),
        amount: members[0].amount,
        total_amount,
        debit_count,
        credit_count,
        debit_amount,
        credit_amount,
        unique_users: users.len(),
        unique_documents: documents.len(),
        first_posting,
        last_posting,
        risk_score,
        risk_level: RiskLevel::from_score(risk_score),
    }
}

// ── Classifier ─────────────────────────────────────────────────────

pub struct DuplicateClassifier {
    threshold: usize,
}

impl DuplicateClassifier {
    pub fn from_options(options: &AnalysisOptions) -> Self {
        Self {
            threshold: options.effective_threshold(),
        }
    }

    /// Run all six key types over the snapshot.
    ///
    /// Group order is deterministic: by type, then highest risk first,
    /// then rendered key. Report-level ranking happens downstream.
    pub fn classify(
        &self,
        snapshot: &TransactionSnapshot,
        deadline: &Deadline,
    ) -> AuditResult<DuplicateReport> {
        let mut groups = Vec::new();
        for dtype in DuplicateType::ALL {
            let mut buckets: HashMap<GroupKey, Vec<&Transaction>> = HashMap::new();
            for (i, txn) in snapshot.well_formed().enumerate() {
                if i % DEADLINE_STRIDE == 0 {
                    deadline.check()?;
                }
                if let Some(key) = dtype.key_for(txn) {
                    buckets.entry(key).or_default().push(txn);
                }
            }
            let mut keyed: Vec<(GroupKey, Vec<&Transaction>)> = buckets
                .into_iter()
                .filter(|(_, members)| members.len() >= self.threshold)
                .collect();
            keyed.sort_by(|a, b| a.0.cmp(&b.0));
            for (key, members) in keyed {
                groups.push(build_group(dtype, &key, &members));
            }
        }

        groups.sort_by(|a, b| {
            a.duplicate_type
                .cmp(&b.duplicate_type)
                .then_with(|| b.risk_score.cmp(&a.risk_score))
                .then_with(|| a.key.cmp(&b.key))
        });

        let report = DuplicateReport::from_groups(groups);
        log::debug!(
            "dataset={} duplicate_groups={} unique_flagged={}",
            snapshot.dataset_key(),
            report.groups.len(),
            report.flagged_transactions.len()
        );
        Ok(report)
    }
}

// ── Report ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateTypeSummary {
    pub duplicate_type: DuplicateType,
    pub group_count: usize,
    /// Sum of member counts under this type.
    pub transaction_count: usize,
    pub total_amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateReport {
    pub groups: Vec<DuplicateGroup>,
    /// One row per type, zeroed rows included.
    pub summary: Vec<DuplicateTypeSummary>,
    /// Unique member ids across all groups. A posting in several groups
    /// appears here once.
    pub flagged_transactions: BTreeSet<TransactionId>,
    /// Sum of group totals. Overlapping members count once per group,
    /// so this can exceed the unique amount involved.
    pub total_amount_at_risk: f64,
}

impl DuplicateReport {
    fn from_groups(groups: Vec<DuplicateGroup>) -> Self {
        let mut summary: Vec<DuplicateTypeSummary> = DuplicateType::ALL
            .iter()
            .map(|dtype| DuplicateTypeSummary {
                duplicate_type: *dtype,
                group_count: 0,
                transaction_count: 0,
                total_amount: 0.0,
            })
            .collect();
        let mut flagged = BTreeSet::new();
        let mut total_amount_at_risk = 0.0;
        for group in &groups {
            let row = &mut summary[group.duplicate_type as usize];
            row.group_count += 1;
            row.transaction_count += group.member_count;
            row.total_amount += group.total_amount;
            total_amount_at_risk += group.total_amount;
            flagged.extend(group.transaction_ids.iter().cloned());
        }
        Self {
            groups,
            summary,
            flagged_transactions: flagged,
            total_amount_at_risk,
        }
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Unique postings involved in at least one group.
    pub fn unique_transaction_count(&self) -> usize {
        self.flagged_transactions.len()
    }

    pub fn has_groups(&self) -> bool {
        !self.groups.is_empty()
    }

    /// Worst group score per member id. Labels the model's training
    /// rows and anchors the rule side of blended scores.
    pub fn rule_scores(&self) -> HashMap<TransactionId, u8> {
        let mut scores: HashMap<TransactionId, u8> = HashMap::new();
        for group in &self.groups {
            for id in &group.transaction_ids {
                let entry = scores.entry(id.clone()).or_insert(0);
                if group.risk_score > *entry {
                    *entry = group.risk_score;
                }
            }
        }
        scores
    }

    /// Highest single group score, 0 with no groups.
    pub fn max_group_score(&self) -> u8 {
        self.groups.iter().map(|g| g.risk_score).max().unwrap_or(0)
    }
}
