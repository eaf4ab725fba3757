//! Shared primitive types used across the entire engine.

/// Identifies one dataset (one batch of postings under analysis).
pub type DatasetKey = String;

/// A stable, unique identifier for a single ledger transaction.
pub type TransactionId = String;

/// The posting-system user name attached to a transaction.
pub type UserName = String;
