//! glaudit-core — duplicate and anomaly detection for general-ledger
//! audits.
//!
//! The crate takes one batch of posted transactions and produces one
//! `RiskReport`: duplicate groups under six fixed key types, temporal
//! anomalies, per-user activity profiles, and optional model-blended
//! duplicate scores, rolled up into a weighted 0-100 risk score.
//!
//! Entry point is [`engine::AuditEngine`]; everything else is the
//! machinery behind it.

pub mod aggregator;
pub mod backdated;
pub mod cache;
pub mod closing;
pub mod config;
pub mod detector;
pub mod duplicates;
pub mod engine;
pub mod error;
pub mod generator;
pub mod holiday;
pub mod model;
pub mod rng;
pub mod risk;
pub mod store;
pub mod transaction;
pub mod types;
pub mod unusual_day;
pub mod user_activity;
