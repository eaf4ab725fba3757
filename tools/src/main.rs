//! audit-runner: headless analysis runner for glaudit.
//!
//! Usage:
//!   audit-runner --seed 42 --count 5000
//!   audit-runner --input postings.json --db audit.db --json
//!   audit-runner --seed 7 --count 200 --force-train

use anyhow::{Context, Result};
use glaudit_core::{
    aggregator::RiskReport,
    cache::AnalysisCache,
    config::AnalysisOptions,
    engine::AuditEngine,
    generator::{self, GeneratorProfile},
    model::ModelState,
    store::ReportStore,
    transaction::Transaction,
};
use std::env;
use std::fs;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let count = parse_arg(&args, "--count", 5_000usize);
    let json_output = args.iter().any(|a| a == "--json");
    let force_train = args.iter().any(|a| a == "--force-train");
    let input = str_arg(&args, "--input");
    let db = str_arg(&args, "--db");

    let mut options = match str_arg(&args, "--options") {
        Some(path) => AnalysisOptions::load(path)?,
        None => AnalysisOptions::default(),
    };
    options.duplicate_threshold = parse_arg(&args, "--threshold", options.duplicate_threshold);
    if let Some(ms) = str_arg(&args, "--budget-ms") {
        options.compute_budget_ms = Some(ms.parse().context("--budget-ms expects milliseconds")?);
    }

    let transactions: Vec<Transaction> = match input {
        Some(path) => {
            let raw = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))?
        }
        None => {
            let profile = GeneratorProfile {
                transaction_count: count,
                ..GeneratorProfile::default()
            };
            generator::generate(seed, &profile)
        }
    };

    let cache = match db {
        Some(path) => {
            log::info!("cache backed by {path}");
            let store = ReportStore::open(path)?;
            store.migrate()?;
            AnalysisCache::with_backend(Box::new(store))
        }
        None => AnalysisCache::in_memory(),
    };
    let engine = AuditEngine::new(options, cache);

    let dataset_key = str_arg(&args, "--dataset")
        .map(str::to_string)
        .unwrap_or_else(generator::fresh_dataset_key);

    if !json_output {
        println!("glaudit — audit-runner");
        println!("  dataset:  {dataset_key}");
        println!("  postings: {}", transactions.len());
        println!("  source:   {}", input.unwrap_or("generated"));
        println!();
    }

    if force_train {
        let state = engine.force_train(&dataset_key, transactions.clone())?;
        if !json_output {
            print_model_state(&state);
        }
    }

    let report = engine.analyze(&dataset_key, transactions)?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    Ok(())
}

fn print_summary(report: &RiskReport) {
    println!("=== RISK REPORT ===");
    println!("  dataset:        {}", report.dataset_key);
    println!("  postings:       {}", report.transaction_count);
    println!("  excluded:       {}", report.excluded_records);
    println!(
        "  overall:        {} ({})",
        report.overall_score, report.overall_level
    );
    println!("  model:          {:?}", report.model_status);
    println!();

    println!("=== SIGNAL BREAKDOWN ===");
    for row in &report.breakdown {
        let status = if row.skipped {
            "skipped"
        } else {
            row.risk_level.label()
        };
        println!(
            "  {:<14} weight={:<3} count={:<5} score={:<3} {status}",
            row.signal.name(),
            row.weight,
            row.count,
            row.risk_score
        );
    }
    println!();

    println!("=== DUPLICATES ===");
    println!("  groups:         {}", report.duplicates.group_count());
    println!(
        "  flagged txns:   {}",
        report.duplicates.unique_transaction_count()
    );
    println!(
        "  amount at risk: {:.2}",
        report.duplicates.total_amount_at_risk
    );
    for row in &report.duplicates.summary {
        println!(
            "  {:<3} {:<58} groups={:<4} txns={}",
            row.duplicate_type.code(),
            row.duplicate_type.label(),
            row.group_count,
            row.transaction_count
        );
    }
    println!();

    println!("=== TOP RISKS ===");
    if report.top_risks.is_empty() {
        println!("  (none)");
    }
    for (rank, risk) in report.top_risks.iter().take(10).enumerate() {
        println!(
            "  {:>2}. [{:<13}] score={:<3} {:<8} {:>14.2}  {}",
            rank + 1,
            risk.signal.name(),
            risk.risk_score,
            risk.risk_level.label(),
            risk.amount,
            risk.reference
        );
    }
}

fn print_model_state(state: &ModelState) {
    println!("=== MODEL ===");
    println!("  status:     {:?}", state.status);
    if let Some(failure) = state.failure {
        println!("  failure:    {}", failure.code());
    }
    println!("  rows:       {}", state.training_rows);
    println!("  positives:  {}", state.positive_labels);
    if let Some(at) = state.trained_at {
        println!("  trained at: {}", at.to_rfc3339());
    }
    println!();
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn str_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
