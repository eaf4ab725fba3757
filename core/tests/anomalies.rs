//! Temporal detector integration tests: backdated entries, closing
//! periods, unusual days, holidays, and per-user activity profiles.

use chrono::{Datelike, NaiveDate, Weekday};
use glaudit_core::backdated::BackdatedDetector;
use glaudit_core::closing::{month_end, ClosingPeriodDetector};
use glaudit_core::config::AnalysisOptions;
use glaudit_core::detector::{
    AnomalyDetector, Deadline, DetectorOutput, FindingDetail,
};
use glaudit_core::error::AuditError;
use glaudit_core::holiday::HolidayDetector;
use glaudit_core::risk::RiskLevel;
use glaudit_core::transaction::{Transaction, TransactionKind, TransactionSnapshot};
use glaudit_core::unusual_day::UnusualDayDetector;
use glaudit_core::user_activity::UserActivityDetector;

fn txn(id: &str, amount: f64, date: &str) -> Transaction {
    let posting_date = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
    Transaction {
        id: id.to_string(),
        gl_account: "400100".to_string(),
        amount,
        transaction_type: TransactionKind::Debit,
        currency: "USD".to_string(),
        posting_date,
        document_date: Some(posting_date),
        document_number: format!("D-{id}"),
        document_type: "SA".to_string(),
        reference: "INV-1".to_string(),
        vendor: "Acme Industrial Supply".to_string(),
        user_name: "JSMITH".to_string(),
        description: "Test posting".to_string(),
        fiscal_year: 2025,
        fiscal_period: posting_date.month() as u8,
    }
}

fn scan(
    detector: &dyn AnomalyDetector,
    transactions: Vec<Transaction>,
    options: &AnalysisOptions,
) -> DetectorOutput {
    let snapshot = TransactionSnapshot::new("anomaly-test", transactions);
    detector.scan(&snapshot, options, &Deadline::none()).unwrap()
}

// ── Backdated ──────────────────────────────────────────────────────

#[test]
fn forty_day_backdate_scores_high() {
    let mut t = txn("late", 800.0, "2025-03-12");
    t.document_date = Some(NaiveDate::from_ymd_opt(2025, 1, 31).unwrap());

    let output = scan(&BackdatedDetector, vec![t], &AnalysisOptions::default());
    assert_eq!(output.count(), 1);
    let finding = &output.findings[0];
    assert_eq!(finding.risk_score, 80, "40 days late at 2 points per day");
    assert_eq!(finding.risk_level, RiskLevel::High);
    assert_eq!(
        finding.risk_factors[0],
        "posted 40 days after document date"
    );
    match &finding.detail {
        FindingDetail::Backdated { days_backdated, .. } => assert_eq!(*days_backdated, 40),
        other => panic!("wrong detail: {other:?}"),
    }
}

/// The gap is a strict threshold: exactly gap days late is still fine.
#[test]
fn backdate_gap_is_strict() {
    let mut options = AnalysisOptions::default();
    options.backdated_gap_days = 5;

    let mut at_gap = txn("at-gap", 100.0, "2025-03-12");
    at_gap.document_date = Some(NaiveDate::from_ymd_opt(2025, 3, 7).unwrap());
    let mut past_gap = txn("past-gap", 100.0, "2025-03-12");
    past_gap.document_date = Some(NaiveDate::from_ymd_opt(2025, 3, 6).unwrap());

    let output = scan(&BackdatedDetector, vec![at_gap, past_gap], &options);
    assert_eq!(output.count(), 1, "only the 6-day entry crosses a 5-day gap");
    assert_eq!(output.findings[0].transaction_id, "past-gap");
    assert_eq!(output.findings[0].risk_score, 12);
}

#[test]
fn missing_document_date_is_not_backdated() {
    let mut t = txn("undated", 100.0, "2025-03-12");
    t.document_date = None;

    let output = scan(&BackdatedDetector, vec![t], &AnalysisOptions::default());
    assert_eq!(output.count(), 0);
    assert_eq!(output.risk_score, 0);
}

#[test]
fn same_day_posting_is_not_backdated() {
    let t = txn("same-day", 100.0, "2025-03-12");
    let output = scan(&BackdatedDetector, vec![t], &AnalysisOptions::default());
    assert_eq!(output.count(), 0);
}

// ── Closing period ─────────────────────────────────────────────────

#[test]
fn month_end_helper_handles_year_boundary() {
    let dec = NaiveDate::from_ymd_opt(2025, 12, 15).unwrap();
    assert_eq!(month_end(dec), NaiveDate::from_ymd_opt(2025, 12, 31));
    let feb = NaiveDate::from_ymd_opt(2025, 2, 3).unwrap();
    assert_eq!(month_end(feb), NaiveDate::from_ymd_opt(2025, 2, 28));
}

#[test]
fn posting_on_month_end_scores_full_proximity() {
    let t = txn("close", 900.0, "2025-03-31");
    let output = scan(&ClosingPeriodDetector, vec![t], &AnalysisOptions::default());
    assert_eq!(output.count(), 1);
    let finding = &output.findings[0];
    assert_eq!(finding.risk_score, 70, "base 50 plus full proximity 20");
    match &finding.detail {
        FindingDetail::ClosingPeriod {
            month_end,
            days_from_month_end,
        } => {
            assert_eq!(*month_end, NaiveDate::from_ymd_opt(2025, 3, 31).unwrap());
            assert_eq!(*days_from_month_end, 0);
        }
        other => panic!("wrong detail: {other:?}"),
    }
}

/// The far edge of the window still flags, with zero proximity bonus.
#[test]
fn window_edge_scores_base_only() {
    let t = txn("edge", 900.0, "2025-03-28");
    let output = scan(&ClosingPeriodDetector, vec![t], &AnalysisOptions::default());
    assert_eq!(output.count(), 1);
    let finding = &output.findings[0];
    assert_eq!(finding.risk_score, 50);
    match &finding.detail {
        FindingDetail::ClosingPeriod {
            days_from_month_end,
            ..
        } => assert_eq!(*days_from_month_end, -3, "three days before the boundary"),
        other => panic!("wrong detail: {other:?}"),
    }
}

/// Grace days after a month end count against the month just closed.
#[test]
fn grace_day_flags_against_previous_month() {
    let t = txn("spill", 900.0, "2025-04-01");
    let output = scan(&ClosingPeriodDetector, vec![t], &AnalysisOptions::default());
    assert_eq!(output.count(), 1);
    let finding = &output.findings[0];
    assert_eq!(finding.risk_score, 60, "base 50 plus half proximity");
    match &finding.detail {
        FindingDetail::ClosingPeriod {
            month_end,
            days_from_month_end,
        } => {
            assert_eq!(*month_end, NaiveDate::from_ymd_opt(2025, 3, 31).unwrap());
            assert_eq!(*days_from_month_end, 1);
        }
        other => panic!("wrong detail: {other:?}"),
    }
}

#[test]
fn past_grace_window_is_clean() {
    let t = txn("settled", 900.0, "2025-04-03");
    let output = scan(&ClosingPeriodDetector, vec![t], &AnalysisOptions::default());
    assert_eq!(output.count(), 0, "3 days after month end exceeds 2 grace days");
}

#[test]
fn mid_month_posting_is_clean() {
    let t = txn("mid", 900.0, "2025-03-12");
    let output = scan(&ClosingPeriodDetector, vec![t], &AnalysisOptions::default());
    assert_eq!(output.count(), 0);
}

#[test]
fn high_value_closing_entry_hits_the_cap() {
    let t = txn("big-close", 2_500_000.0, "2025-03-31");
    let output = scan(&ClosingPeriodDetector, vec![t], &AnalysisOptions::default());
    assert_eq!(output.findings[0].risk_score, 100, "50 + 20 + 30");
    assert_eq!(output.findings[0].risk_level, RiskLevel::Critical);
}

// ── Unusual day ────────────────────────────────────────────────────

#[test]
fn saturday_posting_is_flagged() {
    let t = txn("weekend", 400.0, "2025-03-15");
    let output = scan(&UnusualDayDetector, vec![t], &AnalysisOptions::default());
    assert_eq!(output.count(), 1);
    let finding = &output.findings[0];
    assert_eq!(finding.risk_score, 40);
    assert_eq!(finding.risk_factors[0], "posted on Saturday");
}

#[test]
fn high_value_weekend_posting_scores_more() {
    let t = txn("big-weekend", 2_000_000.0, "2025-03-15");
    let output = scan(&UnusualDayDetector, vec![t], &AnalysisOptions::default());
    assert_eq!(output.findings[0].risk_score, 65, "base 40 plus 25 for value");
}

#[test]
fn weekday_posting_is_clean() {
    let t = txn("monday", 400.0, "2025-03-17");
    let output = scan(&UnusualDayDetector, vec![t], &AnalysisOptions::default());
    assert_eq!(output.count(), 0);
}

/// The unusual set is configuration, not a hardcoded weekend.
#[test]
fn custom_unusual_days_override_the_weekend() {
    let mut options = AnalysisOptions::default();
    options.unusual_days = vec![Weekday::Wed];

    let wednesday = txn("wed", 400.0, "2025-03-12");
    let saturday = txn("sat", 400.0, "2025-03-15");
    let output = scan(&UnusualDayDetector, vec![wednesday, saturday], &options);
    assert_eq!(output.count(), 1);
    assert_eq!(output.findings[0].transaction_id, "wed");
}

// ── Holiday ────────────────────────────────────────────────────────

#[test]
fn holiday_posting_is_flagged() {
    let mut options = AnalysisOptions::default();
    options
        .holiday_calendar
        .insert(NaiveDate::from_ymd_opt(2025, 7, 4).unwrap());

    let t = txn("fireworks", 400.0, "2025-07-04");
    let output = scan(&HolidayDetector, vec![t], &options);
    assert_eq!(output.count(), 1);
    let finding = &output.findings[0];
    assert_eq!(finding.risk_score, 60);
    assert_eq!(finding.risk_factors[0], "posted on holiday 2025-07-04");
}

#[test]
fn high_value_holiday_posting_is_critical() {
    let mut options = AnalysisOptions::default();
    options
        .holiday_calendar
        .insert(NaiveDate::from_ymd_opt(2025, 7, 4).unwrap());

    let t = txn("big-fireworks", 3_000_000.0, "2025-07-04");
    let output = scan(&HolidayDetector, vec![t], &options);
    assert_eq!(output.findings[0].risk_score, 90);
    assert_eq!(output.findings[0].risk_level, RiskLevel::Critical);
}

/// No configured calendar means nothing to flag, never an error.
#[test]
fn empty_calendar_finds_nothing() {
    let t = txn("fireworks", 400.0, "2025-07-04");
    let output = scan(&HolidayDetector, vec![t], &AnalysisOptions::default());
    assert_eq!(output.count(), 0);
    assert_eq!(output.risk_score, 0);
    assert_eq!(output.risk_level, RiskLevel::Low);
}

// ── User activity ──────────────────────────────────────────────────

#[test]
fn user_of_interest_is_always_flagged() {
    let mut options = AnalysisOptions::default();
    options.users_of_interest.insert("RPATEL".to_string());

    let batch: Vec<Transaction> = (0..3)
        .map(|i| {
            let mut t = txn(&format!("r-{i}"), 150.0, "2025-03-12");
            t.user_name = "RPATEL".to_string();
            t
        })
        .collect();

    let snapshot = TransactionSnapshot::new("user-test", batch);
    let output = UserActivityDetector::scan(&snapshot, &options, &Deadline::none()).unwrap();
    assert_eq!(output.findings.len(), 1);
    let finding = &output.findings[0];
    assert_eq!(finding.user_name, "RPATEL");
    assert_eq!(finding.risk_score, 30);
    assert_eq!(finding.risk_factors, vec!["user of interest".to_string()]);
    assert_eq!(finding.stats.transaction_count, 3);
}

#[test]
fn repeated_high_value_postings_flag_the_user() {
    // 26 high-value postings crosses the strict threshold of 25.
    let batch: Vec<Transaction> = (0..26)
        .map(|i| txn(&format!("hv-{i:02}"), 1_500_000.0 + i as f64, "2025-03-12"))
        .collect();

    let snapshot = TransactionSnapshot::new("user-test", batch);
    let output =
        UserActivityDetector::scan(&snapshot, &AnalysisOptions::default(), &Deadline::none())
            .unwrap();
    assert_eq!(output.findings.len(), 1);
    let finding = &output.findings[0];
    assert_eq!(finding.risk_score, 20);
    assert_eq!(
        finding.risk_factors,
        vec!["multiple high-value transactions".to_string()]
    );
    assert_eq!(finding.stats.high_value_count, 26);
}

#[test]
fn quiet_users_are_profiled_but_not_flagged() {
    let mut a = txn("a", 100.0, "2025-03-12");
    a.user_name = "JSMITH".to_string();
    let mut b = txn("b", 100.0, "2025-03-13");
    b.user_name = "MALVAREZ".to_string();

    let snapshot = TransactionSnapshot::new("user-test", vec![a, b]);
    let output =
        UserActivityDetector::scan(&snapshot, &AnalysisOptions::default(), &Deadline::none())
            .unwrap();
    assert_eq!(output.profiled_users, 2);
    assert!(output.findings.is_empty());
    assert_eq!(output.risk_score, 0);
}

#[test]
fn blank_user_names_are_not_profiled() {
    let mut options = AnalysisOptions::default();
    options.users_of_interest.insert(String::new());

    let mut anonymous = txn("anon", 150.0, "2025-03-12");
    anonymous.user_name = String::new();
    let named = txn("named", 150.0, "2025-03-12");

    let snapshot = TransactionSnapshot::new("user-test", vec![anonymous, named]);
    let output = UserActivityDetector::scan(&snapshot, &options, &Deadline::none()).unwrap();
    assert_eq!(output.profiled_users, 1, "only the named user gets a profile");
    assert!(output.findings.is_empty());
}

#[test]
fn flagged_users_sort_worst_first() {
    let mut options = AnalysisOptions::default();
    options.users_of_interest.insert("LNOVAK".to_string());

    // LNOVAK: watch list only (30). TCHEN: 26 high-value (20).
    let mut batch: Vec<Transaction> = (0..26)
        .map(|i| {
            let mut t = txn(&format!("t-{i:02}"), 1_500_000.0, "2025-03-12");
            t.user_name = "TCHEN".to_string();
            t
        })
        .collect();
    let mut watched = txn("l-0", 50.0, "2025-03-12");
    watched.user_name = "LNOVAK".to_string();
    batch.push(watched);

    let snapshot = TransactionSnapshot::new("user-test", batch);
    let output = UserActivityDetector::scan(&snapshot, &options, &Deadline::none()).unwrap();
    assert_eq!(output.findings.len(), 2);
    assert_eq!(output.findings[0].user_name, "LNOVAK");
    assert_eq!(output.findings[1].user_name, "TCHEN");
    assert_eq!(output.risk_score, 30, "output carries the worst user score");
}

// ── Compute budget ─────────────────────────────────────────────────

/// A zero budget fires on the first cooperative check.
#[test]
fn exhausted_budget_aborts_the_scan() {
    let t = txn("any", 100.0, "2025-03-12");
    let snapshot = TransactionSnapshot::new("budget-test", vec![t]);
    let result = BackdatedDetector.scan(
        &snapshot,
        &AnalysisOptions::default(),
        &Deadline::after_ms(0),
    );
    assert!(
        matches!(result, Err(AuditError::DeadlineExceeded { .. })),
        "expected DeadlineExceeded, got {result:?}"
    );
}
