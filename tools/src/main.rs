//! bonus-runner: headless monthly incentive run.
//!
//! Usage:
//!   bonus-runner --db bonus.db --month 2025-07 --stores 1,2,3
//!   bonus-runner --db bonus.db --reconcile --json
//!
//! `--db` falls back to BONUS_DB_PATH, `--stores` to BONUS_STORE_IDS.
//! The month defaults to the current calendar month.

use anyhow::{anyhow, Result};
use incentive_core::{
    config::{parse_store_ids, EngineConfig, DB_PATH_ENV, STORE_IDS_ENV},
    engine::{BonusEngine, MonthRunReport, StoreOutcome},
    month::Month,
    reconciliation::{ReconRunSummary, ReconciliationEngine},
    types::{StoreId, NETWORK_LABEL, NETWORK_STORE_ID},
};
use std::env;

#[derive(serde::Serialize)]
struct RunOutput {
    report: MonthRunReport,
    reconciliation: Option<ReconRunSummary>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let db = flag_value(&args, "--db")
        .or_else(|| env::var(DB_PATH_ENV).ok())
        .ok_or_else(|| anyhow!("no database path: pass --db or set {DB_PATH_ENV}"))?;
    let stores_raw = flag_value(&args, "--stores")
        .or_else(|| env::var(STORE_IDS_ENV).ok())
        .ok_or_else(|| anyhow!("no store list: pass --stores or set {STORE_IDS_ENV}"))?;
    let month = match flag_value(&args, "--month") {
        Some(raw) => Month::parse(&raw)?,
        None => Month::current(),
    };
    let reconcile = args.iter().any(|a| a == "--reconcile");
    let json = args.iter().any(|a| a == "--json");

    let config = EngineConfig::new(db, parse_store_ids(&stores_raw)?)?;
    let engine = BonusEngine::new(config)?;

    let report = engine.run_month(month)?;

    let reconciliation = if reconcile {
        let summary = ReconciliationEngine::new(engine.store()).run(month)?;
        Some(summary)
    } else {
        None
    };

    if json {
        let out = RunOutput {
            report,
            reconciliation,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_summary(&report);
        if let Some(summary) = &reconciliation {
            print_reconciliation(&engine, summary)?;
        }
    }

    Ok(())
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].clone())
}

fn store_label(store_id: StoreId) -> String {
    if store_id == NETWORK_STORE_ID {
        NETWORK_LABEL.to_string()
    } else {
        format!("store {store_id}")
    }
}

fn print_summary(report: &MonthRunReport) {
    println!(
        "month {}: {} computed, {} failed",
        report.month,
        report.computed_count(),
        report.failed_count()
    );
    for outcome in &report.outcomes {
        match outcome {
            StoreOutcome::Computed(r) => println!(
                "  {:<10} value {:>7.2}%  mix {:>6.2}%  pct {:>5.2}%  bonus {:>10.2}  {}",
                store_label(r.store_id),
                r.value_pct,
                r.mix_pct,
                r.bonus_pct * 100.0,
                r.bonus_value,
                r.reason,
            ),
            StoreOutcome::Failed { store_id, reason } => {
                println!("  {:<10} FAILED: {reason}", store_label(*store_id));
            }
        }
    }
    let n = &report.network;
    println!(
        "  {:<10} value {:>7.2}%  mix {:>6.2}%  pct {:>5.2}%  bonus {:>10.2}  {}",
        store_label(n.store_id),
        n.value_pct,
        n.mix_pct,
        n.bonus_pct * 100.0,
        n.bonus_value,
        n.reason,
    );
}

fn print_reconciliation(engine: &BonusEngine, summary: &ReconRunSummary) -> Result<()> {
    println!(
        "reconciliation {} ..= {}: {} store rows, {} network rows",
        summary.window_start, summary.window_end, summary.store_rows, summary.network_rows
    );
    let rows = engine
        .store()
        .get_reconciliation(summary.window_start, summary.window_end)?;
    for r in rows {
        println!(
            "  {:<10} {}  predicted {:>10.2}  received {:>10.2}  diff {:>10.2}  {}",
            store_label(r.store_id),
            r.month,
            r.predicted,
            r.received,
            r.diff,
            r.status,
        );
    }
    Ok(())
}
