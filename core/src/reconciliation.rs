//! Reconciliation engine: trailing-window diff between the bonus amounts
//! the program predicted and the amounts actually posted.
//!
//! Run phases, in order:
//!   load predicted → load received → compute per store →
//!   compute network → persist all.
//! A failure during either load aborts the run with nothing written; the
//! whole window is recomputed and overwritten on every run, never patched
//! incrementally. Compute itself cannot fail: absent values default to zero.

use crate::error::EngineResult;
use crate::month::Month;
use crate::store::BonusStore;
use crate::types::{StoreId, NETWORK_STORE_ID};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Inclusive trailing window length, in months.
pub const WINDOW_MONTHS: usize = 12;

/// Divergence status. Persisted under the program's Portuguese labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconStatus {
    Batido,
    NaoBatido,
}

impl ReconStatus {
    /// Exact boundary, no tolerance band: received >= predicted is BATIDO.
    pub fn from_amounts(predicted: f64, received: f64) -> Self {
        if received >= predicted {
            ReconStatus::Batido
        } else {
            ReconStatus::NaoBatido
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReconStatus::Batido => "BATIDO",
            ReconStatus::NaoBatido => "NÃO BATIDO",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "BATIDO" => Some(ReconStatus::Batido),
            "NÃO BATIDO" => Some(ReconStatus::NaoBatido),
            _ => None,
        }
    }
}

impl fmt::Display for ReconStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for ReconStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ReconStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        ReconStatus::from_label(text).ok_or(FromSqlError::InvalidType)
    }
}

/// One reconciliation row, keyed by (store, month).
/// Store id 0 carries the network-wide sums for the month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationRecord {
    pub store_id: StoreId,
    pub month: Month,
    pub predicted: f64,
    pub received: f64,
    pub diff: f64,
    pub status: ReconStatus,
}

impl ReconciliationRecord {
    fn new(store_id: StoreId, month: Month, predicted: f64, received: f64) -> Self {
        Self {
            store_id,
            month,
            predicted,
            received,
            diff: received - predicted,
            status: ReconStatus::from_amounts(predicted, received),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconRunSummary {
    pub window_start: Month,
    pub window_end: Month,
    pub store_rows: usize,
    pub network_rows: usize,
}

pub struct ReconciliationEngine<'a> {
    store: &'a BonusStore,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(store: &'a BonusStore) -> Self {
        Self { store }
    }

    /// Recompute and overwrite the trailing window ending at `reference`.
    pub fn run(&self, reference: Month) -> EngineResult<ReconRunSummary> {
        let window = reference.trailing_window(WINDOW_MONTHS);
        let window_start = window[0];
        let window_end = reference;
        log::info!("reconciliation run: window {window_start} ..= {window_end}");

        // Load phases. Any error here aborts with nothing persisted.
        let predicted = load_map(self.store.predicted_bonus_window(&window)?);
        let received = load_map(self.store.received_bonus_window(&window)?);
        log::info!(
            "loaded {} predicted and {} received entries",
            predicted.len(),
            received.len()
        );

        // Per-store rows: every (store, month) observed on either side.
        let keys: BTreeSet<(StoreId, Month)> = predicted
            .keys()
            .chain(received.keys())
            .copied()
            .filter(|(store_id, _)| *store_id != NETWORK_STORE_ID)
            .collect();

        let mut rows: Vec<ReconciliationRecord> = keys
            .iter()
            .map(|&(store_id, month)| {
                let p = predicted.get(&(store_id, month)).copied().unwrap_or(0.0);
                let r = received.get(&(store_id, month)).copied().unwrap_or(0.0);
                ReconciliationRecord::new(store_id, month, p, r)
            })
            .collect();
        let store_rows = rows.len();

        // Network rows: one per observed month, summed across stores and
        // statused independently of the per-store rows.
        let months: BTreeSet<Month> = keys.iter().map(|&(_, month)| month).collect();
        for &month in &months {
            let p: f64 = sum_for_month(&predicted, month);
            let r: f64 = sum_for_month(&received, month);
            rows.push(ReconciliationRecord::new(NETWORK_STORE_ID, month, p, r));
        }
        let network_rows = months.len();

        // Persist phase: whole window in one transaction.
        self.store.replace_reconciliation_window(&window, &rows)?;
        log::info!(
            "reconciliation persisted: {store_rows} store rows, {network_rows} network rows"
        );

        Ok(ReconRunSummary {
            window_start,
            window_end,
            store_rows,
            network_rows,
        })
    }
}

fn load_map(rows: Vec<(StoreId, Month, f64)>) -> BTreeMap<(StoreId, Month), f64> {
    rows.into_iter()
        .map(|(store_id, month, value)| ((store_id, month), value))
        .collect()
}

fn sum_for_month(map: &BTreeMap<(StoreId, Month), f64>, month: Month) -> f64 {
    map.iter()
        .filter(|((store_id, m), _)| *m == month && *store_id != NETWORK_STORE_ID)
        .map(|(_, v)| v)
        .sum()
}
