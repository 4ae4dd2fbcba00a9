//! SQLite persistence layer.
//!
//! RULE: Only store.rs talks to the database.
//! Pipeline and reconciliation code call store methods; they never
//! execute SQL directly.

use crate::error::EngineResult;
use crate::metrics::MetricSource;
use crate::month::Month;
use crate::reconciliation::ReconciliationRecord;
use crate::types::{StoreId, NETWORK_STORE_ID};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// One computed incentive result, keyed by (store, month).
/// Store id 0 is the synthetic network aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaResult {
    pub store_id: StoreId,
    pub month: Month,
    pub computed_at: String,
    pub target_value: f64,
    pub purchase_value: f64,
    pub value_pct: f64,
    pub catalog_skus: i64,
    pub purchased_skus: i64,
    pub mix_pct: f64,
    pub bonus_pct: f64,
    pub bonus_value: f64,
    pub reason: String,
}

/// Wall-clock stamp written to `computed_at` on every upsert.
pub(crate) fn now_stamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

pub struct BonusStore {
    conn: Connection,
}

impl BonusStore {
    pub fn open(path: &str) -> EngineResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only matters for real files; :memory: ignores it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> EngineResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> EngineResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_facts.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/002_results.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/003_reconciliation.sql"))?;
        Ok(())
    }

    // ── Fact ingestion ─────────────────────────────────────────

    pub fn upsert_sales(&self, store_id: StoreId, month: Month, value: f64) -> EngineResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO monthly_sales (store_id, month, sales_value)
             VALUES (?1, ?2, ?3)",
            params![store_id, month, value],
        )?;
        Ok(())
    }

    pub fn upsert_purchase_value(
        &self,
        store_id: StoreId,
        month: Month,
        value: f64,
    ) -> EngineResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO monthly_purchases (store_id, month, purchase_value)
             VALUES (?1, ?2, ?3)",
            params![store_id, month, value],
        )?;
        Ok(())
    }

    pub fn set_catalog_sku_count(&self, month: Month, count: i64) -> EngineResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO catalog_skus (month, sku_count) VALUES (?1, ?2)",
            params![month, count],
        )?;
        Ok(())
    }

    pub fn upsert_purchased_sku_count(
        &self,
        store_id: StoreId,
        month: Month,
        count: i64,
    ) -> EngineResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO purchased_skus (store_id, month, sku_count)
             VALUES (?1, ?2, ?3)",
            params![store_id, month, count],
        )?;
        Ok(())
    }

    /// Record a posted bonus amount against a target month. Append-only:
    /// a target month may accumulate several postings, and the posting
    /// month can trail the target month.
    pub fn append_receipt(
        &self,
        store_id: StoreId,
        target_month: Month,
        posted_month: Month,
        amount: f64,
    ) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO bonus_receipt (store_id, target_month, posted_month, amount)
             VALUES (?1, ?2, ?3, ?4)",
            params![store_id, target_month, posted_month, amount],
        )?;
        Ok(())
    }

    // ── Computed results ───────────────────────────────────────

    /// Replace-on-conflict keyed by (store, month). Reruns overwrite.
    pub fn upsert_meta_result(&self, r: &MetaResult) -> EngineResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta_result (
                store_id, month, computed_at,
                target_value, purchase_value, value_pct,
                catalog_skus, purchased_skus, mix_pct,
                bonus_pct, bonus_value, reason
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                r.store_id,
                r.month,
                r.computed_at,
                r.target_value,
                r.purchase_value,
                r.value_pct,
                r.catalog_skus,
                r.purchased_skus,
                r.mix_pct,
                r.bonus_pct,
                r.bonus_value,
                r.reason,
            ],
        )?;
        Ok(())
    }

    pub fn get_meta_result(
        &self,
        store_id: StoreId,
        month: Month,
    ) -> EngineResult<Option<MetaResult>> {
        self.conn
            .query_row(
                "SELECT store_id, month, computed_at,
                        target_value, purchase_value, value_pct,
                        catalog_skus, purchased_skus, mix_pct,
                        bonus_pct, bonus_value, reason
                 FROM meta_result WHERE store_id = ?1 AND month = ?2",
                params![store_id, month],
                meta_result_row_mapper,
            )
            .optional()
            .map_err(Into::into)
    }

    /// The synthetic network aggregate row for a month, if computed.
    pub fn get_network_rollup(&self, month: Month) -> EngineResult<Option<MetaResult>> {
        self.get_meta_result(NETWORK_STORE_ID, month)
    }

    /// All result rows for a month, network row included, ordered by store.
    pub fn month_results(&self, month: Month) -> EngineResult<Vec<MetaResult>> {
        let mut stmt = self.conn.prepare(
            "SELECT store_id, month, computed_at,
                    target_value, purchase_value, value_pct,
                    catalog_skus, purchased_skus, mix_pct,
                    bonus_pct, bonus_value, reason
             FROM meta_result WHERE month = ?1
             ORDER BY store_id ASC",
        )?;
        let rows = stmt.query_map(params![month], meta_result_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Reconciliation window reads ────────────────────────────

    /// Predicted bonus values over the window: store-level meta_result rows
    /// (the network row is excluded; it is re-summed during reconciliation).
    pub fn predicted_bonus_window(
        &self,
        window: &[Month],
    ) -> EngineResult<Vec<(StoreId, Month, f64)>> {
        let sql = format!(
            "SELECT store_id, month, bonus_value
             FROM meta_result
             WHERE store_id != {NETWORK_STORE_ID} AND month IN ({})",
            month_placeholders(1, window.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(window.iter()), |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Received bonus totals over the window, summed by (store, target month).
    pub fn received_bonus_window(
        &self,
        window: &[Month],
    ) -> EngineResult<Vec<(StoreId, Month, f64)>> {
        let sql = format!(
            "SELECT store_id, target_month, SUM(amount)
             FROM bonus_receipt
             WHERE target_month IN ({})
             GROUP BY store_id, target_month",
            month_placeholders(1, window.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(window.iter()), |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Reconciliation writes ──────────────────────────────────

    /// Overwrite the whole trailing window in one transaction: stale rows
    /// inside the window are deleted, then the freshly computed rows are
    /// inserted. Nothing is persisted if any step fails.
    pub fn replace_reconciliation_window(
        &self,
        window: &[Month],
        rows: &[ReconciliationRecord],
    ) -> EngineResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        let delete_sql = format!(
            "DELETE FROM bonus_reconciliation WHERE month IN ({})",
            month_placeholders(1, window.len())
        );
        tx.execute(&delete_sql, params_from_iter(window.iter()))?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO bonus_reconciliation
                     (store_id, month, predicted, received, diff, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for r in rows {
                stmt.execute(params![
                    r.store_id,
                    r.month,
                    r.predicted,
                    r.received,
                    r.diff,
                    r.status,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Reconciliation rows in `[start, end]`, ordered by store then month.
    pub fn get_reconciliation(
        &self,
        start: Month,
        end: Month,
    ) -> EngineResult<Vec<ReconciliationRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT store_id, month, predicted, received, diff, status
             FROM bonus_reconciliation
             WHERE month >= ?1 AND month <= ?2
             ORDER BY store_id ASC, month ASC",
        )?;
        let rows = stmt.query_map(params![start, end], |row| {
            Ok(ReconciliationRecord {
                store_id: row.get(0)?,
                month: row.get(1)?,
                predicted: row.get(2)?,
                received: row.get(3)?,
                diff: row.get(4)?,
                status: row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn reconciliation_count(&self) -> EngineResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM bonus_reconciliation", [], |row| {
                row.get(0)
            })
            .map_err(Into::into)
    }
}

fn meta_result_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<MetaResult> {
    Ok(MetaResult {
        store_id: row.get(0)?,
        month: row.get(1)?,
        computed_at: row.get(2)?,
        target_value: row.get(3)?,
        purchase_value: row.get(4)?,
        value_pct: row.get(5)?,
        catalog_skus: row.get(6)?,
        purchased_skus: row.get(7)?,
        mix_pct: row.get(8)?,
        bonus_pct: row.get(9)?,
        bonus_value: row.get(10)?,
        reason: row.get(11)?,
    })
}

/// `?n, ?n+1, ...` placeholder list for an IN clause.
fn month_placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl MetricSource for BonusStore {
    fn sales_value(&self, store_id: StoreId, month: Month) -> EngineResult<Option<f64>> {
        self.conn
            .query_row(
                "SELECT sales_value FROM monthly_sales WHERE store_id = ?1 AND month = ?2",
                params![store_id, month],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    fn purchase_value(&self, store_id: StoreId, month: Month) -> EngineResult<Option<f64>> {
        self.conn
            .query_row(
                "SELECT purchase_value FROM monthly_purchases WHERE store_id = ?1 AND month = ?2",
                params![store_id, month],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    fn catalog_sku_count(&self, month: Month) -> EngineResult<Option<i64>> {
        self.conn
            .query_row(
                "SELECT sku_count FROM catalog_skus WHERE month = ?1",
                params![month],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    fn purchased_sku_count(&self, store_id: StoreId, month: Month) -> EngineResult<Option<i64>> {
        self.conn
            .query_row(
                "SELECT sku_count FROM purchased_skus WHERE store_id = ?1 AND month = ?2",
                params![store_id, month],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    fn received_bonus_total(
        &self,
        store_id: StoreId,
        target_month: Month,
    ) -> EngineResult<Option<f64>> {
        // SUM over zero rows is NULL, which maps to None.
        self.conn
            .query_row(
                "SELECT SUM(amount) FROM bonus_receipt
                 WHERE store_id = ?1 AND target_month = ?2",
                params![store_id, target_month],
                |row| row.get::<_, Option<f64>>(0),
            )
            .map_err(Into::into)
    }
}
