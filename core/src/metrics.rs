//! Metric aggregation: turns raw per-store monthly facts into attainment
//! percentages.
//!
//! The purchase target is derived from the *prior* month's sales, so a
//! reference month of 2025-07 reads sales from 2025-06. Missing fact rows
//! resolve to zero with a warning; they are never an error.

use crate::error::EngineResult;
use crate::month::Month;
use crate::types::StoreId;
use serde::Serialize;

/// Fraction of prior-month sales that sets the full purchase target.
pub const TARGET_FULL_FRACTION: f64 = 0.25;
/// Fraction of prior-month sales that sets the reduced purchase target.
pub const TARGET_REDUCED_FRACTION: f64 = 0.20;

/// Seam to the external facts collaborator. `None` means the fact row is
/// absent upstream; the aggregator resolves it to zero.
pub trait MetricSource {
    fn sales_value(&self, store_id: StoreId, month: Month) -> EngineResult<Option<f64>>;
    fn purchase_value(&self, store_id: StoreId, month: Month) -> EngineResult<Option<f64>>;
    fn catalog_sku_count(&self, month: Month) -> EngineResult<Option<i64>>;
    fn purchased_sku_count(&self, store_id: StoreId, month: Month) -> EngineResult<Option<i64>>;
    /// Total bonus amount posted against a target month (postings summed).
    fn received_bonus_total(&self, store_id: StoreId, target_month: Month)
        -> EngineResult<Option<f64>>;
}

/// Raw facts for one (store, reference month), already defaulted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyMetrics {
    pub store_id: StoreId,
    pub month: Month,
    pub prior_sales: f64,
    pub purchase_value: f64,
    pub catalog_skus: i64,
    pub purchased_skus: i64,
}

/// Derived attainment figures for tier resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Attainment {
    pub target25: f64,
    pub target20: f64,
    pub value_pct: f64,
    pub mix_pct: f64,
}

impl MonthlyMetrics {
    pub fn attainment(&self) -> Attainment {
        let target25 = self.prior_sales * TARGET_FULL_FRACTION;
        let target20 = self.prior_sales * TARGET_REDUCED_FRACTION;
        let value_pct = if target25 > 0.0 {
            self.purchase_value / target25 * 100.0
        } else {
            0.0
        };
        let mix_pct = if self.catalog_skus > 0 {
            self.purchased_skus as f64 / self.catalog_skus as f64 * 100.0
        } else {
            0.0
        };
        Attainment {
            target25,
            target20,
            value_pct,
            mix_pct,
        }
    }
}

/// Read the four facts for one store and reference month.
pub fn gather(
    source: &dyn MetricSource,
    store_id: StoreId,
    month: Month,
) -> EngineResult<MonthlyMetrics> {
    let prior = month.prev();

    let prior_sales = match source.sales_value(store_id, prior)? {
        Some(v) => v,
        None => {
            log::warn!("store {store_id}: no sales row for {prior}, target falls to zero");
            0.0
        }
    };

    let purchase_value = match source.purchase_value(store_id, month)? {
        Some(v) => v,
        None => {
            log::warn!("store {store_id}: no purchases recorded for {month}");
            0.0
        }
    };

    let catalog_skus = match source.catalog_sku_count(month)? {
        Some(n) => n,
        None => {
            log::warn!("no catalog SKU count for {month}, mix falls to zero");
            0
        }
    };

    let purchased_skus = match source.purchased_sku_count(store_id, month)? {
        Some(n) => n,
        None => {
            log::warn!("store {store_id}: no purchased SKU count for {month}");
            0
        }
    };

    log::debug!(
        "store {store_id} {month}: prior_sales={prior_sales:.2} purchase={purchase_value:.2} \
         skus={purchased_skus}/{catalog_skus}"
    );

    Ok(MonthlyMetrics {
        store_id,
        month,
        prior_sales,
        purchase_value,
        catalog_skus,
        purchased_skus,
    })
}
