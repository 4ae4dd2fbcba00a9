//! Monthly pipeline orchestration.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Each store pipeline runs to completion: gather facts →
//!      resolve tier → upsert result.
//!   2. Only after every store pipeline has finished does the network
//!      rollup run, over the completed store results.
//!
//! RULES:
//!   - A failure inside one store's pipeline is converted into an
//!     explicit outcome at that store's boundary. It never aborts the
//!     remaining stores.
//!   - Failures persisting the network row abort only the current run.

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::metrics::{self, MetricSource};
use crate::month::Month;
use crate::rollup;
use crate::store::{now_stamp, BonusStore, MetaResult};
use crate::tier;
use crate::types::StoreId;
use serde::Serialize;

/// Result of one store's pipeline. No error crosses this boundary.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StoreOutcome {
    Computed(MetaResult),
    Failed { store_id: StoreId, reason: String },
}

/// Everything a caller needs to report on a month run.
#[derive(Debug, Clone, Serialize)]
pub struct MonthRunReport {
    pub month: Month,
    pub outcomes: Vec<StoreOutcome>,
    pub network: MetaResult,
}

impl MonthRunReport {
    pub fn computed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, StoreOutcome::Computed(_)))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.computed_count()
    }
}

pub struct BonusEngine {
    config: EngineConfig,
    store: BonusStore,
}

impl BonusEngine {
    /// Open (and migrate) the configured database and build the engine.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        let store = BonusStore::open(&config.db_path)?;
        store.migrate()?;
        Ok(Self { config, store })
    }

    /// Build around an existing store. Used by tests and tooling that
    /// manage the database themselves.
    pub fn with_store(config: EngineConfig, store: BonusStore) -> Self {
        Self { config, store }
    }

    pub fn store(&self) -> &BonusStore {
        &self.store
    }

    /// One store's full pipeline: gather → resolve → upsert.
    pub fn compute_store(&self, store_id: StoreId, month: Month) -> EngineResult<MetaResult> {
        self.compute_store_via(&self.store, store_id, month)
    }

    fn compute_store_via(
        &self,
        source: &dyn MetricSource,
        store_id: StoreId,
        month: Month,
    ) -> EngineResult<MetaResult> {
        let facts = metrics::gather(source, store_id, month)?;
        let att = facts.attainment();
        let decision =
            tier::resolve_store_tier(facts.purchase_value, att.target25, att.target20, att.mix_pct);

        let result = MetaResult {
            store_id,
            month,
            computed_at: now_stamp(),
            target_value: decision.target_value,
            purchase_value: facts.purchase_value,
            value_pct: att.value_pct,
            catalog_skus: facts.catalog_skus,
            purchased_skus: facts.purchased_skus,
            mix_pct: att.mix_pct,
            bonus_pct: decision.pct,
            bonus_value: facts.purchase_value * decision.pct,
            reason: decision.reason.to_string(),
        };

        self.store.upsert_meta_result(&result)?;

        log::info!(
            "store {store_id} {month}: value {:.2}% mix {:.2}% -> pct {:.2}% bonus {:.2} ({})",
            result.value_pct,
            result.mix_pct,
            result.bonus_pct * 100.0,
            result.bonus_value,
            result.reason,
        );

        Ok(result)
    }

    /// Run every configured store pipeline for `month`, then the network
    /// rollup over the completed results.
    pub fn run_month(&self, month: Month) -> EngineResult<MonthRunReport> {
        self.run_month_with_source(&self.store, month)
    }

    /// Parse the reference month first; malformed input means no
    /// computation is attempted.
    pub fn run_month_str(&self, raw: &str) -> EngineResult<MonthRunReport> {
        let month = Month::parse(raw)?;
        self.run_month(month)
    }

    /// Same as `run_month` but reading facts from an explicit source.
    /// The seam for tests that exercise the per-store isolation guarantee.
    pub fn run_month_with_source(
        &self,
        source: &dyn MetricSource,
        month: Month,
    ) -> EngineResult<MonthRunReport> {
        log::info!(
            "month run {month}: {} stores {:?}",
            self.config.store_ids.len(),
            self.config.store_ids
        );

        let mut outcomes = Vec::with_capacity(self.config.store_ids.len());
        let mut computed = Vec::new();

        for &store_id in &self.config.store_ids {
            match self.compute_store_via(source, store_id, month) {
                Ok(result) => {
                    computed.push(result.clone());
                    outcomes.push(StoreOutcome::Computed(result));
                }
                Err(e) => {
                    log::error!("store {store_id} {month}: pipeline failed: {e}");
                    outcomes.push(StoreOutcome::Failed {
                        store_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        // Precondition for the rollup holds by construction here: every
        // store pipeline above has run to completion.
        let network = rollup::network_rollup(month, &computed);
        self.store.upsert_meta_result(&network)?;

        Ok(MonthRunReport {
            month,
            outcomes,
            network,
        })
    }
}
