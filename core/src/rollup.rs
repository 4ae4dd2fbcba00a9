//! Network rollup: folds all store-level results for a month into one
//! synthetic record under the network sentinel id.
//!
//! Ordering dependency made explicit: the rollup takes the completed slice
//! of store results as input instead of re-querying and hoping every row
//! was already written.

use crate::month::Month;
use crate::store::{now_stamp, MetaResult};
use crate::tier;
use crate::types::NETWORK_STORE_ID;

/// Aggregate store results into the network record for `month`.
///
/// Target, purchase, SKU counts and bonus value are summed over non-network
/// rows; value and mix percentages are recomputed from the sums. The network
/// tier percentage is resolved from the aggregates but is informational:
/// the stored `bonus_value` is the sum of store-level bonus values.
pub fn network_rollup(month: Month, store_results: &[MetaResult]) -> MetaResult {
    let mut target_value = 0.0;
    let mut purchase_value = 0.0;
    let mut catalog_skus = 0i64;
    let mut purchased_skus = 0i64;
    let mut bonus_value = 0.0;

    for r in store_results.iter().filter(|r| r.store_id != NETWORK_STORE_ID) {
        target_value += r.target_value;
        purchase_value += r.purchase_value;
        catalog_skus += r.catalog_skus;
        purchased_skus += r.purchased_skus;
        bonus_value += r.bonus_value;
    }

    let value_pct = if target_value > 0.0 {
        purchase_value / target_value * 100.0
    } else {
        0.0
    };
    let mix_pct = if catalog_skus > 0 {
        purchased_skus as f64 / catalog_skus as f64 * 100.0
    } else {
        0.0
    };

    let decision = tier::resolve_network_tier(purchase_value, target_value, mix_pct);

    log::info!(
        "network {month}: purchase={purchase_value:.2} target={target_value:.2} \
         mix={mix_pct:.2}% pct={:.2}% bonus={bonus_value:.2}",
        decision.pct * 100.0
    );

    MetaResult {
        store_id: NETWORK_STORE_ID,
        month,
        computed_at: now_stamp(),
        target_value,
        purchase_value,
        value_pct,
        catalog_skus,
        purchased_skus,
        mix_pct,
        bonus_pct: decision.pct,
        bonus_value,
        reason: decision.reason.to_string(),
    }
}
