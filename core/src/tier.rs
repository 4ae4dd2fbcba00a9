//! Tier resolution: ordered rule tables mapping attainment to a bonus
//! percentage and reason.
//!
//! Two distinct tables exist: one for stores, one for the network aggregate.
//! Rules are evaluated top to bottom, first match wins. Percentages are
//! carried as fractions (0.02 = 2%) so `bonus_value = purchase * pct`
//! holds without unit conversion.

use serde::Serialize;

/// Mix attainment threshold shared by every rule, in percent.
pub const MIX_THRESHOLD_PCT: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TierDecision {
    pub pct: f64,
    pub reason: &'static str,
    /// The purchase target this entity was held to. Persisted as the
    /// result's target value and summed into the network rollup.
    pub target_value: f64,
}

const NO_BONUS_REASON: &str = "did not meet bonus criteria";
const NETWORK_NO_BONUS_REASON: &str = "network did not meet bonus criteria";

/// Which purchase target a store-level rule checks against.
#[derive(Debug, Clone, Copy, Serialize)]
pub enum ValueGate {
    /// 25% of prior-month sales.
    FullTarget,
    /// 20% of prior-month sales.
    ReducedTarget,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StoreRule {
    pub gate: ValueGate,
    /// Whether the rule requires mix attainment at or above the threshold.
    pub needs_mix: bool,
    pub pct: f64,
    pub reason: &'static str,
}

pub const STORE_RULES: [StoreRule; 3] = [
    StoreRule {
        gate: ValueGate::FullTarget,
        needs_mix: true,
        pct: 0.02,
        reason: "hit 25% value target and 50% mix",
    },
    StoreRule {
        gate: ValueGate::ReducedTarget,
        needs_mix: true,
        pct: 0.015,
        reason: "hit 20% value target and 50% mix",
    },
    StoreRule {
        gate: ValueGate::ReducedTarget,
        needs_mix: false,
        pct: 0.01,
        reason: "missed mix but hit 20% value target",
    },
];

#[derive(Debug, Clone, Copy, Serialize)]
pub struct NetworkRule {
    /// Minimum total purchase as a fraction of the summed target.
    pub min_target_frac: f64,
    pub needs_mix: bool,
    pub pct: f64,
    pub reason: &'static str,
}

pub const NETWORK_RULES: [NetworkRule; 3] = [
    NetworkRule {
        min_target_frac: 1.0,
        needs_mix: true,
        pct: 0.02,
        reason: "network hit full value target and 50% mix",
    },
    NetworkRule {
        min_target_frac: 0.8,
        needs_mix: true,
        pct: 0.015,
        reason: "network hit 80% of value target and 50% mix",
    },
    NetworkRule {
        min_target_frac: 0.8,
        needs_mix: false,
        pct: 0.01,
        reason: "network missed mix but hit 80% of value target",
    },
];

/// Resolve the store-level tier. Ordered, first match wins.
///
/// The decision carries the target the matched rule measured against
/// (25% of prior sales for the top tier, 20% for the reduced tiers).
/// A store that met no rule is reported against the headline 25% target.
pub fn resolve_store_tier(
    purchase: f64,
    target25: f64,
    target20: f64,
    mix_pct: f64,
) -> TierDecision {
    let mix_ok = mix_pct >= MIX_THRESHOLD_PCT;
    for rule in &STORE_RULES {
        let (value_ok, target_value) = match rule.gate {
            ValueGate::FullTarget => (purchase >= target25, target25),
            ValueGate::ReducedTarget => (purchase >= target20, target20),
        };
        if value_ok && rule.needs_mix == mix_ok {
            return TierDecision {
                pct: rule.pct,
                reason: rule.reason,
                target_value,
            };
        }
    }
    TierDecision {
        pct: 0.0,
        reason: NO_BONUS_REASON,
        target_value: target25,
    }
}

/// Resolve the network-level tier over aggregated inputs.
///
/// The resolved percentage is informational: the persisted network bonus
/// value is the sum of store bonus values, not `total_purchase * pct`.
pub fn resolve_network_tier(total_purchase: f64, total_target: f64, mix_pct: f64) -> TierDecision {
    let mix_ok = mix_pct >= MIX_THRESHOLD_PCT;
    for rule in &NETWORK_RULES {
        if total_purchase >= rule.min_target_frac * total_target && rule.needs_mix == mix_ok {
            return TierDecision {
                pct: rule.pct,
                reason: rule.reason,
                target_value: total_target,
            };
        }
    }
    TierDecision {
        pct: 0.0,
        reason: NETWORK_NO_BONUS_REASON,
        target_value: total_target,
    }
}
