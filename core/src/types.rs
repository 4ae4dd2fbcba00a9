//! Shared primitive types used across the engine.

/// Identifier of a physical store in the chain.
pub type StoreId = i64;

/// Sentinel store id under which the synthetic network aggregate is stored.
pub const NETWORK_STORE_ID: StoreId = 0;

/// Label used when presenting the network aggregate row.
pub const NETWORK_LABEL: &str = "network";
