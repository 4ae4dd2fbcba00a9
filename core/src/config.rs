//! Engine configuration.
//!
//! An explicit value passed into the engine at construction, no globals.
//! A missing database location is fatal before any computation is attempted.

use crate::error::{EngineError, EngineResult};
use crate::types::{StoreId, NETWORK_STORE_ID};
use serde::{Deserialize, Serialize};

pub const DB_PATH_ENV: &str = "BONUS_DB_PATH";
pub const STORE_IDS_ENV: &str = "BONUS_STORE_IDS";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to the SQLite database file (`:memory:` allowed for tests).
    pub db_path: String,
    /// Physical stores processed each run, in pipeline order.
    pub store_ids: Vec<StoreId>,
}

impl EngineConfig {
    pub fn new(db_path: impl Into<String>, store_ids: Vec<StoreId>) -> EngineResult<Self> {
        let config = Self {
            db_path: db_path.into(),
            store_ids,
        };
        config.validate()?;
        Ok(config)
    }

    /// Build from the environment: `BONUS_DB_PATH` (required) and
    /// `BONUS_STORE_IDS` (comma-separated, required).
    pub fn from_env() -> EngineResult<Self> {
        let db_path = std::env::var(DB_PATH_ENV)
            .map_err(|_| EngineError::Configuration(format!("{DB_PATH_ENV} is not set")))?;
        let raw_ids = std::env::var(STORE_IDS_ENV)
            .map_err(|_| EngineError::Configuration(format!("{STORE_IDS_ENV} is not set")))?;
        Self::new(db_path, parse_store_ids(&raw_ids)?)
    }

    fn validate(&self) -> EngineResult<()> {
        if self.db_path.is_empty() {
            return Err(EngineError::Configuration(
                "database path is empty".to_string(),
            ));
        }
        if self.store_ids.is_empty() {
            return Err(EngineError::Configuration(
                "no store ids configured".to_string(),
            ));
        }
        if self.store_ids.contains(&NETWORK_STORE_ID) {
            return Err(EngineError::Configuration(format!(
                "store id {NETWORK_STORE_ID} is reserved for the network aggregate"
            )));
        }
        Ok(())
    }
}

/// Parse a comma-separated store id list, e.g. `"1,2,3"`.
pub fn parse_store_ids(raw: &str) -> EngineResult<Vec<StoreId>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<StoreId>().map_err(|_| {
                EngineError::Configuration(format!("invalid store id '{s}' in '{raw}'"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_store_id_list() {
        assert_eq!(parse_store_ids("1,2,3").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_store_ids(" 4 , 5 ").unwrap(), vec![4, 5]);
        assert!(parse_store_ids("1,x").is_err());
    }

    #[test]
    fn rejects_reserved_network_id() {
        let err = EngineConfig::new(":memory:", vec![0, 1]).unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[test]
    fn rejects_empty_store_list() {
        assert!(EngineConfig::new(":memory:", vec![]).is_err());
    }
}
