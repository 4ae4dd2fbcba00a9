//! Tiered incentive computation & reconciliation engine for a retail chain.
//!
//! Each store's monthly purchases are compared against a rolling
//! sales-derived value target and a catalog-coverage mix target; an ordered
//! rule table assigns a bonus tier; store results roll up into a synthetic
//! network record; and a trailing 12-month reconciliation cross-checks the
//! bonus amounts the program predicted against what was actually posted.
//!
//! RULES:
//!   - Only `store` talks to the database. Everything else calls store
//!     methods.
//!   - Store pipelines run to completion, one store at a time, before the
//!     network rollup. The rollup takes the completed results as input.
//!   - A failure in one store's pipeline never aborts the others.
//!   - Reconciliation recomputes and overwrites its whole window on every
//!     run; load failures persist nothing.

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod month;
pub mod reconciliation;
pub mod rollup;
pub mod store;
pub mod tier;
pub mod types;
