//! Shared types for the Fabricheck platform.
//!
//! This crate contains:
//! - **Data models** — fabric types, servers, thresholds, test outcomes,
//!   and the persisted ledger document
//! - **Configuration** — the `datacenter_map` TOML loader that yields
//!   per-fabric thresholds and rack/server enumerations

pub mod config;
pub mod models;
