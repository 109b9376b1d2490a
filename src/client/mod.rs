//! Mimir HTTP API integration.
//!
//! This module owns the single configured HTTP client and the endpoint
//! methods built on it: ruler rule groups, Alertmanager user
//! configuration, and distributor tenant statistics.

mod alertmanager;
mod config;
mod ruler;
mod stats;
mod transport;

pub use alertmanager::ALERTS_PATH;
pub use config::{ClientConfig, DEFAULT_TIMEOUT_SECS};
pub use ruler::RULES_PATH;
pub use stats::{STATS_PATH, TenantStats, parse_user_stats};
pub use transport::{Component, MimirClient, ORG_ID_HEADER};
