// ============================================================================
// Linting
// ============================================================================

#![forbid(unsafe_code)]               // Unsafe code is forbidden
#![warn(missing_docs)]                // Public items should be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]
#![warn(clippy::todo)]
#![warn(clippy::unimplemented)]
#![warn(clippy::unwrap_in_result)]
#![warn(clippy::redundant_clone)]
#![warn(clippy::cognitive_complexity)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// ============================================================================
// Crate Documentation
// ============================================================================

//! # mimirform
//!
//! Declarative management of Grafana Mimir ruler rule groups and
//! Alertmanager configuration.
//!
//! ## Overview
//!
//! A `mimirform.yaml` manifest declares the desired objects; mimirform
//! reads what it recorded in a local state file, refreshes those objects
//! from Mimir, and converges them:
//!
//! 1. **Desired**: resources declared in the manifest
//! 2. **Recorded**: what the last apply wrote, in `.mimirform/state.json`
//! 3. **Observed**: what the ruler and Alertmanager APIs return now
//!
//! Four resource kinds are managed:
//!
//! - `mimir_rule_group_alerting`: one group of alerting rules
//! - `mimir_rule_group_recording`: one group of recording rules
//! - `mimir_alertmanager_config`: a tenant's Alertmanager configuration
//! - `mimir_rules`: a multi-group rules document in one namespace
//!
//! ## Modules
//!
//! - [`client`]: HTTP transport for the ruler, Alertmanager and distributor
//! - [`format`]: name, PromQL and duration validation
//! - [`rules`]: rule group wire types and multi-group documents
//! - [`alertmanager`]: Alertmanager wire and declarative trees
//! - [`resources`]: per-kind controllers and data sources
//! - [`config`]: manifest parsing and validation
//! - [`state`]: persisted state and locking
//! - [`planner`]: diff computation and plan execution
//! - [`reconciler`]: refresh, plan, apply and drift detection
//! - [`cli`]: command-line interface
//!
//! ## Example
//!
//! ```yaml
//! provider:
//!   uri: http://mimir:8080
//!   org_id: tenant-1
//!
//! resources:
//!   mimir_rule_group_alerting:
//!     node:
//!       namespace: infrastructure
//!       name: node
//!       rule:
//!         - alert: HighCPUUsage
//!           expr: instance:cpu:rate5m > 0.9
//!           for: 10m
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod alertmanager;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod format;
pub mod planner;
pub mod reconciler;
pub mod resources;
pub mod rules;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use client::{ClientConfig, MimirClient};
pub use config::{ConfigParser, ConfigValidator, Manifest, ResourceAddress};
pub use error::{MimirError, Result};
pub use planner::{DiffEngine, Plan, PlanExecutor};
pub use reconciler::{DriftReport, ReconciliationResult, Reconciler};
pub use resources::{DataSources, DesiredResource, ProviderContext, Provisioner, ResourceKind};
pub use state::{LocalStateStore, ProviderState, StateStore};
