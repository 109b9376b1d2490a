//! Alertmanager configuration model.
//!
//! Two representations live here. [`wire`] mirrors the YAML Alertmanager
//! itself reads; [`spec`] is the declarative shape written in manifests.
//! Each declarative type has an explicit `to_wire`/`from_wire` pair.

pub mod spec;
pub mod wire;

pub use spec::{AlertmanagerSpec, RouteSpec};
pub use wire::{AlertmanagerConfig, Route, UserConfig};
