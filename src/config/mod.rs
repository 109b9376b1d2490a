//! Manifest handling.
//!
//! - Parsing `mimirform.yaml` and applying `MIMIR_*` environment defaults
//! - Validation of the provider block and declared resources
//! - Content hashing for change detection

pub mod hash;
mod parser;
mod spec;
mod validator;

pub use hash::ConfigHasher;
pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, apply_env_defaults, find_config_file};
pub use spec::{
    DEFAULT_STATE_PATH, Manifest, ProviderConfig, ResourceAddress, Resources, StateConfig,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
