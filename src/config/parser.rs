//! Manifest loading.
//!
//! Reads `mimirform.yaml`, fills unset provider settings from `MIMIR_*`
//! environment variables, and resolves relative paths against the
//! manifest directory.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, MimirError, Result};

use super::spec::{Manifest, ProviderConfig};

/// Manifest parser.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads a manifest from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Manifest> {
        let path = path.as_ref();
        info!("Loading manifest from: {}", path.display());

        if !path.exists() {
            return Err(MimirError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            MimirError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        let mut manifest = self.parse_yaml(&content, Some(path))?;
        let base = self
            .base_path
            .clone()
            .or_else(|| path.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        manifest.resources.resolve_paths(&base);
        Ok(manifest)
    }

    /// Parses a manifest from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<Manifest> {
        debug!("Parsing YAML manifest");

        let manifest: Manifest = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            MimirError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!("Parsed manifest with {} resource(s)", manifest.resources.len());
        Ok(manifest)
    }

    /// Loads a manifest and fills unset provider fields from the environment.
    ///
    /// Variables follow the `MIMIR_<FIELD>` form (`MIMIR_URI`,
    /// `MIMIR_ORG_ID`, `MIMIR_TOKEN`, ...). A value in the manifest always
    /// wins over the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if a
    /// boolean or numeric variable is malformed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<Manifest> {
        let mut manifest = self.load_file(path)?;
        apply_env_defaults(&mut manifest.provider, |name| std::env::var(name).ok())?;
        Ok(manifest)
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                MimirError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Fills unset provider fields from `lookup`.
///
/// # Errors
///
/// Returns an error if a boolean or numeric variable cannot be parsed.
pub fn apply_env_defaults(
    provider: &mut ProviderConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    let strings = [
        ("MIMIR_URI", &mut provider.uri),
        ("MIMIR_RULER_URI", &mut provider.ruler_uri),
        ("MIMIR_ALERTMANAGER_URI", &mut provider.alertmanager_uri),
        ("MIMIR_DISTRIBUTOR_URI", &mut provider.distributor_uri),
        ("MIMIR_ORG_ID", &mut provider.org_id),
        ("MIMIR_TOKEN", &mut provider.token),
        ("MIMIR_USERNAME", &mut provider.username),
        ("MIMIR_PASSWORD", &mut provider.password),
        ("MIMIR_PROXY_URL", &mut provider.proxy_url),
        ("MIMIR_CA", &mut provider.ca),
        ("MIMIR_CERT", &mut provider.cert),
        ("MIMIR_KEY", &mut provider.key),
        ("MIMIR_READ_DELAY", &mut provider.read_delay),
    ];
    for (name, slot) in strings {
        if slot.is_none() {
            if let Some(value) = lookup(name).filter(|v| !v.is_empty()) {
                debug!("Setting provider field from {name}");
                *slot = Some(value);
            }
        }
    }

    let flags = [
        ("MIMIR_INSECURE", &mut provider.insecure),
        ("MIMIR_DEBUG", &mut provider.debug),
        ("MIMIR_FORMAT_PROMQL_EXPR", &mut provider.format_promql_expr),
    ];
    for (name, slot) in flags {
        if slot.is_none() {
            if let Some(value) = lookup(name).filter(|v| !v.is_empty()) {
                *slot = Some(parse_env(name, &value)?);
            }
        }
    }

    if provider.timeout.is_none() {
        if let Some(value) = lookup("MIMIR_TIMEOUT").filter(|v| !v.is_empty()) {
            provider.timeout = Some(parse_env("MIMIR_TIMEOUT", &value)?);
        }
    }

    Ok(())
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        MimirError::Config(ConfigError::ParseError {
            message: format!("invalid value '{value}' for {name}"),
            location: Some(String::from("environment")),
        })
    })
}

/// Default manifest file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["mimirform.yaml", "mimirform.yml"];

/// Finds the manifest in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no manifest is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found manifest: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(MimirError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_minimal_manifest() {
        let yaml = r"
provider:
  uri: http://mimir:8080
  org_id: tenant-1
";
        let manifest = ConfigParser::new().parse_yaml(yaml, None).expect("parse");
        assert_eq!(manifest.provider.uri.as_deref(), Some("http://mimir:8080"));
        assert!(manifest.resources.is_empty());
        assert!(manifest.state.path.is_none());
    }

    #[test]
    fn test_parse_error_carries_location() {
        let err = ConfigParser::new()
            .parse_yaml("provider: [", Some(Path::new("m.yaml")))
            .unwrap_err();
        let MimirError::Config(ConfigError::ParseError { location, .. }) = err else {
            panic!("unexpected error {err}");
        };
        assert_eq!(location.as_deref(), Some("m.yaml"));
    }

    #[test]
    fn test_env_defaults_do_not_override() {
        let env: HashMap<&str, &str> = [
            ("MIMIR_URI", "http://from-env"),
            ("MIMIR_ORG_ID", "env-tenant"),
            ("MIMIR_DEBUG", "true"),
            ("MIMIR_TIMEOUT", "30"),
        ]
        .into_iter()
        .collect();
        let mut provider = ProviderConfig {
            uri: Some(String::from("http://from-file")),
            ..ProviderConfig::default()
        };

        apply_env_defaults(&mut provider, |name| env.get(name).map(|v| (*v).to_string()))
            .expect("apply");

        assert_eq!(provider.uri.as_deref(), Some("http://from-file"));
        assert_eq!(provider.org_id.as_deref(), Some("env-tenant"));
        assert_eq!(provider.debug, Some(true));
        assert_eq!(provider.timeout, Some(30));
    }

    #[test]
    fn test_env_bad_flag() {
        let mut provider = ProviderConfig::default();
        let err = apply_env_defaults(&mut provider, |name| {
            (name == "MIMIR_INSECURE").then(|| String::from("maybe"))
        })
        .unwrap_err();
        assert!(err.to_string().contains("MIMIR_INSECURE"));
    }

    #[test]
    fn test_load_file_resolves_content_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mimirform.yaml");
        std::fs::write(
            &path,
            "resources:\n  mimir_rules:\n    infra:\n      namespace: infra\n      content_file: rules.yaml\n",
        )
        .expect("write");

        let manifest = ConfigParser::new().load_file(&path).expect("load");
        assert_eq!(
            manifest.resources.mimir_rules["infra"].content_file.as_deref(),
            Some(dir.path().join("rules.yaml").as_path())
        );
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("mimirform.yml"), "{}\n").expect("write");
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).expect("mkdir");

        let found = find_config_file(&nested).expect("found");
        assert_eq!(found, dir.path().join("mimirform.yml"));
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigParser::new()
            .load_file("/nonexistent/mimirform.yaml")
            .unwrap_err();
        assert!(matches!(err, MimirError::Config(ConfigError::FileNotFound { .. })));
    }
}
