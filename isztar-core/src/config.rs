//! Service configuration
//!
//! ## Configuration Sources (in precedence order)
//!
//! 1. CLI flags (applied by the binary)
//! 2. Environment: `ISZTAR_UPSTREAM_URL`, `ISZTAR_BIND`
//! 3. Explicit `--config <file>` or `~/.config/isztar/config.yaml`
//! 4. Built-in defaults
//!
//! ```yaml
//! upstream:
//!   base_url: https://ext-isztar4.mf.gov.pl/tariff/rest/goods-nomenclature
//!   timeout_seconds: 30
//! defaults:
//!   date: "2025-11-17"
//!   language: PL
//! index:
//!   implicit_page_limit: 3
//!   time_budget_seconds: 30
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default upstream service root
pub const DEFAULT_UPSTREAM_URL: &str =
    "https://ext-isztar4.mf.gov.pl/tariff/rest/goods-nomenclature";

/// Environment variable overriding `upstream.base_url`
pub const ENV_UPSTREAM_URL: &str = "ISZTAR_UPSTREAM_URL";

/// Environment variable overriding `server.bind`
pub const ENV_BIND: &str = "ISZTAR_BIND";

/// Top-level service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub defaults: LookupDefaults,

    #[serde(default)]
    pub index: IndexSettings,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Tariff service connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Root URL; `codes` and `measures` are resolved against it
    #[serde(default = "default_upstream_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_url(),
            timeout_seconds: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Query parameter defaults shared by every endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupDefaults {
    /// Tariff date, `YYYY-MM-DD`
    #[serde(default = "default_date")]
    pub date: String,

    /// Upstream locale code
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for LookupDefaults {
    fn default() -> Self {
        Self {
            date: default_date(),
            language: default_language(),
        }
    }
}

/// Index build and search knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSettings {
    /// Pages fetched when a search finds the index stale
    #[serde(default = "default_implicit_page_limit")]
    pub implicit_page_limit: u32,

    /// Pages fetched by an explicit rebuild that names no limit
    #[serde(default = "default_rebuild_pages")]
    pub default_rebuild_pages: u32,

    /// Hard ceiling for any requested page limit
    #[serde(default = "default_max_page_limit")]
    pub max_page_limit: u32,

    /// Wall-clock ceiling for one build, checked between pages
    #[serde(default = "default_time_budget")]
    pub time_budget_seconds: u64,

    /// Prefix descriptions with their ancestors ("LIVE ANIMALS > Horses")
    #[serde(default = "default_breadcrumbs")]
    pub breadcrumbs: bool,

    #[serde(default = "default_search_limit")]
    pub default_search_limit: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            implicit_page_limit: default_implicit_page_limit(),
            default_rebuild_pages: default_rebuild_pages(),
            max_page_limit: default_max_page_limit(),
            time_budget_seconds: default_time_budget(),
            breadcrumbs: default_breadcrumbs(),
            default_search_limit: default_search_limit(),
        }
    }
}

impl IndexSettings {
    pub fn time_budget(&self) -> Duration {
        Duration::from_secs(self.time_budget_seconds)
    }

    /// Clamp a requested page count into `1..=max_page_limit`
    pub fn clamp_pages(&self, requested: u32) -> u32 {
        requested.clamp(1, self.max_page_limit.max(1))
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_upstream_url() -> String {
    DEFAULT_UPSTREAM_URL.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("isztar/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_date() -> String {
    "2025-11-17".to_string()
}

fn default_language() -> String {
    "PL".to_string()
}

fn default_implicit_page_limit() -> u32 {
    3
}

fn default_rebuild_pages() -> u32 {
    50
}

fn default_max_page_limit() -> u32 {
    500
}

fn default_time_budget() -> u64 {
    30
}

fn default_breadcrumbs() -> bool {
    true
}

fn default_search_limit() -> usize {
    20
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

impl ServiceConfig {
    /// Resolve configuration from an explicit file, the default location, or defaults
    ///
    /// Environment overrides are applied last.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match explicit_path {
            Some(path) => Self::load_from_path(path)?,
            None => match Self::default_config_path() {
                Some(path) if path.exists() => Self::load_from_path(&path)?,
                _ => {
                    debug!("No config file found, using built-in defaults");
                    Self::default()
                }
            },
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific YAML file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        let config: ServiceConfig = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;

        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Platform config location (`~/.config/isztar/config.yaml` on Linux)
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("pl", "isztar", "isztar")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Apply `ISZTAR_*` environment overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(ENV_UPSTREAM_URL) {
            if !url.trim().is_empty() {
                debug!("Upstream URL overridden from {}", ENV_UPSTREAM_URL);
                self.upstream.base_url = url.trim().to_string();
            }
        }

        if let Ok(bind) = std::env::var(ENV_BIND) {
            if !bind.trim().is_empty() {
                self.server.bind = bind.trim().to_string();
            }
        }
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if !self.upstream.base_url.starts_with("http://")
            && !self.upstream.base_url.starts_with("https://")
        {
            anyhow::bail!("upstream.base_url must start with http:// or https://");
        }

        if self.upstream.timeout_seconds == 0 {
            anyhow::bail!("upstream.timeout_seconds must be at least 1");
        }

        if self.index.implicit_page_limit == 0 || self.index.max_page_limit == 0 {
            anyhow::bail!("index page limits must be at least 1");
        }

        chrono::NaiveDate::parse_from_str(&self.defaults.date, "%Y-%m-%d").with_context(|| {
            format!(
                "defaults.date must be YYYY-MM-DD, got '{}'",
                self.defaults.date
            )
        })?;

        if self.defaults.language.trim().is_empty() {
            anyhow::bail!("defaults.language must not be empty");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.upstream.base_url, DEFAULT_UPSTREAM_URL);
        assert_eq!(config.upstream.timeout_seconds, 30);
        assert_eq!(config.defaults.date, "2025-11-17");
        assert_eq!(config.defaults.language, "PL");
        assert_eq!(config.index.implicit_page_limit, 3);
        assert!(config.index.breadcrumbs);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "index:\n  implicit_page_limit: 5\n  breadcrumbs: false\ndefaults:\n  language: EN\n",
        )
        .unwrap();

        let config = ServiceConfig::load_from_path(&path).unwrap();
        assert_eq!(config.index.implicit_page_limit, 5);
        assert!(!config.index.breadcrumbs);
        assert_eq!(config.index.max_page_limit, 500);
        assert_eq!(config.defaults.language, "EN");
        assert_eq!(config.defaults.date, "2025-11-17");
        assert_eq!(config.upstream.base_url, DEFAULT_UPSTREAM_URL);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = ServiceConfig::load(Some(&temp_dir.path().join("nope.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_date() {
        let mut config = ServiceConfig::default();
        config.defaults.date = "17.11.2025".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("YYYY-MM-DD"));
    }

    #[test]
    fn test_clamp_pages() {
        let settings = IndexSettings::default();
        assert_eq!(settings.clamp_pages(0), 1);
        assert_eq!(settings.clamp_pages(7), 7);
        assert_eq!(settings.clamp_pages(10_000), 500);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var(ENV_UPSTREAM_URL, "http://127.0.0.1:9999/tariff");
        std::env::set_var(ENV_BIND, "0.0.0.0:8080");

        let mut config = ServiceConfig::default();
        config.apply_env_overrides();

        std::env::remove_var(ENV_UPSTREAM_URL);
        std::env::remove_var(ENV_BIND);

        assert_eq!(config.upstream.base_url, "http://127.0.0.1:9999/tariff");
        assert_eq!(config.server.bind, "0.0.0.0:8080");
    }
}
