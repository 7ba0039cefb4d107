//! TOML configuration file loading
//!
//! Configuration is layered: [`Config::default`] supplies every value, then
//! the keys present in the file are applied over it one field at a time.
//! Unknown keys are reported as warnings and otherwise ignored.

use super::error::{ConfigError, ConfigResult};
use super::types::Config;
use crate::core::time::parse_duration;
use crate::engine::Severity;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const TOP_LEVEL_KEYS: &[&str] = &[
    "cacheDir",
    "timeout",
    "deleteFailedImages",
    "vulnerabilities",
    "engine",
    "registry",
];

/// Default configuration file location, `<config dir>/imagegate/imagegate.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("imagegate").join("imagegate.toml"))
}

impl Config {
    /// Load configuration from `config_file`, or from the default location
    ///
    /// An explicitly named file must exist. Without one, the default location
    /// is used if present and built-in defaults otherwise.
    pub async fn load(config_file: Option<&Path>) -> ConfigResult<Self> {
        let path = match config_file {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::not_found(path.to_path_buf()));
                }
                path.to_path_buf()
            }
            None => match default_config_path() {
                Some(path) if path.exists() => path,
                _ => {
                    log::debug!("No configuration file found, using defaults");
                    return Ok(Config::default());
                }
            },
        };

        log::debug!("Loading configuration from {}", path.display());
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
        Self::from_toml_str(&contents, &path.display().to_string())
    }

    /// Build a configuration from TOML text layered over the defaults
    ///
    /// A document carrying `components.scanner.config` as a string is treated
    /// as a host-orchestrator configuration: that embedded string is the
    /// scanner configuration.
    pub fn from_toml_str(contents: &str, location: &str) -> ConfigResult<Self> {
        let table = contents
            .parse::<toml::Table>()
            .map_err(|e| ConfigError::parse(location, e))?;

        let mut config = Config::default();
        match embedded_scanner_config(&table) {
            Some(embedded) => {
                let inner = embedded
                    .parse::<toml::Table>()
                    .map_err(|e| ConfigError::parse(format!("{} (components.scanner.config)", location), e))?;
                config.apply_toml_values(&inner)?;
            }
            None if table.contains_key("components") => {
                log::debug!("{} has no scanner configuration, using defaults", location);
            }
            None => config.apply_toml_values(&table)?,
        }
        Ok(config)
    }

    /// Apply the keys present in `table` over this configuration
    pub fn apply_toml_values(&mut self, table: &toml::Table) -> ConfigResult<()> {
        for key in table.keys() {
            if !TOP_LEVEL_KEYS.contains(&key.as_str()) {
                log::warn!("Ignoring unknown configuration key '{}'", key);
            }
        }

        if let Some(cache_dir) = get_str(table, "cacheDir", "cacheDir")? {
            if cache_dir.trim().is_empty() {
                return Err(ConfigError::invalid("cacheDir", "must not be empty"));
            }
            self.cache_dir = PathBuf::from(cache_dir);
        }
        if let Some(delete) = get_bool(table, "deleteFailedImages", "deleteFailedImages")? {
            self.delete_failed_images = delete;
        }

        if let Some(timeout) = get_table(table, "timeout")? {
            if let Some(total) = get_duration(timeout, "total", "timeout.total")? {
                self.timeout.total = total;
            }
            if let Some(per_image) = get_duration(timeout, "perImage", "timeout.perImage")? {
                self.timeout.per_image = per_image;
            }
        }

        if let Some(vulns) = get_table(table, "vulnerabilities")? {
            if let Some(ignore) =
                get_bool(vulns, "ignoreUnfixed", "vulnerabilities.ignoreUnfixed")?
            {
                self.vulnerabilities.ignore_unfixed = ignore;
            }
            if let Some(labels) =
                get_string_list(vulns, "severities", "vulnerabilities.severities")?
            {
                self.vulnerabilities.severities =
                    parse_severities(&labels, "vulnerabilities.severities")?;
            }
        }

        if let Some(engine) = get_table(table, "engine")? {
            // `url` configures a combined indexer/matcher instance
            if let Some(url) = get_str(engine, "url", "engine.url")? {
                self.engine.indexer_url = url.to_string();
                self.engine.matcher_url = url.to_string();
            }
            if let Some(url) = get_str(engine, "indexerUrl", "engine.indexerUrl")? {
                self.engine.indexer_url = url.to_string();
            }
            if let Some(url) = get_str(engine, "matcherUrl", "engine.matcherUrl")? {
                self.engine.matcher_url = url.to_string();
            }
            if let Some(timeout) =
                get_duration(engine, "requestTimeout", "engine.requestTimeout")?
            {
                if timeout.is_zero() {
                    return Err(ConfigError::invalid(
                        "engine.requestTimeout",
                        "must be greater than zero",
                    ));
                }
                self.engine.request_timeout = timeout;
            }
        }

        if let Some(registry) = get_table(table, "registry")? {
            if let Some(hosts) = get_string_list(registry, "insecure", "registry.insecure")? {
                self.registry.insecure = hosts;
            }
            if let Some(platform) = get_str(registry, "platform", "registry.platform")? {
                if platform.split('/').filter(|p| !p.is_empty()).count() < 2 {
                    return Err(ConfigError::invalid(
                        "registry.platform",
                        format!("'{}' is not of the form os/arch[/variant]", platform),
                    ));
                }
                self.registry.platform = platform.to_string();
            }
        }

        Ok(())
    }
}

/// Validate severity labels against the known vocabulary
pub fn parse_severities(labels: &[String], key: &str) -> ConfigResult<BTreeSet<Severity>> {
    if labels.is_empty() {
        return Err(ConfigError::invalid(key, "at least one severity is required"));
    }
    labels
        .iter()
        .map(|label| {
            label.trim().parse::<Severity>().map_err(|_| {
                ConfigError::invalid(
                    key,
                    format!(
                        "unknown severity '{}' (expected one of Unknown, Negligible, Low, Medium, High, Critical)",
                        label
                    ),
                )
            })
        })
        .collect()
}

fn embedded_scanner_config(table: &toml::Table) -> Option<&str> {
    table
        .get("components")
        .and_then(|v| v.as_table())
        .and_then(|c| c.get("scanner"))
        .and_then(|v| v.as_table())
        .and_then(|s| s.get("config"))
        .and_then(|v| v.as_str())
}

fn get_table<'a>(table: &'a toml::Table, key: &str) -> ConfigResult<Option<&'a toml::Table>> {
    match table.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_table()
            .map(Some)
            .ok_or_else(|| ConfigError::invalid(key, "expected a table")),
    }
}

fn get_str<'a>(table: &'a toml::Table, key: &str, path: &str) -> ConfigResult<Option<&'a str>> {
    match table.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| ConfigError::invalid(path, "expected a string")),
    }
}

fn get_bool(table: &toml::Table, key: &str, path: &str) -> ConfigResult<Option<bool>> {
    match table.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_bool()
            .map(Some)
            .ok_or_else(|| ConfigError::invalid(path, "expected true or false")),
    }
}

/// Accepts `"1h30m"`-style strings or integer seconds
fn get_duration(table: &toml::Table, key: &str, path: &str) -> ConfigResult<Option<Duration>> {
    match table.get(key) {
        None => Ok(None),
        Some(toml::Value::String(s)) => parse_duration(s)
            .map(Some)
            .map_err(|e| ConfigError::invalid(path, e)),
        Some(toml::Value::Integer(secs)) if *secs >= 0 => {
            Ok(Some(Duration::from_secs(*secs as u64)))
        }
        Some(toml::Value::Integer(_)) => Err(ConfigError::invalid(path, "must not be negative")),
        Some(_) => Err(ConfigError::invalid(
            path,
            "expected a duration such as \"1h30m\" or a number of seconds",
        )),
    }
}

/// Accepts a single string or an array of strings
fn get_string_list(
    table: &toml::Table,
    key: &str,
    path: &str,
) -> ConfigResult<Option<Vec<String>>> {
    match table.get(key) {
        None => Ok(None),
        Some(toml::Value::String(s)) => Ok(Some(vec![s.clone()])),
        Some(toml::Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ConfigError::invalid(path, "expected a list of strings"))
            })
            .collect::<ConfigResult<Vec<_>>>()
            .map(Some),
        Some(_) => Err(ConfigError::invalid(path, "expected a list of strings")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{DEFAULT_PER_IMAGE_TIMEOUT, DEFAULT_TOTAL_TIMEOUT};

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = Config::from_toml_str("", "test").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.cache_dir, PathBuf::from("/var/lib/clair"));
        assert!(config.delete_failed_images);
        assert!(config.vulnerabilities.ignore_unfixed);
        assert_eq!(config.vulnerabilities.severities.len(), 4);
        assert!(!config
            .vulnerabilities
            .severities
            .contains(&Severity::Negligible));
        assert_eq!(config.timeout.total, DEFAULT_TOTAL_TIMEOUT);
        assert_eq!(config.timeout.per_image, DEFAULT_PER_IMAGE_TIMEOUT);
    }

    #[test]
    fn test_partial_overlay_keeps_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            deleteFailedImages = false

            [timeout]
            total = "2h"

            [vulnerabilities]
            severities = ["critical", "HIGH"]
            "#,
            "test",
        )
        .unwrap();

        assert!(!config.delete_failed_images);
        assert_eq!(config.timeout.total, Duration::from_secs(7200));
        assert_eq!(config.timeout.per_image, DEFAULT_PER_IMAGE_TIMEOUT);
        assert!(config.vulnerabilities.ignore_unfixed);
        assert_eq!(
            config.vulnerabilities.severities,
            BTreeSet::from([Severity::Critical, Severity::High])
        );
        assert_eq!(config.cache_dir, PathBuf::from("/var/lib/clair"));
    }

    #[test]
    fn test_integer_seconds_and_engine_url() {
        let config = Config::from_toml_str(
            r#"
            [timeout]
            perImage = 90

            [engine]
            url = "http://clair:6060"
            matcherUrl = "http://matcher:6060"
            "#,
            "test",
        )
        .unwrap();

        assert_eq!(config.timeout.per_image, Duration::from_secs(90));
        assert_eq!(config.engine.indexer_url, "http://clair:6060");
        assert_eq!(config.engine.matcher_url, "http://matcher:6060");
    }

    #[test]
    fn test_unknown_severity_is_rejected() {
        let err = Config::from_toml_str(
            r#"
            [vulnerabilities]
            severities = ["Critical", "Severe"]
            "#,
            "test",
        )
        .unwrap_err();

        assert_eq!(err.key(), Some("vulnerabilities.severities"));
        assert!(err.to_string().contains("Severe"));
    }

    #[test]
    fn test_empty_severities_rejected() {
        let err = Config::from_toml_str(
            "[vulnerabilities]\nseverities = []\n",
            "test",
        )
        .unwrap_err();
        assert_eq!(err.key(), Some("vulnerabilities.severities"));
    }

    #[test]
    fn test_type_mismatches_name_the_key() {
        let err = Config::from_toml_str("deleteFailedImages = \"yes\"", "test").unwrap_err();
        assert_eq!(err.key(), Some("deleteFailedImages"));

        let err = Config::from_toml_str("[timeout]\ntotal = \"soon\"", "test").unwrap_err();
        assert_eq!(err.key(), Some("timeout.total"));

        let err = Config::from_toml_str("[timeout]\ntotal = -5", "test").unwrap_err();
        assert_eq!(err.key(), Some("timeout.total"));

        let err = Config::from_toml_str("timeout = 5", "test").unwrap_err();
        assert_eq!(err.key(), Some("timeout"));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = Config::from_toml_str("cacheDir = ", "broken.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_embedded_scanner_config() {
        let config = Config::from_toml_str(
            r#"
            [components.collector]
            enabled = true

            [components.scanner]
            enabled = true
            config = """
            cacheDir = "/tmp/clair"
            [vulnerabilities]
            ignoreUnfixed = false
            """
            "#,
            "test",
        )
        .unwrap();

        assert_eq!(config.cache_dir, PathBuf::from("/tmp/clair"));
        assert!(!config.vulnerabilities.ignore_unfixed);
    }

    #[test]
    fn test_wrapper_without_scanner_config_uses_defaults() {
        let config =
            Config::from_toml_str("[components.scanner]\nenabled = false\n", "test").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_invalid_platform_rejected() {
        let err = Config::from_toml_str("[registry]\nplatform = \"amd64\"", "test").unwrap_err();
        assert_eq!(err.key(), Some("registry.platform"));
    }

    #[tokio::test]
    async fn test_load_missing_explicit_file_fails() {
        let err = Config::load(Some(Path::new("/nonexistent/imagegate.toml")))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanner.toml");
        std::fs::write(&path, "cacheDir = \"/srv/clair\"\n").unwrap();

        let config = Config::load(Some(&path)).await.unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("/srv/clair"));
    }
}
