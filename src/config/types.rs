//! Configuration Types and Defaults

use crate::engine::Severity;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CACHE_DIR: &str = "/var/lib/clair";
pub const DEFAULT_CLAIR_URL: &str = "http://localhost:6060";
pub const DEFAULT_TOTAL_TIMEOUT: Duration = Duration::from_secs(23 * 3600);
pub const DEFAULT_PER_IMAGE_TIMEOUT: Duration = Duration::from_secs(3600);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Complete scanner configuration, fully populated with defaults
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory for persistent matcher state
    pub cache_dir: PathBuf,
    pub timeout: TimeoutConfig,
    /// Whether images that failed to scan are also handed over for removal
    pub delete_failed_images: bool,
    pub vulnerabilities: VulnConfig,
    pub engine: EngineConfig,
    pub registry: RegistryConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Wall-clock budget for the whole batch
    pub total: Duration,
    /// Budget for a single image; zero disables the per-image limit
    pub per_image: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VulnConfig {
    /// Only count vulnerabilities that have a fixed version available
    pub ignore_unfixed: bool,
    /// Severities that make an image non-compliant
    pub severities: BTreeSet<Severity>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub indexer_url: String,
    pub matcher_url: String,
    /// Timeout applied to every single HTTP request
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Registry hosts reached over plain HTTP
    pub insecure: Vec<String>,
    /// Platform picked from multi-arch images, `os/arch[/variant]`
    pub platform: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            timeout: TimeoutConfig::default(),
            delete_failed_images: true,
            vulnerabilities: VulnConfig::default(),
            engine: EngineConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            total: DEFAULT_TOTAL_TIMEOUT,
            per_image: DEFAULT_PER_IMAGE_TIMEOUT,
        }
    }
}

impl Default for VulnConfig {
    fn default() -> Self {
        Self {
            ignore_unfixed: true,
            severities: BTreeSet::from([
                Severity::Critical,
                Severity::High,
                Severity::Medium,
                Severity::Low,
            ]),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            indexer_url: DEFAULT_CLAIR_URL.to_string(),
            matcher_url: DEFAULT_CLAIR_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            insecure: Vec::new(),
            platform: crate::engine::registry::host_platform(),
        }
    }
}

impl std::fmt::Display for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use crate::core::time::format_duration;

        let severities: Vec<String> = self
            .vulnerabilities
            .severities
            .iter()
            .rev()
            .map(|s| s.to_string())
            .collect();
        write!(
            f,
            "cacheDir={} timeout.total={} timeout.perImage={} deleteFailedImages={} \
             vulnerabilities.ignoreUnfixed={} vulnerabilities.severities=[{}] \
             engine.indexerUrl={} engine.matcherUrl={}",
            self.cache_dir.display(),
            format_duration(self.timeout.total),
            format_duration(self.timeout.per_image),
            self.delete_failed_images,
            self.vulnerabilities.ignore_unfixed,
            severities.join(","),
            self.engine.indexer_url,
            self.engine.matcher_url,
        )
    }
}
