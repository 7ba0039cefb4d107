//! Engine Boundary
//!
//! Traits for the external collaborators the scan step drives, plus the
//! concrete adapters used by the binary:
//!
//! - [`ImageInspector`]: image reference → [`Manifest`] ([`registry::RegistryInspector`])
//! - [`Indexer`]: manifest → [`IndexReport`] ([`clair::ClairClient`])
//! - [`Matcher`]: index report → [`VulnerabilityReport`], plus update refresh
//!   ([`clair::ClairClient`])

pub mod clair;
pub mod error;
pub mod registry;
pub mod types;

pub use error::{EngineError, EngineResult};
pub use types::{
    IndexReport, Layer, Manifest, Package, Severity, Vulnerability, VulnerabilityReport,
};

/// Resolves an image reference into a manifest the indexer can fetch layers from
#[async_trait::async_trait]
pub trait ImageInspector: Send + Sync {
    async fn inspect(&self, reference: &str) -> EngineResult<Manifest>;
}

/// Produces a package inventory for a manifest
#[async_trait::async_trait]
pub trait Indexer: Send + Sync {
    async fn index(&self, manifest: &Manifest) -> EngineResult<IndexReport>;
}

/// Matches inventories against the vulnerability database
#[async_trait::async_trait]
pub trait Matcher: Send + Sync {
    /// Bring the vulnerability database up to date
    ///
    /// Must be cheap when the database is already current; callers may invoke
    /// it once per image.
    async fn fetch_updates(&self) -> EngineResult<()>;

    async fn scan(&self, report: &IndexReport) -> EngineResult<VulnerabilityReport>;
}
