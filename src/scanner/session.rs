//! Scan Session
//!
//! Long-lived state shared by every image of a batch: the engine handles, the
//! timeout settings, the severity policy and the update-refresh latch.

use crate::config::{Config, TimeoutConfig};
use crate::core::shutdown::ShutdownSignal;
use crate::engine::clair::ClairClient;
use crate::engine::registry::RegistryInspector;
use crate::engine::{EngineError, EngineResult, ImageInspector, Indexer, Matcher};
use crate::scanner::context::ScanContext;
use crate::scanner::error::ScanResult;
use crate::scanner::policy::SeverityPolicy;
use crate::scanner::types::ScanStage;
use std::sync::Arc;
use tokio::sync::OnceCell;

pub struct ScanSession {
    inspector: Arc<dyn ImageInspector>,
    indexer: Arc<dyn Indexer>,
    matcher: Arc<dyn Matcher>,
    timeouts: TimeoutConfig,
    policy: SeverityPolicy,
    updates: OnceCell<()>,
}

impl ScanSession {
    pub fn new(
        inspector: Arc<dyn ImageInspector>,
        indexer: Arc<dyn Indexer>,
        matcher: Arc<dyn Matcher>,
        timeouts: TimeoutConfig,
        policy: SeverityPolicy,
    ) -> Self {
        Self {
            inspector,
            indexer,
            matcher,
            timeouts,
            policy,
            updates: OnceCell::new(),
        }
    }

    /// Build the session against the configured Clair and registries
    ///
    /// Creates the cache directory when it is missing.
    pub async fn from_config(config: &Config) -> EngineResult<Self> {
        tokio::fs::create_dir_all(&config.cache_dir)
            .await
            .map_err(|source| EngineError::CacheDir {
                path: config.cache_dir.clone(),
                source,
            })?;

        let clair = Arc::new(ClairClient::new(
            &config.engine.indexer_url,
            &config.engine.matcher_url,
            config.engine.request_timeout,
            &config.cache_dir,
        )?);
        let inspector = Arc::new(RegistryInspector::new(
            &config.registry.insecure,
            &config.registry.platform,
            config.engine.request_timeout,
        )?);

        log::debug!(
            "Scan session ready: indexer {} matcher {}",
            clair.indexer_url(),
            clair.matcher_url()
        );

        Ok(Self::new(
            inspector,
            clair.clone(),
            clair,
            config.timeout,
            SeverityPolicy::from(&config.vulnerabilities),
        ))
    }

    pub fn inspector(&self) -> &dyn ImageInspector {
        self.inspector.as_ref()
    }

    pub fn indexer(&self) -> &dyn Indexer {
        self.indexer.as_ref()
    }

    pub fn matcher(&self) -> &dyn Matcher {
        self.matcher.as_ref()
    }

    pub fn timeouts(&self) -> TimeoutConfig {
        self.timeouts
    }

    pub fn policy(&self) -> &SeverityPolicy {
        &self.policy
    }

    /// Context for a new batch, its deadline starting now
    pub fn start_batch(&self, shutdown: ShutdownSignal) -> ScanContext {
        ScanContext::with_budget(self.timeouts.total, shutdown)
    }

    /// Refresh the vulnerability database at most once per session
    ///
    /// A failed refresh is not remembered, so the next image tries again.
    pub async fn refresh_updates(&self, ctx: &ScanContext) -> ScanResult<()> {
        self.updates
            .get_or_try_init(|| async {
                let refreshed = ctx
                    .run(ScanStage::UpdateRefresh, self.matcher.fetch_updates())
                    .await;
                if refreshed.is_ok() {
                    log::info!("Vulnerability database is up to date");
                }
                refreshed
            })
            .await
            .map(|_| ())
    }

    pub fn updates_refreshed(&self) -> bool {
        self.updates.initialized()
    }
}
