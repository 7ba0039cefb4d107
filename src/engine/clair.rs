//! Clair v4 HTTP Adapter
//!
//! Implements [`Indexer`] and [`Matcher`] against a Clair indexer/matcher pair
//! (or a combo-mode instance serving both). Update refresh consults the
//! matcher's update-operation list and keeps its ETag in the cache directory so
//! repeat refreshes are a single conditional request.

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::types::{IndexReport, Manifest, VulnerabilityReport};
use crate::engine::{Indexer, Matcher};
use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

const INDEX_REPORT_PATH: &str = "/indexer/api/v1/index_report";
const VULNERABILITY_REPORT_PATH: &str = "/matcher/api/v1/vulnerability_report";
const UPDATE_OPERATION_PATH: &str = "/matcher/api/v1/internal/update_operation";

/// Name of the update marker file inside the cache directory
pub const UPDATE_MARKER_FILE: &str = "update_operations.json";

/// Maximum number of bytes of an error body carried into an error message
const ERROR_BODY_LIMIT: usize = 512;

/// One entry of the matcher's update-operation list
#[derive(Debug, Clone, Deserialize)]
struct UpdateOperation {
    #[serde(rename = "ref")]
    reference: String,
    #[serde(default)]
    date: String,
}

/// Persisted state of the last update refresh
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateMarker {
    pub etag: Option<String>,
    /// Updater name to the ref of its latest operation
    pub latest: BTreeMap<String, String>,
}

/// HTTP client for a Clair indexer and matcher
pub struct ClairClient {
    http: reqwest::Client,
    indexer_url: String,
    matcher_url: String,
    marker_path: PathBuf,
}

impl ClairClient {
    pub fn new(
        indexer_url: &str,
        matcher_url: &str,
        request_timeout: Duration,
        cache_dir: &Path,
    ) -> EngineResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("imagegate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EngineError::Construction {
                message: format!("Failed to build HTTP client for Clair: {}", e),
            })?;

        Ok(Self {
            http,
            indexer_url: normalise_base_url(indexer_url)?,
            matcher_url: normalise_base_url(matcher_url)?,
            marker_path: cache_dir.join(UPDATE_MARKER_FILE),
        })
    }

    pub fn indexer_url(&self) -> &str {
        &self.indexer_url
    }

    pub fn matcher_url(&self) -> &str {
        &self.matcher_url
    }

    async fn load_marker(&self) -> UpdateMarker {
        match tokio::fs::read(&self.marker_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                log::warn!(
                    "Ignoring unreadable update marker {}: {}",
                    self.marker_path.display(),
                    e
                );
                UpdateMarker::default()
            }),
            Err(_) => UpdateMarker::default(),
        }
    }

    async fn store_marker(&self, marker: &UpdateMarker) {
        let result = match serde_json::to_vec_pretty(marker) {
            Ok(bytes) => tokio::fs::write(&self.marker_path, bytes)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = result {
            log::warn!(
                "Could not persist update marker {}: {}",
                self.marker_path.display(),
                e
            );
        }
    }
}

#[async_trait::async_trait]
impl Indexer for ClairClient {
    async fn index(&self, manifest: &Manifest) -> EngineResult<IndexReport> {
        let url = format!("{}{}", self.indexer_url, INDEX_REPORT_PATH);
        log::debug!(
            "Submitting manifest {} ({} layers) to indexer",
            manifest.hash,
            manifest.layers.len()
        );

        let response = self
            .http
            .post(&url)
            .json(manifest)
            .send()
            .await
            .map_err(|e| EngineError::transport(&url, &e))?;
        let response = ensure_success(&url, response).await?;

        let report: IndexReport = response.json().await.map_err(|e| EngineError::Decode {
            what: "index report".to_string(),
            message: e.to_string(),
        })?;

        if !report.is_complete() {
            let message = if report.err.is_empty() {
                format!("indexer finished in state '{}'", report.state)
            } else {
                report.err.clone()
            };
            return Err(EngineError::Index {
                manifest_hash: manifest.hash.clone(),
                message,
            });
        }
        Ok(report)
    }
}

#[async_trait::async_trait]
impl Matcher for ClairClient {
    async fn fetch_updates(&self) -> EngineResult<()> {
        let url = format!("{}{}?latest=true", self.matcher_url, UPDATE_OPERATION_PATH);
        let marker = self.load_marker().await;

        let mut request = self.http.get(&url);
        if let Some(etag) = &marker.etag {
            request = request.header(IF_NONE_MATCH, etag);
        }
        let response = request
            .send()
            .await
            .map_err(|e| EngineError::transport(&url, &e))?;

        if response.status() == StatusCode::NOT_MODIFIED {
            log::debug!("Vulnerability database unchanged since last refresh");
            return Ok(());
        }
        let response = ensure_success(&url, response).await?;

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let operations: HashMap<String, Vec<UpdateOperation>> =
            response.json().await.map_err(|e| EngineError::Decode {
                what: "update operations".to_string(),
                message: e.to_string(),
            })?;

        let refreshed = UpdateMarker {
            etag,
            latest: latest_refs(&operations),
        };
        if refreshed.latest.is_empty() {
            return Err(EngineError::NoVulnerabilityData);
        }

        let changed = changed_updaters(&marker, &refreshed);
        if changed.is_empty() {
            log::debug!(
                "Vulnerability database current ({} updaters)",
                refreshed.latest.len()
            );
        } else {
            log::info!(
                "Vulnerability database updated by {} of {} updaters: {}",
                changed.len(),
                refreshed.latest.len(),
                changed.join(", ")
            );
        }

        self.store_marker(&refreshed).await;
        Ok(())
    }

    async fn scan(&self, report: &IndexReport) -> EngineResult<VulnerabilityReport> {
        let url = format!(
            "{}{}/{}",
            self.matcher_url, VULNERABILITY_REPORT_PATH, report.manifest_hash
        );

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::transport(&url, &e))?;
        let response = ensure_success(&url, response).await?;

        response.json().await.map_err(|e| EngineError::Decode {
            what: "vulnerability report".to_string(),
            message: e.to_string(),
        })
    }
}

fn normalise_base_url(raw: &str) -> EngineResult<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = reqwest::Url::parse(trimmed).map_err(|e| EngineError::Construction {
        message: format!("Invalid Clair URL '{}': {}", raw, e),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        other => Err(EngineError::Construction {
            message: format!("Unsupported scheme '{}' in Clair URL '{}'", other, raw),
        }),
    }
}

async fn ensure_success(
    url: &str,
    response: reqwest::Response,
) -> EngineResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > ERROR_BODY_LIMIT {
        let mut cut = ERROR_BODY_LIMIT;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push('…');
    }
    Err(EngineError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        body: body.trim().to_string(),
    })
}

fn latest_refs(operations: &HashMap<String, Vec<UpdateOperation>>) -> BTreeMap<String, String> {
    operations
        .iter()
        .filter_map(|(updater, ops)| {
            // RFC 3339 dates sort lexically
            ops.iter()
                .max_by(|a, b| a.date.cmp(&b.date))
                .map(|op| (updater.clone(), op.reference.clone()))
        })
        .collect()
}

fn changed_updaters(previous: &UpdateMarker, current: &UpdateMarker) -> Vec<String> {
    current
        .latest
        .iter()
        .filter(|(updater, reference)| previous.latest.get(*updater) != Some(*reference))
        .map(|(updater, _)| updater.clone())
        .collect()
}
