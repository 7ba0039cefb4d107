//! Engine Wire Types
//!
//! Manifests, index reports and vulnerability reports exchanged with the
//! indexing and matching engines. Field names follow the Clair v4 JSON API.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use strum_macros::{Display, EnumIter, EnumString};

/// Normalized vulnerability severity, ordered from least to most severe
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[serde(from = "String", into = "String")]
pub enum Severity {
    Unknown,
    Negligible,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Lenient conversion for engine output: anything unrecognised is `Unknown`
    pub fn from_report_label(label: &str) -> Self {
        label.trim().parse().unwrap_or(Severity::Unknown)
    }
}

impl From<String> for Severity {
    fn from(label: String) -> Self {
        Severity::from_report_label(&label)
    }
}

impl From<Severity> for String {
    fn from(severity: Severity) -> Self {
        severity.to_string()
    }
}

/// Image manifest as consumed by the indexer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Content digest of the manifest, e.g. `sha256:…`
    pub hash: String,
    pub layers: Vec<Layer>,
}

/// One layer blob and how to fetch it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub hash: String,
    pub uri: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// Inventory of an image produced by the indexer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexReport {
    pub manifest_hash: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub packages: BTreeMap<String, Package>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub err: String,
}

impl IndexReport {
    /// True when the indexer finished and reported no error
    pub fn is_complete(&self) -> bool {
        self.err.is_empty() && (self.success || self.state == "IndexFinished")
    }
}

/// A single matched vulnerability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Severity as reported by the upstream security tracker
    #[serde(default)]
    pub severity: String,
    #[serde(default = "unknown_severity")]
    pub normalized_severity: Severity,
    /// Empty when no fixed version is known
    #[serde(default)]
    pub fixed_in_version: String,
    #[serde(default)]
    pub package: Option<Package>,
}

fn unknown_severity() -> Severity {
    Severity::Unknown
}

impl Vulnerability {
    pub fn has_fix(&self) -> bool {
        !self.fixed_in_version.trim().is_empty()
    }
}

/// Vulnerabilities matched against an index report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityReport {
    #[serde(default)]
    pub manifest_hash: String,
    #[serde(default)]
    pub vulnerabilities: BTreeMap<String, Vulnerability>,
    /// Package id to the ids of vulnerabilities affecting it
    #[serde(default)]
    pub package_vulnerabilities: BTreeMap<String, Vec<String>>,
    /// Opaque enrichment payloads (e.g. CVSS scores) keyed by enricher
    #[serde(default)]
    pub enrichments: BTreeMap<String, serde_json::Value>,
}
