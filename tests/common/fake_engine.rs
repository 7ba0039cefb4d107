//! Scripted engine for scanner tests
//!
//! One value implements inspection, indexing and matching. Each image
//! reference can be given a [`Behaviour`]; unknown references are clean.
//! Delays use the tokio clock, so paused-time tests advance instantly.

use async_trait::async_trait;
use imagegate::engine::{
    EngineError, EngineResult, ImageInspector, IndexReport, Indexer, Layer, Manifest, Matcher,
    Package, Severity, Vulnerability, VulnerabilityReport,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Behaviour {
    /// No vulnerabilities
    Clean,
    /// One vulnerability of the given severity, with or without a fix
    Vulnerable { severity: Severity, fixed: bool },
    FailInspect,
    FailIndex,
    FailMatch,
    /// Inspection takes this long before succeeding with a clean report
    Slow(Duration),
}

pub struct FakeEngine {
    behaviours: HashMap<String, Behaviour>,
    /// Added to every inspection
    inspect_delay: Duration,
    /// Added to every match, the last engine call of a scan
    match_delay: Duration,
    update_failures: usize,
    update_calls: AtomicUsize,
    inspected: Mutex<Vec<String>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            behaviours: HashMap::new(),
            inspect_delay: Duration::ZERO,
            match_delay: Duration::ZERO,
            update_failures: 0,
            update_calls: AtomicUsize::new(0),
            inspected: Mutex::new(Vec::new()),
        }
    }

    pub fn with(mut self, reference: &str, behaviour: Behaviour) -> Self {
        self.behaviours.insert(reference.to_string(), behaviour);
        self
    }

    pub fn with_inspect_delay(mut self, delay: Duration) -> Self {
        self.inspect_delay = delay;
        self
    }

    pub fn with_match_delay(mut self, delay: Duration) -> Self {
        self.match_delay = delay;
        self
    }

    /// Fail the first `count` update refreshes
    pub fn with_update_failures(mut self, count: usize) -> Self {
        self.update_failures = count;
        self
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// References inspected so far, in call order
    pub fn inspected(&self) -> Vec<String> {
        self.inspected.lock().unwrap().clone()
    }

    fn behaviour(&self, reference: &str) -> Behaviour {
        self.behaviours
            .get(reference)
            .cloned()
            .unwrap_or(Behaviour::Clean)
    }
}

fn manifest_hash(reference: &str) -> String {
    format!("sha256:{}", reference)
}

fn reference_of(manifest_hash: &str) -> &str {
    manifest_hash.trim_start_matches("sha256:")
}

fn failure(what: &str, reference: &str) -> EngineError {
    EngineError::Status {
        url: format!("http://fake/{}/{}", what, reference),
        status: 500,
        body: format!("{} exploded", what),
    }
}

#[async_trait]
impl ImageInspector for FakeEngine {
    async fn inspect(&self, reference: &str) -> EngineResult<Manifest> {
        self.inspected.lock().unwrap().push(reference.to_string());
        if !self.inspect_delay.is_zero() {
            tokio::time::sleep(self.inspect_delay).await;
        }

        match self.behaviour(reference) {
            Behaviour::FailInspect => return Err(failure("inspect", reference)),
            Behaviour::Slow(delay) => tokio::time::sleep(delay).await,
            _ => {}
        }

        Ok(Manifest {
            hash: manifest_hash(reference),
            layers: vec![Layer {
                hash: format!("sha256:layer-{}", reference),
                uri: format!("http://fake/blobs/{}", reference),
                headers: HashMap::new(),
            }],
        })
    }
}

#[async_trait]
impl Indexer for FakeEngine {
    async fn index(&self, manifest: &Manifest) -> EngineResult<IndexReport> {
        let reference = reference_of(&manifest.hash);
        if let Behaviour::FailIndex = self.behaviour(reference) {
            return Err(EngineError::Index {
                manifest_hash: manifest.hash.clone(),
                message: "layer fetch failed".to_string(),
            });
        }

        let package = Package {
            id: "1".to_string(),
            name: "openssl".to_string(),
            version: "3.0.0".to_string(),
        };
        Ok(IndexReport {
            manifest_hash: manifest.hash.clone(),
            state: "IndexFinished".to_string(),
            packages: BTreeMap::from([("1".to_string(), package)]),
            success: true,
            err: String::new(),
        })
    }
}

#[async_trait]
impl Matcher for FakeEngine {
    async fn fetch_updates(&self) -> EngineResult<()> {
        let call = self.update_calls.fetch_add(1, Ordering::SeqCst);
        if call < self.update_failures {
            return Err(EngineError::NoVulnerabilityData);
        }
        Ok(())
    }

    async fn scan(&self, report: &IndexReport) -> EngineResult<VulnerabilityReport> {
        if !self.match_delay.is_zero() {
            tokio::time::sleep(self.match_delay).await;
        }
        let reference = reference_of(&report.manifest_hash);
        let mut vulnerabilities = BTreeMap::new();
        match self.behaviour(reference) {
            Behaviour::FailMatch => return Err(failure("match", reference)),
            Behaviour::Vulnerable { severity, fixed } => {
                let vuln = Vulnerability {
                    id: "42".to_string(),
                    name: format!("CVE-2024-{}", reference),
                    description: "test vulnerability".to_string(),
                    severity: severity.to_string(),
                    normalized_severity: severity,
                    fixed_in_version: if fixed { "3.0.1".to_string() } else { String::new() },
                    package: report.packages.get("1").cloned(),
                };
                vulnerabilities.insert(vuln.id.clone(), vuln);
            }
            _ => {}
        }

        Ok(VulnerabilityReport {
            manifest_hash: report.manifest_hash.clone(),
            vulnerabilities,
            ..Default::default()
        })
    }
}
