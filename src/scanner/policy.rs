//! Severity Policy
//!
//! Decides whether a vulnerability report disqualifies an image. A report is
//! non-compliant when at least one vulnerability has a configured severity
//! and, if unfixed vulnerabilities are ignored, a fixed version available.

use crate::config::VulnConfig;
use crate::engine::{Severity, Vulnerability, VulnerabilityReport};
use std::collections::BTreeSet;

/// Returns true when `report` contains a disqualifying vulnerability
pub fn evaluate(
    report: &VulnerabilityReport,
    severities: &BTreeSet<Severity>,
    ignore_unfixed: bool,
) -> bool {
    report
        .vulnerabilities
        .values()
        .any(|v| is_disqualifying(v, severities, ignore_unfixed))
}

fn is_disqualifying(
    vulnerability: &Vulnerability,
    severities: &BTreeSet<Severity>,
    ignore_unfixed: bool,
) -> bool {
    severities.contains(&vulnerability.normalized_severity)
        && (!ignore_unfixed || vulnerability.has_fix())
}

/// The configured policy, built once per session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeverityPolicy {
    severities: BTreeSet<Severity>,
    ignore_unfixed: bool,
}

impl SeverityPolicy {
    pub fn new<I: IntoIterator<Item = Severity>>(severities: I, ignore_unfixed: bool) -> Self {
        Self {
            severities: severities.into_iter().collect(),
            ignore_unfixed,
        }
    }

    pub fn severities(&self) -> &BTreeSet<Severity> {
        &self.severities
    }

    pub fn ignore_unfixed(&self) -> bool {
        self.ignore_unfixed
    }

    /// True when the report is non-compliant under this policy
    pub fn evaluate(&self, report: &VulnerabilityReport) -> bool {
        evaluate(report, &self.severities, self.ignore_unfixed)
    }

    /// Disqualifying vulnerabilities, most severe first, then by name
    pub fn findings<'a>(&self, report: &'a VulnerabilityReport) -> Vec<&'a Vulnerability> {
        let mut findings: Vec<&Vulnerability> = report
            .vulnerabilities
            .values()
            .filter(|v| is_disqualifying(v, &self.severities, self.ignore_unfixed))
            .collect();
        findings.sort_by(|a, b| {
            b.normalized_severity
                .cmp(&a.normalized_severity)
                .then_with(|| a.name.cmp(&b.name))
        });
        findings
    }
}

impl From<&VulnConfig> for SeverityPolicy {
    fn from(config: &VulnConfig) -> Self {
        Self::new(config.severities.iter().copied(), config.ignore_unfixed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vuln(name: &str, severity: Severity, fixed_in: &str) -> Vulnerability {
        Vulnerability {
            id: name.to_string(),
            name: name.to_string(),
            description: String::new(),
            severity: severity.to_string(),
            normalized_severity: severity,
            fixed_in_version: fixed_in.to_string(),
            package: None,
        }
    }

    fn report(vulns: Vec<Vulnerability>) -> VulnerabilityReport {
        VulnerabilityReport {
            manifest_hash: "sha256:test".to_string(),
            vulnerabilities: vulns.into_iter().map(|v| (v.id.clone(), v)).collect(),
            ..Default::default()
        }
    }

    fn critical_only() -> BTreeSet<Severity> {
        BTreeSet::from([Severity::Critical])
    }

    #[test]
    fn test_fixed_critical_is_non_compliant() {
        let report = report(vec![vuln("CVE-1", Severity::Critical, "1.2.3")]);
        assert!(evaluate(&report, &critical_only(), true));
    }

    #[test]
    fn test_unfixed_critical_ignored_when_ignore_unfixed() {
        let report = report(vec![vuln("CVE-1", Severity::Critical, "")]);
        assert!(!evaluate(&report, &critical_only(), true));
        // Counted once unfixed vulnerabilities are no longer ignored
        assert!(evaluate(&report, &critical_only(), false));
    }

    #[test]
    fn test_empty_report_is_compliant() {
        let empty = VulnerabilityReport::default();
        assert!(!evaluate(&empty, &critical_only(), true));
        assert!(!evaluate(&empty, &critical_only(), false));

        let everything: BTreeSet<Severity> = BTreeSet::from([
            Severity::Unknown,
            Severity::Negligible,
            Severity::Low,
            Severity::Medium,
            Severity::High,
            Severity::Critical,
        ]);
        assert!(!evaluate(&empty, &everything, false));
    }

    #[test]
    fn test_out_of_set_severities_are_compliant_regardless_of_fix() {
        let report = report(vec![
            vuln("CVE-1", Severity::Low, "1.0"),
            vuln("CVE-2", Severity::Medium, ""),
        ]);
        assert!(!evaluate(&report, &critical_only(), true));
        assert!(!evaluate(&report, &critical_only(), false));
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let report = report(vec![
            vuln("CVE-1", Severity::High, "2.0"),
            vuln("CVE-2", Severity::Low, ""),
        ]);
        let policy = SeverityPolicy::new([Severity::High], true);

        let first = policy.evaluate(&report);
        let second = policy.evaluate(&report);
        assert_eq!(first, second);
        assert!(first);
    }

    #[test]
    fn test_findings_sorted_by_severity_then_name() {
        let report = report(vec![
            vuln("CVE-b", Severity::High, "1"),
            vuln("CVE-a", Severity::High, "1"),
            vuln("CVE-c", Severity::Critical, "1"),
            vuln("CVE-d", Severity::Critical, ""),
            vuln("CVE-e", Severity::Low, "1"),
        ]);
        let policy = SeverityPolicy::new([Severity::Critical, Severity::High], true);

        let names: Vec<&str> = policy
            .findings(&report)
            .iter()
            .map(|v| v.name.as_str())
            .collect();
        assert_eq!(names, vec!["CVE-c", "CVE-a", "CVE-b"]);
    }

    #[test]
    fn test_policy_from_config_defaults() {
        let policy = SeverityPolicy::from(&VulnConfig::default());
        assert!(policy.ignore_unfixed());
        assert_eq!(policy.severities().len(), 4);
        assert!(!policy.severities().contains(&Severity::Unknown));
    }
}
