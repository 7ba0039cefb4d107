//! Image Scan Step
//!
//! Drives one image through update refresh, inspection, indexing, matching
//! and the severity policy. Every engine call runs under the image's
//! [`ScanContext`]; the first failing stage ends the scan.

use crate::provider::Image;
use crate::scanner::context::ScanContext;
use crate::scanner::error::ScanResult;
use crate::scanner::session::ScanSession;
use crate::scanner::types::{ScanStage, ScanStatus};

/// Scan a single image
///
/// `Ok` carries either [`ScanStatus::Ok`] or [`ScanStatus::NonCompliant`];
/// an `Err` means the image is [`ScanStatus::Failed`].
pub async fn scan_one(
    ctx: &ScanContext,
    session: &ScanSession,
    image: &Image,
) -> ScanResult<ScanStatus> {
    session.refresh_updates(ctx).await?;

    let reference = image.reference();
    let manifest = ctx
        .run(ScanStage::Inspect, session.inspector().inspect(reference))
        .await?;
    log::debug!(
        "{}: manifest {} with {} layers",
        image.image_id,
        manifest.hash,
        manifest.layers.len()
    );

    let index_report = ctx
        .run(ScanStage::Index, session.indexer().index(&manifest))
        .await?;
    log::debug!(
        "{}: indexed {} packages",
        image.image_id,
        index_report.packages.len()
    );

    let report = ctx
        .run(ScanStage::Match, session.matcher().scan(&index_report))
        .await?;

    let findings = session.policy().findings(&report);
    if findings.is_empty() {
        log::info!(
            "{}: compliant ({} vulnerabilities reported)",
            image,
            report.vulnerabilities.len()
        );
        return Ok(ScanStatus::Ok);
    }

    log::warn!(
        "{}: non-compliant, {} disqualifying vulnerabilities",
        image,
        findings.len()
    );
    for vuln in findings {
        let package = vuln
            .package
            .as_ref()
            .map(|p| format!("{} {}", p.name, p.version))
            .unwrap_or_default();
        if vuln.has_fix() {
            log::info!(
                "{}: {} [{}] {} (fixed in {})",
                image.image_id,
                vuln.name,
                vuln.normalized_severity,
                package,
                vuln.fixed_in_version
            );
        } else {
            log::info!(
                "{}: {} [{}] {} (no fix)",
                image.image_id,
                vuln.name,
                vuln.normalized_severity,
                package
            );
        }
    }
    Ok(ScanStatus::NonCompliant)
}
