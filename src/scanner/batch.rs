//! Batch Scan Loop
//!
//! Scans images one after another under a single batch deadline. Once the
//! deadline has passed, or shutdown was requested, every image not yet
//! attempted is recorded as failed and the batch stops.

use crate::core::shutdown::ShutdownSignal;
use crate::core::time::format_duration;
use crate::provider::Image;
use crate::scanner::error::{BatchError, ScanError};
use crate::scanner::session::ScanSession;
use crate::scanner::step::scan_one;
use crate::scanner::types::{BatchOutcome, ScanStatus};

/// Scan `images` in order and partition the results
///
/// Per-image failures never stop the batch. The returned outcome always
/// accounts for every input image; `error` is set only when the batch
/// stopped early.
pub async fn run_batch(
    session: &ScanSession,
    images: &[Image],
    shutdown: ShutdownSignal,
) -> BatchOutcome {
    let total = images.len();
    let timeouts = session.timeouts();
    let ctx = session.start_batch(shutdown);
    let mut outcome = BatchOutcome::with_capacity(total);

    log::info!(
        "Scanning {} images (budget {}, per image {})",
        total,
        format_duration(timeouts.total),
        if timeouts.per_image.is_zero() {
            "unlimited".to_string()
        } else {
            format_duration(timeouts.per_image)
        }
    );

    for (pos, image) in images.iter().enumerate() {
        let stop = if ctx.is_cancelled() {
            Some(BatchError::Cancelled {
                remaining: total - pos,
                total,
            })
        } else if ctx.is_expired() {
            Some(BatchError::BudgetExceeded {
                budget: timeouts.total,
                remaining: total - pos,
                total,
            })
        } else {
            None
        };

        if let Some(error) = stop {
            log::error!("{}", error);
            for skipped in &images[pos..] {
                log::warn!("{}: not scanned", skipped.image_id);
                outcome.record(skipped, ScanStatus::Failed);
            }
            outcome.error = Some(error);
            break;
        }

        log::debug!("Scanning image {}/{}: {}", pos + 1, total, image);
        let image_ctx = ctx.for_image(timeouts.per_image);
        let status = match scan_one(&image_ctx, session, image).await {
            Ok(status) => status,
            Err(e) => {
                log::error!("{}: scan failed: {}", image.image_id, e);
                // An interrupted final image has no next iteration to notice the stop
                if pos + 1 == total {
                    outcome.error = match e {
                        ScanError::Cancelled { .. } => Some(BatchError::Cancelled {
                            remaining: 0,
                            total,
                        }),
                        ScanError::DeadlineExceeded { .. } => Some(BatchError::BudgetExceeded {
                            budget: timeouts.total,
                            remaining: 0,
                            total,
                        }),
                        _ => None,
                    };
                    if let Some(error) = &outcome.error {
                        log::error!("{}", error);
                    }
                }
                ScanStatus::Failed
            }
        };
        outcome.record(image, status);
    }

    log::info!(
        "Scan finished: {} compliant, {} non-compliant, {} failed",
        outcome.compliant,
        outcome.non_compliant.len(),
        outcome.failed.len()
    );
    outcome
}
