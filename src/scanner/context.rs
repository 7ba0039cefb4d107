//! Scan Context
//!
//! Carries the batch deadline, an optional tighter per-image deadline and the
//! shutdown signal into every engine call. Calls are abandoned as soon as
//! either deadline passes or shutdown is requested.

use crate::core::shutdown::ShutdownSignal;
use crate::engine::EngineResult;
use crate::scanner::error::{ScanError, ScanResult};
use crate::scanner::types::ScanStage;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Stand-in deadline for limits too large to add to the clock
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

fn deadline_after(limit: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(limit).unwrap_or_else(|| now + FAR_FUTURE)
}

#[derive(Debug, Clone)]
pub struct ScanContext {
    batch_deadline: Instant,
    /// Per-image deadline and the limit it was derived from
    image_deadline: Option<(Instant, Duration)>,
    shutdown: ShutdownSignal,
}

impl ScanContext {
    pub fn with_deadline(batch_deadline: Instant, shutdown: ShutdownSignal) -> Self {
        Self {
            batch_deadline,
            image_deadline: None,
            shutdown,
        }
    }

    /// Context whose batch deadline is `budget` from now
    pub fn with_budget(budget: Duration, shutdown: ShutdownSignal) -> Self {
        Self::with_deadline(deadline_after(budget), shutdown)
    }

    /// Derive the context for one image
    ///
    /// The image deadline is `per_image` from now, capped by the batch
    /// deadline. A zero `per_image` leaves only the batch deadline.
    pub fn for_image(&self, per_image: Duration) -> Self {
        let image_deadline = if per_image.is_zero() {
            None
        } else {
            let deadline = deadline_after(per_image);
            (deadline < self.batch_deadline).then_some((deadline, per_image))
        };
        Self {
            batch_deadline: self.batch_deadline,
            image_deadline,
            shutdown: self.shutdown.clone(),
        }
    }

    /// The earliest deadline that applies to calls made with this context
    pub fn deadline(&self) -> Instant {
        match self.image_deadline {
            Some((deadline, _)) => deadline.min(self.batch_deadline),
            None => self.batch_deadline,
        }
    }

    /// True once the batch deadline has passed
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.batch_deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_shutdown_requested()
    }

    /// Run one engine call under this context
    pub async fn run<T, F>(&self, stage: ScanStage, call: F) -> ScanResult<T>
    where
        F: Future<Output = EngineResult<T>>,
    {
        if self.is_cancelled() {
            return Err(ScanError::Cancelled { stage });
        }
        if Instant::now() >= self.deadline() {
            return Err(self.timeout_error(stage));
        }

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(ScanError::Cancelled { stage }),
            result = tokio::time::timeout_at(self.deadline(), call) => match result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(source)) => Err(ScanError::Engine { stage, source }),
                Err(_) => Err(self.timeout_error(stage)),
            },
        }
    }

    fn timeout_error(&self, stage: ScanStage) -> ScanError {
        match self.image_deadline {
            Some((deadline, limit)) if deadline < self.batch_deadline => {
                ScanError::ImageTimeout { stage, limit }
            }
            _ => ScanError::DeadlineExceeded { stage },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shutdown::ShutdownCoordinator;
    use crate::engine::EngineError;

    #[tokio::test(start_paused = true)]
    async fn test_run_passes_through_results() {
        let ctx = ScanContext::with_budget(Duration::from_secs(10), ShutdownSignal::never());

        let ok = ctx.run(ScanStage::Inspect, async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err = ctx
            .run(ScanStage::Index, async {
                Err::<(), _>(EngineError::NoVulnerabilityData)
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ScanError::Engine {
                stage: ScanStage::Index,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_deadline_aborts_slow_call() {
        let ctx = ScanContext::with_budget(Duration::from_secs(5), ShutdownSignal::never());

        let err = ctx
            .run(ScanStage::Match, async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ScanError::DeadlineExceeded {
                stage: ScanStage::Match
            }
        ));
        assert!(ctx.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_image_deadline_is_nested() {
        let batch = ScanContext::with_budget(Duration::from_secs(100), ShutdownSignal::never());
        let image = batch.for_image(Duration::from_secs(3));
        assert!(image.deadline() < batch.deadline());

        let err = image
            .run(ScanStage::Index, async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::ImageTimeout { limit, .. } if limit == Duration::from_secs(3)));
        assert!(!batch.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_image_deadline_capped_by_batch() {
        let batch = ScanContext::with_budget(Duration::from_secs(2), ShutdownSignal::never());
        let image = batch.for_image(Duration::from_secs(60));
        assert_eq!(image.deadline(), batch.deadline());

        let unlimited = batch.for_image(Duration::ZERO);
        assert_eq!(unlimited.deadline(), batch.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_context_fails_without_polling() {
        let ctx = ScanContext::with_budget(Duration::ZERO, ShutdownSignal::never());
        let err = ctx
            .run(ScanStage::UpdateRefresh, async { Ok(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::DeadlineExceeded { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_limits_do_not_overflow() {
        let batch = ScanContext::with_budget(Duration::MAX, ShutdownSignal::never());
        assert!(!batch.is_expired());
        let image = batch.for_image(Duration::MAX);
        assert_eq!(image.deadline(), batch.deadline());

        let ok = image.run(ScanStage::Inspect, async { Ok("done") }).await;
        assert_eq!(ok.unwrap(), "done");
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_in_flight_call() {
        let coordinator = ShutdownCoordinator::new();
        let ctx = ScanContext::with_budget(Duration::from_secs(600), coordinator.signal());

        let call = ctx.run(ScanStage::Inspect, async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        });
        let trigger = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            coordinator.trigger_shutdown();
        };
        let (result, ()) = tokio::join!(call, trigger);

        assert!(matches!(
            result.unwrap_err(),
            ScanError::Cancelled {
                stage: ScanStage::Inspect
            }
        ));
        assert!(ctx.is_cancelled());
    }
}
