//! Scanner Error Types

use crate::core::time::format_duration;
use crate::engine::EngineError;
use crate::scanner::types::ScanStage;
use std::time::Duration;

/// Why a single image ended up `Failed`
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("{stage} failed: {source}")]
    Engine {
        stage: ScanStage,
        #[source]
        source: EngineError,
    },

    #[error("{stage} aborted: batch deadline exceeded")]
    DeadlineExceeded { stage: ScanStage },

    #[error("{stage} aborted: per-image timeout of {} exceeded", human(.limit))]
    ImageTimeout { stage: ScanStage, limit: Duration },

    #[error("{stage} aborted: shutdown requested")]
    Cancelled { stage: ScanStage },
}

impl ScanError {
    pub fn stage(&self) -> ScanStage {
        match self {
            ScanError::Engine { stage, .. }
            | ScanError::DeadlineExceeded { stage }
            | ScanError::ImageTimeout { stage, .. }
            | ScanError::Cancelled { stage } => *stage,
        }
    }

    /// True for deadline, per-image timeout and cancellation aborts
    pub fn is_interrupted(&self) -> bool {
        !matches!(self, ScanError::Engine { .. })
    }
}

/// Terminal condition of a batch; partial results stay usable
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    #[error(
        "image scan total timeout of {} exceeded: {remaining} of {total} images not scanned",
        human(.budget)
    )]
    BudgetExceeded {
        budget: Duration,
        remaining: usize,
        total: usize,
    },

    #[error("scan cancelled: {remaining} of {total} images not scanned")]
    Cancelled { remaining: usize, total: usize },
}

fn human(duration: &Duration) -> String {
    format_duration(*duration)
}

pub type ScanResult<T> = Result<T, ScanError>;
