//! Scanner Types
//!
//! Per-image statuses and the partitioned result of a batch.

use crate::provider::Image;
use crate::scanner::error::BatchError;
use strum_macros::Display;

/// Outcome of scanning one image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanStatus {
    /// An error occurred, or the budget ran out before the image was attempted
    Failed,
    /// The report contains a disqualifying vulnerability
    NonCompliant,
    Ok,
}

/// External call boundaries of the per-image scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ScanStage {
    #[strum(serialize = "update refresh")]
    UpdateRefresh,
    #[strum(serialize = "inspect")]
    Inspect,
    #[strum(serialize = "index")]
    Index,
    #[strum(serialize = "match")]
    Match,
}

/// Partitioned results of a batch
///
/// Compliant images are only counted. Within each list the input order is
/// preserved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub non_compliant: Vec<Image>,
    pub failed: Vec<Image>,
    pub compliant: usize,
    /// Set when the batch stopped early
    pub error: Option<BatchError>,
}

impl BatchOutcome {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            non_compliant: Vec::with_capacity(capacity),
            failed: Vec::with_capacity(capacity),
            compliant: 0,
            error: None,
        }
    }

    pub fn record(&mut self, image: &Image, status: ScanStatus) {
        match status {
            ScanStatus::Failed => self.failed.push(image.clone()),
            ScanStatus::NonCompliant => self.non_compliant.push(image.clone()),
            ScanStatus::Ok => self.compliant += 1,
        }
    }

    /// Number of images that received a status
    pub fn classified(&self) -> usize {
        self.non_compliant.len() + self.failed.len() + self.compliant
    }
}
