//! Scanner Component
//!
//! The scan loop and classification policy:
//!
//! - **[`batch::run_batch`]**: walks a batch under one shared deadline and
//!   partitions the images into non-compliant and failed
//! - **[`step::scan_one`]**: update refresh → inspect → index → match → policy
//!   for a single image
//! - **[`policy::SeverityPolicy`]**: turns a vulnerability report into a
//!   pass/fail decision
//! - **[`session::ScanSession`]**: engine handles and settings shared by a batch
//! - **[`context::ScanContext`]**: deadlines and cancellation for engine calls

pub mod api;
pub mod batch;
pub mod context;
pub mod error;
pub mod policy;
pub mod session;
pub mod step;
pub mod types;

pub use error::{BatchError, ScanError, ScanResult};
pub use types::{BatchOutcome, ScanStage, ScanStatus};
