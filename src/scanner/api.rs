//! Scanner API
//!
//! Public surface of the scanner for the application layer and integration
//! tests.

// Entry points
pub use crate::scanner::batch::run_batch;
pub use crate::scanner::step::scan_one;

// Session, context and policy
pub use crate::scanner::context::ScanContext;
pub use crate::scanner::policy::{evaluate, SeverityPolicy};
pub use crate::scanner::session::ScanSession;

// Error handling
pub use crate::scanner::error::{BatchError, ScanError, ScanResult};

// Core data types
pub use crate::scanner::types::{BatchOutcome, ScanStage, ScanStatus};
