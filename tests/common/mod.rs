//! Common test utilities and helpers
//!
//! Scripted engines standing in for the registry and Clair, plus builders for
//! sessions and images.

#![allow(dead_code)]

pub mod fake_engine;

use fake_engine::FakeEngine;
use imagegate::config::{TimeoutConfig, VulnConfig};
use imagegate::provider::Image;
use imagegate::scanner::api::{ScanSession, SeverityPolicy};
use std::sync::Arc;
use std::time::Duration;

/// Session backed by `engine` for all three engine roles
pub fn session_with(engine: Arc<FakeEngine>, total: Duration, per_image: Duration) -> ScanSession {
    ScanSession::new(
        engine.clone(),
        engine.clone(),
        engine,
        TimeoutConfig { total, per_image },
        SeverityPolicy::from(&VulnConfig::default()),
    )
}

/// Session with generous budgets
pub fn session(engine: Arc<FakeEngine>) -> ScanSession {
    session_with(engine, Duration::from_secs(3600), Duration::ZERO)
}

/// Images named `prefix-0`, `prefix-1`, ...
pub fn images(prefix: &str, count: usize) -> Vec<Image> {
    (0..count)
        .map(|i| Image::new(format!("{}-{}", prefix, i)))
        .collect()
}

pub fn ids(images: &[Image]) -> Vec<&str> {
    images.iter().map(|i| i.image_id.as_str()).collect()
}
