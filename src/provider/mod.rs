//! Image Provider
//!
//! The provider supplies the candidate images for a batch and accepts the
//! classified results. Whether failed images are also handed over for removal
//! is a delivery policy (`deleteFailedImages`) the provider applies.

pub mod error;
pub mod file;

pub use error::{ProviderError, ProviderResult};
pub use file::{Delivery, FileImageProvider, Location};

use serde::{Deserialize, Serialize};

/// A container image as known to the provider
///
/// Immutable for the duration of a scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub image_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
    /// Digest-qualified references, e.g. `repo@sha256:…`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub digests: Vec<String>,
}

impl Image {
    pub fn new<S: Into<String>>(image_id: S) -> Self {
        Self {
            image_id: image_id.into(),
            names: Vec::new(),
            digests: Vec::new(),
        }
    }

    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_digests<I, S>(mut self, digests: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.digests = digests.into_iter().map(Into::into).collect();
        self
    }

    /// The reference handed to image inspection
    ///
    /// A digest-qualified reference pins the exact content, so it wins over a
    /// tag name; the bare id is the last resort.
    pub fn reference(&self) -> &str {
        self.digests
            .iter()
            .find(|d| d.contains('@'))
            .or_else(|| self.names.first())
            .map(String::as_str)
            .unwrap_or(self.image_id.as_str())
    }
}

impl std::fmt::Display for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.names.first() {
            Some(name) if name != &self.image_id => write!(f, "{} ({})", name, self.image_id),
            _ => write!(f, "{}", self.image_id),
        }
    }
}

/// Source of candidate images and sink for classified results
#[async_trait::async_trait]
pub trait ImageProvider: Send {
    /// Retrieve the images to scan, in scan order
    async fn receive_images(&mut self) -> ProviderResult<Vec<Image>>;

    /// Hand over the classified images
    async fn send_images(&mut self, non_compliant: &[Image], failed: &[Image])
        -> ProviderResult<()>;

    /// Signal that the scan run is complete
    async fn finish(&mut self) -> ProviderResult<()>;
}
