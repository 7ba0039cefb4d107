//! File/stdio backed image provider
//!
//! Reads a JSON array of images (objects or plain reference strings) and
//! writes a single JSON delivery document once the batch is classified.

use super::error::{ProviderError, ProviderResult};
use super::{Image, ImageProvider};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Where to read from or write to; `-` selects stdin/stdout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Stdio,
    File(PathBuf),
}

impl Location {
    pub fn from_arg(arg: Option<&Path>) -> Self {
        match arg {
            None => Location::Stdio,
            Some(path) if path.as_os_str() == "-" => Location::Stdio,
            Some(path) => Location::File(path.to_path_buf()),
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Stdio => write!(f, "standard I/O"),
            Location::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImageEntry {
    Reference(String),
    Full(Image),
}

impl From<ImageEntry> for Image {
    fn from(entry: ImageEntry) -> Self {
        match entry {
            ImageEntry::Reference(reference) => Image::new(reference),
            ImageEntry::Full(image) => image,
        }
    }
}

/// The document handed to the removal process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub non_compliant: Vec<Image>,
    pub failed: Vec<Image>,
    /// Images the removal process should delete
    pub remove: Vec<Image>,
    pub delete_failed_images: bool,
    pub generated_at: String,
}

impl Delivery {
    pub fn new(non_compliant: &[Image], failed: &[Image], delete_failed_images: bool) -> Self {
        let mut remove = non_compliant.to_vec();
        if delete_failed_images {
            remove.extend(failed.iter().cloned());
        }
        Self {
            non_compliant: non_compliant.to_vec(),
            failed: failed.to_vec(),
            remove,
            delete_failed_images,
            generated_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        }
    }
}

/// Parse an image list document
pub fn parse_image_list(contents: &str, location: &str) -> ProviderResult<Vec<Image>> {
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }
    let entries: Vec<ImageEntry> =
        serde_json::from_str(contents).map_err(|e| ProviderError::Decode {
            location: location.to_string(),
            message: e.to_string(),
        })?;

    let images: Vec<Image> = entries.into_iter().map(Image::from).collect();
    if let Some(pos) = images.iter().position(|i| i.image_id.trim().is_empty()) {
        return Err(ProviderError::Decode {
            location: location.to_string(),
            message: format!("entry {} has an empty imageId", pos),
        });
    }
    Ok(images)
}

pub struct FileImageProvider {
    input: Location,
    output: Location,
    delete_failed_images: bool,
    delivered: Option<Delivery>,
}

impl FileImageProvider {
    pub fn new(input: Location, output: Location, delete_failed_images: bool) -> Self {
        Self {
            input,
            output,
            delete_failed_images,
            delivered: None,
        }
    }

    /// The document written by the last `send_images` call
    pub fn delivered(&self) -> Option<&Delivery> {
        self.delivered.as_ref()
    }

    async fn write_output(&self, bytes: &[u8]) -> ProviderResult<()> {
        let location = self.output.to_string();
        let write_err = |source| ProviderError::Write {
            location: location.clone(),
            source,
        };

        match &self.output {
            Location::Stdio => {
                let mut stdout = tokio::io::stdout();
                stdout.write_all(bytes).await.map_err(write_err)?;
                stdout.write_all(b"\n").await.map_err(write_err)?;
                stdout.flush().await.map_err(write_err)
            }
            Location::File(path) => {
                // Write beside the target then rename so readers never see a partial file
                let tmp = temp_path(path);
                let written = match tokio::fs::write(&tmp, bytes).await {
                    Ok(()) => tokio::fs::rename(&tmp, path).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = written {
                    let _ = tokio::fs::remove_file(&tmp).await;
                    return Err(write_err(e));
                }
                Ok(())
            }
        }
    }
}

/// `results.json` becomes `results.json.tmp`
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[async_trait::async_trait]
impl ImageProvider for FileImageProvider {
    async fn receive_images(&mut self) -> ProviderResult<Vec<Image>> {
        let location = self.input.to_string();
        let contents = match &self.input {
            Location::Stdio => {
                let mut buffer = String::new();
                tokio::io::stdin()
                    .read_to_string(&mut buffer)
                    .await
                    .map_err(|source| ProviderError::Read {
                        location: location.clone(),
                        source,
                    })?;
                buffer
            }
            Location::File(path) => {
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| ProviderError::Read {
                        location: location.clone(),
                        source,
                    })?
            }
        };

        let images = parse_image_list(&contents, &location)?;
        log::info!("Received {} images from {}", images.len(), location);
        Ok(images)
    }

    async fn send_images(
        &mut self,
        non_compliant: &[Image],
        failed: &[Image],
    ) -> ProviderResult<()> {
        if self.delivered.is_some() {
            return Err(ProviderError::Protocol {
                message: "results were already delivered".to_string(),
            });
        }

        let delivery = Delivery::new(non_compliant, failed, self.delete_failed_images);
        let bytes = serde_json::to_vec_pretty(&delivery).map_err(|e| ProviderError::Protocol {
            message: format!("Failed to serialize delivery: {}", e),
        })?;
        self.write_output(&bytes).await?;

        log::info!(
            "Delivered {} non-compliant and {} failed images ({} marked for removal) to {}",
            delivery.non_compliant.len(),
            delivery.failed.len(),
            delivery.remove.len(),
            self.output
        );
        self.delivered = Some(delivery);
        Ok(())
    }

    async fn finish(&mut self) -> ProviderResult<()> {
        if self.delivered.is_none() {
            return Err(ProviderError::Protocol {
                message: "finish called before results were delivered".to_string(),
            });
        }
        log::debug!("Image provider finished");
        Ok(())
    }
}
