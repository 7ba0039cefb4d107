//! Registry Image Inspector
//!
//! Resolves an image reference against an OCI distribution (Docker v2)
//! registry into a [`Manifest`]: multi-platform indexes are narrowed to the
//! configured platform, and every layer gets a blob URI plus the bearer token
//! the indexer needs to fetch it.

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::types::{Layer, Manifest};
use crate::engine::ImageInspector;
use regex::Regex;
use reqwest::header::{ACCEPT, AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::StatusCode;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use std::time::Duration;

const DOCKER_HUB: &str = "docker.io";
const DOCKER_HUB_API: &str = "registry-1.docker.io";

const MEDIA_OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
const MEDIA_OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
const MEDIA_DOCKER_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
const MEDIA_DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// A parsed `registry/repository[:tag][@digest]` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub registry: String,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageReference {
    pub fn parse(reference: &str) -> EngineResult<Self> {
        let invalid = |message: &str| EngineError::InvalidReference {
            reference: reference.to_string(),
            message: message.to_string(),
        };

        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(invalid("reference is empty"));
        }
        if trimmed.starts_with("sha256:") {
            return Err(invalid("bare image id has no repository to pull from"));
        }

        let (name, digest) = match trimmed.split_once('@') {
            Some((name, digest)) => {
                if !digest.contains(':') {
                    return Err(invalid("digest must be algorithm:hex"));
                }
                (name, Some(digest.to_string()))
            }
            None => (trimmed, None),
        };

        // A ':' after the last '/' separates the tag; earlier ones are ports
        let last_slash = name.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (name, tag) = match name[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                (&name[..split], Some(name[split + 1..].to_string()))
            }
            None => (name, None),
        };
        if name.is_empty() || tag.as_deref() == Some("") {
            return Err(invalid("missing repository or tag"));
        }

        let (registry, repository) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), rest.to_string())
            }
            _ => (DOCKER_HUB.to_string(), name.to_string()),
        };
        let repository = if registry == DOCKER_HUB && !repository.contains('/') {
            format!("library/{}", repository)
        } else {
            repository
        };

        let tag = if tag.is_none() && digest.is_none() {
            Some("latest".to_string())
        } else {
            tag
        };

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Host serving the registry API
    pub fn api_host(&self) -> &str {
        if self.registry == DOCKER_HUB {
            DOCKER_HUB_API
        } else {
            &self.registry
        }
    }

    /// Digest wins over tag when both are present
    pub fn manifest_ref(&self) -> &str {
        self.digest
            .as_deref()
            .or(self.tag.as_deref())
            .unwrap_or("latest")
    }
}

#[derive(Debug, Deserialize)]
struct Descriptor {
    digest: String,
    #[serde(default)]
    platform: Option<Platform>,
}

#[derive(Debug, Deserialize)]
struct Platform {
    architecture: String,
    os: String,
    #[serde(default)]
    variant: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestDocument {
    #[serde(default)]
    media_type: String,
    #[serde(default)]
    manifests: Vec<Descriptor>,
    #[serde(default)]
    layers: Vec<Descriptor>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: String,
    #[serde(default)]
    access_token: String,
}

/// Inspects images by talking to their registry directly
pub struct RegistryInspector {
    http: reqwest::Client,
    insecure_hosts: HashSet<String>,
    platform: (String, String, Option<String>),
}

impl RegistryInspector {
    /// `platform` is `os/arch[/variant]`, e.g. `linux/amd64`
    pub fn new(
        insecure_hosts: &[String],
        platform: &str,
        request_timeout: Duration,
    ) -> EngineResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("imagegate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EngineError::Construction {
                message: format!("Failed to build HTTP client for registry: {}", e),
            })?;

        let mut parts = platform.split('/');
        let (os, arch) = match (parts.next(), parts.next()) {
            (Some(os), Some(arch)) if !os.is_empty() && !arch.is_empty() => {
                (os.to_string(), arch.to_string())
            }
            _ => {
                return Err(EngineError::Construction {
                    message: format!("Invalid platform '{}', expected os/arch", platform),
                })
            }
        };
        let variant = parts.next().map(str::to_string);

        Ok(Self {
            http,
            insecure_hosts: insecure_hosts.iter().cloned().collect(),
            platform: (os, arch, variant),
        })
    }

    fn base_url(&self, image: &ImageReference) -> String {
        let scheme = if self.insecure_hosts.contains(&image.registry) {
            "http"
        } else {
            "https"
        };
        format!("{}://{}/v2/{}", scheme, image.api_host(), image.repository)
    }

    /// Fetch a manifest, negotiating an anonymous pull token on 401
    async fn get_manifest(
        &self,
        image: &ImageReference,
        manifest_ref: &str,
        token: &mut Option<String>,
    ) -> EngineResult<(String, Vec<u8>)> {
        let url = format!("{}/manifests/{}", self.base_url(image), manifest_ref);
        let accept = [
            MEDIA_OCI_INDEX,
            MEDIA_DOCKER_LIST,
            MEDIA_OCI_MANIFEST,
            MEDIA_DOCKER_MANIFEST,
        ]
        .join(", ");

        let mut response = self.send_get(&url, &accept, token.as_deref()).await?;
        if response.status() == StatusCode::UNAUTHORIZED && token.is_none() {
            let challenge = response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| EngineError::Registry {
                    reference: image.repository.clone(),
                    message: "unauthorized without an authentication challenge".to_string(),
                })?;
            *token = Some(self.fetch_token(&challenge, image).await?);
            response = self.send_get(&url, &accept, token.as_deref()).await?;
        }

        if !response.status().is_success() {
            return Err(EngineError::Status {
                url,
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let digest = response
            .headers()
            .get("Docker-Content-Digest")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| EngineError::transport(&url, &e))?
            .to_vec();
        let digest = digest.unwrap_or_else(|| sha256_digest(&body));
        Ok((digest, body))
    }

    async fn send_get(
        &self,
        url: &str,
        accept: &str,
        token: Option<&str>,
    ) -> EngineResult<reqwest::Response> {
        let mut request = self.http.get(url).header(ACCEPT, accept);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        request
            .send()
            .await
            .map_err(|e| EngineError::transport(url, &e))
    }

    async fn fetch_token(&self, challenge: &str, image: &ImageReference) -> EngineResult<String> {
        let params = parse_bearer_challenge(challenge).ok_or_else(|| EngineError::Registry {
            reference: image.repository.clone(),
            message: format!("unsupported authentication challenge '{}'", challenge),
        })?;
        let realm = params.get("realm").ok_or_else(|| EngineError::Registry {
            reference: image.repository.clone(),
            message: "authentication challenge has no realm".to_string(),
        })?;

        let mut query = vec![(
            "scope".to_string(),
            params
                .get("scope")
                .cloned()
                .unwrap_or_else(|| format!("repository:{}:pull", image.repository)),
        )];
        if let Some(service) = params.get("service") {
            query.push(("service".to_string(), service.clone()));
        }

        let response = self
            .http
            .get(realm)
            .query(&query)
            .send()
            .await
            .map_err(|e| EngineError::transport(realm, &e))?;
        if !response.status().is_success() {
            return Err(EngineError::Status {
                url: realm.clone(),
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let token: TokenResponse = response.json().await.map_err(|e| EngineError::Decode {
            what: "registry token".to_string(),
            message: e.to_string(),
        })?;

        if !token.token.is_empty() {
            Ok(token.token)
        } else if !token.access_token.is_empty() {
            Ok(token.access_token)
        } else {
            Err(EngineError::Registry {
                reference: image.repository.clone(),
                message: "token endpoint returned no token".to_string(),
            })
        }
    }

    fn select_platform<'a>(&self, manifests: &'a [Descriptor]) -> Option<&'a Descriptor> {
        let (os, arch, variant) = &self.platform;
        let candidates: Vec<&Descriptor> = manifests
            .iter()
            .filter(|d| {
                d.platform
                    .as_ref()
                    .is_some_and(|p| &p.os == os && &p.architecture == arch)
            })
            .collect();

        candidates
            .iter()
            .find(|d| {
                variant.is_none()
                    || d.platform.as_ref().and_then(|p| p.variant.as_ref()) == variant.as_ref()
            })
            .or_else(|| candidates.first())
            .copied()
    }
}

#[async_trait::async_trait]
impl ImageInspector for RegistryInspector {
    async fn inspect(&self, reference: &str) -> EngineResult<Manifest> {
        let image = ImageReference::parse(reference)?;
        let mut token = None;

        let (mut digest, mut body) = self
            .get_manifest(&image, image.manifest_ref(), &mut token)
            .await?;
        let mut document = decode_manifest(&body)?;

        if is_index(&document) {
            let chosen = self
                .select_platform(&document.manifests)
                .ok_or_else(|| EngineError::Registry {
                    reference: reference.to_string(),
                    message: format!(
                        "no manifest for platform {}/{}",
                        self.platform.0, self.platform.1
                    ),
                })?;
            let chosen_digest = chosen.digest.clone();
            log::debug!("{} resolved to platform manifest {}", reference, chosen_digest);

            (digest, body) = self.get_manifest(&image, &chosen_digest, &mut token).await?;
            document = decode_manifest(&body)?;
        }

        let blob_base = format!("{}/blobs", self.base_url(&image));
        let mut headers = HashMap::new();
        if let Some(token) = &token {
            headers.insert(
                "Authorization".to_string(),
                vec![format!("Bearer {}", token)],
            );
        }

        let layers = document
            .layers
            .into_iter()
            .map(|layer| Layer {
                uri: format!("{}/{}", blob_base, layer.digest),
                hash: layer.digest,
                headers: headers.clone(),
            })
            .collect::<Vec<_>>();
        if layers.is_empty() {
            return Err(EngineError::Registry {
                reference: reference.to_string(),
                message: "manifest lists no layers".to_string(),
            });
        }

        Ok(Manifest {
            hash: digest,
            layers,
        })
    }
}

fn decode_manifest(body: &[u8]) -> EngineResult<ManifestDocument> {
    serde_json::from_slice(body).map_err(|e| EngineError::Decode {
        what: "image manifest".to_string(),
        message: e.to_string(),
    })
}

fn is_index(document: &ManifestDocument) -> bool {
    document.media_type == MEDIA_OCI_INDEX
        || document.media_type == MEDIA_DOCKER_LIST
        || (document.layers.is_empty() && !document.manifests.is_empty())
}

fn sha256_digest(body: &[u8]) -> String {
    let hash = Sha256::digest(body);
    let hex: String = hash.iter().map(|b| format!("{:02x}", b)).collect();
    format!("sha256:{}", hex)
}

/// Parse `Bearer realm="…",service="…",scope="…"` into its parameters
fn parse_bearer_challenge(challenge: &str) -> Option<HashMap<String, String>> {
    static PARAM: OnceLock<Regex> = OnceLock::new();

    let rest = challenge.trim();
    if !rest.get(..7)?.eq_ignore_ascii_case("bearer ") {
        return None;
    }
    let param = PARAM.get_or_init(|| {
        Regex::new(r#"(\w+)="([^"]*)""#).expect("challenge parameter pattern is valid")
    });

    let params: HashMap<String, String> = param
        .captures_iter(&rest[7..])
        .map(|c| (c[1].to_ascii_lowercase(), c[2].to_string()))
        .collect();
    Some(params)
}

/// `os/arch[/variant]` of the running host in OCI vocabulary
pub fn host_platform() -> String {
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" => "ppc64le",
        other => other,
    };
    format!("linux/{}", arch)
}
