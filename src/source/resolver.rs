//! Turning tool inputs into bytes
//!
//! Sources are local paths (optionally sandboxed to resource directories),
//! base64 payloads, URLs (with SSRF protection and a download cap) or keys of
//! earlier outputs in the [`BlobCache`].

use super::cache::BlobCache;
use super::FileSource;
use crate::editor::decode_image_payload;
use crate::error::{Error, Result};
use futures_util::StreamExt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Redirect hops followed for a URL source, each checked like the first request
const MAX_REDIRECTS: usize = 5;

pub const PDF_MIME: &str = "application/pdf";
pub const ZIP_MIME: &str = "application/zip";

/// What a tool expects its input to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Pdf,
    Image,
}

/// Bytes produced from a [`FileSource`]
#[derive(Debug, Clone)]
pub struct Resolved {
    pub data: Vec<u8>,
    pub source_name: String,
    pub mime_type: String,
}

/// Sniff the content type of `data`
pub fn detect_mime(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(b"%PDF") {
        return Some(PDF_MIME);
    }
    if data.starts_with(b"PK\x03\x04") {
        return Some(ZIP_MIME);
    }
    image::guess_format(data).ok().map(|f| f.to_mime_type())
}

fn ensure_kind(data: &[u8], kind: InputKind, source_name: &str) -> Result<&'static str> {
    let mime = detect_mime(data);
    match (kind, mime) {
        (InputKind::Pdf, Some(PDF_MIME)) => Ok(PDF_MIME),
        (InputKind::Pdf, _) => Err(Error::InvalidPdf {
            reason: format!("{} is not a PDF file", source_name),
        }),
        (InputKind::Image, Some(mime)) if mime.starts_with("image/") => Ok(mime),
        (InputKind::Image, _) => Err(Error::InvalidImage {
            reason: format!("{} is not a recognized image", source_name),
        }),
    }
}

/// Check if an IP address is private/reserved (loopback, link-local, private ranges, etc.)
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // CGNAT 100.64/10
                || (a == 100 && (b & 0xC0) == 64)
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local, fe80::/10 link-local
                || (first & 0xFE00) == 0xFC00
                || (first & 0xFFC0) == 0xFE80
        }
    }
}

/// Resolve the URL's host and refuse private or reserved addresses
async fn check_ssrf(url_str: &str) -> Result<()> {
    let parsed = url::Url::parse(url_str).map_err(|e| Error::SourceResolution {
        reason: format!("Invalid URL: {}", e),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::SsrfBlocked {
            url: url_str.to_string(),
        });
    }

    let host = parsed.host_str().ok_or_else(|| Error::SourceResolution {
        reason: "URL has no host".to_string(),
    })?;
    let port = parsed.port_or_known_default().unwrap_or(443);

    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| Error::SourceResolution {
            reason: format!("DNS resolution failed for {}: {}", host, e),
        })?;

    for addr in addrs {
        if is_private_ip(&addr.ip()) {
            return Err(Error::SsrfBlocked {
                url: url_str.to_string(),
            });
        }
    }
    Ok(())
}

/// Settings for [`SourceResolver`]
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// When non-empty, local reads and writes must stay inside these directories
    pub resource_dirs: Vec<String>,
    pub allow_private_urls: bool,
    pub max_download_bytes: u64,
}

/// Resolves sources and writes outputs under a shared sandbox policy
pub struct SourceResolver {
    config: ResolverConfig,
    cache: Arc<BlobCache>,
    http: reqwest::Client,
}

impl SourceResolver {
    pub fn new(config: ResolverConfig, cache: Arc<BlobCache>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });
        Self {
            config,
            cache,
            http,
        }
    }

    pub fn cache(&self) -> &Arc<BlobCache> {
        &self.cache
    }

    /// Load `source` and check that it holds the expected kind of content
    pub async fn resolve(&self, source: &FileSource, kind: InputKind) -> Result<Resolved> {
        let source_name = source.display_name();
        let data = match source {
            FileSource::Path { path } => {
                let path = self.validate_path_access(path)?;
                if !path.exists() {
                    return Err(Error::FileNotFound {
                        path: path.display().to_string(),
                    });
                }
                tokio::fs::read(&path).await?
            }
            FileSource::Base64 { base64 } => decode_image_payload(base64)?,
            FileSource::Url { url } => self.download(url).await?,
            FileSource::CacheRef { cache_key } => self
                .cache
                .get(cache_key)
                .map(|blob| blob.data.as_ref().clone())
                .ok_or_else(|| Error::CacheKeyNotFound {
                    key: cache_key.clone(),
                })?,
        };

        let mime_type = ensure_kind(&data, kind, &source_name)?.to_string();
        tracing::debug!(source = %source_name, mime = %mime_type, bytes = data.len(), "Resolved source");
        Ok(Resolved {
            data,
            source_name,
            mime_type,
        })
    }

    /// Target of a redirect from `current`, refused when it leaves the allowed network
    async fn redirect_target(&self, current: &url::Url, location: &str) -> Result<url::Url> {
        let next = current.join(location).map_err(|e| Error::SourceResolution {
            reason: format!("Invalid redirect location {:?}: {}", location, e),
        })?;
        if !self.config.allow_private_urls {
            check_ssrf(next.as_str()).await?;
        }
        Ok(next)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        if !self.config.allow_private_urls {
            check_ssrf(url).await?;
        }
        let mut current = url::Url::parse(url).map_err(|e| Error::SourceResolution {
            reason: format!("Invalid URL: {}", e),
        })?;

        let max = self.config.max_download_bytes;
        let mut hops = 0;
        let response = loop {
            let response = self.http.get(current.clone()).send().await?;
            if !response.status().is_redirection() {
                break response;
            }
            if hops == MAX_REDIRECTS {
                return Err(Error::SourceResolution {
                    reason: format!("Too many redirects fetching {}", url),
                });
            }
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| Error::SourceResolution {
                    reason: format!("Redirect from {} has no location", current),
                })?;
            current = self.redirect_target(&current, location).await?;
            tracing::debug!(hop = hops + 1, target = %current, "Following redirect");
            hops += 1;
        };
        if !response.status().is_success() {
            return Err(Error::SourceResolution {
                reason: format!("HTTP request failed with status: {}", response.status()),
            });
        }

        if let Some(length) = response.content_length() {
            if length > max {
                return Err(Error::DownloadTooLarge {
                    size: length,
                    max_size: max,
                });
            }
        }

        let mut data = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            data.extend_from_slice(&chunk?);
            if data.len() as u64 > max {
                return Err(Error::DownloadTooLarge {
                    size: data.len() as u64,
                    max_size: max,
                });
            }
        }
        Ok(data)
    }

    fn inside_resource_dirs(&self, canonical: &Path) -> bool {
        self.config.resource_dirs.iter().any(|dir| {
            std::fs::canonicalize(dir)
                .map(|dir| canonical.starts_with(dir))
                .unwrap_or(false)
        })
    }

    /// Check a path to read from against the resource directories
    pub fn validate_path_access(&self, path: &str) -> Result<PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(PathBuf::from(path));
        }
        let denied = || Error::PathAccessDenied {
            path: path.to_string(),
        };
        let canonical = std::fs::canonicalize(path).map_err(|_| denied())?;
        if self.inside_resource_dirs(&canonical) {
            Ok(canonical)
        } else {
            Err(denied())
        }
    }

    /// Check a path to write to; the file itself may not exist yet
    pub fn validate_output_path(&self, path: &str) -> Result<PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(PathBuf::from(path));
        }
        let denied = || Error::PathAccessDenied {
            path: path.to_string(),
        };
        let target = Path::new(path);
        let parent = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let file_name = target.file_name().ok_or_else(denied)?;
        let canonical = std::fs::canonicalize(parent)
            .map_err(|_| denied())?
            .join(file_name);
        if self.inside_resource_dirs(&canonical) {
            Ok(canonical)
        } else {
            Err(denied())
        }
    }

    /// Write `data` to `output_path` if one was requested
    pub fn write_output(&self, output_path: Option<&str>, data: &[u8]) -> Result<Option<String>> {
        let Some(path_str) = output_path else {
            return Ok(None);
        };
        self.validate_output_path(path_str)?;

        let path = Path::new(path_str);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, data)?;
        Ok(Some(path_str.to_string()))
    }
}
