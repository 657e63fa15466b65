//! Remote image download.
//!
//! `RemoteFetcher::fetch` streams a URL to a local path and only accepts the result when
//! the sniffed content type is an image. The `Content-Type` the server declares is kept
//! for diagnostics but never decides acceptance.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures::StreamExt;
use portrait_core::{FetchConfig, PipelineError};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Url;
use tokio::io::AsyncWriteExt;

use crate::sniff::{is_image_mimetype, sniff_file};

const USER_AGENT: &str = concat!("portrait/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Download of {url} did not finish within {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("{url} is larger than the {limit} byte limit")]
    TooLarge { url: String, limit: u64 },

    #[error("Failed to write {path}: {reason}")]
    Write { path: String, reason: String },

    /// The body arrived but is not an image. `detected` is the sniffed type, if any.
    #[error("{url} is not an image (detected {detected:?})")]
    NotAnImage {
        url: String,
        detected: Option<String>,
    },
}

impl FetchError {
    /// Content-validation failures as opposed to transport failures.
    pub fn is_validation(&self) -> bool {
        matches!(self, FetchError::NotAnImage { .. })
    }
}

impl From<FetchError> for PipelineError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::NotAnImage { .. } => PipelineError::Validation(err.to_string()),
            FetchError::Write { .. } => PipelineError::Internal(err.to_string()),
            _ => PipelineError::Fetch(err.to_string()),
        }
    }
}

/// A downloaded and validated file.
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub path: PathBuf,
    pub bytes: u64,
    /// Sniffed from the file contents.
    pub mimetype: String,
    /// What the server claimed, without parameters.
    pub declared_content_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RemoteFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_bytes: u64,
}

impl RemoteFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Network {
                url: String::new(),
                reason: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            timeout: config.timeout,
            max_bytes: config.max_bytes,
        })
    }

    /// Download `url` to `destination` and validate that it is an image.
    ///
    /// A partially written or rejected file is left at `destination`; removing it is
    /// up to the caller.
    #[tracing::instrument(skip(self, destination), fields(url = %url))]
    pub async fn fetch(&self, url: &str, destination: &Path) -> Result<FetchedFile, FetchError> {
        let start = Instant::now();
        let parsed = parse_url(url)?;

        let (bytes, declared_content_type) =
            match tokio::time::timeout(self.timeout, self.download(&parsed, destination)).await {
                Ok(result) => result?,
                Err(_) => {
                    tracing::warn!(url = %url, timeout_secs = self.timeout.as_secs(), "Download timed out");
                    return Err(FetchError::Timeout {
                        url: url.to_string(),
                        timeout: self.timeout,
                    });
                }
            };

        let detected = sniff_file(destination)
            .await
            .map_err(|e| FetchError::Write {
                path: destination.display().to_string(),
                reason: e.to_string(),
            })?;

        let mimetype = match detected {
            Some(mimetype) if is_image_mimetype(mimetype) => mimetype.to_string(),
            other => {
                tracing::info!(
                    url = %url,
                    detected = ?other,
                    declared = ?declared_content_type,
                    "Downloaded content is not an image"
                );
                return Err(FetchError::NotAnImage {
                    url: url.to_string(),
                    detected: other.map(str::to_string),
                });
            }
        };

        tracing::info!(
            url = %url,
            size_bytes = bytes,
            mimetype = %mimetype,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Remote image downloaded"
        );

        Ok(FetchedFile {
            path: destination.to_path_buf(),
            bytes,
            mimetype,
            declared_content_type,
        })
    }

    /// HEAD the URL for its declared length. Any failure is ignored.
    async fn probe_length(&self, url: &Url) -> Option<u64> {
        match self.client.head(url.clone()).send().await {
            Ok(response) if response.status().is_success() => response
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok()),
            Ok(response) => {
                tracing::debug!(url = %url, status = response.status().as_u16(), "HEAD probe rejected");
                None
            }
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "HEAD probe failed");
                None
            }
        }
    }

    async fn download(
        &self,
        url: &Url,
        destination: &Path,
    ) -> Result<(u64, Option<String>), FetchError> {
        let url_str = url.as_str();

        if let Some(length) = self.probe_length(url).await {
            if length > self.max_bytes {
                return Err(FetchError::TooLarge {
                    url: url_str.to_string(),
                    limit: self.max_bytes,
                });
            }
        }

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.transport_error(url_str, e))?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url_str.to_string(),
                status: response.status().as_u16(),
            });
        }

        let declared_content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let write_error = |e: std::io::Error| FetchError::Write {
            path: destination.display().to_string(),
            reason: e.to_string(),
        };

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_error)?;
        }
        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(write_error)?;

        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.transport_error(url_str, e))?;
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Err(FetchError::TooLarge {
                    url: url_str.to_string(),
                    limit: self.max_bytes,
                });
            }
            file.write_all(&chunk).await.map_err(write_error)?;
        }

        file.flush().await.map_err(write_error)?;
        file.sync_all().await.map_err(write_error)?;

        Ok((written, declared_content_type))
    }

    fn transport_error(&self, url: &str, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                timeout: self.timeout,
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

fn parse_url(url: &str) -> Result<Url, FetchError> {
    let trimmed = url.trim();
    let parsed = Url::parse(trimmed).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(FetchError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme {}", scheme),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::{Cursor, Write};

    fn png_bytes() -> Vec<u8> {
        let img = RgbImage::from_pixel(16, 16, Rgb([200, 30, 30]));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn fetcher(timeout: Duration, max_bytes: u64) -> RemoteFetcher {
        RemoteFetcher::new(&FetchConfig { timeout, max_bytes }).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_valid_image() {
        let mut server = mockito::Server::new_async().await;
        let body = png_bytes();
        let _head = server
            .mock("HEAD", "/photo.png")
            .with_status(200)
            .create_async()
            .await;
        let _get = server
            .mock("GET", "/photo.png")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body(body.clone())
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("download");
        let fetched = fetcher(Duration::from_secs(5), 1024 * 1024)
            .fetch(&format!("{}/photo.png", server.url()), &destination)
            .await
            .unwrap();

        assert_eq!(fetched.mimetype, "image/png");
        assert_eq!(fetched.bytes, body.len() as u64);
        assert_eq!(fetched.declared_content_type.as_deref(), Some("image/png"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        assert_eq!(
            sniff_file(&destination).await.unwrap(),
            Some("image/png")
        );
    }

    #[tokio::test]
    async fn test_declared_type_is_not_trusted() {
        let mut server = mockito::Server::new_async().await;
        let _get = server
            .mock("GET", "/page")
            .with_status(200)
            .with_header("content-type", "image/jpeg")
            .with_body("<!DOCTYPE html><html><body>not an image</body></html>")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("download");
        let err = fetcher(Duration::from_secs(5), 1024 * 1024)
            .fetch(&format!("{}/page", server.url()), &destination)
            .await
            .unwrap_err();

        assert!(err.is_validation());
        assert!(matches!(
            PipelineError::from(err),
            PipelineError::Validation(_)
        ));
        // Left for the caller to clean up.
        assert!(destination.exists());
    }

    #[tokio::test]
    async fn test_html_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _get = server
            .mock("GET", "/index.html")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html></html>")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = fetcher(Duration::from_secs(5), 1024)
            .fetch(&format!("{}/index.html", server.url()), &dir.path().join("f"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NotAnImage { detected: None, .. }));
    }

    #[tokio::test]
    async fn test_empty_body_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _get = server
            .mock("GET", "/empty")
            .with_status(200)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = fetcher(Duration::from_secs(5), 1024)
            .fetch(&format!("{}/empty", server.url()), &dir.path().join("f"))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_not_found_is_fetch_error() {
        let mut server = mockito::Server::new_async().await;
        let _get = server
            .mock("GET", "/missing.png")
            .with_status(404)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = fetcher(Duration::from_secs(5), 1024)
            .fetch(&format!("{}/missing.png", server.url()), &dir.path().join("f"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
        assert!(matches!(PipelineError::from(err), PipelineError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_streamed_body_over_limit() {
        let mut server = mockito::Server::new_async().await;
        let _get = server
            .mock("GET", "/big.png")
            .with_status(200)
            .with_body(vec![0u8; 4096])
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = fetcher(Duration::from_secs(5), 1000)
            .fetch(&format!("{}/big.png", server.url()), &dir.path().join("f"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { .. }));
    }

    #[tokio::test]
    async fn test_slow_body_times_out() {
        let mut server = mockito::Server::new_async().await;
        let _get = server
            .mock("GET", "/slow.png")
            .with_status(200)
            .with_chunked_body(|w| {
                w.write_all(b"\x89PNG")?;
                std::thread::sleep(Duration::from_secs(3));
                w.write_all(b"rest")
            })
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = fetcher(Duration::from_millis(500), 1024 * 1024)
            .fetch(&format!("{}/slow.png", server.url()), &dir.path().join("f"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_rejects_non_http_schemes() {
        let dir = tempfile::tempdir().unwrap();
        let f = fetcher(Duration::from_secs(1), 1024);

        let err = f
            .fetch("file:///etc/passwd", &dir.path().join("f"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));

        let err = f.fetch("not a url", &dir.path().join("f")).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }
}
