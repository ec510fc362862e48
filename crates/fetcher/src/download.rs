//! The download seam: a trait for fetching raw bytes from a URL, and its
//! HTTP implementation.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

/// Why a download attempt failed.
///
/// The distinction drives retry policy: transient failures are worth
/// retrying with backoff, terminal ones are not.
#[derive(Debug, Clone)]
pub enum DownloadFailure {
    /// Likely to succeed on retry: transport errors, timeouts, HTTP 5xx.
    Transient(String),
    /// Retrying cannot help: HTTP 4xx and other definitive rejections.
    Terminal(String),
}

impl DownloadFailure {
    /// The failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Transient(m) | Self::Terminal(m) => m,
        }
    }
}

/// Fetches the raw bytes behind a URL.
///
/// The production implementation is [`HttpDownloader`]; tests substitute a
/// scripted mock. Implementations do not verify content; hashing happens in
/// the fetcher against the cache.
#[async_trait]
pub trait ToolDownloader: Send + Sync {
    /// Download the content at `url` in full.
    async fn download(&self, url: &str) -> Result<Vec<u8>, DownloadFailure>;
}

/// HTTP(S) downloader backed by a shared [`reqwest::Client`].
pub struct HttpDownloader {
    client: Client,
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpDownloader {
    /// Create a downloader with a default client.
    ///
    /// # Panics
    ///
    /// `Client::builder().build()` only fails if the TLS backend cannot
    /// initialize, which indicates a broken environment rather than a
    /// recoverable condition.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .user_agent(concat!("opack/", env!("CARGO_PKG_VERSION")))
                .build()
                .expect("failed to build HTTP client: TLS backend initialization failed"),
        }
    }
}

#[async_trait]
impl ToolDownloader for HttpDownloader {
    async fn download(&self, url: &str) -> Result<Vec<u8>, DownloadFailure> {
        debug!(%url, "Downloading tool");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadFailure::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(DownloadFailure::Transient(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(DownloadFailure::Terminal(format!("HTTP {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| DownloadFailure::Transient(e.to_string()))?;
        debug!(%url, size = bytes.len(), "Download complete");
        Ok(bytes.to_vec())
    }
}
