//! Retrieval of remote packages.

use async_trait::async_trait;
use pkgr_core::PkgError;
use std::time::Duration;

/// Default time allowed for a remote package download.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest package accepted, inline or remote.
pub const MAX_PACKAGE_BYTES: usize = 16 * 1024 * 1024;

/// Downloads the raw bytes of a remote package.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, PkgError>;
}

/// [`RemoteFetcher`] over plain HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, PkgError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pkgr/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PkgError::Internal(e.into()))?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            max_bytes: MAX_PACKAGE_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, PkgError> {
        let fetch_err = |message: String| PkgError::Fetch {
            url: url.to_string(),
            message,
        };

        tracing::debug!(url, "Fetching remote package");
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_err(format!("unexpected status {status}")));
        }

        let too_large = || fetch_err(format!("package exceeds {} bytes", self.max_bytes));
        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes as u64)
        {
            return Err(too_large());
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| fetch_err(e.to_string()))? {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}
