use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::AnchorFetch;
use crate::error::FetchError;

/// HTTPS GET for the trust-anchor document and its signature.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dnssec-chain/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl AnchorFetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let request_error = |e: reqwest::Error| FetchError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(request_error)?;
        debug!("Fetched {} bytes from {}", body.len(), url);
        Ok(body.to_vec())
    }
}
