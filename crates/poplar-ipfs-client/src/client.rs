//! HTTP client for the content-store proxy

use crate::error::{IpfsError, Result};
use crate::types::*;
use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// HTTP client for the `/ipfs` proxy endpoints
///
/// The proxy has no authentication and no retry policy; callers decide
/// whether a failed upload is worth resubmitting.
#[derive(Debug, Clone)]
pub struct IpfsClient {
    config: IpfsConfig,
    client: Client,
}

impl IpfsClient {
    /// Create a new content-store client
    pub fn new(config: IpfsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    /// Base URL this client talks to
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Upload form data, returning the content hash
    pub async fn upload<T: Serialize>(&self, data: &T) -> Result<String> {
        let url = format!("{}/ipfs", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&UploadRequest { property_data: data })
            .send()
            .await?;

        let body: UploadResponse = self.handle_response(response, None).await?;
        if body.ipfs_hash.is_empty() {
            return Err(IpfsError::InvalidResponse("empty ipfs_hash".to_string()));
        }

        debug!(hash = %body.ipfs_hash, "Uploaded content");
        Ok(body.ipfs_hash)
    }

    /// Fetch previously uploaded form data by hash
    pub async fn fetch<T: DeserializeOwned>(&self, hash: &str) -> Result<T> {
        let url = format!(
            "{}/ipfs/{}",
            self.config.base_url,
            urlencoding::encode(hash)
        );

        let response = self.client.get(&url).send().await?;
        let body: FetchResponse<T> = self.handle_response(response, Some(hash)).await?;
        Ok(body.data)
    }

    // ==================== Helper Methods ====================

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
        hash: Option<&str>,
    ) -> Result<T> {
        if response.status() == StatusCode::NOT_FOUND {
            return Err(IpfsError::NotFound(
                hash.unwrap_or("resource").to_string(),
            ));
        }

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(IpfsError::Server {
                status,
                message: body,
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
