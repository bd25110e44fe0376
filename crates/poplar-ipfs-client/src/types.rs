//! Wire types for the content-store proxy

use serde::{Deserialize, Serialize};

/// Client configuration
#[derive(Debug, Clone)]
pub struct IpfsConfig {
    /// Base URL of the proxy (no trailing slash)
    pub base_url: String,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
}

impl Default for IpfsConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Body of `POST /ipfs`
#[derive(Debug, Serialize)]
pub struct UploadRequest<'a, T: Serialize> {
    /// Submitted form fields
    pub property_data: &'a T,
}

/// Response from `POST /ipfs`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Content hash assigned by the store
    pub ipfs_hash: String,
}

/// Response from `GET /ipfs/{hash}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse<T> {
    /// Echo of the requested hash (older proxies omit it)
    #[serde(default)]
    pub ipfs_hash: Option<String>,
    /// Stored form fields
    pub data: T,
}
