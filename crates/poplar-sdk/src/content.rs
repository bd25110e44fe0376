//! Content-store seam used by the submission pipeline.

use async_trait::async_trait;
use poplar_ipfs_client::IpfsClient;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Result, SdkError};

/// Off-ledger store for submission metadata.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store `data`, returning its content hash
    async fn upload(&self, data: serde_json::Value) -> Result<String>;

    /// Fetch previously stored data
    async fn fetch(&self, hash: &str) -> Result<serde_json::Value>;
}

#[async_trait]
impl ContentStore for IpfsClient {
    async fn upload(&self, data: serde_json::Value) -> Result<String> {
        Ok(IpfsClient::upload(self, &data).await?)
    }

    async fn fetch(&self, hash: &str) -> Result<serde_json::Value> {
        Ok(IpfsClient::fetch(self, hash).await?)
    }
}

/// In-memory content store for testing.
///
/// Hashes are `Qm` + hex SHA-256 of the serialized JSON, so identical
/// submissions map to the same hash.
#[derive(Default)]
pub struct MemoryContentStore {
    entries: Mutex<HashMap<String, serde_json::Value>>,
    upload_count: AtomicU32,
    failure: Option<String>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every upload fail with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Number of upload attempts.
    pub fn upload_count(&self) -> u32 {
        self.upload_count.load(Ordering::SeqCst)
    }

    /// Most recently stored values by hash.
    pub async fn entries(&self) -> HashMap<String, serde_json::Value> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn upload(&self, data: serde_json::Value) -> Result<String> {
        self.upload_count.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.failure {
            return Err(SdkError::ContentStore(message.clone()));
        }

        let bytes = serde_json::to_vec(&data)?;
        let hash = format!("Qm{}", hex::encode(Sha256::digest(&bytes)));
        debug!(hash = %hash, "Stored content in memory");
        self.entries.lock().await.insert(hash.clone(), data);
        Ok(hash)
    }

    async fn fetch(&self, hash: &str) -> Result<serde_json::Value> {
        self.entries
            .lock()
            .await
            .get(hash)
            .cloned()
            .ok_or_else(|| SdkError::ContentStore(format!("Not found: {hash}")))
    }
}
