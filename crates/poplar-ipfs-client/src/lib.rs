//! Rust client for the Poplar content-store proxy
//!
//! The proxy fronts a content-addressed store. Property metadata is uploaded
//! as JSON before the matching ledger write, and the returned hash is what the
//! ledger records as the property's content hash.
//!
//! # Example
//!
//! ```rust,no_run
//! use poplar_ipfs_client::{IpfsClient, IpfsConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = IpfsClient::new(IpfsConfig {
//!     base_url: "http://localhost:8000".into(),
//!     ..Default::default()
//! })?;
//!
//! let hash = client
//!     .upload(&serde_json::json!({ "parcelNumber": "1234-567-890" }))
//!     .await?;
//!
//! let data: serde_json::Value = client.fetch(&hash).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod types;

// Re-export main types
pub use client::IpfsClient;
pub use error::{IpfsError, Result};
pub use types::*;
