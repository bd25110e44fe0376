//! Poplar SDK - client for the Poplar property-record registry
//!
//! The registry's rules (staking, validation voting, reward settlement) live
//! in an external ledger contract. This SDK is everything on the client side
//! of that contract.
//!
//! # Architecture
//!
//! - **Identifiers**: a property's ledger id is keccak-256 over its location
//!   fields, computed locally ([`id`])
//! - **Projection**: raw ledger tuples become typed records, optionally
//!   refreshed on a fixed interval ([`projection`], [`poll`])
//! - **Pipeline**: writes go Idle → Validating → (Approving) → Submitting →
//!   Succeeded | Failed, approving token spend only when the allowance is
//!   short ([`pipeline`])
//!
//! The ledger is reached through the [`ledger::LedgerReader`] and
//! [`ledger::Wallet`] traits. [`ledger::JsonRpcLedger`] talks to a node;
//! [`ledger::MockLedger`] simulates the registry in memory.
//!
//! # Example
//!
//! ```rust,ignore
//! use poplar_sdk::{Action, ActionPipeline, JsonRpcLedger, PoplarConfig, PropertySubmission};
//! use poplar_ipfs_client::IpfsClient;
//! use std::sync::Arc;
//!
//! let config = PoplarConfig::from_yaml(&std::fs::read_to_string("poplar.yaml")?)?;
//! let ledger = Arc::new(JsonRpcLedger::new(config.ledger.clone())?.with_account(account));
//! let store = Arc::new(IpfsClient::new(config.content_store.to_client_config())?);
//!
//! let pipeline = ActionPipeline::new(ledger.clone(), ledger, store, config);
//! let state = pipeline.run(Action::SubmitProperty(form)).await?;
//! ```

// Identifiers and value types
pub mod address;
pub mod amount;
pub mod id;
pub mod status;

// Ledger access
pub mod ledger;

// Read side
pub mod poll;
pub mod projection;
pub mod records;

// Write side
pub mod content;
pub mod forms;
pub mod pipeline;

pub mod config;
pub mod error;
pub mod routes;

pub use address::Address;
pub use amount::TokenAmount;
pub use config::PoplarConfig;
pub use content::{ContentStore, MemoryContentStore};
pub use error::{Result, SdkError};
pub use forms::{FormError, PropertySubmission, ValidationRequest, VoteRequest};
pub use id::{derive, EntityId, LocationKey};
pub use ledger::{JsonRpcLedger, LedgerError, LedgerReader, MockLedger, Receipt, Wallet};
pub use pipeline::{Action, ActionPipeline, ActionState, PipelineError, PipelineEvent};
pub use poll::{PollHandle, Poller};
pub use projection::{FetchState, Projector, ValidationDetail};
pub use records::{PropertyRecord, PropertySummary, ValidationRecord, VoterStake};
pub use routes::Route;
pub use status::{DisplayStatus, RecordStatus};
