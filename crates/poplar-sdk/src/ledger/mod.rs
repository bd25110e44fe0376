//! Ledger access layer.
//!
//! Provides trait-based access to the external registry and token contracts:
//! - JSON-RPC transport for a real node
//! - Mock ledger for testing
//! - The ABI codec both share

pub mod abi;
pub mod mock;
pub mod rpc;
pub mod traits;

pub use mock::{JournalEntry, MockLedger};
pub use rpc::JsonRpcLedger;
pub use traits::{ContractCall, LedgerError, LedgerReader, Receipt, TxHash, Wallet};
