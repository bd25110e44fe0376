//! JSON-RPC ledger transport.
//!
//! Reads go through `eth_call`. Writes use `eth_sendTransaction` from a
//! node-managed account, then poll `eth_getTransactionReceipt` until the
//! transaction is mined. A receipt with status `0x0` is a revert; the call is
//! replayed with `eth_call` to recover the ledger's reason string.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::abi::{self, signatures, Token};
use super::traits::{ContractCall, LedgerError, LedgerReader, Receipt, TxHash, Wallet};
use crate::address::Address;
use crate::amount::TokenAmount;
use crate::config::LedgerConfig;
use crate::id::EntityId;
use crate::records::{RawProperty, RawStake, RawValidation};

/// JSON-RPC request
#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: Vec<Value>,
}

/// JSON-RPC response; `result` is legitimately null for pending receipts
#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

/// JSON-RPC error
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Subset of `eth_getTransactionReceipt`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReceipt {
    transaction_hash: String,
    #[serde(default)]
    block_number: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Ledger access over an Ethereum-style JSON-RPC endpoint
pub struct JsonRpcLedger {
    config: LedgerConfig,
    client: reqwest::Client,
    next_id: AtomicU64,
    account: Option<Address>,
}

impl std::fmt::Debug for JsonRpcLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcLedger")
            .field("rpc_url", &self.config.rpc_url)
            .field("registry", &self.config.registry_address)
            .field("token", &self.config.token_address)
            .field("account", &self.account)
            .finish()
    }
}

impl JsonRpcLedger {
    /// Create a ledger client with no connected account
    pub fn new(config: LedgerConfig) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        Ok(Self {
            config,
            client,
            next_id: AtomicU64::new(1),
            account: None,
        })
    }

    /// Send writes from this node-managed account
    pub fn with_account(mut self, account: Address) -> Self {
        self.account = Some(account);
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Accounts the node can sign for (`eth_accounts`)
    pub async fn accounts(&self) -> Result<Vec<Address>, LedgerError> {
        let raw: Vec<String> = self.request("eth_accounts", vec![]).await?;
        raw.iter()
            .map(|s| {
                s.parse()
                    .map_err(|_| LedgerError::Decode(format!("invalid account: {s}")))
            })
            .collect()
    }

    // ==================== Transport ====================

    async fn request_optional<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Vec<Value>,
    ) -> Result<Option<T>, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        debug!(method, id, "JSON-RPC request");

        let response = self
            .client
            .post(&self.config.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::Transport(format!("HTTP error: {status}")));
        }

        let body: JsonRpcResponse<T> = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(format!("failed to parse response: {e}")))?;

        if let Some(error) = body.error {
            return Err(map_rpc_error(error));
        }
        Ok(body.result)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Vec<Value>,
    ) -> Result<T, LedgerError> {
        self.request_optional(method, params)
            .await?
            .ok_or_else(|| LedgerError::Decode(format!("missing result for {method}")))
    }

    async fn eth_call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, LedgerError> {
        let params = vec![
            json!({ "to": to.to_string(), "data": format!("0x{}", hex::encode(data)) }),
            json!("latest"),
        ];
        let result: String = self.request("eth_call", params).await?;
        decode_hex_bytes(&result)
    }

    async fn call_registry(
        &self,
        signature: &str,
        tokens: &[Token],
    ) -> Result<Vec<u8>, LedgerError> {
        self.eth_call(
            self.config.registry_address,
            abi::encode_call(signature, tokens),
        )
        .await
    }

    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TransactionReceipt, LedgerError> {
        let interval = Duration::from_millis(self.config.receipt_poll_interval_ms);
        loop {
            let receipt: Option<TransactionReceipt> = self
                .request_optional("eth_getTransactionReceipt", vec![json!(hash.to_string())])
                .await?;
            match receipt {
                Some(receipt) => return Ok(receipt),
                None => {
                    debug!(tx = %hash, "Receipt pending");
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }
}

/// Revert payload from an error's `data` field, in any of the shapes nodes use
fn revert_data(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::String(s) => decode_hex_bytes(s).ok(),
        Value::Object(map) => map.get("data").and_then(revert_data),
        _ => None,
    }
}

fn map_rpc_error(error: JsonRpcError) -> LedgerError {
    if let Some(reason) = error
        .data
        .as_ref()
        .and_then(revert_data)
        .and_then(|data| abi::decode_revert_reason(&data))
    {
        return LedgerError::Reverted(reason);
    }
    // code 3 is the standard "execution reverted" code
    if error.code == 3 || error.message.contains("revert") {
        return LedgerError::Reverted(error.message);
    }
    LedgerError::Rpc {
        code: error.code,
        message: error.message,
    }
}

fn decode_hex_bytes(s: &str) -> Result<Vec<u8>, LedgerError> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(trimmed).map_err(|e| LedgerError::Decode(format!("invalid hex: {e}")))
}

fn parse_quantity(s: &str) -> Result<u64, LedgerError> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(trimmed, 16)
        .map_err(|e| LedgerError::Decode(format!("invalid quantity {s}: {e}")))
}

#[async_trait]
impl LedgerReader for JsonRpcLedger {
    async fn properties_needing_validation(&self) -> Result<Vec<RawProperty>, LedgerError> {
        let data = self
            .call_registry(signatures::PROPERTIES_NEEDING_VALIDATION, &[])
            .await?;
        abi::decode_property_list(&data)
    }

    async fn property(&self, id: EntityId) -> Result<RawProperty, LedgerError> {
        let data = self
            .call_registry(signatures::PROPERTIES, &[Token::FixedBytes(id)])
            .await?;
        abi::decode_property(&data)
    }

    async fn validation(&self, id: EntityId) -> Result<RawValidation, LedgerError> {
        let data = self
            .call_registry(signatures::VALIDATIONS, &[Token::FixedBytes(id)])
            .await?;
        abi::decode_validation(&data)
    }

    async fn validation_stake(
        &self,
        id: EntityId,
        voter: Address,
    ) -> Result<RawStake, LedgerError> {
        let data = self
            .call_registry(
                signatures::VALIDATION_STAKE,
                &[Token::FixedBytes(id), Token::Address(voter)],
            )
            .await?;
        abi::decode_stake(&data)
    }

    async fn is_valid_location(
        &self,
        country: &str,
        region: &str,
        locality: &str,
    ) -> Result<bool, LedgerError> {
        let data = self
            .call_registry(
                signatures::IS_VALID_LOCATION,
                &[
                    Token::String(country.to_string()),
                    Token::String(region.to_string()),
                    Token::String(locality.to_string()),
                ],
            )
            .await?;
        abi::decode_bool(&data)
    }

    async fn is_property_registered(&self, id: EntityId) -> Result<bool, LedgerError> {
        let data = self
            .call_registry(signatures::IS_PROPERTY_REGISTERED, &[Token::FixedBytes(id)])
            .await?;
        abi::decode_bool(&data)
    }

    async fn allowance(
        &self,
        owner: Address,
        spender: Address,
    ) -> Result<TokenAmount, LedgerError> {
        let data = self
            .eth_call(
                self.config.token_address,
                abi::encode_call(
                    signatures::ALLOWANCE,
                    &[Token::Address(owner), Token::Address(spender)],
                ),
            )
            .await?;
        abi::decode_uint_saturating(&data).map(TokenAmount::from_raw)
    }

    async fn balance_of(&self, owner: Address) -> Result<TokenAmount, LedgerError> {
        let data = self
            .eth_call(
                self.config.token_address,
                abi::encode_call(signatures::BALANCE_OF, &[Token::Address(owner)]),
            )
            .await?;
        abi::decode_uint_saturating(&data).map(TokenAmount::from_raw)
    }
}

#[async_trait]
impl Wallet for JsonRpcLedger {
    fn account(&self) -> Option<Address> {
        self.account
    }

    async fn send(&self, call: ContractCall) -> Result<Receipt, LedgerError> {
        let from = self.account.ok_or(LedgerError::NotConnected)?;
        let to = if call.targets_token() {
            self.config.token_address
        } else {
            self.config.registry_address
        };
        let tx = json!({
            "from": from.to_string(),
            "to": to.to_string(),
            "data": format!("0x{}", hex::encode(abi::encode_contract_call(&call))),
        });

        let hash: String = self.request("eth_sendTransaction", vec![tx.clone()]).await?;
        let hash: TxHash = hash.parse()?;
        info!(method = call.name(), tx = %hash, "Transaction sent");

        let receipt = self.wait_for_receipt(hash).await?;
        let block_number = receipt
            .block_number
            .as_deref()
            .map(parse_quantity)
            .transpose()?;

        if receipt.status.as_deref() == Some("0x0") {
            warn!(method = call.name(), tx = %receipt.transaction_hash, "Transaction reverted");
            let block = receipt.block_number.unwrap_or_else(|| "latest".to_string());
            return match self.request::<String>("eth_call", vec![tx, json!(block)]).await {
                Err(LedgerError::Reverted(reason)) => Err(LedgerError::Reverted(reason)),
                _ => Err(LedgerError::Reverted(format!(
                    "{} reverted",
                    call.name()
                ))),
            };
        }

        info!(method = call.name(), tx = %hash, block = ?block_number, "Transaction confirmed");
        Ok(Receipt {
            tx_hash: hash,
            block_number,
        })
    }
}
