//! Aptos fullnode REST client.
//!
//! Base URL: https://fullnode.testnet.aptoslabs.com/v1
//!
//! Transactions are built as JSON, the node BCS-encodes the signing message
//! (`/transactions/encode_submission`), the local account signs it, and the
//! JSON transaction is submitted together with the Ed25519 signature.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::account::LocalAccount;
use super::{ChainClient, EntryFunction, ViewRequest};
use crate::types::AgentError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_NODE_URL: &str = "https://fullnode.testnet.aptoslabs.com";

const APT_COIN_STORE: &str = "0x1::coin::CoinStore<0x1::aptos_coin::AptosCoin>";
const APT_COIN_TYPE: &str = "0x1::aptos_coin::AptosCoin";

const MAX_GAS_AMOUNT: u64 = 200_000;
const FALLBACK_GAS_UNIT_PRICE: u64 = 100;
const EXPIRATION_SECS: i64 = 60;

/// Confirmation polling: 60 × 500ms = 30s.
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(500);
const CONFIRM_MAX_POLLS: u32 = 60;

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AccountData {
    sequence_number: String,
}

#[derive(Debug, Deserialize)]
struct CoinStoreResource {
    data: CoinStoreData,
}

#[derive(Debug, Deserialize)]
struct CoinStoreData {
    coin: CoinValue,
}

#[derive(Debug, Deserialize)]
struct CoinValue {
    value: String,
}

#[derive(Debug, Deserialize)]
struct GasEstimate {
    gas_estimate: u64,
}

#[derive(Debug, Deserialize)]
struct PendingTransaction {
    hash: String,
}

/// Shape of `/transactions/by_hash/{hash}`; only what confirmation needs.
#[derive(Debug, Deserialize)]
struct TransactionStatus {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    vm_status: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct AptosRestClient {
    http: Client,
    base_url: String,
}

impl AptosRestClient {
    pub fn new(node_url: Option<&str>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("hashpredict-agent/0.1.0")
            .build()
            .context("Failed to build HTTP client for Aptos node")?;

        let base = node_url.unwrap_or(DEFAULT_NODE_URL).trim_end_matches('/');
        let base_url = if base.ends_with("/v1") {
            base.to_string()
        } else {
            format!("{base}/v1")
        };

        Ok(Self { http, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Turn a non-2xx response into `AgentError::Api`.
    async fn check(resp: Response) -> Result<Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let message = resp.text().await.unwrap_or_default();
        Err(AgentError::Api { status, message }.into())
    }

    async fn sequence_number(&self, address: &str) -> Result<u64> {
        let resp = self
            .http
            .get(self.url(&format!("accounts/{address}")))
            .send()
            .await
            .context("Aptos account request failed")?;
        let data: AccountData = Self::check(resp)
            .await?
            .json()
            .await
            .context("Failed to parse account response")?;
        data.sequence_number
            .parse()
            .context("Invalid sequence number from node")
    }

    async fn gas_unit_price(&self) -> u64 {
        let estimate = async {
            let resp = self.http.get(self.url("estimate_gas_price")).send().await?;
            let est: GasEstimate = Self::check(resp).await?.json().await?;
            anyhow::Ok(est.gas_estimate)
        };
        match estimate.await {
            Ok(price) => price,
            Err(e) => {
                warn!(error = %e, "Gas estimate failed, using fallback price");
                FALLBACK_GAS_UNIT_PRICE
            }
        }
    }

    /// Balance from `0x1::coin::balance`, used when there is no CoinStore.
    async fn view_balance(&self, address: &str) -> Result<u64> {
        let request = ViewRequest {
            function: "0x1::coin::balance".to_string(),
            type_arguments: vec![APT_COIN_TYPE.to_string()],
            arguments: vec![json!(address)],
        };
        let result = self.view(&request).await?;
        parse_u64(result.first()).ok_or_else(|| {
            AgentError::ViewDecode {
                function: request.function.clone(),
                message: format!("unexpected result {result:?}"),
            }
            .into()
        })
    }

    fn unsigned_transaction(
        sender: &LocalAccount,
        sequence_number: u64,
        gas_unit_price: u64,
        payload: &EntryFunction,
    ) -> Value {
        json!({
            "sender": sender.address(),
            "sequence_number": sequence_number.to_string(),
            "max_gas_amount": MAX_GAS_AMOUNT.to_string(),
            "gas_unit_price": gas_unit_price.to_string(),
            "expiration_timestamp_secs": (Utc::now().timestamp() + EXPIRATION_SECS).to_string(),
            "payload": {
                "type": "entry_function_payload",
                "function": payload.function,
                "type_arguments": payload.type_arguments,
                "arguments": payload.arguments,
            },
        })
    }
}

/// Move `u64` values come back as decimal strings.
fn parse_u64(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    hex::decode(s.trim_start_matches("0x")).context("Invalid hex from node")
}

// ---------------------------------------------------------------------------
// ChainClient trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ChainClient for AptosRestClient {
    async fn view(&self, request: &ViewRequest) -> Result<Vec<Value>> {
        debug!(function = %request.function, "Calling view function");

        let resp = self
            .http
            .post(self.url("view"))
            .json(request)
            .send()
            .await
            .with_context(|| format!("View request failed: {}", request.function))?;

        Self::check(resp)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse view result: {}", request.function))
    }

    async fn balance(&self, address: &str) -> Result<u64> {
        let path = format!(
            "accounts/{address}/resource/{}",
            urlencoding::encode(APT_COIN_STORE)
        );
        let resp = self
            .http
            .get(self.url(&path))
            .send()
            .await
            .context("Balance request failed")?;

        if resp.status() == StatusCode::NOT_FOUND {
            // Accounts on the fungible-asset standard have no CoinStore.
            return self.view_balance(address).await;
        }

        let store: CoinStoreResource = Self::check(resp)
            .await?
            .json()
            .await
            .context("Failed to parse CoinStore resource")?;

        store
            .data
            .coin
            .value
            .parse()
            .context("Invalid coin value in CoinStore")
    }

    async fn submit(&self, sender: &LocalAccount, payload: &EntryFunction) -> Result<String> {
        let sequence_number = self.sequence_number(sender.address()).await?;
        let gas_unit_price = self.gas_unit_price().await;
        let mut txn = Self::unsigned_transaction(sender, sequence_number, gas_unit_price, payload);

        let resp = self
            .http
            .post(self.url("transactions/encode_submission"))
            .json(&txn)
            .send()
            .await
            .context("encode_submission request failed")?;
        let signing_message: String = Self::check(resp)
            .await?
            .json()
            .await
            .context("Failed to parse signing message")?;

        let signature = sender.sign_hex(&decode_hex(&signing_message)?);
        txn["signature"] = json!({
            "type": "ed25519_signature",
            "public_key": sender.public_key_hex(),
            "signature": signature,
        });

        let resp = self
            .http
            .post(self.url("transactions"))
            .json(&txn)
            .send()
            .await
            .context("Transaction submission failed")?;
        let pending: PendingTransaction = Self::check(resp)
            .await?
            .json()
            .await
            .context("Failed to parse submission response")?;

        info!(
            sender = sender.address(),
            function = %payload.function,
            hash = %pending.hash,
            "Transaction submitted"
        );
        Ok(pending.hash)
    }

    async fn wait_for_transaction(&self, hash: &str) -> Result<()> {
        for _ in 0..CONFIRM_MAX_POLLS {
            let resp = self
                .http
                .get(self.url(&format!("transactions/by_hash/{hash}")))
                .send()
                .await
                .context("Transaction status request failed")?;

            if resp.status() != StatusCode::NOT_FOUND {
                let status: TransactionStatus = Self::check(resp)
                    .await?
                    .json()
                    .await
                    .context("Failed to parse transaction status")?;

                if status.kind != "pending_transaction" {
                    return match status.success {
                        Some(true) => Ok(()),
                        _ => Err(AgentError::TransactionFailed {
                            hash: hash.to_string(),
                            vm_status: status.vm_status.unwrap_or_default(),
                        }
                        .into()),
                    };
                }
            }

            tokio::time::sleep(CONFIRM_POLL_INTERVAL).await;
        }

        Err(AgentError::ConfirmationTimeout(hash.to_string()).into())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
