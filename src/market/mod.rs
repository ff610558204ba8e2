//! Facade over the HashPredict Move modules.
//!
//! Wraps a `ChainClient` and the module address, and exposes the handful of
//! view and entry functions the agent needs:
//! - `user_account::has_claimed_account` / `get_user_info` (registry lookup)
//! - `user_account::register_user`
//! - `hashpredictalpha::get_all_predictions`
//! - `hashpredictalpha::predict`

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::chain::account::LocalAccount;
use crate::chain::{ChainClient, EntryFunction, ViewRequest};
use crate::types::{AgentError, Market, MarketState, Verdict};

const USER_MODULE: &str = "user_account";
const PREDICTION_MODULE: &str = "hashpredictalpha";

// ---------------------------------------------------------------------------
// Move JSON → Rust
// ---------------------------------------------------------------------------

/// Move `u64` values are serialised as decimal strings.
fn de_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(u64),
    }
    match Raw::deserialize(d)? {
        Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
        Raw::Num(n) => Ok(n),
    }
}

fn de_opt_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    de_u64(d).map(Some)
}

#[derive(Debug, Deserialize)]
struct RawState {
    value: u8,
}

/// `PredictionDetails` as returned by `get_all_predictions`.
/// Only the fields the agent reads are deserialized.
#[derive(Debug, Deserialize)]
struct RawPrediction {
    #[serde(deserialize_with = "de_u64")]
    id: u64,
    #[serde(default)]
    description: String,
    #[serde(deserialize_with = "de_u64")]
    end_time: u64,
    state: RawState,
    #[serde(deserialize_with = "de_u64")]
    yes_votes: u64,
    #[serde(deserialize_with = "de_u64")]
    no_votes: u64,
    #[serde(default, deserialize_with = "de_opt_u64")]
    yes_price: Option<u64>,
    #[serde(default, deserialize_with = "de_opt_u64")]
    no_price: Option<u64>,
    #[serde(default, deserialize_with = "de_opt_u64")]
    total_bet: Option<u64>,
}

impl From<RawPrediction> for Market {
    fn from(p: RawPrediction) -> Self {
        Market {
            id: p.id,
            description: p.description,
            yes_votes: p.yes_votes,
            no_votes: p.no_votes,
            end_time: i64::try_from(p.end_time).unwrap_or(i64::MAX),
            state: MarketState::from_raw(p.state.value),
            yes_price: p.yes_price,
            no_price: p.no_price,
            total_bet: p.total_bet,
        }
    }
}

/// Decode the result vector of `get_all_predictions`.
pub fn decode_predictions(result: Vec<Value>) -> Result<Vec<Market>> {
    let Some(first) = result.into_iter().next() else {
        return Ok(Vec::new());
    };
    let raw: Vec<RawPrediction> =
        serde_json::from_value(first).context("Failed to decode prediction list")?;
    Ok(raw.into_iter().map(Market::from).collect())
}

// ---------------------------------------------------------------------------
// Facade
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct HashPredict {
    chain: Arc<dyn ChainClient>,
    module_address: String,
}

impl HashPredict {
    pub fn new(chain: Arc<dyn ChainClient>, module_address: impl Into<String>) -> Self {
        Self {
            chain,
            module_address: module_address.into(),
        }
    }

    pub fn chain(&self) -> &Arc<dyn ChainClient> {
        &self.chain
    }

    fn function(&self, module: &str, name: &str) -> String {
        format!("{}::{module}::{name}", self.module_address)
    }

    /// Whether `address` has registered with the user registry.
    ///
    /// A node-level API error on the primary view falls back to
    /// `get_user_info`: a successful read means registered, an error
    /// mentioning "does not exist" means not registered.
    pub async fn has_claimed_account(&self, address: &str) -> Result<bool> {
        let request = ViewRequest::new(
            self.function(USER_MODULE, "has_claimed_account"),
            vec![json!(address)],
        );

        let err = match self.chain.view(&request).await {
            Ok(result) => {
                return result.first().and_then(Value::as_bool).ok_or_else(|| {
                    AgentError::ViewDecode {
                        function: request.function.clone(),
                        message: format!("expected [bool], got {result:?}"),
                    }
                    .into()
                });
            }
            Err(e) => e,
        };

        if !matches!(err.downcast_ref::<AgentError>(), Some(AgentError::Api { .. })) {
            return Err(err);
        }

        debug!(address, error = %err, "has_claimed_account failed, trying get_user_info");
        let fallback = ViewRequest::new(
            self.function(USER_MODULE, "get_user_info"),
            vec![json!(address)],
        );
        match self.chain.view(&fallback).await {
            Ok(_) => Ok(true),
            Err(e) if format!("{e:#}").contains("does not exist") => Ok(false),
            Err(e) => {
                warn!(address, error = %e, "Alternative user check failed");
                Err(e)
            }
        }
    }

    pub async fn get_all_predictions(&self) -> Result<Vec<Market>> {
        let request = ViewRequest::new(self.function(PREDICTION_MODULE, "get_all_predictions"), vec![]);
        let result = self.chain.view(&request).await?;
        decode_predictions(result)
    }

    /// Submit `register_user(username)` and wait for it to commit.
    pub async fn register_user(&self, account: &LocalAccount, username: &str) -> Result<String> {
        let payload = EntryFunction::new(
            self.function(USER_MODULE, "register_user"),
            vec![json!(username)],
        );
        self.submit_and_wait(account, &payload).await
    }

    /// Submit `predict(id, verdict, stake, use_alt_currency)` and wait for it to commit.
    pub async fn predict(
        &self,
        account: &LocalAccount,
        market_id: u64,
        verdict: Verdict,
        stake: u64,
        use_alt_currency: bool,
    ) -> Result<String> {
        let payload = predict_payload(&self.module_address, market_id, verdict, stake, use_alt_currency);
        self.submit_and_wait(account, &payload).await
    }

    async fn submit_and_wait(&self, account: &LocalAccount, payload: &EntryFunction) -> Result<String> {
        let hash = self.chain.submit(account, payload).await?;
        self.chain.wait_for_transaction(&hash).await?;
        Ok(hash)
    }
}

fn predict_payload(
    module_address: &str,
    market_id: u64,
    verdict: Verdict,
    stake: u64,
    use_alt_currency: bool,
) -> EntryFunction {
    EntryFunction::new(
        format!("{module_address}::{PREDICTION_MODULE}::predict"),
        vec![
            json!(market_id.to_string()),
            json!(verdict.as_bool()),
            json!(stake.to_string()),
            json!(use_alt_currency),
        ],
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
