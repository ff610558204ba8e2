//! In-memory chain and faucet for integration testing.
//!
//! `MockChain` keeps balances, registrations, markets and submitted
//! transactions in memory and records every call in an event log so tests
//! can assert on ordering. `MockFaucet` credits balances on a shared
//! `MockChain`.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;
use tokio::sync::Notify;

use hashpredict_agent::agent::retry::RetryPolicy;
use hashpredict_agent::agent::{AgentSettings, PredictionAgent, Timings};
use hashpredict_agent::chain::account::LocalAccount;
use hashpredict_agent::chain::{ChainClient, EntryFunction, Faucet, ViewRequest};
use hashpredict_agent::market::HashPredict;
use hashpredict_agent::types::{Market, MarketState};

pub const MODULE: &str = "0xc0ffee";
pub const FUNDED: u64 = 50_000_000;

/// Pauses submission of `predict` transactions until released.
pub struct SubmitGate {
    pub started: Notify,
    pub release: Notify,
}

#[derive(Default)]
struct ChainState {
    balances: HashMap<String, u64>,
    registered: HashSet<String>,
    markets: Vec<Market>,
    submissions: Vec<(String, EntryFunction)>,
    events: Vec<String>,
    view_error: Option<String>,
    submit_error: Option<String>,
    tx_counter: u64,
}

#[derive(Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
    gate: Mutex<Option<Arc<SubmitGate>>>,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_balance(&self, address: &str, octas: u64) {
        self.state.lock().unwrap().balances.insert(address.to_string(), octas);
    }

    pub fn credit(&self, address: &str, octas: u64) {
        *self
            .state
            .lock()
            .unwrap()
            .balances
            .entry(address.to_string())
            .or_default() += octas;
    }

    pub fn register(&self, address: &str) {
        self.state.lock().unwrap().registered.insert(address.to_string());
    }

    pub fn is_registered(&self, address: &str) -> bool {
        self.state.lock().unwrap().registered.contains(address)
    }

    pub fn set_markets(&self, markets: Vec<Market>) {
        self.state.lock().unwrap().markets = markets;
    }

    /// Force all view calls to fail.
    pub fn set_view_error(&self, msg: Option<&str>) {
        self.state.lock().unwrap().view_error = msg.map(String::from);
    }

    /// Force all submissions to fail.
    pub fn set_submit_error(&self, msg: Option<&str>) {
        self.state.lock().unwrap().submit_error = msg.map(String::from);
    }

    pub fn install_gate(&self) -> Arc<SubmitGate> {
        let gate = Arc::new(SubmitGate {
            started: Notify::new(),
            release: Notify::new(),
        });
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn log(&self, event: impl Into<String>) {
        self.state.lock().unwrap().events.push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.state.lock().unwrap().events.clone()
    }

    /// Submitted calls to `<module>::<name>`, as (sender, payload).
    pub fn submissions_of(&self, name: &str) -> Vec<(String, EntryFunction)> {
        self.state
            .lock()
            .unwrap()
            .submissions
            .iter()
            .filter(|(_, p)| p.function.ends_with(&format!("::{name}")))
            .cloned()
            .collect()
    }

    fn market_json(m: &Market) -> Value {
        let state: u8 = match m.state {
            MarketState::Active => 0,
            MarketState::Other(v) => v,
        };
        json!({
            "id": m.id.to_string(),
            "description": m.description,
            "end_time": m.end_time.max(0).to_string(),
            "start_time": "0",
            "state": { "value": state },
            "yes_votes": m.yes_votes.to_string(),
            "no_votes": m.no_votes.to_string(),
            "total_bet": "0",
        })
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn view(&self, request: &ViewRequest) -> Result<Vec<Value>> {
        let name = request.function.rsplit("::").next().unwrap_or_default().to_string();
        self.log(format!("view:{name}"));

        let s = self.state.lock().unwrap();
        if let Some(msg) = &s.view_error {
            return Err(anyhow!(msg.clone()));
        }

        match name.as_str() {
            "has_claimed_account" => {
                let addr = request.arguments[0].as_str().unwrap_or_default();
                Ok(vec![json!(s.registered.contains(addr))])
            }
            "get_all_predictions" => Ok(vec![Value::Array(
                s.markets.iter().map(Self::market_json).collect(),
            )]),
            other => Err(anyhow!("unknown view function {other}")),
        }
    }

    async fn balance(&self, address: &str) -> Result<u64> {
        self.log("balance");
        Ok(*self.state.lock().unwrap().balances.get(address).unwrap_or(&0))
    }

    async fn submit(&self, sender: &LocalAccount, payload: &EntryFunction) -> Result<String> {
        let name = payload.function.rsplit("::").next().unwrap_or_default().to_string();
        self.log(format!("submit:{name}"));

        let forced = self.state.lock().unwrap().submit_error.clone();
        if let Some(msg) = forced {
            return Err(anyhow!(msg));
        }

        if name == "predict" {
            let gate = self.gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                gate.started.notify_one();
                gate.release.notified().await;
            }
        }

        let mut s = self.state.lock().unwrap();
        s.tx_counter += 1;
        let hash = format!("0x{:064x}", s.tx_counter);

        match name.as_str() {
            "register_user" => {
                s.registered.insert(sender.address().to_string());
            }
            "predict" => {
                let id: u64 = payload.arguments[0].as_str().unwrap_or("0").parse()?;
                let yes = payload.arguments[1].as_bool().unwrap_or(false);
                if let Some(m) = s.markets.iter_mut().find(|m| m.id == id) {
                    if yes {
                        m.yes_votes += 1;
                    } else {
                        m.no_votes += 1;
                    }
                }
            }
            _ => {}
        }

        s.submissions.push((sender.address().to_string(), payload.clone()));
        Ok(hash)
    }

    async fn wait_for_transaction(&self, _hash: &str) -> Result<()> {
        Ok(())
    }
}

/// Faucet that credits a `MockChain`, or fails on demand.
pub struct MockFaucet {
    chain: Arc<MockChain>,
    fail: Mutex<Option<String>>,
}

impl MockFaucet {
    pub fn new(chain: Arc<MockChain>) -> Arc<Self> {
        Arc::new(Self {
            chain,
            fail: Mutex::new(None),
        })
    }

    pub fn set_error(&self, msg: &str) {
        *self.fail.lock().unwrap() = Some(msg.to_string());
    }
}

#[async_trait]
impl Faucet for MockFaucet {
    async fn fund(&self, address: &str, amount: u64) -> Result<()> {
        self.chain.log("faucet");
        let forced = self.fail.lock().unwrap().clone();
        if let Some(msg) = forced {
            return Err(anyhow!(msg));
        }
        self.chain.credit(address, amount);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn account(n: u8) -> LocalAccount {
    LocalAccount::from_seed([n; 32])
}

pub fn open_market(id: u64) -> Market {
    Market {
        id,
        description: format!("Open market {id}"),
        yes_votes: 0,
        no_votes: 0,
        end_time: (Utc::now() + Duration::days(3)).timestamp(),
        state: MarketState::Active,
        yes_price: None,
        no_price: None,
        total_bet: None,
    }
}

pub fn fast_settings() -> AgentSettings {
    AgentSettings {
        poll_interval: StdDuration::from_millis(100),
        registry_retry: RetryPolicy::fixed(3, StdDuration::ZERO),
        timings: Timings::immediate(),
        ..AgentSettings::default()
    }
}

pub fn build_agent(
    chain: &Arc<MockChain>,
    faucet: &Arc<MockFaucet>,
    accounts: Vec<LocalAccount>,
    settings: AgentSettings,
) -> PredictionAgent {
    let market = HashPredict::new(chain.clone(), MODULE);
    PredictionAgent::new(accounts, market, faucet.clone(), settings)
}

/// Chain with every given account funded and registered.
pub fn ready_chain(accounts: &[LocalAccount]) -> Arc<MockChain> {
    let chain = MockChain::new();
    for a in accounts {
        chain.set_balance(a.address(), FUNDED);
        chain.register(a.address());
    }
    chain
}
