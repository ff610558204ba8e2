//! Chain integrations.
//!
//! Defines the `ChainClient` and `Faucet` traits the agent talks to, and
//! provides implementations for:
//! - Aptos fullnode REST API (view functions, balances, signed entry-function
//!   transactions, confirmation polling)
//! - Aptos testnet faucet (`POST /mint`)

pub mod account;
pub mod faucet;
pub mod rest;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use account::LocalAccount;

/// A read-only Move view function call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewRequest {
    /// Fully qualified: `<address>::<module>::<function>`.
    pub function: String,
    pub type_arguments: Vec<String>,
    pub arguments: Vec<Value>,
}

impl ViewRequest {
    pub fn new(function: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            function: function.into(),
            type_arguments: Vec::new(),
            arguments,
        }
    }
}

/// A state-changing Move entry function call, submitted as a signed transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryFunction {
    pub function: String,
    pub type_arguments: Vec<String>,
    pub arguments: Vec<Value>,
}

impl EntryFunction {
    pub fn new(function: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            function: function.into(),
            type_arguments: Vec::new(),
            arguments,
        }
    }
}

/// Abstraction over a blockchain node.
///
/// Implementors report failures as errors; callers decide whether a failure
/// is fatal. Nothing here retries.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Call a view function and return its raw JSON result vector.
    async fn view(&self, request: &ViewRequest) -> Result<Vec<Value>>;

    /// Native coin balance in octas.
    async fn balance(&self, address: &str) -> Result<u64>;

    /// Build, sign and submit an entry-function transaction.
    /// Returns the transaction hash without waiting for it to commit.
    async fn submit(&self, sender: &LocalAccount, payload: &EntryFunction) -> Result<String>;

    /// Block until the transaction is committed successfully.
    async fn wait_for_transaction(&self, hash: &str) -> Result<()>;
}

/// A testnet faucet that credits an address with test currency.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Faucet: Send + Sync {
    async fn fund(&self, address: &str, amount: u64) -> Result<()>;
}
