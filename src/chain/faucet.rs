//! Aptos testnet faucet client.
//!
//! Endpoint: `POST {faucet_url}/mint?amount=<octas>&address=<hex>`
//! Any 2xx answer counts as success; the response body is not inspected.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use super::Faucet;

pub const DEFAULT_FAUCET_URL: &str = "https://faucet.testnet.aptoslabs.com";

/// Pause after a successful mint so the funding transaction can settle.
const DEFAULT_SETTLE: Duration = Duration::from_secs(2);

pub struct FaucetClient {
    http: Client,
    base_url: String,
    settle: Duration,
}

impl FaucetClient {
    pub fn new(base_url: Option<&str>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("hashpredict-agent/0.1.0")
            .build()
            .context("Failed to build HTTP client for faucet")?;

        Ok(Self {
            http,
            base_url: base_url
                .unwrap_or(DEFAULT_FAUCET_URL)
                .trim_end_matches('/')
                .to_string(),
            settle: DEFAULT_SETTLE,
        })
    }

    /// Override the post-mint settle pause.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    fn mint_url(&self) -> String {
        format!("{}/mint", self.base_url)
    }
}

#[async_trait]
impl Faucet for FaucetClient {
    async fn fund(&self, address: &str, amount: u64) -> Result<()> {
        let url = self.mint_url();
        debug!(url = %url, address, amount, "Requesting faucet funds");

        self.http
            .post(&url)
            .query(&[("amount", amount.to_string()), ("address", address.to_string())])
            .send()
            .await
            .context("Faucet request failed")?
            .error_for_status()
            .context("Faucet returned an error status")?;

        info!(address, amount, "Faucet requested successfully");
        tokio::time::sleep(self.settle).await;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
