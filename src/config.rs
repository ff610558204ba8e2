//! Configuration loading from TOML with environment variable overrides.
//!
//! Reads `config.toml` (optional) and deserializes into strongly-typed
//! structs, then applies environment overrides. Private keys are only ever
//! read from the environment and held as `SecretString`.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::agent::{AgentSettings, Timings};
use crate::agent::cache::eviction_horizon;
use crate::agent::retry::RetryPolicy;
use crate::chain::faucet::DEFAULT_FAUCET_URL;
use crate::chain::rest::DEFAULT_NODE_URL;
use crate::types::AgentError;

/// Comma-separated hex private keys of the managed accounts.
pub const PRIVATE_KEYS_ENV: &str = "BOT_PRIVATE_KEYS";
pub const MODULE_ADDRESS_ENV: &str = "MODULE_ADDRESS";
/// Name used by the web front end's `.env`.
pub const MODULE_ADDRESS_ENV_FALLBACK: &str = "NEXT_PUBLIC_MODULEADDRESS";
pub const REPEAT_INTERVAL_ENV: &str = "REPEAT_INTERVAL_HOURS";
pub const POLL_INTERVAL_ENV: &str = "POLL_INTERVAL_MINUTES";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub chain: ChainConfig,
    pub agent: AgentConfig,
    pub dashboard: DashboardConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChainConfig {
    pub node_url: String,
    pub faucet_url: String,
    pub module_address: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            node_url: DEFAULT_NODE_URL.to_string(),
            faucet_url: DEFAULT_FAUCET_URL.to_string(),
            module_address: String::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    pub repeat_interval_hours: u64,
    pub poll_interval_minutes: u64,
    pub safety_timeout_hours: u64,
    pub stake_octas: u64,
    pub min_balance_octas: u64,
    pub faucet_amount_octas: u64,
    pub eviction_factor: u32,
    pub registry_attempts: u32,
    pub registry_delay_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            repeat_interval_hours: 6,
            poll_interval_minutes: 5,
            safety_timeout_hours: 24,
            stake_octas: 10_000_000,
            min_balance_octas: 20_000_000,
            faucet_amount_octas: 100_000_000,
            eviction_factor: 4,
            registry_attempts: 3,
            registry_delay_secs: 2,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8088,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Where to persist the vote cache. Unset disables persistence.
    pub state_file: Option<String>,
}

impl AppConfig {
    /// Parse configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse config")
    }

    /// Load configuration from a TOML file; a missing file yields defaults.
    /// Environment overrides are applied afterwards.
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {path}"))?;
            Self::from_toml(&contents).with_context(|| format!("In config file: {path}"))?
        } else {
            info!(path, "No config file found, using defaults");
            Self::default()
        };

        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (normally `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(MODULE_ADDRESS_ENV).or_else(|| lookup(MODULE_ADDRESS_ENV_FALLBACK)) {
            self.chain.module_address = addr.trim().to_string();
        }
        if let Some(v) = lookup(REPEAT_INTERVAL_ENV) {
            self.agent.repeat_interval_hours = v
                .trim()
                .parse()
                .with_context(|| format!("Invalid {REPEAT_INTERVAL_ENV}: {v}"))?;
        }
        if let Some(v) = lookup(POLL_INTERVAL_ENV) {
            self.agent.poll_interval_minutes = v
                .trim()
                .parse()
                .with_context(|| format!("Invalid {POLL_INTERVAL_ENV}: {v}"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.chain.module_address.is_empty() {
            return Err(AgentError::Config(format!(
                "module address not set (set {MODULE_ADDRESS_ENV} or chain.module_address)"
            )));
        }
        if self.agent.repeat_interval_hours == 0 {
            return Err(AgentError::Config("repeat_interval_hours must be > 0".into()));
        }
        if self.agent.poll_interval_minutes == 0 {
            return Err(AgentError::Config("poll_interval_minutes must be > 0".into()));
        }
        let repeat_interval = self.repeat_interval()?;
        if eviction_horizon(repeat_interval, self.agent.eviction_factor).is_none() {
            return Err(AgentError::Config(format!(
                "eviction_factor {} x repeat_interval_hours {} is out of range",
                self.agent.eviction_factor, self.agent.repeat_interval_hours
            )));
        }
        if self.agent.poll_interval_minutes.checked_mul(60).is_none() {
            return Err(AgentError::Config("poll_interval_minutes is out of range".into()));
        }
        Ok(())
    }

    fn repeat_interval(&self) -> Result<chrono::Duration, AgentError> {
        i64::try_from(self.agent.repeat_interval_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .ok_or_else(|| {
                AgentError::Config(format!(
                    "repeat_interval_hours {} is out of range",
                    self.agent.repeat_interval_hours
                ))
            })
    }

    pub fn agent_settings(&self) -> Result<AgentSettings, AgentError> {
        self.validate()?;
        let a = &self.agent;
        Ok(AgentSettings {
            repeat_interval: self.repeat_interval()?,
            poll_interval: Duration::from_secs(a.poll_interval_minutes.saturating_mul(60)),
            stake: a.stake_octas,
            min_balance: a.min_balance_octas,
            faucet_amount: a.faucet_amount_octas,
            eviction_factor: a.eviction_factor,
            registry_retry: RetryPolicy::fixed(
                a.registry_attempts,
                Duration::from_secs(a.registry_delay_secs),
            ),
            timings: Timings::default(),
            state_file: self.storage.state_file.clone(),
        })
    }

    pub fn safety_timeout(&self) -> Duration {
        Duration::from_secs(self.agent.safety_timeout_hours.saturating_mul(60 * 60))
    }
}

/// Split a comma/whitespace separated key list into secrets.
pub fn parse_private_keys(raw: &str) -> Vec<SecretString> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(|k| SecretString::new(k.to_string()))
        .collect()
}

/// Read the managed accounts' private keys from the environment.
pub fn private_keys_from_env() -> Result<Vec<SecretString>> {
    let raw = std::env::var(PRIVATE_KEYS_ENV)
        .with_context(|| format!("Environment variable not set: {PRIVATE_KEYS_ENV}"))?;
    Ok(parse_private_keys(&raw))
}
