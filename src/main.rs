//! HashPredict: autonomous prediction agent
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores the vote cache, provisions the managed accounts, and runs the
//! voting loop until Ctrl+C or the safety timeout.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use hashpredict_agent::agent::PredictionAgent;
use hashpredict_agent::chain::account::LocalAccount;
use hashpredict_agent::chain::faucet::FaucetClient;
use hashpredict_agent::chain::rest::AptosRestClient;
use hashpredict_agent::config::{self, AppConfig};
use hashpredict_agent::dashboard;
use hashpredict_agent::market::HashPredict;
use hashpredict_agent::storage;

const BANNER: &str = r#"
  _   _           _     ____               _ _      _
 | | | | __ _ ___| |__ |  _ \ _ __ ___  __| (_) ___| |_
 | |_| |/ _` / __| '_ \| |_) | '__/ _ \/ _` | |/ __| __|
 |  _  | (_| \__ \ | | |  __/| | |  __/ (_| | | (__| |_
 |_| |_|\__,_|___/_| |_|_|   |_|  \___|\__,_|_|\___|\__|

  v0.1.0 · Autonomous Prediction Agent
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let cfg = AppConfig::load("config.toml")?;

    println!("{BANNER}");
    info!(
        module_address = %cfg.chain.module_address,
        node_url = %cfg.chain.node_url,
        repeat_interval_hours = cfg.agent.repeat_interval_hours,
        poll_interval_minutes = cfg.agent.poll_interval_minutes,
        "HashPredict agent starting up"
    );

    // -- Accounts --------------------------------------------------------

    let accounts = config::private_keys_from_env()?
        .iter()
        .map(LocalAccount::from_private_key)
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to load managed accounts")?;

    if accounts.is_empty() {
        warn!("No private keys configured; the agent will idle");
    }

    // -- Clients ---------------------------------------------------------

    let chain = Arc::new(AptosRestClient::new(Some(&cfg.chain.node_url))?);
    let faucet = Arc::new(FaucetClient::new(Some(&cfg.chain.faucet_url))?);
    let market = HashPredict::new(chain, cfg.chain.module_address.clone());

    let agent = Arc::new(PredictionAgent::new(
        accounts,
        market,
        faucet,
        cfg.agent_settings()?,
    ));

    // -- Restore vote cache ----------------------------------------------

    if let Some(path) = cfg.storage.state_file.as_deref() {
        agent.restore_votes(storage::load_votes(path)?);
    }

    // -- Provision -------------------------------------------------------

    agent.initialize().await;

    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(agent.clone(), cfg.dashboard.port).await?;
    }

    // -- Main loop -------------------------------------------------------

    let run = agent.run_with_timeout(cfg.safety_timeout());
    tokio::pin!(run);

    info!(
        safety_timeout_hours = cfg.agent.safety_timeout_hours,
        "Entering main loop. Press Ctrl+C to stop."
    );

    tokio::select! {
        _ = &mut run => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received.");
            agent.stop();
            // Let the in-flight vote finish.
            run.await;
        }
    }

    agent.persist();

    let status = agent.status();
    info!(
        accounts = status.accounts_count,
        ready = status.ready_accounts,
        cached_votes = status.predictions_processed,
        "HashPredict agent shut down cleanly."
    );

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("hashpredict_agent=info"));

    let json_logging = std::env::var("AGENT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
