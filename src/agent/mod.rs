//! Autonomous prediction agent.
//!
//! Owns a pool of accounts, keeps them funded and registered, and on a
//! fixed interval places one vote per eligible open market, respecting a
//! per-(market, account) cooldown.
//!
//! Everything runs on one task. Votes are submitted one at a time; the
//! shared maps sit behind a `std::sync::Mutex` that is never held across an
//! `.await`, so the dashboard can read snapshots while the loop runs.

pub mod cache;
pub mod names;
pub mod retry;
pub mod strategy;

use anyhow::Result;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::chain::account::LocalAccount;
use crate::chain::Faucet;
use crate::market::HashPredict;
use crate::storage;
use crate::types::{octas_to_apt, AccountStatus, AgentError, Market, StatusReport};
use cache::{VoteCache, VoteKey, VoteRecord};
use retry::RetryPolicy;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Fixed pauses between chain operations.
#[derive(Debug, Clone)]
pub struct Timings {
    /// After a faucet request, before re-reading the balance.
    pub faucet_settle: Duration,
    /// After `register_user` commits, before the caller re-checks the registry.
    pub register_settle: Duration,
    /// After a successful registration, before the final lookup.
    pub post_register: Duration,
    /// Between accounts during `initialize`.
    pub between_accounts: Duration,
    /// Random pause between votes is drawn from `vote_pause_min..=vote_pause_max`.
    pub vote_pause_min: Duration,
    pub vote_pause_max: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            faucet_settle: Duration::from_secs(3),
            register_settle: Duration::from_secs(2),
            post_register: Duration::from_secs(3),
            between_accounts: Duration::from_secs(3),
            vote_pause_min: Duration::from_secs(2),
            vote_pause_max: Duration::from_secs(5),
        }
    }
}

impl Timings {
    /// All pauses zero.
    pub fn immediate() -> Self {
        Self {
            faucet_settle: Duration::ZERO,
            register_settle: Duration::ZERO,
            post_register: Duration::ZERO,
            between_accounts: Duration::ZERO,
            vote_pause_min: Duration::ZERO,
            vote_pause_max: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Cooldown per (market, account).
    pub repeat_interval: chrono::Duration,
    pub poll_interval: Duration,
    /// Stake per vote, in octas.
    pub stake: u64,
    pub min_balance: u64,
    pub faucet_amount: u64,
    /// Cache entries older than `eviction_factor × repeat_interval` are dropped.
    pub eviction_factor: u32,
    pub registry_retry: RetryPolicy,
    pub timings: Timings,
    /// Persist the vote cache here after every cycle.
    pub state_file: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            repeat_interval: chrono::Duration::hours(6),
            poll_interval: Duration::from_secs(5 * 60),
            stake: 10_000_000,
            min_balance: 20_000_000,
            faucet_amount: 100_000_000,
            eviction_factor: 4,
            registry_retry: RetryPolicy::registry_default(),
            timings: Timings::default(),
            state_file: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub markets_found: usize,
    pub votes_submitted: usize,
    pub votes_failed: usize,
    pub evicted: usize,
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

struct AgentState {
    setup: HashMap<String, AccountStatus>,
    votes: VoteCache,
}

pub struct PredictionAgent {
    accounts: Vec<LocalAccount>,
    market: HashPredict,
    faucet: Arc<dyn Faucet>,
    settings: AgentSettings,
    state: Mutex<AgentState>,
    rng: Mutex<StdRng>,
    running: AtomicBool,
    stop_tx: watch::Sender<bool>,
}

impl PredictionAgent {
    pub fn new(
        accounts: Vec<LocalAccount>,
        market: HashPredict,
        faucet: Arc<dyn Faucet>,
        settings: AgentSettings,
    ) -> Self {
        Self::with_rng(accounts, market, faucet, settings, StdRng::from_entropy())
    }

    /// Construct with a caller-supplied RNG (deterministic tests).
    pub fn with_rng(
        accounts: Vec<LocalAccount>,
        market: HashPredict,
        faucet: Arc<dyn Faucet>,
        settings: AgentSettings,
        rng: StdRng,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            state: Mutex::new(AgentState {
                setup: HashMap::new(),
                votes: VoteCache::new(settings.repeat_interval),
            }),
            accounts,
            market,
            faucet,
            settings,
            rng: Mutex::new(rng),
            running: AtomicBool::new(false),
            stop_tx,
        }
    }

    fn state(&self) -> MutexGuard<'_, AgentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn accounts(&self) -> &[LocalAccount] {
        &self.accounts
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn account_status(&self, address: &str) -> AccountStatus {
        self.state().setup.get(address).copied().unwrap_or_default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn stop_requested(&self) -> bool {
        *self.stop_tx.borrow()
    }

    // -- Account provisioning --------------------------------------------

    /// Set up every managed account in turn. A failing account is logged
    /// and skipped. Returns the number of ready accounts.
    pub async fn initialize(&self) -> usize {
        info!(accounts = self.accounts.len(), "Initializing agent");

        for (i, account) in self.accounts.iter().enumerate() {
            info!(address = account.address(), "Setting up account");
            if self.setup_account(account).await {
                info!(address = account.address(), "Successfully initialized account");
            } else {
                warn!(address = account.address(), "Failed to initialize account");
            }
            if i + 1 < self.accounts.len() {
                tokio::time::sleep(self.settings.timings.between_accounts).await;
            }
        }

        let ready = self.status().ready_accounts;
        info!(ready, total = self.accounts.len(), "Initialization complete");
        ready
    }

    /// Ensure `account` is funded and registered. Never errors; a failure
    /// leaves the account `Unset` and returns false.
    pub async fn setup_account(&self, account: &LocalAccount) -> bool {
        if self.account_status(account.address()) == AccountStatus::Ready {
            return true;
        }

        match self.try_setup_account(account).await {
            Ok(true) => {
                self.state()
                    .setup
                    .insert(account.address().to_string(), AccountStatus::Ready);
                info!(address = account.address(), "Account is fully set up and ready");
                true
            }
            Ok(false) => false,
            Err(e) => {
                error!(address = account.address(), error = %e, "Error setting up account");
                false
            }
        }
    }

    async fn try_setup_account(&self, account: &LocalAccount) -> Result<bool> {
        let address = account.address();

        self.ensure_funded(account).await?;

        let registered = self
            .settings
            .registry_retry
            .poll_until(|| self.is_registered(address))
            .await;

        if !registered {
            info!(address, "Creating user account");
            if let Err(e) = self.create_user_account(account).await {
                warn!(address, error = %e, "Failed to create user account");
                return Ok(false);
            }
            tokio::time::sleep(self.settings.timings.post_register).await;
        }

        if !self.is_registered(address).await {
            warn!(address, "Final registration check failed");
            return Ok(false);
        }

        Ok(true)
    }

    /// Top the account up from the faucet if it is below `min_balance`.
    /// Fails with `AgentError::InsufficientBalance` if it is still short.
    async fn ensure_funded(&self, account: &LocalAccount) -> Result<()> {
        let address = account.address();
        let balance = self.market.chain().balance(address).await?;
        info!(address, balance = %octas_to_apt(balance), "Account balance (APT)");

        if balance >= self.settings.min_balance {
            return Ok(());
        }

        self.request_faucet(address).await;
        tokio::time::sleep(self.settings.timings.faucet_settle).await;

        let new_balance = self.market.chain().balance(address).await?;
        debug!(address, balance = new_balance, "Balance after faucet");
        if new_balance < self.settings.min_balance {
            return Err(AgentError::InsufficientBalance {
                address: address.to_string(),
                needed: self.settings.min_balance,
                available: new_balance,
            }
            .into());
        }
        Ok(())
    }

    /// Faucet errors are logged, not propagated; the following balance
    /// check decides whether funding worked.
    async fn request_faucet(&self, address: &str) -> bool {
        info!(address, amount = self.settings.faucet_amount, "Requesting faucet");
        match self.faucet.fund(address, self.settings.faucet_amount).await {
            Ok(()) => true,
            Err(e) => {
                warn!(address, error = %e, "Faucet request failed");
                false
            }
        }
    }

    /// Registry lookup; lookup failures count as "not registered".
    async fn is_registered(&self, address: &str) -> bool {
        match self.market.has_claimed_account(address).await {
            Ok(registered) => registered,
            Err(e) => {
                warn!(address, error = %e, "Error checking user existence");
                false
            }
        }
    }

    async fn create_user_account(&self, account: &LocalAccount) -> Result<()> {
        let username = names::random_display_name(&mut *self.rng());
        info!(address = account.address(), username = %username, "Registering user");

        let balance = self.market.chain().balance(account.address()).await?;
        if balance < self.settings.min_balance {
            info!(address = account.address(), "Requesting faucet before registration");
            self.request_faucet(account.address()).await;
            tokio::time::sleep(self.settings.timings.faucet_settle).await;
        }

        let hash = self.market.register_user(account, &username).await?;
        info!(
            address = account.address(),
            username = %username,
            tx = %hash,
            "Account created"
        );
        tokio::time::sleep(self.settings.timings.register_settle).await;
        Ok(())
    }

    // -- Market selection ------------------------------------------------

    /// Open markets on which at least one managed account is out of cooldown.
    /// A failed fetch is logged and yields an empty list.
    pub async fn active_markets(&self) -> Vec<Market> {
        match self.fetch_active_markets().await {
            Ok(markets) => markets,
            Err(e) => {
                error!(error = %e, "Error fetching predictions");
                Vec::new()
            }
        }
    }

    async fn fetch_active_markets(&self) -> Result<Vec<Market>> {
        let markets = self.market.get_all_predictions().await?;
        let now = Utc::now();
        let state = self.state();

        Ok(markets
            .into_iter()
            .filter(|m| m.is_open_at(now))
            .filter(|m| {
                self.accounts
                    .iter()
                    .any(|a| state.votes.is_eligible(&VoteKey::new(m.id, a.address()), now))
            })
            .collect())
    }

    /// Accounts outside their cooldown for `market_id`.
    pub fn eligible_accounts(&self, market_id: u64) -> Vec<&LocalAccount> {
        let now = Utc::now();
        let state = self.state();
        self.accounts
            .iter()
            .filter(|a| state.votes.is_eligible(&VoteKey::new(market_id, a.address()), now))
            .collect()
    }

    // -- Voting ----------------------------------------------------------

    /// Place one vote. Returns false (without submitting) when the account
    /// is not ready or still in cooldown for this market, and false on any
    /// chain failure.
    pub async fn submit_vote(&self, account: &LocalAccount, market: &Market) -> bool {
        let address = account.address();

        if !self.setup_account(account).await {
            warn!(address, "Account not ready for predictions");
            return false;
        }

        let key = VoteKey::new(market.id, address);
        if !self.state().votes.is_eligible(&key, Utc::now()) {
            debug!(key = %key, "Still in cooldown, skipping");
            return false;
        }

        let verdict = strategy::decide_verdict(market, &mut *self.rng());

        match self
            .market
            .predict(account, market.id, verdict, self.settings.stake, false)
            .await
        {
            Ok(hash) => {
                let now = Utc::now();
                self.state().votes.record(key, now);
                info!(
                    address,
                    market_id = market.id,
                    description = %market.description,
                    verdict = %verdict,
                    amount_apt = %octas_to_apt(self.settings.stake),
                    tx = %hash,
                    next_allowed = %(now + self.settings.repeat_interval).to_rfc3339(),
                    "Prediction made"
                );
                true
            }
            Err(e) => {
                error!(address, market_id = market.id, error = %e, "Error making prediction");
                false
            }
        }
    }

    // -- Run loop --------------------------------------------------------

    /// One pass: evict stale cache entries, fetch eligible markets, and vote
    /// once per market with a randomly chosen ready account outside cooldown.
    /// Accounts whose setup failed are skipped until restart.
    /// Stops early (between votes) if the agent has been stopped.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let evicted = self
            .state()
            .votes
            .evict_expired(self.settings.eviction_factor, Utc::now());
        if evicted > 0 {
            debug!(evicted, "Evicted expired vote records");
        }

        let markets = self.fetch_active_markets().await?;
        info!(count = markets.len(), "Found active predictions");

        let mut report = CycleReport {
            markets_found: markets.len(),
            evicted,
            ..CycleReport::default()
        };

        for market in &markets {
            if self.stop_requested() {
                info!("Stop requested, ending cycle early");
                break;
            }

            let Some(account) = self.pick_account(market.id) else {
                continue;
            };

            if self.submit_vote(account, market).await {
                report.votes_submitted += 1;
            } else {
                report.votes_failed += 1;
            }

            tokio::time::sleep(self.vote_pause()).await;
        }

        Ok(report)
    }

    fn pick_account(&self, market_id: u64) -> Option<&LocalAccount> {
        let eligible: Vec<&LocalAccount> = self
            .eligible_accounts(market_id)
            .into_iter()
            .filter(|a| self.account_status(a.address()) == AccountStatus::Ready)
            .collect();
        if eligible.is_empty() {
            debug!(market_id, "No ready account outside cooldown");
            return None;
        }
        let idx = self.rng().gen_range(0..eligible.len());
        Some(eligible[idx])
    }

    fn vote_pause(&self) -> Duration {
        let min = self.settings.timings.vote_pause_min.as_millis() as u64;
        let max = self.settings.timings.vote_pause_max.as_millis() as u64;
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(self.rng().gen_range(min..=max))
    }

    /// Run cycles every `poll_interval` until `stop` is called.
    /// Returns immediately if the loop is already running.
    pub async fn run(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Agent already running");
            return;
        }
        self.stop_tx.send_replace(false);
        let mut stop_rx = self.stop_tx.subscribe();

        info!(
            poll_interval_secs = self.settings.poll_interval.as_secs(),
            repeat_interval_hours = self.settings.repeat_interval.num_hours(),
            "Agent started"
        );

        while self.is_running() {
            match self.run_cycle().await {
                Ok(report) => info!(
                    markets = report.markets_found,
                    submitted = report.votes_submitted,
                    failed = report.votes_failed,
                    "Cycle complete"
                ),
                Err(e) => error!(error = %e, "Cycle failed, continuing to next"),
            }
            self.persist();

            if !self.is_running() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
                _ = stop_rx.wait_for(|stopped| *stopped) => {}
            }
        }

        info!("Run loop exited");
    }

    /// `run`, with a hard limit after which the agent stops itself.
    /// The in-flight vote still completes.
    pub async fn run_with_timeout(&self, limit: Duration) {
        let run = self.run();
        tokio::pin!(run);

        tokio::select! {
            _ = &mut run => return,
            _ = tokio::time::sleep(limit) => {
                info!(limit_secs = limit.as_secs(), "Safety timeout reached");
                self.stop();
            }
        }

        run.await;
    }

    /// Prevent further cycles. The in-flight submission is not interrupted.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.stop_tx.send_replace(true);
        info!("Agent stopped");
    }

    // -- Reporting & persistence ----------------------------------------

    pub fn status(&self) -> StatusReport {
        let now = Utc::now();
        let state = self.state();
        StatusReport {
            running: self.is_running(),
            accounts_count: self.accounts.len(),
            ready_accounts: state
                .setup
                .values()
                .filter(|s| **s == AccountStatus::Ready)
                .count(),
            predictions_processed: state.votes.len(),
            next_available_predictions: state.votes.next_available(now),
        }
    }

    pub fn vote_records(&self) -> Vec<VoteRecord> {
        self.state().votes.records()
    }

    /// Write the vote cache to `state_file`, if configured. Errors are logged.
    pub fn persist(&self) {
        let Some(path) = self.settings.state_file.as_deref() else {
            return;
        };
        if let Err(e) = storage::save_votes(&self.vote_records(), path) {
            error!(error = %e, path, "Failed to save vote cache");
        }
    }

    pub fn restore_votes(&self, records: Vec<VoteRecord>) {
        self.state().votes.restore(records);
    }

    pub fn last_vote(&self, market_id: u64, address: &str) -> Option<chrono::DateTime<Utc>> {
        self.state().votes.last_vote(&VoteKey::new(market_id, address))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
