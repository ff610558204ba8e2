//! End-to-end agent scenarios against the in-memory chain.

mod common;

use chrono::{Duration, Utc};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use common::*;
use hashpredict_agent::agent::cache::{VoteKey, VoteRecord};
use hashpredict_agent::agent::AgentSettings;
use hashpredict_agent::types::{AccountStatus, MarketState};

// ---------------------------------------------------------------------------
// Account provisioning
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_underfunded_account_is_funded_before_registration() {
    let chain = MockChain::new();
    let faucet = MockFaucet::new(chain.clone());
    let acct = account(1);
    let agent = build_agent(&chain, &faucet, vec![acct.clone()], fast_settings());

    assert!(agent.setup_account(&acct).await);
    assert_eq!(agent.account_status(acct.address()), AccountStatus::Ready);
    assert!(chain.is_registered(acct.address()));

    let events = chain.events();
    let faucet_at = events.iter().position(|e| e == "faucet").unwrap();
    let register_at = events.iter().position(|e| e == "submit:register_user").unwrap();
    let first_lookup = events.iter().position(|e| e == "view:has_claimed_account").unwrap();
    assert!(faucet_at < first_lookup);
    assert!(faucet_at < register_at);
}

#[tokio::test]
async fn test_funded_registered_account_skips_faucet_and_registration() {
    let acct = account(1);
    let chain = ready_chain(&[acct.clone()]);
    let faucet = MockFaucet::new(chain.clone());
    let agent = build_agent(&chain, &faucet, vec![acct.clone()], fast_settings());

    assert_eq!(agent.initialize().await, 1);

    let events = chain.events();
    assert!(!events.iter().any(|e| e == "faucet"));
    assert!(chain.submissions_of("register_user").is_empty());
}

#[tokio::test]
async fn test_ready_account_needs_no_further_calls() {
    let acct = account(1);
    let chain = ready_chain(&[acct.clone()]);
    let faucet = MockFaucet::new(chain.clone());
    let agent = build_agent(&chain, &faucet, vec![acct.clone()], fast_settings());

    assert!(agent.setup_account(&acct).await);
    let calls = chain.events().len();
    assert!(agent.setup_account(&acct).await);
    assert_eq!(chain.events().len(), calls);
}

#[tokio::test]
async fn test_faucet_failure_returns_false_and_leaves_account_unready() {
    let chain = MockChain::new();
    let faucet = MockFaucet::new(chain.clone());
    faucet.set_error("connect ECONNREFUSED");
    let acct = account(1);
    let agent = build_agent(&chain, &faucet, vec![acct.clone()], fast_settings());

    assert!(!agent.setup_account(&acct).await);
    assert_eq!(agent.account_status(acct.address()), AccountStatus::Unset);
    assert_eq!(agent.status().ready_accounts, 0);
    assert!(chain.submissions_of("register_user").is_empty());
}

#[tokio::test]
async fn test_failed_registration_leaves_account_unready() {
    let acct = account(1);
    let chain = MockChain::new();
    chain.set_balance(acct.address(), FUNDED);
    chain.set_submit_error(Some("SEQUENCE_NUMBER_TOO_OLD"));
    let faucet = MockFaucet::new(chain.clone());
    let agent = build_agent(&chain, &faucet, vec![acct.clone()], fast_settings());

    assert!(!agent.setup_account(&acct).await);
    assert_eq!(agent.account_status(acct.address()), AccountStatus::Unset);

    // Three registry lookups, one attempt to register, no final check.
    let lookups = chain
        .events()
        .iter()
        .filter(|e| *e == "view:has_claimed_account")
        .count();
    assert_eq!(lookups, 3);
}

#[tokio::test]
async fn test_initialize_continues_past_failing_account() {
    let good = account(1);
    let bad = account(2);
    let chain = ready_chain(&[good.clone()]);
    let faucet = MockFaucet::new(chain.clone());
    faucet.set_error("faucet down");
    let agent = build_agent(&chain, &faucet, vec![bad.clone(), good.clone()], fast_settings());

    assert_eq!(agent.initialize().await, 1);
    assert_eq!(agent.account_status(bad.address()), AccountStatus::Unset);
    assert_eq!(agent.account_status(good.address()), AccountStatus::Ready);
}

// ---------------------------------------------------------------------------
// Market selection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_active_markets_filters_closed_expired_and_cooled_down() {
    let acct = account(1);
    let chain = ready_chain(&[acct.clone()]);
    let faucet = MockFaucet::new(chain.clone());

    let open = open_market(1);
    let mut expired = open_market(2);
    expired.end_time = (Utc::now() - Duration::minutes(1)).timestamp();
    let mut resolved = open_market(3);
    resolved.state = MarketState::Other(1);
    let voted = open_market(4);
    chain.set_markets(vec![open, expired, resolved, voted.clone()]);

    let agent = build_agent(&chain, &faucet, vec![acct.clone()], fast_settings());
    assert!(agent.submit_vote(&acct, &voted).await);

    let ids: Vec<u64> = agent.active_markets().await.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![1]);
}

#[tokio::test]
async fn test_market_stays_active_while_any_account_is_eligible() {
    let a = account(1);
    let b = account(2);
    let chain = ready_chain(&[a.clone(), b.clone()]);
    let faucet = MockFaucet::new(chain.clone());
    let market = open_market(9);
    chain.set_markets(vec![market.clone()]);

    let agent = build_agent(&chain, &faucet, vec![a.clone(), b.clone()], fast_settings());
    assert!(agent.submit_vote(&a, &market).await);

    assert_eq!(agent.active_markets().await.len(), 1);
    let eligible = agent.eligible_accounts(9);
    assert_eq!(eligible.len(), 1);
    assert_eq!(eligible[0].address(), b.address());

    assert!(agent.submit_vote(&b, &market).await);
    assert!(agent.active_markets().await.is_empty());
}

#[tokio::test]
async fn test_view_failure_yields_no_markets() {
    let acct = account(1);
    let chain = ready_chain(&[acct.clone()]);
    chain.set_markets(vec![open_market(1)]);
    chain.set_view_error(Some("503 Service Unavailable"));
    let faucet = MockFaucet::new(chain.clone());
    let agent = build_agent(&chain, &faucet, vec![acct], fast_settings());

    assert!(agent.active_markets().await.is_empty());
}

// ---------------------------------------------------------------------------
// Voting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_single_vote_then_cooldown_noop() {
    let acct = account(1);
    let chain = ready_chain(&[acct.clone()]);
    let faucet = MockFaucet::new(chain.clone());
    let market = open_market(5);
    chain.set_markets(vec![market.clone()]);
    let agent = build_agent(&chain, &faucet, vec![acct.clone()], fast_settings());

    let before = Utc::now();
    assert!(agent.submit_vote(&acct, &market).await);
    let after = Utc::now();

    let status = agent.status();
    assert_eq!(status.predictions_processed, 1);
    assert_eq!(status.next_available_predictions.len(), 1);
    assert_eq!(
        status.next_available_predictions[0].key,
        format!("5-{}", acct.address())
    );
    let voted_at = agent.last_vote(5, acct.address()).unwrap();
    assert!(voted_at >= before && voted_at <= after);

    let predicts = chain.submissions_of("predict");
    assert_eq!(predicts.len(), 1);
    assert_eq!(predicts[0].0, acct.address());
    assert_eq!(predicts[0].1.arguments[0], serde_json::json!("5"));
    assert_eq!(predicts[0].1.arguments[2], serde_json::json!("10000000"));
    assert_eq!(predicts[0].1.arguments[3], serde_json::json!(false));

    // Second attempt inside the cooldown: no-op, no transaction.
    assert!(!agent.submit_vote(&acct, &market).await);
    assert_eq!(chain.submissions_of("predict").len(), 1);
    assert_eq!(agent.status().predictions_processed, 1);
}

#[tokio::test]
async fn test_contrarian_vote_on_chain() {
    let acct = account(1);
    let chain = ready_chain(&[acct.clone()]);
    let faucet = MockFaucet::new(chain.clone());
    let mut lopsided = open_market(6);
    lopsided.yes_votes = 1;
    lopsided.no_votes = 9;
    chain.set_markets(vec![lopsided.clone()]);
    let agent = build_agent(&chain, &faucet, vec![acct.clone()], fast_settings());

    assert!(agent.submit_vote(&acct, &lopsided).await);
    let predicts = chain.submissions_of("predict");
    assert_eq!(predicts[0].1.arguments[1], serde_json::json!(true));
}

#[tokio::test]
async fn test_failed_submission_records_nothing() {
    let acct = account(1);
    let chain = ready_chain(&[acct.clone()]);
    let faucet = MockFaucet::new(chain.clone());
    let market = open_market(1);
    chain.set_markets(vec![market.clone()]);
    let agent = build_agent(&chain, &faucet, vec![acct.clone()], fast_settings());
    assert!(agent.setup_account(&acct).await);

    chain.set_submit_error(Some("INSUFFICIENT_BALANCE_FOR_TRANSACTION_FEE"));
    assert!(!agent.submit_vote(&acct, &market).await);
    assert_eq!(agent.status().predictions_processed, 0);
}

#[tokio::test]
async fn test_vote_from_unready_account_is_refused() {
    let acct = account(1);
    let chain = MockChain::new();
    let faucet = MockFaucet::new(chain.clone());
    faucet.set_error("faucet down");
    let market = open_market(1);
    chain.set_markets(vec![market.clone()]);
    let agent = build_agent(&chain, &faucet, vec![acct.clone()], fast_settings());

    assert!(!agent.submit_vote(&acct, &market).await);
    assert!(chain.submissions_of("predict").is_empty());
}

// ---------------------------------------------------------------------------
// Cycles and run loop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cycles_rotate_through_accounts_until_all_cooled_down() {
    let accounts = vec![account(1), account(2), account(3)];
    let chain = ready_chain(&accounts);
    let faucet = MockFaucet::new(chain.clone());
    chain.set_markets(vec![open_market(1)]);
    let agent = build_agent(&chain, &faucet, accounts.clone(), fast_settings());
    assert_eq!(agent.initialize().await, 3);

    for _ in 0..3 {
        let report = agent.run_cycle().await.unwrap();
        assert_eq!(report.markets_found, 1);
        assert_eq!(report.votes_submitted, 1);
    }

    let mut voters: Vec<String> = chain
        .submissions_of("predict")
        .into_iter()
        .map(|(sender, _)| sender)
        .collect();
    voters.sort();
    voters.dedup();
    assert_eq!(voters.len(), 3, "each account votes once per cooldown");

    let report = agent.run_cycle().await.unwrap();
    assert_eq!(report.markets_found, 0);
    assert_eq!(chain.submissions_of("predict").len(), 3);
}

#[tokio::test]
async fn test_cycles_skip_account_whose_setup_failed() {
    let good = account(1);
    let broken = account(2);
    let chain = ready_chain(&[good.clone()]);
    let faucet = MockFaucet::new(chain.clone());
    faucet.set_error("faucet down");
    let agent = build_agent(&chain, &faucet, vec![good.clone(), broken.clone()], fast_settings());

    assert_eq!(agent.initialize().await, 1);
    let faucet_calls = || chain.events().iter().filter(|e| *e == "faucet").count();
    let after_init = faucet_calls();

    for id in 1..=10 {
        chain.set_markets(vec![open_market(id)]);
        let report = agent.run_cycle().await.unwrap();
        assert_eq!(report.votes_submitted, 1, "market {id} should get a vote");
        assert_eq!(report.votes_failed, 0);
    }

    assert_eq!(faucet_calls(), after_init, "failed account is not re-provisioned");
    assert!(chain
        .submissions_of("predict")
        .iter()
        .all(|(sender, _)| sender == good.address()));
    assert!(chain.submissions_of("register_user").is_empty());
    assert_eq!(agent.account_status(broken.address()), AccountStatus::Unset);
}

#[tokio::test]
async fn test_cycle_evicts_stale_votes() {
    let acct = account(1);
    let chain = ready_chain(&[acct.clone()]);
    let faucet = MockFaucet::new(chain.clone());
    let agent = build_agent(&chain, &faucet, vec![acct.clone()], fast_settings());

    // Default horizon is 4 x 6h.
    let now = Utc::now();
    agent.restore_votes(vec![
        VoteRecord {
            key: VoteKey::new(1, acct.address()),
            voted_at: now - Duration::hours(25),
        },
        VoteRecord {
            key: VoteKey::new(2, acct.address()),
            voted_at: now - Duration::hours(2),
        },
    ]);

    let report = agent.run_cycle().await.unwrap();
    assert_eq!(report.evicted, 1);
    assert_eq!(agent.status().predictions_processed, 1);
    assert!(agent.last_vote(1, acct.address()).is_none());
    assert!(agent.last_vote(2, acct.address()).is_some());

    let report = agent.run_cycle().await.unwrap();
    assert_eq!(report.evicted, 0);
}

#[tokio::test]
async fn test_huge_eviction_factor_keeps_cooldown() {
    let acct = account(1);
    let chain = ready_chain(&[acct.clone()]);
    let faucet = MockFaucet::new(chain.clone());
    chain.set_markets(vec![open_market(1)]);
    let settings = AgentSettings {
        eviction_factor: u32::MAX,
        ..fast_settings()
    };
    let agent = build_agent(&chain, &faucet, vec![acct], settings);
    assert_eq!(agent.initialize().await, 1);

    let first = agent.run_cycle().await.unwrap();
    let second = agent.run_cycle().await.unwrap();

    assert_eq!(first.votes_submitted, 1);
    assert_eq!(second.evicted, 0);
    assert_eq!(second.votes_submitted, 0);
    assert_eq!(chain.submissions_of("predict").len(), 1);
}

#[tokio::test]
async fn test_run_loop_survives_failing_cycle() {
    let acct = account(1);
    let chain = ready_chain(&[acct.clone()]);
    let faucet = MockFaucet::new(chain.clone());
    chain.set_markets(vec![open_market(1)]);

    let agent = Arc::new(build_agent(&chain, &faucet, vec![acct], fast_settings()));
    assert_eq!(agent.initialize().await, 1);
    chain.set_view_error(Some("node unavailable"));
    let handle = tokio::spawn({
        let agent = agent.clone();
        async move { agent.run().await }
    });

    tokio::time::sleep(StdDuration::from_millis(150)).await;
    assert!(agent.is_running());
    chain.set_view_error(None);

    let voted = tokio::time::timeout(StdDuration::from_secs(5), async {
        while chain.submissions_of("predict").is_empty() {
            tokio::time::sleep(StdDuration::from_millis(20)).await;
        }
    })
    .await;
    assert!(voted.is_ok(), "a later cycle should vote");

    agent.stop();
    tokio::time::timeout(StdDuration::from_secs(5), handle)
        .await
        .expect("run loop should exit after stop")
        .unwrap();
    assert!(!agent.is_running());
}

#[tokio::test]
async fn test_stop_mid_cycle_completes_inflight_vote_only() {
    let acct = account(1);
    let chain = ready_chain(&[acct.clone()]);
    let faucet = MockFaucet::new(chain.clone());
    chain.set_markets(vec![open_market(1), open_market(2)]);
    let gate = chain.install_gate();

    let agent = Arc::new(build_agent(&chain, &faucet, vec![acct.clone()], fast_settings()));
    assert_eq!(agent.initialize().await, 1);
    let handle = tokio::spawn({
        let agent = agent.clone();
        async move { agent.run().await }
    });

    // The first vote is now blocked inside submission.
    tokio::time::timeout(StdDuration::from_secs(5), gate.started.notified())
        .await
        .expect("vote submission should start");
    agent.stop();
    gate.release.notify_one();

    tokio::time::timeout(StdDuration::from_secs(5), handle)
        .await
        .expect("run loop should exit after stop")
        .unwrap();

    assert_eq!(chain.submissions_of("predict").len(), 1);
    assert_eq!(agent.status().predictions_processed, 1);
    assert!(!agent.status().running);

    // Wait well past the poll interval: nothing else happens.
    tokio::time::sleep(agent.settings().poll_interval * 3).await;
    assert_eq!(chain.submissions_of("predict").len(), 1);
    assert_eq!(agent.status().predictions_processed, 1);
}

#[tokio::test]
async fn test_run_is_idempotent_while_running() {
    let acct = account(1);
    let chain = ready_chain(&[acct.clone()]);
    let faucet = MockFaucet::new(chain.clone());
    let agent = Arc::new(build_agent(&chain, &faucet, vec![acct], fast_settings()));

    let handle = tokio::spawn({
        let agent = agent.clone();
        async move { agent.run().await }
    });
    tokio::time::sleep(StdDuration::from_millis(50)).await;

    // A second `run` returns immediately.
    tokio::time::timeout(StdDuration::from_secs(1), agent.run())
        .await
        .expect("second run should return immediately");

    agent.stop();
    tokio::time::timeout(StdDuration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_safety_timeout_stops_agent() {
    let acct = account(1);
    let chain = ready_chain(&[acct.clone()]);
    let faucet = MockFaucet::new(chain.clone());
    let agent = build_agent(&chain, &faucet, vec![acct], fast_settings());

    tokio::time::timeout(
        StdDuration::from_secs(5),
        agent.run_with_timeout(StdDuration::from_millis(250)),
    )
    .await
    .expect("safety timeout should end the run");
    assert!(!agent.is_running());
}

#[tokio::test]
async fn test_status_reports_remaining_cooldown() {
    let acct = account(1);
    let chain = ready_chain(&[acct.clone()]);
    let faucet = MockFaucet::new(chain.clone());
    let market = open_market(3);
    chain.set_markets(vec![market.clone()]);
    let agent = build_agent(&chain, &faucet, vec![acct.clone()], fast_settings());

    assert!(agent.submit_vote(&acct, &market).await);
    let status = agent.status();
    assert_eq!(status.accounts_count, 1);
    assert_eq!(status.ready_accounts, 1);
    let minutes = status.next_available_predictions[0].next_available_in_minutes;
    assert!(minutes > 359.0 && minutes <= 360.0, "minutes = {minutes}");
}
