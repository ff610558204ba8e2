//! Per-(market, account) vote cooldown cache.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::types::NextAvailable;

/// Identifies one account's vote on one market.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoteKey {
    pub market_id: u64,
    pub address: String,
}

impl VoteKey {
    pub fn new(market_id: u64, address: &str) -> Self {
        Self {
            market_id,
            address: address.to_string(),
        }
    }
}

impl fmt::Display for VoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.market_id, self.address)
    }
}

/// One persisted cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRecord {
    pub key: VoteKey,
    pub voted_at: DateTime<Utc>,
}

/// Last-vote timestamps with a fixed cooldown.
///
/// Invariant: `is_eligible` is false for `cooldown` after `record`.
#[derive(Debug, Clone)]
pub struct VoteCache {
    cooldown: Duration,
    entries: HashMap<VoteKey, DateTime<Utc>>,
}

impl VoteCache {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            entries: HashMap::new(),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_vote(&self, key: &VoteKey) -> Option<DateTime<Utc>> {
        self.entries.get(key).copied()
    }

    /// No previous vote, or the previous one is at least `cooldown` old.
    pub fn is_eligible(&self, key: &VoteKey, now: DateTime<Utc>) -> bool {
        match self.entries.get(key) {
            None => true,
            Some(last) => now - *last >= self.cooldown,
        }
    }

    pub fn record(&mut self, key: VoteKey, at: DateTime<Utc>) {
        self.entries.insert(key, at);
    }

    /// Time left until `key` may vote again (zero if already eligible).
    pub fn time_until_eligible(&self, key: &VoteKey, now: DateTime<Utc>) -> Duration {
        match self.entries.get(key) {
            None => Duration::zero(),
            Some(last) => (self.cooldown - (now - *last)).max(Duration::zero()),
        }
    }

    /// Drop entries older than `factor × cooldown`. `factor` is clamped to
    /// at least 1 so an entry still inside its cooldown is never evicted.
    /// A horizon too large to represent evicts nothing.
    /// Returns the number of entries removed.
    pub fn evict_expired(&mut self, factor: u32, now: DateTime<Utc>) -> usize {
        let Some(horizon) = eviction_horizon(self.cooldown, factor) else {
            return 0;
        };
        let before = self.entries.len();
        self.entries.retain(|_, at| now - *at < horizon);
        before - self.entries.len()
    }

    /// Cooldown report for every entry, sorted by key for stable output.
    pub fn next_available(&self, now: DateTime<Utc>) -> Vec<NextAvailable> {
        let mut out: Vec<NextAvailable> = self
            .entries
            .keys()
            .map(|key| NextAvailable {
                key: key.to_string(),
                next_available_in_minutes: self.time_until_eligible(key, now).num_seconds()
                    as f64
                    / 60.0,
            })
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    pub fn records(&self) -> Vec<VoteRecord> {
        self.entries
            .iter()
            .map(|(key, at)| VoteRecord {
                key: key.clone(),
                voted_at: *at,
            })
            .collect()
    }

    /// Merge persisted records, keeping the newest timestamp per key.
    pub fn restore(&mut self, records: Vec<VoteRecord>) {
        for r in records {
            let slot = self.entries.entry(r.key).or_insert(r.voted_at);
            if r.voted_at > *slot {
                *slot = r.voted_at;
            }
        }
    }
}

/// `factor × cooldown`, or `None` on overflow.
pub fn eviction_horizon(cooldown: Duration, factor: u32) -> Option<Duration> {
    let factor = i32::try_from(factor.max(1)).ok()?;
    cooldown.checked_mul(factor)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
