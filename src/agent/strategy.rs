//! Contrarian vote heuristic.
//!
//! - No votes yet: coin flip.
//! - YES share below 40%: vote YES.
//! - YES share above 60%: vote NO.
//! - Otherwise (40%–60% inclusive): coin flip.

use rand::Rng;

use crate::types::{Market, Verdict};

/// Below this YES share the agent backs YES.
pub const CONTRARIAN_LOW: f64 = 0.4;
/// Above this YES share the agent backs NO.
pub const CONTRARIAN_HIGH: f64 = 0.6;

pub fn decide_verdict<R: Rng + ?Sized>(market: &Market, rng: &mut R) -> Verdict {
    match market.yes_fraction() {
        Some(p) if p < CONTRARIAN_LOW => Verdict::Yes,
        Some(p) if p > CONTRARIAN_HIGH => Verdict::No,
        _ => Verdict::from(rng.gen_bool(0.5)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
