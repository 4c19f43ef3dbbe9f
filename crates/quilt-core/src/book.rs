//! Incremental order book reconstruction.
//!
//! Several venues send an initial snapshot followed by delta messages that
//! add, update, or remove price levels. [`OrderBook`] turns that stream into
//! a consistently ordered, queryable book:
//!
//! - Bids are sorted **descending** by price (best bid first).
//! - Asks are sorted **ascending** by price (best ask first).
//!
//! The book records each message's `sequence_id` as a watermark. Detecting
//! sequence gaps is the caller's responsibility (via [`OrderBook::check_sequence`]);
//! on a gap the caller fetches a fresh snapshot — the book only guarantees
//! consistency for a contiguous stream.

use crate::types::{BookLevel, L2Snapshot, L2Update};

/// Tolerance for floating-point price comparison.
const PRICE_EPS: f64 = 1e-10;

/// Level-2 order book built from a snapshot plus incremental updates.
#[derive(Debug, Default)]
pub struct OrderBook {
    /// Bid levels, sorted descending by price.
    bids: Vec<BookLevel>,
    /// Ask levels, sorted ascending by price.
    asks: Vec<BookLevel>,
    /// Sequence id of the last applied snapshot or update.
    sequence_id: u64,
}

impl OrderBook {
    /// Create a new empty order book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire book with a snapshot and record its sequence id.
    ///
    /// Both sides are re-sorted internally, so snapshot ordering on the wire
    /// does not matter.
    pub fn apply_snapshot(&mut self, snapshot: &L2Snapshot) {
        self.bids.clear();
        self.bids.extend(snapshot.bids.iter().cloned());
        self.bids
            .sort_by(|a, b| b.price.partial_cmp(&a.price).unwrap_or(std::cmp::Ordering::Equal));

        self.asks.clear();
        self.asks.extend(snapshot.asks.iter().cloned());
        self.asks
            .sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal));

        self.sequence_id = snapshot.sequence_id;
    }

    /// Apply an incremental update and record its sequence id.
    ///
    /// For each `(price, size)` level:
    /// - If the price exists and `size == 0.0`, the level is **removed**.
    /// - If the price exists and `size > 0.0`, size and timestamp are
    ///   **overwritten**.
    /// - If the price is absent and `size > 0.0`, a new level is **inserted**
    ///   at its sorted position.
    pub fn apply_update(&mut self, update: &L2Update) {
        for level in &update.bids {
            upsert_desc(&mut self.bids, level);
        }
        for level in &update.asks {
            upsert_asc(&mut self.asks, level);
        }
        self.sequence_id = update.sequence_id;
    }

    /// `true` when `update` applies cleanly on top of the stored watermark.
    ///
    /// Updates without a prior-sequence reference always pass; the venue's
    /// wire protocol simply does not support gap detection.
    pub fn check_sequence(&self, update: &L2Update) -> bool {
        update
            .prev_sequence_id
            .is_none_or(|prev| prev == self.sequence_id)
    }

    /// Sequence id of the last applied snapshot or update.
    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    /// Best (highest) bid, if any.
    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    /// Best (lowest) ask, if any.
    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }

    /// All bid levels, best first.
    pub fn bids(&self) -> &[BookLevel] {
        &self.bids
    }

    /// All ask levels, best first.
    pub fn asks(&self) -> &[BookLevel] {
        &self.asks
    }

    /// Returns `true` if the book has no levels on either side.
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Upsert into a bid side (sorted **descending** by price).
fn upsert_desc(levels: &mut Vec<BookLevel>, level: &BookLevel) {
    let pos = levels.partition_point(|l| l.price > level.price + PRICE_EPS);
    apply_at(levels, pos, level);
}

/// Upsert into an ask side (sorted **ascending** by price).
fn upsert_asc(levels: &mut Vec<BookLevel>, level: &BookLevel) {
    let pos = levels.partition_point(|l| l.price < level.price - PRICE_EPS);
    apply_at(levels, pos, level);
}

/// Remove, overwrite, or insert at the binary-searched position.
fn apply_at(levels: &mut Vec<BookLevel>, pos: usize, level: &BookLevel) {
    if pos < levels.len() && (levels[pos].price - level.price).abs() < PRICE_EPS {
        if level.size == 0.0 {
            levels.remove(pos);
        } else {
            levels[pos].size = level.size;
            levels[pos].timestamp_ms = level.timestamp_ms;
        }
    } else if level.size > 0.0 {
        levels.insert(pos, level.clone());
    }
}
