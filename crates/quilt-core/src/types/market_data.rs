//! Normalized market-data records — the event vocabulary every venue
//! adapter decodes into, regardless of its wire format.
//!
//! # Timestamp convention
//!
//! All timestamps are **milliseconds since Unix epoch** (most venue wire
//! formats are millisecond-based). Adapters that receive second- or
//! microsecond-resolution feeds convert at the decode boundary.

use serde::{Deserialize, Serialize};

use super::market::Channel;

// ---------------------------------------------------------------------------
// Ticker (Best Bid / Offer)
// ---------------------------------------------------------------------------

/// Best bid and offer quote — the tightest spread on the order book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub timestamp_ms: u64,
    pub bid: f64,
    pub bid_size: f64,
    pub ask: f64,
    pub ask_size: f64,
    /// Last traded price, when the venue includes it in its ticker stream.
    pub last: Option<f64>,
    /// Rolling base-asset volume, when the venue includes it.
    pub volume: Option<f64>,
}

// ---------------------------------------------------------------------------
// Trade
// ---------------------------------------------------------------------------

/// A single trade execution.
///
/// `trade_id` is a string because venues disagree on the shape (integers,
/// UUIDs, composite keys).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp_ms: u64,
    pub trade_id: String,
    pub price: f64,
    pub size: f64,
    pub is_buyer_maker: bool,
}

// ---------------------------------------------------------------------------
// Candle
// ---------------------------------------------------------------------------

/// One OHLCV bar. `timestamp_ms` is the bar's open time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp_ms: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

// ---------------------------------------------------------------------------
// Order book points
// ---------------------------------------------------------------------------

/// One price level on an order-book side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    /// Resting size at `price`; `0.0` in an update means "remove the level".
    pub size: f64,
    pub timestamp_ms: u64,
}

impl BookLevel {
    pub fn new(price: f64, size: f64, timestamp_ms: u64) -> Self {
        Self { price, size, timestamp_ms }
    }
}

/// One resting order on a level-3 (order-granular) book side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct L3Point {
    pub order_id: String,
    pub price: f64,
    pub size: f64,
    pub timestamp_ms: u64,
    /// Venue-specific extra payload, passed through opaquely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<String>,
}

// ---------------------------------------------------------------------------
// Level 2 snapshot / update
// ---------------------------------------------------------------------------

/// Full replacement state for a level-2 book at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct L2Snapshot {
    pub sequence_id: u64,
    pub timestamp_ms: u64,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

/// Incremental change to a level-2 book since the previous message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct L2Update {
    pub sequence_id: u64,
    /// The sequence this diff applies on top of, when the wire supplies one.
    /// Callers compare it against their book's watermark to detect gaps.
    pub prev_sequence_id: Option<u64>,
    pub timestamp_ms: u64,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

// ---------------------------------------------------------------------------
// Level 3 snapshot / update
// ---------------------------------------------------------------------------

/// Full replacement state for a level-3 (order-granular) book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct L3Snapshot {
    pub sequence_id: u64,
    pub timestamp_ms: u64,
    pub bids: Vec<L3Point>,
    pub asks: Vec<L3Point>,
}

/// Incremental change to a level-3 book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct L3Update {
    pub sequence_id: u64,
    pub prev_sequence_id: Option<u64>,
    pub timestamp_ms: u64,
    pub bids: Vec<L3Point>,
    pub asks: Vec<L3Point>,
}

// ---------------------------------------------------------------------------
// MarketData — tagged union for event passing
// ---------------------------------------------------------------------------

/// A tagged union of all normalized market-data records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MarketData {
    Ticker(Ticker),
    Trade(Trade),
    Candle(Candle),
    L2Snapshot(L2Snapshot),
    L2Update(L2Update),
    L3Snapshot(L3Snapshot),
    L3Update(L3Update),
}

impl MarketData {
    /// The channel this record belongs to — used to pick the subscription
    /// set that maps its wire symbol back to a [`super::Market`].
    pub fn channel(&self) -> Channel {
        match self {
            MarketData::Ticker(_) => Channel::Ticker,
            MarketData::Trade(_) => Channel::Trade,
            MarketData::Candle(_) => Channel::Candle,
            MarketData::L2Snapshot(_) => Channel::Level2Snapshot,
            MarketData::L2Update(_) => Channel::Level2Update,
            MarketData::L3Snapshot(_) => Channel::Level3Snapshot,
            MarketData::L3Update(_) => Channel::Level3Update,
        }
    }
}

// ---------------------------------------------------------------------------
// Display impls
// ---------------------------------------------------------------------------

impl std::fmt::Display for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Ticker(bid={:.8}x{:.4} ask={:.8}x{:.4})",
            self.bid, self.bid_size, self.ask, self.ask_size
        )
    }
}

impl std::fmt::Display for Trade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let side = if self.is_buyer_maker { "SELL" } else { "BUY" };
        write!(
            f,
            "Trade({side} {:.8}x{:.4} id={})",
            self.price, self.size, self.trade_id
        )
    }
}

impl std::fmt::Display for Candle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Candle(o={:.8} h={:.8} l={:.8} c={:.8} v={:.4})",
            self.open, self.high, self.low, self.close, self.volume
        )
    }
}
