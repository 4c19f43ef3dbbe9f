//! Market identity, channel taxonomy, and adapter capability flags.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

/// A tradable symbol pair plus the venue-native identifier used on the wire.
///
/// `id` is the key in every subscription set. Markets are created by the
/// caller and never mutated by the framework.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Market {
    /// Venue-native symbol (e.g. `"BTCUSDT"`).
    pub id: String,
    /// Base asset (e.g. `"BTC"`).
    pub base: String,
    /// Quote asset (e.g. `"USDT"`).
    pub quote: String,
    /// Optional instrument category (e.g. `"spot"`, `"swap"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_type: Option<String>,
}

impl Market {
    pub fn new(id: impl Into<String>, base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base: base.into(),
            quote: quote.into(),
            market_type: None,
        }
    }
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({}/{})", self.id, self.base, self.quote)
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// Normalized message channels.
///
/// The declaration order is the order used when replaying subscriptions
/// after a reconnect, so it is part of the observable contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Ticker,
    Trade,
    Candle,
    Level2Snapshot,
    Level2Update,
    Level3Snapshot,
    Level3Update,
}

impl Channel {
    /// Number of channels.
    pub const COUNT: usize = 7;

    /// All channels, in replay order.
    pub const ALL: [Channel; Self::COUNT] = [
        Channel::Ticker,
        Channel::Trade,
        Channel::Candle,
        Channel::Level2Snapshot,
        Channel::Level2Update,
        Channel::Level3Snapshot,
        Channel::Level3Update,
    ];

    /// Stable index into per-channel storage (matches [`Channel::ALL`]).
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Ticker => "ticker",
            Channel::Trade => "trade",
            Channel::Candle => "candle",
            Channel::Level2Snapshot => "l2snapshot",
            Channel::Level2Update => "l2update",
            Channel::Level3Snapshot => "l3snapshot",
            Channel::Level3Update => "l3update",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Which channels a venue adapter supports.
///
/// Declared once by the adapter; the client records the set at construction
/// and turns subscribe calls for unsupported channels into no-ops, so the
/// check is never duplicated at individual call sites.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub tickers: bool,
    pub trades: bool,
    pub candles: bool,
    pub level2_snapshots: bool,
    pub level2_updates: bool,
    pub level3_snapshots: bool,
    pub level3_updates: bool,
}

impl Capabilities {
    /// Every channel supported — useful for tests and full-featured venues.
    pub fn all() -> Self {
        Self {
            tickers: true,
            trades: true,
            candles: true,
            level2_snapshots: true,
            level2_updates: true,
            level3_snapshots: true,
            level3_updates: true,
        }
    }

    pub fn supports(&self, channel: Channel) -> bool {
        match channel {
            Channel::Ticker => self.tickers,
            Channel::Trade => self.trades,
            Channel::Candle => self.candles,
            Channel::Level2Snapshot => self.level2_snapshots,
            Channel::Level2Update => self.level2_updates,
            Channel::Level3Snapshot => self.level3_snapshots,
            Channel::Level3Update => self.level3_updates,
        }
    }
}
