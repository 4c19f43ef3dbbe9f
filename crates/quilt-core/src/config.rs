//! Configuration parsing for the Quilt runner.
//!
//! All feeds are described by a single JSON config file. The top-level
//! structure contains logging metadata and a `feeds` array where each entry
//! describes one venue feed instance.
//!
//! # Example config
//!
//! ```json
//! {
//!   "meta": { "module_name": "quilt", "log_path": "/tmp/log" },
//!   "feeds": [{
//!     "venue": "binance",
//!     "markets": [{ "id": "BTCUSDT", "base": "BTC", "quote": "USDT" }],
//!     "channels": ["ticker", "trade"],
//!     "watchdog_interval_sec": 90,
//!     "reconnect_policy": "await_closed",
//!     "multiplex": { "max_connecting": 3, "creation_delay_ms": 250 }
//!   }]
//! }
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::types::{Channel, Market};

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Module metadata (name, log path).
    pub meta: Option<ModuleMeta>,

    /// Array of feed configs — one per venue feed instance.
    pub feeds: Vec<FeedConfig>,
}

/// Module metadata block.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
}

/// A single venue feed configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Venue identifier: `"binance"`.
    pub venue: String,

    /// Markets to subscribe.
    pub markets: Vec<Market>,

    /// Channels to subscribe for each market.
    pub channels: Vec<Channel>,

    /// Candle bar period for venues that parameterize their kline streams
    /// (default: `"1m"`).
    pub candle_period: Option<String>,

    /// Watchdog silence interval in seconds (default: 90).
    pub watchdog_interval_sec: Option<u64>,

    /// Reconnect policy: `"await_closed"` (default) or `"immediate"`.
    pub reconnect_policy: Option<String>,

    /// When present, run one connection per market through the multiplexing
    /// manager instead of a single shared connection.
    pub multiplex: Option<MultiplexConfig>,

    /// Extra HTTP headers for the WebSocket handshake (e.g. API key).
    pub extra_headers: Option<HashMap<String, String>>,
}

impl FeedConfig {
    /// Returns the effective watchdog interval.
    pub fn effective_watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_sec.unwrap_or(90))
    }

    /// Returns the effective candle period.
    pub fn effective_candle_period(&self) -> &str {
        self.candle_period.as_deref().unwrap_or("1m")
    }
}

/// Multiplexing (one-connection-per-market) configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MultiplexConfig {
    /// Maximum number of concurrently establishing connections (default: 3).
    pub max_connecting: Option<usize>,

    /// Minimum delay between connection creations in milliseconds
    /// (default: 250).
    pub creation_delay_ms: Option<u64>,
}

impl MultiplexConfig {
    pub fn effective_max_connecting(&self) -> usize {
        self.max_connecting.unwrap_or(3)
    }

    pub fn effective_creation_delay(&self) -> Duration {
        Duration::from_millis(self.creation_delay_ms.unwrap_or(250))
    }
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let raw = r#"{
            "feeds": [{
                "venue": "binance",
                "markets": [{ "id": "BTCUSDT", "base": "BTC", "quote": "USDT" }],
                "channels": ["ticker", "trade", "level2_update"]
            }]
        }"#;
        let config: AppConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.feeds.len(), 1);
        let feed = &config.feeds[0];
        assert_eq!(feed.venue, "binance");
        assert_eq!(feed.markets[0].id, "BTCUSDT");
        assert_eq!(
            feed.channels,
            vec![Channel::Ticker, Channel::Trade, Channel::Level2Update]
        );
        assert_eq!(feed.effective_watchdog_interval(), Duration::from_secs(90));
        assert!(feed.multiplex.is_none());
    }

    #[test]
    fn parse_multiplex_block() {
        let raw = r#"{
            "feeds": [{
                "venue": "binance",
                "markets": [],
                "channels": [],
                "multiplex": { "max_connecting": 5 }
            }]
        }"#;
        let config: AppConfig = serde_json::from_str(raw).unwrap();
        let mux = config.feeds[0].multiplex.as_ref().unwrap();
        assert_eq!(mux.effective_max_connecting(), 5);
        assert_eq!(mux.effective_creation_delay(), Duration::from_millis(250));
    }
}
