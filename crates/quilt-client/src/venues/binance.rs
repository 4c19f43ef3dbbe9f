//! Binance spot adapter.
//!
//! Uses the combined-stream endpoint, where every payload arrives wrapped
//! as `{"stream":"btcusdt@trade","data":{...}}` — the stream name carries
//! the symbol, so records can be tagged without per-connection bookkeeping.
//!
//! Streams: `bookTicker` → `Ticker`, `trade` → `Trade`, `kline_<period>` →
//! `Candle`, `depth20@100ms` → `L2Snapshot`, `depth@100ms` → `L2Update`.
//! Level-3 data is not offered by Binance.
//!
//! For consumers maintaining a full book from `depth@100ms` diffs,
//! [`fetch_depth_snapshot`] pulls the REST seed snapshot with bounded
//! retries.

use std::time::Duration;

use quilt_core::error::FeedError;
use quilt_core::time_util;
use quilt_core::types::{
    BookLevel, Candle, Capabilities, Channel, L2Snapshot, L2Update, Market, MarketData, Ticker,
    Trade,
};
use serde_json::Value;
use tracing::warn;

use crate::adapter::{Decoded, VenueAdapter};
use crate::transport::ws::WsConfig;

/// Combined-stream WebSocket endpoint.
pub const BINANCE_WS_URL: &str = "wss://stream.binance.com:443/stream";

/// REST endpoint for the depth seed snapshot.
const BINANCE_REST_URL: &str = "https://api.binance.com";

const SNAPSHOT_RETRIES: u32 = 3;

/// Binance spot wire-format strategy.
pub struct BinanceAdapter {
    candle_period: String,
    next_request_id: u64,
}

impl BinanceAdapter {
    pub fn new() -> Self {
        Self::with_candle_period("1m")
    }

    pub fn with_candle_period(period: &str) -> Self {
        Self {
            candle_period: period.to_string(),
            next_request_id: 1,
        }
    }

    /// Transport config for the combined-stream endpoint. Binance answers
    /// protocol-level pings itself, so no venue ping payload is needed.
    pub fn ws_config() -> WsConfig {
        WsConfig::new(BINANCE_WS_URL)
    }

    fn stream_name(&self, channel: Channel, market: &Market) -> Option<String> {
        let sym = market.id.to_lowercase();
        match channel {
            Channel::Ticker => Some(format!("{sym}@bookTicker")),
            Channel::Trade => Some(format!("{sym}@trade")),
            Channel::Candle => Some(format!("{sym}@kline_{}", self.candle_period)),
            Channel::Level2Snapshot => Some(format!("{sym}@depth20@100ms")),
            Channel::Level2Update => Some(format!("{sym}@depth@100ms")),
            Channel::Level3Snapshot | Channel::Level3Update => None,
        }
    }

    fn request(&mut self, method: &str, stream: String) -> String {
        let id = self.next_request_id;
        self.next_request_id += 1;
        serde_json::json!({
            "method": method,
            "params": [stream],
            "id": id
        })
        .to_string()
    }
}

impl Default for BinanceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl VenueAdapter for BinanceAdapter {
    fn name(&self) -> &str {
        "binance"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            tickers: true,
            trades: true,
            candles: true,
            level2_snapshots: true,
            level2_updates: true,
            level3_snapshots: false,
            level3_updates: false,
        }
    }

    fn subscribe_request(&mut self, channel: Channel, market: &Market) -> Option<String> {
        let stream = self.stream_name(channel, market)?;
        Some(self.request("SUBSCRIBE", stream))
    }

    fn unsubscribe_request(&mut self, channel: Channel, market: &Market) -> Option<String> {
        let stream = self.stream_name(channel, market)?;
        Some(self.request("UNSUBSCRIBE", stream))
    }

    fn decode(&mut self, raw: &str) -> Result<Vec<Decoded>, FeedError> {
        let v: Value =
            serde_json::from_str(raw).map_err(|e| FeedError::Decode(format!("invalid json: {e}")))?;

        // Request acks look like {"result":null,"id":1}.
        if v.get("id").is_some() {
            return Ok(Vec::new());
        }
        let (Some(stream), Some(data)) = (v.get("stream").and_then(Value::as_str), v.get("data"))
        else {
            return Ok(Vec::new());
        };
        let Some((sym, chan)) = stream.split_once('@') else {
            return Ok(Vec::new());
        };
        let remote_id = sym.to_uppercase();

        let record = match chan {
            "bookTicker" => parse_book_ticker(data)?,
            "trade" => parse_trade(data)?,
            c if c.starts_with("kline") => parse_kline(data)?,
            c if c.starts_with("depth20") => parse_partial_depth(data)?,
            c if c.starts_with("depth") => parse_depth_update(data)?,
            _ => return Ok(Vec::new()),
        };
        Ok(vec![(remote_id, record)])
    }
}

// ---------------------------------------------------------------------------
// Individual parsers
// ---------------------------------------------------------------------------

fn parse_book_ticker(data: &Value) -> Result<MarketData, FeedError> {
    Ok(MarketData::Ticker(Ticker {
        // bookTicker carries no event time; stamp on receipt.
        timestamp_ms: time_util::now_ms(),
        bid: f64_field(data, "b")?,
        bid_size: f64_field(data, "B")?,
        ask: f64_field(data, "a")?,
        ask_size: f64_field(data, "A")?,
        last: None,
        volume: None,
    }))
}

fn parse_trade(data: &Value) -> Result<MarketData, FeedError> {
    Ok(MarketData::Trade(Trade {
        timestamp_ms: u64_field(data, "T")?,
        trade_id: u64_field(data, "t")?.to_string(),
        price: f64_field(data, "p")?,
        size: f64_field(data, "q")?,
        is_buyer_maker: bool_field(data, "m")?,
    }))
}

fn parse_kline(data: &Value) -> Result<MarketData, FeedError> {
    let k = data
        .get("k")
        .ok_or_else(|| FeedError::Decode("kline without k object".into()))?;
    Ok(MarketData::Candle(Candle {
        timestamp_ms: u64_field(k, "t")?,
        open: f64_field(k, "o")?,
        high: f64_field(k, "h")?,
        low: f64_field(k, "l")?,
        close: f64_field(k, "c")?,
        volume: f64_field(k, "v")?,
    }))
}

fn parse_depth_update(data: &Value) -> Result<MarketData, FeedError> {
    let first_id = u64_field(data, "U")?;
    Ok(MarketData::L2Update(L2Update {
        sequence_id: u64_field(data, "u")?,
        // The diff applies on top of the update immediately preceding its
        // first id; a book seeded at sequence U-1 is contiguous.
        prev_sequence_id: Some(first_id.saturating_sub(1)),
        timestamp_ms: u64_field(data, "E")?,
        bids: parse_levels(data.get("b"), time_util::now_ms())?,
        asks: parse_levels(data.get("a"), time_util::now_ms())?,
    }))
}

fn parse_partial_depth(data: &Value) -> Result<MarketData, FeedError> {
    let now = time_util::now_ms();
    Ok(MarketData::L2Snapshot(L2Snapshot {
        sequence_id: u64_field(data, "lastUpdateId")?,
        timestamp_ms: now,
        bids: parse_levels(data.get("bids"), now)?,
        asks: parse_levels(data.get("asks"), now)?,
    }))
}

/// Parse a `[["price","qty"], ...]` array. A missing key is an empty side.
fn parse_levels(v: Option<&Value>, timestamp_ms: u64) -> Result<Vec<BookLevel>, FeedError> {
    let Some(arr) = v.and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    arr.iter()
        .map(|pair| {
            let price = pair
                .get(0)
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| FeedError::Decode("bad level price".into()))?;
            let size = pair
                .get(1)
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| FeedError::Decode("bad level size".into()))?;
            Ok(BookLevel::new(price, size, timestamp_ms))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Field accessors
// ---------------------------------------------------------------------------

fn f64_field(v: &Value, key: &str) -> Result<f64, FeedError> {
    v.get(key)
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| FeedError::Decode(format!("missing or bad field {key}")))
}

fn u64_field(v: &Value, key: &str) -> Result<u64, FeedError> {
    v.get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| FeedError::Decode(format!("missing or bad field {key}")))
}

fn bool_field(v: &Value, key: &str) -> Result<bool, FeedError> {
    v.get(key)
        .and_then(Value::as_bool)
        .ok_or_else(|| FeedError::Decode(format!("missing or bad field {key}")))
}

// ---------------------------------------------------------------------------
// REST depth snapshot
// ---------------------------------------------------------------------------

/// Fetch the full depth seed snapshot for `market` over REST.
///
/// Retries transient failures with exponential backoff, up to
/// `SNAPSHOT_RETRIES` attempts; the caller decides when to re-seed (on a
/// sequence gap), so this helper never loops forever.
pub async fn fetch_depth_snapshot(market: &Market, limit: u32) -> Result<L2Snapshot, FeedError> {
    let url = format!(
        "{BINANCE_REST_URL}/api/v3/depth?symbol={}&limit={limit}",
        market.id
    );
    let mut delay = Duration::from_millis(250);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match try_fetch_snapshot(&url).await {
            Ok(snapshot) => return Ok(snapshot),
            Err(err) => {
                if attempt >= SNAPSHOT_RETRIES {
                    return Err(err);
                }
                warn!("[binance] snapshot fetch failed ({err}), retrying in {delay:?}");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
    }
}

async fn try_fetch_snapshot(url: &str) -> Result<L2Snapshot, FeedError> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| FeedError::Snapshot(e.to_string()))?;
    if !response.status().is_success() {
        return Err(FeedError::Snapshot(format!(
            "depth request returned {}",
            response.status()
        )));
    }
    let body: Value = response
        .json()
        .await
        .map_err(|e| FeedError::Snapshot(e.to_string()))?;

    let now = time_util::now_ms();
    Ok(L2Snapshot {
        sequence_id: u64_field(&body, "lastUpdateId")
            .map_err(|e| FeedError::Snapshot(e.to_string()))?,
        timestamp_ms: now,
        bids: parse_levels(body.get("bids"), now).map_err(|e| FeedError::Snapshot(e.to_string()))?,
        asks: parse_levels(body.get("asks"), now).map_err(|e| FeedError::Snapshot(e.to_string()))?,
    })
}
