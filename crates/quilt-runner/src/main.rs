//! # quilt-runner
//!
//! Main entry point for the Quilt market-data gateway.
//!
//! Loads a JSON configuration file, builds one client per configured feed
//! (single-connection or multiplexed), subscribes the configured markets,
//! and logs every normalized event until Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! quilt-runner config.json --log-level info
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use quilt_client::transport::ws::{WsConfig, WsTransport};
use quilt_client::venues::binance::{BinanceAdapter, BINANCE_WS_URL};
use quilt_client::{
    ChildFactory, ClientEvent, ClientOptions, FeedClient, MultiFeedClient, MuxEvent, MuxOptions,
    ReconnectPolicy, Transport, VenueAdapter,
};
use quilt_core::config::FeedConfig;
use quilt_core::error::FeedError;
use quilt_core::types::{Market, MarketData};
use tracing::{debug, info, warn};

/// Quilt Market Data Gateway Runner.
#[derive(Parser)]
#[command(name = "quilt-runner", about = "Quilt Market Data Gateway Runner")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,
}

/// One running feed, closed on shutdown.
enum FeedHandle {
    Single(FeedClient),
    Multi(MultiFeedClient<BinanceChildFactory>),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = quilt_core::config::load_config(&cli.config)?;

    // 2. Initialize logging — CLI flags win over the config's meta block
    let meta = config.meta.as_ref();
    let log_dir = cli
        .log_dir
        .clone()
        .or_else(|| meta.and_then(|m| m.log_path.clone()));
    let module_name = meta
        .and_then(|m| m.module_name.as_deref())
        .unwrap_or("quilt-runner");
    quilt_core::logging::init_logging(&cli.log_level, log_dir.as_deref(), module_name);

    info!(
        "quilt-runner starting — config={}, log_level={}",
        cli.config.display(),
        cli.log_level,
    );
    info!("config loaded — {} feed(s)", config.feeds.len());

    // 3. Build and subscribe each feed
    let mut feeds: Vec<FeedHandle> = Vec::new();
    for (idx, feed) in config.feeds.iter().enumerate() {
        match start_feed(feed).await {
            Ok(handle) => {
                info!("feed[{idx}]: started (venue={})", feed.venue);
                feeds.push(handle);
            }
            Err(e) => {
                warn!("feed[{idx}]: failed to start '{}': {e}", feed.venue);
            }
        }
    }
    if feeds.is_empty() {
        bail!("no feeds started");
    }

    info!("all feeds running — press Ctrl+C to stop");

    // 4. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    // 5. Close all feeds gracefully
    for handle in &mut feeds {
        match handle {
            FeedHandle::Single(client) => client.close().await,
            FeedHandle::Multi(mux) => mux.close().await,
        }
    }

    info!("all feeds closed — goodbye");
    Ok(())
}

/// Build the client for one configured feed and subscribe its markets.
async fn start_feed(feed: &FeedConfig) -> Result<FeedHandle> {
    if feed.venue != "binance" {
        bail!("unknown venue: {}", feed.venue);
    }

    let options = ClientOptions {
        watchdog_interval: feed.effective_watchdog_interval(),
        reconnect_policy: parse_policy(feed.reconnect_policy.as_deref()),
        subscribe_throttle: Some(std::time::Duration::from_millis(250)),
    };

    if let Some(mux_config) = &feed.multiplex {
        let factory = BinanceChildFactory {
            candle_period: feed.effective_candle_period().to_string(),
            extra_headers: feed.extra_headers.clone().unwrap_or_default(),
        };
        let mux_options = MuxOptions {
            max_connecting: mux_config.effective_max_connecting(),
            creation_delay: mux_config.effective_creation_delay(),
            client: options,
        };
        let (mut mux, events) = MultiFeedClient::new(factory, mux_options);
        for market in &feed.markets {
            for channel in &feed.channels {
                mux.subscribe(*channel, market).await;
            }
        }
        tokio::spawn(log_mux_events(feed.venue.clone(), events));
        Ok(FeedHandle::Multi(mux))
    } else {
        let adapter = BinanceAdapter::with_candle_period(feed.effective_candle_period());
        let mut ws_config = BinanceAdapter::ws_config();
        ws_config.extra_headers = feed.extra_headers.clone().unwrap_or_default();
        let transport = WsTransport::new(ws_config);
        let (client, events) = FeedClient::new(Box::new(adapter), Box::new(transport), options);
        for market in &feed.markets {
            for channel in &feed.channels {
                client.subscribe(*channel, market).await;
            }
        }
        tokio::spawn(log_client_events(feed.venue.clone(), events));
        Ok(FeedHandle::Single(client))
    }
}

/// Per-market adapter + transport builder for multiplexed Binance feeds.
struct BinanceChildFactory {
    candle_period: String,
    extra_headers: HashMap<String, String>,
}

impl ChildFactory for BinanceChildFactory {
    fn create(
        &self,
        _market: &Market,
    ) -> Result<(Box<dyn VenueAdapter>, Box<dyn Transport>), FeedError> {
        let adapter = BinanceAdapter::with_candle_period(&self.candle_period);
        let mut ws_config = WsConfig::new(BINANCE_WS_URL);
        ws_config.extra_headers = self.extra_headers.clone();
        Ok((Box::new(adapter), Box::new(WsTransport::new(ws_config))))
    }
}

fn parse_policy(raw: Option<&str>) -> ReconnectPolicy {
    match raw {
        Some("immediate") => ReconnectPolicy::Immediate,
        Some("await_closed") | None => ReconnectPolicy::AwaitClosed,
        Some(other) => {
            warn!("unknown reconnect_policy '{other}', using await_closed");
            ReconnectPolicy::AwaitClosed
        }
    }
}

async fn log_client_events(
    venue: String,
    mut events: tokio::sync::mpsc::UnboundedReceiver<ClientEvent>,
) {
    while let Some(event) = events.recv().await {
        log_event(&venue, &event);
    }
}

async fn log_mux_events(venue: String, mut events: tokio::sync::mpsc::UnboundedReceiver<MuxEvent>) {
    while let Some(MuxEvent { market, event }) = events.recv().await {
        log_event(&format!("{venue}:{}", market.id), &event);
    }
}

fn log_event(label: &str, event: &ClientEvent) {
    match event {
        ClientEvent::Data { market, data } => match data {
            MarketData::Ticker(t) => info!("[{label}] {} {t}", market.id),
            MarketData::Trade(t) => info!("[{label}] {} {t}", market.id),
            MarketData::Candle(c) => info!("[{label}] {} {c}", market.id),
            MarketData::L2Snapshot(s) => debug!(
                "[{label}] {} L2Snapshot({} bids / {} asks, seq={})",
                market.id,
                s.bids.len(),
                s.asks.len(),
                s.sequence_id
            ),
            MarketData::L2Update(u) => debug!(
                "[{label}] {} L2Update({} bids / {} asks, seq={})",
                market.id,
                u.bids.len(),
                u.asks.len(),
                u.sequence_id
            ),
            MarketData::L3Snapshot(s) => debug!(
                "[{label}] {} L3Snapshot(seq={})",
                market.id, s.sequence_id
            ),
            MarketData::L3Update(u) => debug!("[{label}] {} L3Update(seq={})", market.id, u.sequence_id),
        },
        ClientEvent::Error { err, market } => match market {
            Some(m) => warn!("[{label}] error on {}: {err}", m.id),
            None => warn!("[{label}] error: {err}"),
        },
        lifecycle => info!("[{label}] {lifecycle:?}"),
    }
}
