//! Shared test support: scripted transports and a minimal venue adapter.
//!
//! No network anywhere — [`MockTransport`] hands the driver side of each
//! opened connection to the test body, which plays the venue.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use quilt_core::error::FeedError;
use quilt_core::types::{Capabilities, Channel, Market, MarketData, Trade};

use crate::adapter::{Decoded, VenueAdapter};
use crate::transport::{Conn, ConnDriver, Transport, TransportEvent};

pub fn market(id: &str) -> Market {
    Market::new(id, "BASE", "QUOTE")
}

/// Spin until `cond` holds, advancing paused time in 1ms steps.
pub async fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached in time");
}

// ---------------------------------------------------------------------------
// MockTransport — hand-driven connections
// ---------------------------------------------------------------------------

struct MockState {
    opens: AtomicUsize,
    drivers: Mutex<Vec<Option<ConnDriver>>>,
}

/// Transport whose connections are driven by hand from the test body.
#[derive(Clone)]
pub struct MockTransport(Arc<MockState>);

impl MockTransport {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Arc::new(MockState {
            opens: AtomicUsize::new(0),
            drivers: Mutex::new(Vec::new()),
        }))
    }

    /// How many connections have been opened so far.
    pub fn opens(&self) -> usize {
        self.0.opens.load(Ordering::SeqCst)
    }

    /// Take ownership of the driver side of the `idx`-th opened connection.
    pub fn take_driver(&self, idx: usize) -> ConnDriver {
        self.0.drivers.lock().unwrap()[idx]
            .take()
            .expect("driver already taken")
    }
}

impl Transport for MockTransport {
    fn open(&self) -> Conn {
        let (conn, driver) = Conn::pair();
        self.0.opens.fetch_add(1, Ordering::SeqCst);
        self.0.drivers.lock().unwrap().push(Some(driver));
        conn
    }
}

// ---------------------------------------------------------------------------
// AutoTransport — connects instantly, acknowledges closes
// ---------------------------------------------------------------------------

/// Transport that reports `Connected` immediately and answers a close with
/// `Closing`/`Closed`, for tests that don't drive the wire by hand.
#[derive(Clone, Default)]
pub struct AutoTransport;

impl Transport for AutoTransport {
    fn open(&self) -> Conn {
        let (conn, driver) = Conn::pair();
        let _ = driver.events.send(TransportEvent::Connecting);
        let _ = driver.events.send(TransportEvent::Connected);
        tokio::spawn(async move {
            let mut shutdown = driver.shutdown;
            if shutdown.changed().await.is_ok() {
                let _ = driver.events.send(TransportEvent::Closing);
                let _ = driver.events.send(TransportEvent::Closed);
            }
        });
        conn
    }
}

// ---------------------------------------------------------------------------
// TestAdapter
// ---------------------------------------------------------------------------

/// Minimal adapter: requests look like `sub|<channel>|<id>`, payloads like
/// `trade:<id>:<price>`, and the literal payload `bad` fails to decode.
pub struct TestAdapter {
    caps: Capabilities,
}

impl TestAdapter {
    pub fn new() -> Self {
        Self { caps: Capabilities::all() }
    }

    pub fn trades_only() -> Self {
        Self {
            caps: Capabilities { trades: true, ..Default::default() },
        }
    }
}

#[async_trait]
impl VenueAdapter for TestAdapter {
    fn name(&self) -> &str {
        "test"
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn subscribe_request(&mut self, channel: Channel, market: &Market) -> Option<String> {
        Some(format!("sub|{channel}|{}", market.id))
    }

    fn unsubscribe_request(&mut self, channel: Channel, market: &Market) -> Option<String> {
        Some(format!("unsub|{channel}|{}", market.id))
    }

    fn decode(&mut self, raw: &str) -> Result<Vec<Decoded>, FeedError> {
        if raw == "bad" {
            return Err(FeedError::Decode("unparseable payload".into()));
        }
        let Some(rest) = raw.strip_prefix("trade:") else {
            return Ok(Vec::new());
        };
        let (id, price) = rest
            .split_once(':')
            .ok_or_else(|| FeedError::Decode("missing price".into()))?;
        let price: f64 = price
            .parse()
            .map_err(|_| FeedError::Decode("bad price".into()))?;
        Ok(vec![(
            id.to_string(),
            MarketData::Trade(Trade {
                timestamp_ms: 0,
                trade_id: "1".into(),
                price,
                size: 1.0,
                is_buyer_maker: false,
            }),
        )])
    }
}
