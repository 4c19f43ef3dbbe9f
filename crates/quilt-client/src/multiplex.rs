//! One-connection-per-market multiplexing manager.
//!
//! Some venues cap subscriptions per connection (or outright require one
//! connection per market). [`MultiFeedClient`] presents the same
//! subscribe/unsubscribe surface as a single [`FeedClient`] but maps each
//! market to its own dedicated child client, created lazily. All child
//! connection establishment — initial dials and reconnects alike — passes
//! through one [`ConnectGate`], so at most `max_connecting` children dial
//! at once and fresh connections are spaced by `creation_delay`.
//!
//! Child events are re-emitted as [`MuxEvent`]s with the owning market
//! attached, so consumers can disambiguate lifecycle transitions across
//! the pool.

use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use quilt_core::error::FeedError;
use quilt_core::types::{Channel, Market};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::adapter::VenueAdapter;
use crate::client::{ClientEvent, ClientOptions, FeedClient};
use crate::transport::gate::{ConnectGate, GatedTransport};
use crate::transport::Transport;

/// Builds the adapter + transport pair for one market's dedicated client.
///
/// A factory failure is isolated to that market: it surfaces as an `Error`
/// event tagged with the market and other markets are unaffected.
pub trait ChildFactory: Send + 'static {
    fn create(
        &self,
        market: &Market,
    ) -> Result<(Box<dyn VenueAdapter>, Box<dyn Transport>), FeedError>;
}

/// A child event re-emitted with the owning market attached.
#[derive(Debug)]
pub struct MuxEvent {
    pub market: Market,
    pub event: ClientEvent,
}

/// Tuning knobs for a [`MultiFeedClient`].
#[derive(Debug, Clone)]
pub struct MuxOptions {
    /// Maximum number of concurrently establishing child connections.
    pub max_connecting: usize,
    /// How long a fresh connection's creation slot is held after it
    /// connects, spacing out connection storms.
    pub creation_delay: Duration,
    /// Options applied to every child client.
    pub client: ClientOptions,
}

impl Default for MuxOptions {
    fn default() -> Self {
        Self {
            max_connecting: 3,
            creation_delay: Duration::from_millis(250),
            client: ClientOptions::default(),
        }
    }
}

struct ChildEntry {
    client: FeedClient,
    /// Channels with a live subscription, by `Channel::index`. When the
    /// last one goes, the child is closed and dropped.
    active: [bool; Channel::COUNT],
}

/// Fans one logical subscription surface out across a pool of per-market
/// child clients.
///
/// The registry is mutated only here, synchronously at the point of
/// decision — a pending child is registered before any await yields, so
/// concurrent subscribes for the same market can never create two children.
pub struct MultiFeedClient<F: ChildFactory> {
    factory: F,
    gate: ConnectGate,
    options: MuxOptions,
    children: AHashMap<String, ChildEntry>,
    event_tx: mpsc::UnboundedSender<MuxEvent>,
}

impl<F: ChildFactory> MultiFeedClient<F> {
    /// Build the manager; re-emitted child events arrive on the returned
    /// receiver.
    pub fn new(factory: F, options: MuxOptions) -> (Self, mpsc::UnboundedReceiver<MuxEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let gate = ConnectGate::new(options.max_connecting, options.creation_delay);
        (
            Self {
                factory,
                gate,
                options,
                children: AHashMap::new(),
                event_tx,
            },
            event_rx,
        )
    }

    /// Subscribe `market` to `channel` on its dedicated child client,
    /// creating and registering the child first if this market is new.
    /// Returns whether a new subscription was created.
    pub async fn subscribe(&mut self, channel: Channel, market: &Market) -> bool {
        if !self.children.contains_key(&market.id) && !self.register_child(market) {
            return false;
        }
        let Some(entry) = self.children.get_mut(&market.id) else {
            return false;
        };
        let created = entry.client.subscribe(channel, market).await;
        if created {
            entry.active[channel.index()] = true;
        }
        created
    }

    /// Unsubscribe `market` from `channel`. When the child's last active
    /// channel is removed, the child is closed and dropped from the
    /// registry.
    pub async fn unsubscribe(&mut self, channel: Channel, market: &Market) {
        let Some(entry) = self.children.get_mut(&market.id) else {
            return;
        };
        entry.client.unsubscribe(channel, market);
        entry.active[channel.index()] = false;
        if !entry.active.iter().any(|active| *active) {
            debug!("[mux] no live channels left for {}, closing child", market.id);
            if let Some(entry) = self.children.remove(&market.id) {
                entry.client.close().await;
            }
        }
    }

    /// Force-reconnect every child. Replacement connections pass through
    /// the creation gate like any other.
    pub fn reconnect(&self) {
        for entry in self.children.values() {
            entry.client.reconnect();
        }
    }

    /// Close and drop every child.
    pub async fn close(&mut self) {
        for (_, entry) in self.children.drain() {
            entry.client.close().await;
        }
    }

    /// Number of live child clients.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Construct a child and register it. Synchronous: the entry is in the
    /// map before control can yield.
    fn register_child(&mut self, market: &Market) -> bool {
        let (adapter, transport) = match self.factory.create(market) {
            Ok(parts) => parts,
            Err(err) => {
                warn!("[mux] child construction failed for {}: {err}", market.id);
                let _ = self.event_tx.send(MuxEvent {
                    market: market.clone(),
                    event: ClientEvent::Error {
                        err,
                        market: Some(market.clone()),
                    },
                });
                return false;
            }
        };

        let gated = GatedTransport::new(Arc::from(transport), self.gate.clone());
        let (client, child_rx) =
            FeedClient::new(adapter, Box::new(gated), self.options.client.clone());
        tokio::spawn(forward_events(
            market.clone(),
            child_rx,
            self.event_tx.clone(),
        ));
        self.children.insert(
            market.id.clone(),
            ChildEntry {
                client,
                active: [false; Channel::COUNT],
            },
        );
        debug!("[mux] registered child for {}", market.id);
        true
    }
}

/// Pass-through listener: tags every child event with the owning market.
async fn forward_events(
    market: Market,
    mut child_rx: mpsc::UnboundedReceiver<ClientEvent>,
    event_tx: mpsc::UnboundedSender<MuxEvent>,
) {
    while let Some(event) = child_rx.recv().await {
        let tagged = MuxEvent {
            market: market.clone(),
            event,
        };
        if event_tx.send(tagged).is_err() {
            return;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{market, wait_until, AutoTransport, MockTransport, TestAdapter};

    /// Factory that refuses markets whose id starts with `BAD`.
    struct PickyFactory {
        transport: MockTransport,
    }

    impl ChildFactory for PickyFactory {
        fn create(
            &self,
            market: &Market,
        ) -> Result<(Box<dyn VenueAdapter>, Box<dyn Transport>), FeedError> {
            if market.id.starts_with("BAD") {
                return Err(FeedError::Subscribe(format!(
                    "no such market: {}",
                    market.id
                )));
            }
            Ok((Box::new(TestAdapter::new()), Box::new(self.transport.clone())))
        }
    }

    struct AutoFactory;

    impl ChildFactory for AutoFactory {
        fn create(
            &self,
            _market: &Market,
        ) -> Result<(Box<dyn VenueAdapter>, Box<dyn Transport>), FeedError> {
            Ok((Box::new(TestAdapter::new()), Box::new(AutoTransport)))
        }
    }

    fn options() -> MuxOptions {
        MuxOptions {
            creation_delay: Duration::from_millis(10),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn one_failing_market_does_not_poison_the_rest() {
        let transport = MockTransport::new();
        let (mut mux, mut events) =
            MultiFeedClient::new(PickyFactory { transport: transport.clone() }, options());

        assert!(!mux.subscribe(Channel::Trade, &market("BAD-1")).await);
        let MuxEvent { market: tagged, event } = events.recv().await.unwrap();
        assert_eq!(tagged.id, "BAD-1");
        match event {
            ClientEvent::Error { market: Some(m), .. } => assert_eq!(m.id, "BAD-1"),
            other => panic!("expected tagged error, got {other:?}"),
        }

        // The failed market left no registry entry behind.
        assert_eq!(mux.child_count(), 0);

        assert!(mux.subscribe(Channel::Trade, &market("GOOD")).await);
        assert_eq!(mux.child_count(), 1);
        wait_until(|| transport.opens() == 1).await;
    }

    #[tokio::test(start_paused = true)]
    async fn one_child_per_market_is_reused() {
        let transport = MockTransport::new();
        let (mut mux, _events) =
            MultiFeedClient::new(PickyFactory { transport: transport.clone() }, options());

        let btc = market("BTCUSDT");
        assert!(mux.subscribe(Channel::Trade, &btc).await);
        assert!(mux.subscribe(Channel::Ticker, &btc).await);
        assert!(!mux.subscribe(Channel::Trade, &btc).await);

        assert_eq!(mux.child_count(), 1);
        wait_until(|| transport.opens() > 0).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(transport.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn last_unsubscribe_closes_and_drops_the_child() {
        let (mut mux, mut events) = MultiFeedClient::new(AutoFactory, options());

        let btc = market("BTCUSDT");
        mux.subscribe(Channel::Trade, &btc).await;
        mux.subscribe(Channel::Ticker, &btc).await;
        assert_eq!(mux.child_count(), 1);

        mux.unsubscribe(Channel::Trade, &btc).await;
        assert_eq!(mux.child_count(), 1);

        mux.unsubscribe(Channel::Ticker, &btc).await;
        assert_eq!(mux.child_count(), 0);

        // The forwarded stream ends with the child's close, tagged with the
        // owning market.
        let mut saw_closed = false;
        tokio::time::sleep(Duration::from_millis(5)).await;
        while let Ok(MuxEvent { market: m, event }) = events.try_recv() {
            assert_eq!(m.id, "BTCUSDT");
            if matches!(event, ClientEvent::Closed) {
                saw_closed = true;
            }
        }
        assert!(saw_closed);
    }

    #[tokio::test(start_paused = true)]
    async fn data_events_arrive_tagged_with_their_market() {
        let transport = MockTransport::new();
        let (mut mux, mut events) =
            MultiFeedClient::new(PickyFactory { transport: transport.clone() }, options());

        mux.subscribe(Channel::Trade, &market("AAA")).await;
        wait_until(|| transport.opens() == 1).await;
        let driver = transport.take_driver(0);
        driver.events.send(crate::transport::TransportEvent::Connected).unwrap();
        driver
            .events
            .send(crate::transport::TransportEvent::Message("trade:AAA:42.0".into()))
            .unwrap();

        loop {
            let MuxEvent { market: m, event } = events.recv().await.unwrap();
            assert_eq!(m.id, "AAA");
            if let ClientEvent::Data { market: dm, .. } = event {
                assert_eq!(dm.id, "AAA");
                break;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn close_tears_down_every_child() {
        let (mut mux, _events) = MultiFeedClient::new(AutoFactory, options());

        mux.subscribe(Channel::Trade, &market("AAA")).await;
        mux.subscribe(Channel::Trade, &market("BBB")).await;
        mux.subscribe(Channel::Trade, &market("CCC")).await;
        assert_eq!(mux.child_count(), 3);

        mux.close().await;
        assert_eq!(mux.child_count(), 0);
    }
}
