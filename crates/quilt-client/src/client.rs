//! Single-connection lifecycle and subscription manager.
//!
//! A [`FeedClient`] owns exactly one underlying transport connection and
//! one insertion-ordered subscription set per channel. Public operations go
//! through a command channel to a background actor task, so handlers for
//! one client never run concurrently; lifecycle and data events come back
//! on an event channel.
//!
//! The subscription sets are the single source of truth for "what should be
//! active": after every `Connected` transition the actor replays them —
//! channel by channel in [`Channel::ALL`] order, each set in insertion
//! order — and nothing is ever re-derived from the wire.

use std::time::Duration;

use indexmap::IndexMap;
use quilt_core::error::FeedError;
use quilt_core::flow::Throttle;
use quilt_core::types::{Capabilities, Channel, Market, MarketData};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::adapter::VenueAdapter;
use crate::transport::{Conn, Transport, TransportEvent};
use crate::watchdog::Watchdog;

// ---------------------------------------------------------------------------
// Options & events
// ---------------------------------------------------------------------------

/// How `reconnect()` replaces the underlying connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectPolicy {
    /// Close the current connection and wait for its `Closed` transition
    /// before opening the replacement.
    #[default]
    AwaitClosed,
    /// Close the current connection and open the replacement immediately,
    /// discarding whatever the old one still reports.
    Immediate,
}

/// Tuning knobs for a [`FeedClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Watchdog silence interval. The watchdog arms on every `Connected`
    /// transition and forces a reconnect after this long without data.
    pub watchdog_interval: Duration,
    pub reconnect_policy: ReconnectPolicy,
    /// When set, wire subscribe/unsubscribe sends drain through a
    /// [`Throttle`] at this rate instead of going out back-to-back —
    /// venues disconnect clients that subscribe too fast.
    pub subscribe_throttle: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            watchdog_interval: Duration::from_secs(90),
            reconnect_policy: ReconnectPolicy::default(),
            subscribe_throttle: None,
        }
    }
}

/// Lifecycle and data events emitted by a client.
///
/// Data events carry the originating [`Market`] so multiplexed consumers
/// can disambiguate.
#[derive(Debug)]
pub enum ClientEvent {
    Connecting,
    Connected,
    Disconnected,
    Reconnecting,
    Closing,
    Closed,
    Error {
        err: FeedError,
        market: Option<Market>,
    },
    Data {
        market: Market,
        data: MarketData,
    },
}

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Absent,
    Connecting,
    Connected,
    Disconnected,
    Closing,
    Closed,
}

enum Command {
    Subscribe {
        channel: Channel,
        market: Market,
        done: oneshot::Sender<bool>,
    },
    Unsubscribe {
        channel: Channel,
        market: Market,
    },
    Reconnect,
    Close {
        done: oneshot::Sender<()>,
    },
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle to a running client actor. Cheap to clone; the actor exits once
/// every handle is dropped.
pub struct FeedClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    capabilities: Capabilities,
}

impl Clone for FeedClient {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            capabilities: self.capabilities,
        }
    }
}

impl FeedClient {
    /// Spawn the actor; events arrive on the returned receiver.
    pub fn new(
        adapter: Box<dyn VenueAdapter>,
        transport: Box<dyn Transport>,
        options: ClientOptions,
    ) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let capabilities = adapter.capabilities();
        let watchdog = Watchdog::new(options.watchdog_interval);

        let actor = ClientActor {
            adapter,
            transport,
            options,
            subs: std::array::from_fn(|_| IndexMap::new()),
            conn: None,
            state: ConnState::Absent,
            watchdog,
            send_throttle: None,
            reopen_on_closed: false,
            event_tx,
        };
        tokio::spawn(actor.run(cmd_rx));

        (Self { cmd_tx, capabilities }, event_rx)
    }

    /// Capability flags declared by the venue adapter.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Subscribe `market` to `channel`.
    ///
    /// Ensures a connection exists (idempotently — N calls create one
    /// transport handle). Returns `true` when a new subscription was
    /// created; `false` for duplicates and for channels the venue does not
    /// support.
    pub async fn subscribe(&self, channel: Channel, market: &Market) -> bool {
        if !self.capabilities.supports(channel) {
            return false;
        }
        let (done, rx) = oneshot::channel();
        let cmd = Command::Subscribe {
            channel,
            market: market.clone(),
            done,
        };
        if self.cmd_tx.send(cmd).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Unsubscribe `market` from `channel`. No-op when not subscribed or
    /// when the venue does not support the channel.
    pub fn unsubscribe(&self, channel: Channel, market: &Market) {
        if !self.capabilities.supports(channel) {
            return;
        }
        let _ = self.cmd_tx.send(Command::Unsubscribe {
            channel,
            market: market.clone(),
        });
    }

    /// Force-replace the underlying connection per the configured
    /// [`ReconnectPolicy`]. Active subscriptions replay automatically once
    /// the replacement connects.
    pub fn reconnect(&self) {
        let _ = self.cmd_tx.send(Command::Reconnect);
    }

    /// Tear the connection down. Resolves once `Closing`/`Closed` have been
    /// emitted. Idempotent: a second close emits no further events.
    pub async fn close(&self) {
        let (done, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Close { done }).is_ok() {
            let _ = rx.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct ClientActor {
    adapter: Box<dyn VenueAdapter>,
    transport: Box<dyn Transport>,
    options: ClientOptions,
    /// One insertion-ordered set per channel, indexed by `Channel::index`.
    subs: [IndexMap<String, Market>; Channel::COUNT],
    conn: Option<Conn>,
    state: ConnState,
    watchdog: Watchdog,
    /// Pacer for wire sends on the current connection.
    send_throttle: Option<Throttle<String>>,
    /// An `AwaitClosed` reconnect is parked until the transport reports
    /// `Closed`.
    reopen_on_closed: bool,
    event_tx: mpsc::UnboundedSender<ClientEvent>,
}

impl ClientActor {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.on_command(cmd).await,
                    None => {
                        // Every handle dropped — tear down and exit.
                        self.do_close().await;
                        return;
                    }
                },
                ev = recv_conn(&mut self.conn) => match ev {
                    Some(ev) => self.on_transport_event(ev).await,
                    None => {
                        // The I/O task died without reporting Closed.
                        warn!("[{}] transport task ended unexpectedly", self.adapter.name());
                        self.drop_conn();
                        self.watchdog.stop();
                        self.state = ConnState::Absent;
                        self.emit(ClientEvent::Disconnected);
                    }
                },
                _ = self.watchdog.expired() => {
                    info!("[{}] watchdog: feed silent, forcing reconnect", self.adapter.name());
                    self.do_reconnect().await;
                }
            }
        }
    }

    async fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::Subscribe { channel, market, done } => {
                let created = self.do_subscribe(channel, market).await;
                let _ = done.send(created);
            }
            Command::Unsubscribe { channel, market } => self.do_unsubscribe(channel, &market),
            Command::Reconnect => self.do_reconnect().await,
            Command::Close { done } => {
                self.do_close().await;
                let _ = done.send(());
            }
        }
    }

    async fn do_subscribe(&mut self, channel: Channel, market: Market) -> bool {
        self.ensure_conn().await;

        let set = &mut self.subs[channel.index()];
        if set.contains_key(&market.id) {
            return false;
        }
        set.insert(market.id.clone(), market.clone());
        debug!(
            "[{}] subscribed {} to {channel}",
            self.adapter.name(),
            market.id
        );

        if self.state == ConnState::Connected {
            if let Some(request) = self.adapter.subscribe_request(channel, &market) {
                self.send(request);
            }
        }
        true
    }

    fn do_unsubscribe(&mut self, channel: Channel, market: &Market) {
        let set = &mut self.subs[channel.index()];
        if set.shift_remove(&market.id).is_none() {
            return;
        }
        debug!(
            "[{}] unsubscribed {} from {channel}",
            self.adapter.name(),
            market.id
        );

        if self.state == ConnState::Connected {
            if let Some(request) = self.adapter.unsubscribe_request(channel, market) {
                self.send(request);
            }
        }
    }

    /// Open the transport when absent. A second call while a handle exists
    /// is a no-op, which is what makes `subscribe` safe to call repeatedly
    /// without spawning duplicate sockets.
    async fn ensure_conn(&mut self) {
        if self.conn.is_some() {
            return;
        }
        if let Err(err) = self.adapter.before_connect().await {
            // Hook failures are surfaced but do not block the connection.
            self.emit_error(err, None);
        }
        self.state = ConnState::Connecting;
        let conn = self.transport.open();
        self.send_throttle = self.options.subscribe_throttle.map(|delay| {
            let sender = conn.sender();
            Throttle::new(
                move |payload: String| {
                    let _ = sender.send(payload);
                },
                delay,
            )
        });
        self.conn = Some(conn);
    }

    async fn do_reconnect(&mut self) {
        self.emit(ClientEvent::Reconnecting);
        match (&self.conn, self.options.reconnect_policy) {
            (None, _) => self.ensure_conn().await,
            (Some(conn), ReconnectPolicy::AwaitClosed) => {
                self.reopen_on_closed = true;
                conn.close();
            }
            (Some(_), ReconnectPolicy::Immediate) => {
                self.drop_conn();
                self.watchdog.stop();
                self.state = ConnState::Absent;
                self.ensure_conn().await;
            }
        }
    }

    async fn do_close(&mut self) {
        if self.state == ConnState::Absent && self.conn.is_none() {
            return;
        }
        self.adapter.before_close().await;
        self.watchdog.stop();
        self.reopen_on_closed = false;
        self.drop_conn();
        self.state = ConnState::Absent;
        self.emit(ClientEvent::Closing);
        self.emit(ClientEvent::Closed);
    }

    async fn on_transport_event(&mut self, ev: TransportEvent) {
        match ev {
            TransportEvent::Connecting => {
                self.state = ConnState::Connecting;
                self.emit(ClientEvent::Connecting);
            }
            TransportEvent::Connected => {
                self.state = ConnState::Connected;
                self.emit(ClientEvent::Connected);
                self.resubscribe_all();
                self.watchdog.start();
            }
            TransportEvent::Disconnected => {
                self.watchdog.stop();
                self.state = ConnState::Disconnected;
                self.emit(ClientEvent::Disconnected);
            }
            TransportEvent::Closing => {
                self.watchdog.stop();
                self.state = ConnState::Closing;
                self.emit(ClientEvent::Closing);
            }
            TransportEvent::Closed => {
                self.state = ConnState::Closed;
                self.emit(ClientEvent::Closed);
                self.drop_conn();
                if self.reopen_on_closed {
                    self.reopen_on_closed = false;
                    self.state = ConnState::Absent;
                    self.ensure_conn().await;
                } else {
                    self.state = ConnState::Absent;
                }
            }
            TransportEvent::Message(raw) => self.on_message(&raw),
            TransportEvent::Error(err) => self.emit_error(err, None),
        }
    }

    /// Replay every active subscription after a `Connected` transition.
    fn resubscribe_all(&mut self) {
        let mut pending = Vec::new();
        for channel in Channel::ALL {
            for market in self.subs[channel.index()].values() {
                pending.push((channel, market.clone()));
            }
        }
        for (channel, market) in pending {
            if let Some(request) = self.adapter.subscribe_request(channel, &market) {
                self.send(request);
            }
        }
        if !self.subs.iter().all(|s| s.is_empty()) {
            info!("[{}] resubscribed active markets", self.adapter.name());
        }
    }

    /// Decode one inbound payload inside a failure boundary: a decode error
    /// becomes an `Error` event, never a crash, and the connection stays
    /// open.
    fn on_message(&mut self, raw: &str) {
        match self.adapter.decode(raw) {
            Ok(records) => {
                for (remote_id, data) in records {
                    let channel = data.channel();
                    let Some(market) = self.subs[channel.index()].get(&remote_id).cloned() else {
                        debug!(
                            "[{}] dropping {channel} record for unknown id {remote_id}",
                            self.adapter.name()
                        );
                        continue;
                    };
                    self.watchdog.mark_alive();
                    self.emit(ClientEvent::Data { market, data });
                }
            }
            Err(err) => self.emit_error(err, None),
        }
    }

    fn send(&self, payload: String) {
        match (&self.send_throttle, &self.conn) {
            (Some(throttle), _) => throttle.call(payload),
            (None, Some(conn)) => {
                if !conn.send(payload) {
                    warn!("[{}] dropped send: transport gone", self.adapter.name());
                }
            }
            (None, None) => {}
        }
    }

    fn drop_conn(&mut self) {
        if let Some(throttle) = self.send_throttle.take() {
            throttle.cancel();
        }
        if let Some(conn) = self.conn.take() {
            conn.close();
        }
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.event_tx.send(event);
    }

    fn emit_error(&self, err: FeedError, market: Option<Market>) {
        warn!("[{}] {err}", self.adapter.name());
        self.emit(ClientEvent::Error { err, market });
    }
}

async fn recv_conn(conn: &mut Option<Conn>) -> Option<TransportEvent> {
    match conn {
        Some(c) => c.recv().await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{market, wait_until, MockTransport, TestAdapter};
    use quilt_core::types::Trade;

    fn trade_payload(remote_id: &str) -> String {
        format!("trade:{remote_id}:100.0")
    }

    async fn drain(events: &mut mpsc::UnboundedReceiver<ClientEvent>) -> Vec<String> {
        let mut out = Vec::new();
        tokio::time::sleep(Duration::from_millis(1)).await;
        while let Ok(ev) = events.try_recv() {
            out.push(label(&ev));
        }
        out
    }

    fn label(ev: &ClientEvent) -> String {
        match ev {
            ClientEvent::Connecting => "connecting".into(),
            ClientEvent::Connected => "connected".into(),
            ClientEvent::Disconnected => "disconnected".into(),
            ClientEvent::Reconnecting => "reconnecting".into(),
            ClientEvent::Closing => "closing".into(),
            ClientEvent::Closed => "closed".into(),
            ClientEvent::Error { .. } => "error".into(),
            ClientEvent::Data { market, .. } => format!("data:{}", market.id),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_subscribes_open_one_transport() {
        let transport = MockTransport::new();
        let probe = transport.clone();
        let (client, _events) = FeedClient::new(
            Box::new(TestAdapter::new()),
            Box::new(transport),
            ClientOptions::default(),
        );

        let btc = market("BTCUSDT");
        assert!(client.subscribe(Channel::Trade, &btc).await);
        assert!(!client.subscribe(Channel::Trade, &btc).await);
        assert!(client.subscribe(Channel::Ticker, &btc).await);
        client.subscribe(Channel::Trade, &market("ETHUSDT")).await;

        assert_eq!(probe.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_subscribe_sends_one_wire_request() {
        let transport = MockTransport::new();
        let probe = transport.clone();
        let (client, _events) = FeedClient::new(
            Box::new(TestAdapter::new()),
            Box::new(transport),
            ClientOptions::default(),
        );

        let btc = market("BTCUSDT");
        client.subscribe(Channel::Trade, &btc).await;
        let mut driver = probe.take_driver(0);
        driver.events.send(TransportEvent::Connected).unwrap();

        assert_eq!(driver.outbound.recv().await.unwrap(), "sub|trade|BTCUSDT");

        // Second subscribe is a no-op: no duplicate send.
        assert!(!client.subscribe(Channel::Trade, &btc).await);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(driver.outbound.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_replays_in_insertion_order() {
        let transport = MockTransport::new();
        let probe = transport.clone();
        let (client, _events) = FeedClient::new(
            Box::new(TestAdapter::new()),
            Box::new(transport),
            ClientOptions::default(),
        );

        client.subscribe(Channel::Trade, &market("AAA")).await;
        client.subscribe(Channel::Trade, &market("BBB")).await;

        let mut driver = probe.take_driver(0);
        driver.events.send(TransportEvent::Connected).unwrap();
        assert_eq!(driver.outbound.recv().await.unwrap(), "sub|trade|AAA");
        assert_eq!(driver.outbound.recv().await.unwrap(), "sub|trade|BBB");

        // Force a reconnect; the old transport acknowledges the close.
        client.reconnect();
        driver.shutdown.changed().await.unwrap();
        driver.events.send(TransportEvent::Closing).unwrap();
        driver.events.send(TransportEvent::Closed).unwrap();

        wait_until(|| probe.opens() == 2).await;
        let mut replacement = probe.take_driver(1);
        replacement.events.send(TransportEvent::Connected).unwrap();

        assert_eq!(replacement.outbound.recv().await.unwrap(), "sub|trade|AAA");
        assert_eq!(replacement.outbound.recv().await.unwrap(), "sub|trade|BBB");
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(replacement.outbound.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn replay_walks_channels_in_fixed_order() {
        let transport = MockTransport::new();
        let probe = transport.clone();
        let (client, _events) = FeedClient::new(
            Box::new(TestAdapter::new()),
            Box::new(transport),
            ClientOptions::default(),
        );

        // Subscribed out of channel order on purpose.
        client.subscribe(Channel::Candle, &market("AAA")).await;
        client.subscribe(Channel::Ticker, &market("AAA")).await;
        client.subscribe(Channel::Trade, &market("BBB")).await;

        let mut driver = probe.take_driver(0);
        driver.events.send(TransportEvent::Connected).unwrap();

        assert_eq!(driver.outbound.recv().await.unwrap(), "sub|ticker|AAA");
        assert_eq!(driver.outbound.recv().await.unwrap(), "sub|trade|BBB");
        assert_eq!(driver.outbound.recv().await.unwrap(), "sub|candle|AAA");
    }

    #[tokio::test(start_paused = true)]
    async fn unsubscribe_unknown_market_is_a_no_op() {
        let transport = MockTransport::new();
        let probe = transport.clone();
        let (client, _events) = FeedClient::new(
            Box::new(TestAdapter::new()),
            Box::new(transport),
            ClientOptions::default(),
        );

        client.subscribe(Channel::Trade, &market("AAA")).await;
        let mut driver = probe.take_driver(0);
        driver.events.send(TransportEvent::Connected).unwrap();
        assert_eq!(driver.outbound.recv().await.unwrap(), "sub|trade|AAA");

        client.unsubscribe(Channel::Trade, &market("NEVER"));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(driver.outbound.try_recv().is_err());

        // A real unsubscribe still goes out.
        client.unsubscribe(Channel::Trade, &market("AAA"));
        assert_eq!(driver.outbound.recv().await.unwrap(), "unsub|trade|AAA");
    }

    #[tokio::test(start_paused = true)]
    async fn close_is_idempotent() {
        let transport = MockTransport::new();
        let (client, mut events) = FeedClient::new(
            Box::new(TestAdapter::new()),
            Box::new(transport),
            ClientOptions::default(),
        );

        client.subscribe(Channel::Trade, &market("AAA")).await;
        client.close().await;
        let seen = drain(&mut events).await;
        assert_eq!(seen, vec!["closing", "closed"]);

        client.close().await;
        assert!(drain(&mut events).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_forces_exactly_one_reconnect() {
        let transport = MockTransport::new();
        let probe = transport.clone();
        let options = ClientOptions {
            watchdog_interval: Duration::from_secs(5),
            ..Default::default()
        };
        let (client, _events) =
            FeedClient::new(Box::new(TestAdapter::new()), Box::new(transport), options);

        client.subscribe(Channel::Trade, &market("AAA")).await;
        let driver = probe.take_driver(0);
        driver.events.send(TransportEvent::Connected).unwrap();

        // Silence. The watchdog fires once and closes the connection.
        let mut shutdown = driver.shutdown.clone();
        tokio::time::timeout(Duration::from_secs(6), shutdown.changed())
            .await
            .expect("watchdog did not force a reconnect")
            .unwrap();

        // It disarmed itself: no second firing while the old transport
        // lingers un-closed.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(probe.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn data_events_feed_the_watchdog() {
        let transport = MockTransport::new();
        let probe = transport.clone();
        let options = ClientOptions {
            watchdog_interval: Duration::from_secs(5),
            ..Default::default()
        };
        let (client, mut events) =
            FeedClient::new(Box::new(TestAdapter::new()), Box::new(transport), options);

        client.subscribe(Channel::Trade, &market("AAA")).await;
        let driver = probe.take_driver(0);
        driver.events.send(TransportEvent::Connected).unwrap();

        // Keep the feed alive for several intervals.
        for _ in 0..8 {
            tokio::time::sleep(Duration::from_secs(3)).await;
            driver
                .events
                .send(TransportEvent::Message(trade_payload("AAA")))
                .unwrap();
        }
        let mut shutdown = driver.shutdown.clone();
        assert!(
            tokio::time::timeout(Duration::from_secs(1), shutdown.changed())
                .await
                .is_err(),
            "watchdog reconnected a live feed"
        );

        // Sanity: the data actually came through.
        let seen = drain(&mut events).await;
        assert_eq!(seen.iter().filter(|l| *l == "data:AAA").count(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn decode_errors_surface_without_dropping_the_connection() {
        let transport = MockTransport::new();
        let probe = transport.clone();
        let (client, mut events) = FeedClient::new(
            Box::new(TestAdapter::new()),
            Box::new(transport),
            ClientOptions::default(),
        );

        client.subscribe(Channel::Trade, &market("AAA")).await;
        let driver = probe.take_driver(0);
        driver.events.send(TransportEvent::Connected).unwrap();

        driver
            .events
            .send(TransportEvent::Message("bad".into()))
            .unwrap();
        driver
            .events
            .send(TransportEvent::Message(trade_payload("AAA")))
            .unwrap();

        let seen = drain(&mut events).await;
        assert_eq!(seen, vec!["connected", "error", "data:AAA"]);
        assert_eq!(probe.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn records_for_unsubscribed_markets_are_dropped() {
        let transport = MockTransport::new();
        let probe = transport.clone();
        let (client, mut events) = FeedClient::new(
            Box::new(TestAdapter::new()),
            Box::new(transport),
            ClientOptions::default(),
        );

        client.subscribe(Channel::Trade, &market("AAA")).await;
        let driver = probe.take_driver(0);
        driver.events.send(TransportEvent::Connected).unwrap();
        driver
            .events
            .send(TransportEvent::Message(trade_payload("GHOST")))
            .unwrap();

        let seen = drain(&mut events).await;
        assert!(!seen.iter().any(|l| l.starts_with("data:")));
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_channel_is_a_capability_no_op() {
        let transport = MockTransport::new();
        let probe = transport.clone();
        let adapter = TestAdapter::trades_only();
        let (client, _events) =
            FeedClient::new(Box::new(adapter), Box::new(transport), ClientOptions::default());

        assert!(!client.subscribe(Channel::Ticker, &market("AAA")).await);
        // Gated before the actor: not even a transport was opened.
        assert_eq!(probe.opens(), 0);

        assert!(client.subscribe(Channel::Trade, &market("AAA")).await);
        assert_eq!(probe.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_policy_reopens_without_waiting_for_closed() {
        let transport = MockTransport::new();
        let probe = transport.clone();
        let options = ClientOptions {
            reconnect_policy: ReconnectPolicy::Immediate,
            ..Default::default()
        };
        let (client, _events) =
            FeedClient::new(Box::new(TestAdapter::new()), Box::new(transport), options);

        client.subscribe(Channel::Trade, &market("AAA")).await;
        let driver = probe.take_driver(0);
        driver.events.send(TransportEvent::Connected).unwrap();

        client.reconnect();
        // The replacement opens with no Closed handshake from the old conn.
        wait_until(|| probe.opens() == 2).await;

        let mut replacement = probe.take_driver(1);
        replacement.events.send(TransportEvent::Connected).unwrap();
        assert_eq!(replacement.outbound.recv().await.unwrap(), "sub|trade|AAA");
    }

    #[tokio::test(start_paused = true)]
    async fn subscribe_throttle_paces_wire_sends() {
        let transport = MockTransport::new();
        let probe = transport.clone();
        let options = ClientOptions {
            subscribe_throttle: Some(Duration::from_millis(100)),
            ..Default::default()
        };
        let (client, _events) =
            FeedClient::new(Box::new(TestAdapter::new()), Box::new(transport), options);

        client.subscribe(Channel::Trade, &market("AAA")).await;
        client.subscribe(Channel::Trade, &market("BBB")).await;

        let mut driver = probe.take_driver(0);
        driver.events.send(TransportEvent::Connected).unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(driver.outbound.try_recv().unwrap(), "sub|trade|AAA");
        assert!(driver.outbound.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(driver.outbound.try_recv().unwrap(), "sub|trade|BBB");
    }

    #[tokio::test(start_paused = true)]
    async fn subscribing_after_close_reconnects() {
        let transport = MockTransport::new();
        let probe = transport.clone();
        let (client, _events) = FeedClient::new(
            Box::new(TestAdapter::new()),
            Box::new(transport),
            ClientOptions::default(),
        );

        client.subscribe(Channel::Trade, &market("AAA")).await;
        client.close().await;
        assert_eq!(probe.opens(), 1);

        // The subscription sets survived the close; a new subscribe opens a
        // fresh transport and the old set replays alongside the new one.
        client.subscribe(Channel::Trade, &market("BBB")).await;
        assert_eq!(probe.opens(), 2);

        let mut driver = probe.take_driver(1);
        driver.events.send(TransportEvent::Connected).unwrap();
        assert_eq!(driver.outbound.recv().await.unwrap(), "sub|trade|AAA");
        assert_eq!(driver.outbound.recv().await.unwrap(), "sub|trade|BBB");
    }

    #[test]
    fn trade_payload_shape_matches_testkit_decoder() {
        let mut adapter = TestAdapter::new();
        let decoded = adapter.decode(&trade_payload("AAA")).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].0, "AAA");
        match &decoded[0].1 {
            MarketData::Trade(Trade { price, .. }) => assert_eq!(*price, 100.0),
            other => panic!("unexpected record: {other:?}"),
        }
    }
}
