//! Transport contract: what the framework requires of a wire socket.
//!
//! The core never assumes a specific framing. A transport reports lifecycle
//! transitions and opaque message payloads over a channel; payloads are
//! handed untouched to the venue adapter's decoder.

pub mod gate;
pub mod ws;

use quilt_core::error::FeedError;
use tokio::sync::{mpsc, watch};

/// Lifecycle and data notifications reported by a transport connection.
#[derive(Debug)]
pub enum TransportEvent {
    Connecting,
    Connected,
    Disconnected,
    Closing,
    Closed,
    /// An opaque inbound payload; framing is the transport's business.
    Message(String),
    Error(FeedError),
}

/// A transport strategy: opens wire connections on demand.
///
/// `open` must not block. Implementations spawn their own I/O task and
/// report progress through the returned handle's event stream, beginning
/// with [`TransportEvent::Connecting`]. Retry and backoff while dialing are
/// the transport's own business; the client layer above only decides *when*
/// a whole connection is torn down and replaced.
pub trait Transport: Send + Sync + 'static {
    fn open(&self) -> Conn;
}

/// Handle to one connection attempt.
///
/// Dropping the handle abandons the attempt; the I/O task notices its
/// channels closing and exits.
pub struct Conn {
    outbound: mpsc::UnboundedSender<String>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    shutdown: watch::Sender<bool>,
}

/// The I/O-task side of a [`Conn`].
pub struct ConnDriver {
    /// Payloads queued by [`Conn::send`].
    pub outbound: mpsc::UnboundedReceiver<String>,
    /// Where the I/O task reports [`TransportEvent`]s.
    pub events: mpsc::UnboundedSender<TransportEvent>,
    /// Flips to `true` when [`Conn::close`] is called.
    pub shutdown: watch::Receiver<bool>,
}

impl Conn {
    /// Wire up a new connection handle; the transport keeps the driver end.
    pub fn pair() -> (Conn, ConnDriver) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        (
            Conn {
                outbound: outbound_tx,
                events: event_rx,
                shutdown: shutdown_tx,
            },
            ConnDriver {
                outbound: outbound_rx,
                events: event_tx,
                shutdown: shutdown_rx,
            },
        )
    }

    /// Queue a payload for sending. Fire-and-forget; returns `false` when
    /// the I/O task is already gone.
    pub fn send(&self, payload: String) -> bool {
        self.outbound.send(payload).is_ok()
    }

    /// The raw outbound queue, for callers that pace their own sends.
    pub fn sender(&self) -> mpsc::UnboundedSender<String> {
        self.outbound.clone()
    }

    /// Signal the I/O task to close the connection.
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
    }

    /// `true` while the I/O task is still alive.
    pub fn is_alive(&self) -> bool {
        !self.outbound.is_closed()
    }

    /// Next transport event, or `None` once the I/O task has exited.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }
}
