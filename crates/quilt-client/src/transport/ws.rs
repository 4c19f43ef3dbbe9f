//! Default WebSocket transport over tokio-tungstenite.
//!
//! Each [`Transport::open`] call spawns a tokio task that:
//! 1. Connects to the venue WebSocket endpoint (TLS).
//! 2. Forwards inbound text frames as [`TransportEvent::Message`].
//! 3. Sends periodic ping messages (venue-specific format).
//! 4. Automatically redials on disconnection with exponential backoff,
//!    reporting every transition on the event stream.
//!
//! The client layer above decides when a connection is torn down for good;
//! this transport only owns the dial-retry loop.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use quilt_core::error::FeedError;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::{Conn, ConnDriver, Transport, TransportEvent};

/// Ping payload format — varies by venue.
#[derive(Debug, Clone)]
pub enum PingPayload {
    /// Send a text frame (e.g. venues that expect a literal `"ping"`).
    Text(String),
    /// Send a JSON object as text (e.g. `{"op":"ping"}`).
    Json(serde_json::Value),
    /// Use the standard WebSocket ping frame.
    WsPing,
}

/// Configuration for the WebSocket transport.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Full WebSocket URL (e.g. `wss://stream.example.com:443/ws`).
    pub url: String,
    /// Extra HTTP headers for the handshake.
    pub extra_headers: HashMap<String, String>,
    /// Interval between ping messages.
    pub ping_interval: Option<Duration>,
    /// Ping message format.
    pub ping_payload: Option<PingPayload>,
}

impl WsConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            extra_headers: HashMap::new(),
            ping_interval: None,
            ping_payload: None,
        }
    }
}

/// WebSocket transport; each `open()` runs one background I/O task.
pub struct WsTransport {
    config: WsConfig,
}

impl WsTransport {
    pub fn new(config: WsConfig) -> Self {
        Self { config }
    }
}

impl Transport for WsTransport {
    fn open(&self) -> Conn {
        let (conn, driver) = Conn::pair();
        let config = self.config.clone();
        tokio::spawn(io_loop(config, driver));
        conn
    }
}

/// Main connection loop — dials, reads, pings, redials.
async fn io_loop(config: WsConfig, mut driver: ConnDriver) {
    let mut backoff = Duration::from_millis(100);
    let max_backoff = Duration::from_secs(30);
    let emit = |ev: TransportEvent| {
        let _ = driver.events.send(ev);
    };

    loop {
        if *driver.shutdown.borrow() {
            emit(TransportEvent::Closed);
            return;
        }

        info!("[ws] connecting to {}", config.url);
        emit(TransportEvent::Connecting);

        let ws_stream = match dial(&config).await {
            Ok(s) => {
                backoff = Duration::from_millis(100); // reset backoff on success
                info!("[ws] connected");
                emit(TransportEvent::Connected);
                s
            }
            Err(e) => {
                error!("[ws] connection failed: {e}, retrying in {backoff:?}");
                emit(TransportEvent::Error(FeedError::Transport(e.to_string())));
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {},
                    _ = driver.shutdown.changed() => {
                        emit(TransportEvent::Closed);
                        return;
                    }
                }
                backoff = (backoff * 2).min(max_backoff);
                continue;
            }
        };

        let (mut ws_write, mut ws_read) = ws_stream.split();

        // Set up ping timer
        let ping_interval = config.ping_interval.map(tokio::time::interval);

        // Pin the interval for use in select!
        tokio::pin! {
            let ping_tick = async {
                if let Some(mut interval) = ping_interval {
                    interval.tick().await; // the first tick fires immediately
                    loop {
                        interval.tick().await;
                    }
                } else {
                    // No pinging — wait forever
                    std::future::pending::<()>().await
                }
            };
        }

        // Main read/write loop
        loop {
            tokio::select! {
                // Shutdown signal
                _ = driver.shutdown.changed() => {
                    info!("[ws] shutdown signal received");
                    emit(TransportEvent::Closing);
                    let _ = ws_write.close().await;
                    emit(TransportEvent::Closed);
                    return;
                }

                // Incoming frame
                msg = ws_read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            emit(TransportEvent::Message(text.to_string()));
                        }
                        Some(Ok(Message::Binary(data))) => {
                            debug!("[ws] ignoring {}-byte binary frame", data.len());
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = ws_write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            warn!("[ws] received close frame");
                            break;
                        }
                        Some(Err(e)) => {
                            error!("[ws] read error: {e}");
                            emit(TransportEvent::Error(FeedError::Transport(e.to_string())));
                            break;
                        }
                        None => {
                            warn!("[ws] stream ended");
                            break;
                        }
                        _ => {} // Pong, Frame — ignore
                    }
                }

                // Outbound payload from the client
                Some(payload) = driver.outbound.recv() => {
                    if let Err(e) = ws_write.send(Message::Text(payload.into())).await {
                        error!("[ws] send error: {e}");
                        emit(TransportEvent::Error(FeedError::Transport(e.to_string())));
                        break;
                    }
                }

                // Ping timer
                _ = &mut ping_tick => {
                    let ping_msg = match &config.ping_payload {
                        Some(PingPayload::Text(t)) => Message::Text(t.clone().into()),
                        Some(PingPayload::Json(j)) => Message::Text(j.to_string().into()),
                        Some(PingPayload::WsPing) | None => Message::Ping(vec![].into()),
                    };
                    if let Err(e) = ws_write.send(ping_msg).await {
                        error!("[ws] ping send error: {e}");
                        break;
                    }
                }
            }
        }

        // Disconnected — will redial at the top of the outer loop
        warn!("[ws] disconnected, redialing in {backoff:?}");
        emit(TransportEvent::Disconnected);
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {},
            _ = driver.shutdown.changed() => {
                emit(TransportEvent::Closed);
                return;
            }
        }
        backoff = (backoff * 2).min(max_backoff);
    }
}

/// Establish a TLS WebSocket connection.
async fn dial(
    config: &WsConfig,
) -> Result<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    FeedError,
> {
    use tokio_tungstenite::tungstenite::http::Request;

    let mut request = Request::builder()
        .uri(&config.url)
        .header("Host", extract_host(&config.url));

    for (key, value) in &config.extra_headers {
        request = request.header(key.as_str(), value.as_str());
    }

    let request = request
        .body(())
        .map_err(|e| FeedError::Transport(format!("bad request: {e}")))?;

    let (stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| FeedError::Transport(e.to_string()))?;
    Ok(stream)
}

/// Extract the host from a URL string.
fn extract_host(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.host_str().unwrap_or("").to_string())
        .unwrap_or_default()
}
