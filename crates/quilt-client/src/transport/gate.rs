//! Connection gate: a counting semaphore plus an inter-creation delay.
//!
//! Venues rate-limit connection storms. The multiplexing manager routes
//! every child connection attempt through a [`ConnectGate`]: an attempt
//! first acquires a semaphore permit, then dials, and the permit is held
//! for `creation_delay` *after* the connection reports `Connected` — so at
//! most `max_connecting` connections are establishing at once and fresh
//! ones are spaced out.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::debug;

use super::{Conn, ConnDriver, Transport, TransportEvent};

/// Shared limiter for connection creation.
#[derive(Clone)]
pub struct ConnectGate {
    semaphore: Arc<Semaphore>,
    creation_delay: Duration,
}

impl ConnectGate {
    pub fn new(max_connecting: usize, creation_delay: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_connecting.max(1))),
            creation_delay,
        }
    }
}

/// Wraps any transport so its connection attempts pass through a
/// [`ConnectGate`]. One permit per `open()`, held until the first
/// `Connected` plus the gate's creation delay.
pub struct GatedTransport {
    inner: Arc<dyn Transport>,
    gate: ConnectGate,
}

impl GatedTransport {
    pub fn new(inner: Arc<dyn Transport>, gate: ConnectGate) -> Self {
        Self { inner, gate }
    }
}

impl Transport for GatedTransport {
    fn open(&self) -> Conn {
        let (conn, driver) = Conn::pair();
        let inner = self.inner.clone();
        let gate = self.gate.clone();
        tokio::spawn(gated_loop(inner, gate, driver));
        conn
    }
}

async fn gated_loop(inner: Arc<dyn Transport>, gate: ConnectGate, mut driver: ConnDriver) {
    // Wait for a creation slot; a close during the wait ends the attempt
    // before anything was dialed.
    let permit = tokio::select! {
        permit = gate.semaphore.clone().acquire_owned() => match permit {
            Ok(p) => p,
            Err(_) => return, // semaphore closed — nothing will ever connect
        },
        _ = driver.shutdown.changed() => {
            let _ = driver.events.send(TransportEvent::Closed);
            return;
        }
    };
    debug!("[gate] creation slot acquired");

    let mut inner_conn = inner.open();
    let mut permit = Some(permit);
    let mut close_requested = false;

    loop {
        tokio::select! {
            _ = driver.shutdown.changed(), if !close_requested => {
                // Relay the close once; the inner transport reports
                // Closing/Closed which keep flowing through the forwarding
                // arm below.
                close_requested = true;
                inner_conn.close();
            }
            ev = inner_conn.recv() => match ev {
                Some(ev) => {
                    if matches!(ev, TransportEvent::Connected) {
                        if let Some(p) = permit.take() {
                            let delay = gate.creation_delay;
                            tokio::spawn(async move {
                                tokio::time::sleep(delay).await;
                                drop(p);
                            });
                        }
                    }
                    if driver.events.send(ev).is_err() {
                        return;
                    }
                }
                None => return,
            },
            Some(payload) = driver.outbound.recv() => {
                inner_conn.send(payload);
            }
        }
    }
}
