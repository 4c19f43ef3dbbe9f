//! Idle-connection watchdog.
//!
//! Venues silently black-hole dead sockets under certain network failures;
//! periodic liveness checking on the *normalized* event stream is the only
//! reliable detector available without transport-level keep-alives. The
//! owning client marks the watchdog alive on every data event it emits and
//! reconnects when [`Watchdog::expired`] resolves.

use std::time::Duration;

use tokio::time::Instant;

/// Timer-driven liveness monitor for one client.
#[derive(Debug)]
pub struct Watchdog {
    interval: Duration,
    last_message: Option<Instant>,
    next_check: Option<Instant>,
}

impl Watchdog {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_message: None,
            next_check: None,
        }
    }

    /// Record that a message was just seen.
    pub fn mark_alive(&mut self) {
        self.last_message = Some(Instant::now());
    }

    /// Arm the recurring silence check. Restarting an armed watchdog is
    /// fine — the old schedule is simply replaced.
    pub fn start(&mut self) {
        self.next_check = Some(Instant::now() + self.interval);
    }

    /// Disarm the check.
    pub fn stop(&mut self) {
        self.next_check = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_check.is_some()
    }

    /// Resolves when the feed has been silent for a full interval: no
    /// message was ever marked alive, or the last one is older than
    /// `interval`. The watchdog disarms itself before resolving, so each
    /// expiry triggers exactly one reconnect. Pending while stopped.
    ///
    /// Cancellation-safe: dropping the future (losing a `select!` race)
    /// leaves the armed schedule intact.
    pub async fn expired(&mut self) {
        loop {
            match self.next_check {
                None => std::future::pending::<()>().await,
                Some(at) => {
                    tokio::time::sleep_until(at).await;
                    let silent = self
                        .last_message
                        .is_none_or(|t| t.elapsed() > self.interval);
                    if silent {
                        self.stop();
                        return;
                    }
                    self.next_check = Some(Instant::now() + self.interval);
                }
            }
        }
    }
}
