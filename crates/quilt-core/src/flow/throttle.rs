//! FIFO throttle: immediate first call, one queued call per delay tick.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc;

use super::FlowMsg;

/// Rate-limits a callback.
///
/// The first call in an idle period invokes the callback right away. Calls
/// arriving while the drain window is open are queued FIFO; exactly one
/// queued call is drained every `delay` until the queue is empty, at which
/// point the timer stops.
pub struct Throttle<T> {
    tx: mpsc::UnboundedSender<FlowMsg<T>>,
}

impl<T> Clone for Throttle<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<T: Send + 'static> Throttle<T> {
    pub fn new<F>(callback: F, delay: Duration) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx, callback, delay));
        Self { tx }
    }

    /// Invoke (or queue) the callback with `arg`.
    pub fn call(&self, arg: T) {
        let _ = self.tx.send(FlowMsg::Call(arg));
    }

    /// Discard the queue and any pending drain. Idempotent; calls issued
    /// after the cancel behave as if the throttle were fresh.
    pub fn cancel(&self) {
        let _ = self.tx.send(FlowMsg::Cancel);
    }
}

async fn run<T, F>(mut rx: mpsc::UnboundedReceiver<FlowMsg<T>>, mut callback: F, delay: Duration)
where
    F: FnMut(T),
{
    'idle: loop {
        // Idle: nothing queued, no timer armed.
        let first = loop {
            match rx.recv().await {
                Some(FlowMsg::Call(arg)) => break arg,
                Some(FlowMsg::Cancel) => {}
                None => return,
            }
        };
        callback(first);

        // Drain: one queued call per tick until the queue runs dry.
        let mut queue: VecDeque<T> = VecDeque::new();
        loop {
            let tick = tokio::time::sleep(delay);
            tokio::pin!(tick);
            loop {
                tokio::select! {
                    _ = &mut tick => break,
                    msg = rx.recv() => match msg {
                        Some(FlowMsg::Call(arg)) => queue.push_back(arg),
                        Some(FlowMsg::Cancel) => continue 'idle,
                        None => return,
                    },
                }
            }
            match queue.pop_front() {
                Some(arg) => callback(arg),
                None => continue 'idle,
            }
        }
    }
}
