//! Debounce: only the last call in a quiet window runs.

use std::time::Duration;

use tokio::sync::mpsc;

use super::FlowMsg;

/// Collapses bursts of calls into one.
///
/// Every call rearms a single `wait` timer; when the timer finally fires,
/// the callback receives the arguments of the *last* call only.
pub struct Debounce<T> {
    tx: mpsc::UnboundedSender<FlowMsg<T>>,
}

impl<T> Clone for Debounce<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<T: Send + 'static> Debounce<T> {
    pub fn new<F>(callback: F, wait: Duration) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx, callback, wait));
        Self { tx }
    }

    /// Schedule the callback with `arg`, displacing any pending call.
    pub fn call(&self, arg: T) {
        let _ = self.tx.send(FlowMsg::Call(arg));
    }

    /// Discard the pending call, if any. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(FlowMsg::Cancel);
    }
}

async fn run<T, F>(mut rx: mpsc::UnboundedReceiver<FlowMsg<T>>, mut callback: F, wait: Duration)
where
    F: FnMut(T),
{
    'idle: loop {
        let mut last = loop {
            match rx.recv().await {
                Some(FlowMsg::Call(arg)) => break arg,
                Some(FlowMsg::Cancel) => {}
                None => return,
            }
        };
        loop {
            // Each loop iteration re-arms the timer from scratch.
            let timer = tokio::time::sleep(wait);
            tokio::pin!(timer);
            tokio::select! {
                _ = &mut timer => {
                    callback(last);
                    continue 'idle;
                }
                msg = rx.recv() => match msg {
                    Some(FlowMsg::Call(arg)) => last = arg,
                    Some(FlowMsg::Cancel) => continue 'idle,
                    None => return,
                },
            }
        }
    }
}
