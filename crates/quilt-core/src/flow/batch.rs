//! Batch: collect a burst of calls, then run chunked.

use std::time::Duration;

use tokio::sync::mpsc;

use super::FlowMsg;

/// Collects call arguments into a pending list. Every call rearms a
/// `collect` timer (debounce-style); when the window finally closes, the
/// pending list is split into consecutive chunks of at most `batch_size`
/// and the callback runs once per chunk, in order.
pub struct Batch<T> {
    tx: mpsc::UnboundedSender<FlowMsg<T>>,
}

impl<T> Clone for Batch<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<T: Send + 'static> Batch<T> {
    pub fn new<F>(callback: F, batch_size: usize, collect: Duration) -> Self
    where
        F: FnMut(Vec<T>) + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx, callback, batch_size.max(1), collect));
        Self { tx }
    }

    /// Append `arg` to the pending batch and rearm the collect window.
    pub fn call(&self, arg: T) {
        let _ = self.tx.send(FlowMsg::Call(arg));
    }

    /// Discard the pending list and timer without running the callback.
    pub fn cancel(&self) {
        let _ = self.tx.send(FlowMsg::Cancel);
    }
}

async fn run<T, F>(
    mut rx: mpsc::UnboundedReceiver<FlowMsg<T>>,
    mut callback: F,
    batch_size: usize,
    collect: Duration,
) where
    F: FnMut(Vec<T>),
{
    'idle: loop {
        let first = loop {
            match rx.recv().await {
                Some(FlowMsg::Call(arg)) => break arg,
                Some(FlowMsg::Cancel) => {}
                None => return,
            }
        };
        let mut pending = vec![first];
        loop {
            let timer = tokio::time::sleep(collect);
            tokio::pin!(timer);
            tokio::select! {
                _ = &mut timer => {
                    let mut items = std::mem::take(&mut pending).into_iter();
                    loop {
                        let chunk: Vec<T> = items.by_ref().take(batch_size).collect();
                        if chunk.is_empty() {
                            break;
                        }
                        callback(chunk);
                    }
                    continue 'idle;
                }
                msg = rx.recv() => match msg {
                    Some(FlowMsg::Call(arg)) => pending.push(arg),
                    Some(FlowMsg::Cancel) => continue 'idle,
                    None => return,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder() -> (
        Arc<Mutex<Vec<Vec<u32>>>>,
        impl FnMut(Vec<u32>) + Send + 'static,
    ) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        (calls, move |chunk| sink.lock().unwrap().push(chunk))
    }

    #[tokio::test(start_paused = true)]
    async fn splits_into_chunks_in_order() {
        let (calls, cb) = recorder();
        let batch = Batch::new(cb, 2, Duration::from_millis(100));

        batch.call(1);
        batch.call(2);
        batch.call(3);

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert!(calls.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(*calls.lock().unwrap(), vec![vec![1, 2], vec![3]]);
    }

    #[tokio::test(start_paused = true)]
    async fn every_call_rearms_the_window() {
        let (calls, cb) = recorder();
        let batch = Batch::new(cb, 10, Duration::from_millis(100));

        batch.call(1);
        tokio::time::sleep(Duration::from_millis(60)).await;
        batch.call(2);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(calls.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*calls.lock().unwrap(), vec![vec![1, 2]]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_pending_list() {
        let (calls, cb) = recorder();
        let batch = Batch::new(cb, 2, Duration::from_millis(100));

        batch.call(1);
        batch.call(2);
        batch.cancel();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(calls.lock().unwrap().is_empty());

        batch.call(3);
        tokio::time::sleep(Duration::from_millis(101)).await;
        assert_eq!(*calls.lock().unwrap(), vec![vec![3]]);
    }
}
