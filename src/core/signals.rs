use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

const SIGNAL_CAPACITY: usize = 16;

/// Per-run wake-ups published after every write that touches a run.
///
/// Signals carry no data; receivers re-read the store. A missed or lagged
/// signal only delays a subscriber until its next poll.
#[derive(Clone, Default)]
pub struct RunSignals {
    channels: Arc<Mutex<HashMap<i64, broadcast::Sender<()>>>>,
}

impl RunSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch(&self, run_id: i64) -> RunWatch {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let tx = channels
            .entry(run_id)
            .or_insert_with(|| broadcast::channel(SIGNAL_CAPACITY).0);
        RunWatch {
            run_id,
            rx: tx.subscribe(),
            channels: self.channels.clone(),
        }
    }

    pub fn publish(&self, run_id: i64) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let abandoned = channels
            .get(&run_id)
            .is_some_and(|tx| tx.send(()).is_err());
        if abandoned {
            channels.remove(&run_id);
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_runs(&self) -> usize {
        self.channels.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Receiver side of one run's channel. The channel is dropped from the hub
/// with its last watch.
pub struct RunWatch {
    run_id: i64,
    rx: broadcast::Receiver<()>,
    channels: Arc<Mutex<HashMap<i64, broadcast::Sender<()>>>>,
}

impl RunWatch {
    /// Resolves on the next signal for this run. Never resolves once the
    /// hub has dropped the channel.
    pub async fn changed(&mut self) {
        match self.rx.recv().await {
            Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}

impl Drop for RunWatch {
    fn drop(&mut self) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        // self.rx is still subscribed here
        let last = channels
            .get(&self.run_id)
            .is_some_and(|tx| tx.receiver_count() <= 1);
        if last {
            channels.remove(&self.run_id);
        }
    }
}
