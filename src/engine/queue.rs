use crate::core::{CommandEnvelope, DispatchError, Result};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::time::{Duration, timeout};

/// Creates the bounded inbound queue shared by the worker pool.
pub fn inbound_queue(capacity: usize, enqueue_timeout: Duration) -> (InboundSender, InboundReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    let sender = InboundSender {
        tx: RwLock::new(Some(tx)),
        capacity,
        enqueue_timeout,
    };
    let receiver = InboundReceiver {
        rx: Arc::new(Mutex::new(rx)),
    };
    (sender, receiver)
}

/// Producer side, owned by the host bridge.
#[derive(Debug)]
pub struct InboundSender {
    tx: RwLock<Option<mpsc::Sender<CommandEnvelope>>>,
    capacity: usize,
    enqueue_timeout: Duration,
}

impl InboundSender {
    fn sender(&self) -> Option<mpsc::Sender<CommandEnvelope>> {
        self.tx
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Enqueues without waiting. A full or closed queue hands the envelope back.
    pub fn try_enqueue(
        &self,
        envelope: CommandEnvelope,
    ) -> std::result::Result<(), TrySendError<CommandEnvelope>> {
        match self.sender() {
            Some(tx) => tx.try_send(envelope),
            None => Err(TrySendError::Closed(envelope)),
        }
    }

    /// Waits up to the configured timeout for a queue slot.
    pub async fn enqueue(&self, envelope: CommandEnvelope) -> Result<()> {
        let tx = self.sender().ok_or(DispatchError::QueueClosed)?;
        let timeout_ms = self.enqueue_timeout.as_millis();

        timeout(self.enqueue_timeout, tx.send(envelope))
            .await
            .map_err(|_| {
                DispatchError::QueueFull(format!(
                    "could not acquire a queue slot within {}ms",
                    timeout_ms
                ))
            })?
            .map_err(|_| DispatchError::QueueClosed)
    }

    /// Stops accepting commands. Queued commands are still handed to workers.
    pub fn close(&self) {
        let mut tx = self
            .tx
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tx.take();
    }

    pub fn is_closed(&self) -> bool {
        self.sender().is_none()
    }

    /// Number of commands waiting for a worker.
    pub fn queued(&self) -> usize {
        self.sender()
            .map(|tx| self.capacity.saturating_sub(tx.capacity()))
            .unwrap_or_default()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Consumer side, cloned into every worker.
#[derive(Debug, Clone)]
pub struct InboundReceiver {
    rx: Arc<Mutex<mpsc::Receiver<CommandEnvelope>>>,
}

impl InboundReceiver {
    /// Next command, or `None` once the queue is closed and drained.
    pub async fn recv(&self) -> Option<CommandEnvelope> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }
}
