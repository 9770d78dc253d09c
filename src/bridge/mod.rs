//! Host bridge: the single inbound entry point.
//!
//! The host calls [`HostBridge::handle_message`] with the JSON text of a
//! command. The call never waits for a queue slot: when the queue is full
//! the command is handed to a background task that waits up to the
//! configured enqueue timeout, and only then is it rejected with an error
//! result carrying its id. At most `max_deferred` commands wait at once;
//! past that a full queue rejects immediately.

use crate::core::{CommandEnvelope, DispatchError, Result, ResultEnvelope};
use crate::engine::queue::InboundSender;
use crate::sink::OutboundSender;
use log::{debug, error, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::sync::mpsc::error::TrySendError;

/// Counters for inbound traffic.
#[derive(Debug, Default)]
pub struct BridgeStats {
    received: AtomicU64,
    malformed: AtomicU64,
    deferred: AtomicU64,
    rejected: AtomicU64,
}

impl BridgeStats {
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Inputs dropped because they were not a valid envelope.
    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    /// Commands that found the queue full and waited in the background.
    pub fn deferred(&self) -> u64 {
        self.deferred.load(Ordering::Relaxed)
    }

    /// Commands answered with a queue error instead of being dispatched.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct HostBridge {
    inbound: Arc<InboundSender>,
    outbound: OutboundSender,
    runtime: Handle,
    deferred_slots: Arc<Semaphore>,
    max_deferred: usize,
    stats: Arc<BridgeStats>,
}

impl HostBridge {
    pub(crate) fn new(
        inbound: Arc<InboundSender>,
        outbound: OutboundSender,
        runtime: Handle,
        max_deferred: usize,
    ) -> Self {
        Self {
            inbound,
            outbound,
            runtime,
            deferred_slots: Arc::new(Semaphore::new(max_deferred)),
            max_deferred,
            stats: Arc::new(BridgeStats::default()),
        }
    }

    pub fn stats(&self) -> &Arc<BridgeStats> {
        &self.stats
    }

    /// Entry point for the host. Safe to call from any thread, including
    /// threads outside the runtime.
    ///
    /// Malformed input is logged and dropped: it has no id a result could
    /// be correlated with.
    pub fn handle_message(&self, raw: &str) {
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        let envelope = match CommandEnvelope::from_json(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                error!("Dropping inbound message: {}", err);
                return;
            }
        };

        debug!(
            "Received command {}/{} (id '{}')",
            envelope.namespace, envelope.method, envelope.id
        );

        match self.inbound.try_enqueue(envelope) {
            Ok(()) => {}
            Err(TrySendError::Full(envelope)) => self.defer(envelope),
            Err(TrySendError::Closed(envelope)) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Engine is shut down, dropping command {}/{} (id '{}')",
                    envelope.namespace, envelope.method, envelope.id
                );
            }
        }
    }

    /// Async variant of [`handle_message`](Self::handle_message) for embedders
    /// that already hold a decoded envelope. Waits for a queue slot up to the
    /// enqueue timeout.
    pub async fn submit(&self, envelope: CommandEnvelope) -> Result<()> {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        self.inbound.enqueue(envelope).await.inspect_err(|_| {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
        })
    }

    fn defer(&self, envelope: CommandEnvelope) {
        let Ok(permit) = Arc::clone(&self.deferred_slots).try_acquire_owned() else {
            let err = DispatchError::QueueFull(format!(
                "{} commands already waiting for a queue slot",
                self.max_deferred
            ));
            self.reject(envelope.id, err);
            return;
        };

        self.stats.deferred.fetch_add(1, Ordering::Relaxed);
        warn!(
            "Inbound queue full ({} slots), deferring command id '{}'",
            self.inbound.capacity(),
            envelope.id
        );

        let inbound = Arc::clone(&self.inbound);
        let outbound = self.outbound.clone();
        let stats = Arc::clone(&self.stats);
        self.runtime.spawn(async move {
            let _permit = permit;
            let id = envelope.id.clone();
            if let Err(err) = inbound.enqueue(envelope).await {
                stats.rejected.fetch_add(1, Ordering::Relaxed);
                error!("Rejecting command id '{}': {}", id, err);
                if let Err(send_err) = outbound.send(ResultEnvelope::error(id, err.to_string())) {
                    error!("{}", send_err);
                }
            }
        });
    }

    fn reject(&self, id: String, err: DispatchError) {
        self.stats.rejected.fetch_add(1, Ordering::Relaxed);
        error!("Rejecting command id '{}': {}", id, err);
        if let Err(send_err) = self.outbound.send(ResultEnvelope::error(id, err.to_string())) {
            error!("{}", send_err);
        }
    }
}
