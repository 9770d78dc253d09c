//! Outbound path to the host.
//!
//! Workers, the lifecycle controller and collaborators all push
//! [`ResultEnvelope`]s into one unbounded channel. A single task drains it
//! and calls the host callback once per envelope, so the host is never
//! entered concurrently.

pub mod callback;

pub use callback::{ChannelCallback, FnCallback, HostCallback};

use crate::core::{DispatchError, Result, ResultEnvelope};
use log::{debug, error};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Cloneable handle used to queue envelopes for delivery.
#[derive(Debug, Clone)]
pub struct OutboundSender {
    tx: mpsc::UnboundedSender<ResultEnvelope>,
}

impl OutboundSender {
    pub fn send(&self, envelope: ResultEnvelope) -> Result<()> {
        self.tx.send(envelope).map_err(|err| {
            DispatchError::Delivery(format!(
                "outbound sink stopped, dropping result for id '{}'",
                err.0.id
            ))
        })
    }
}

/// Publishes unsolicited notifications (results with a topic and no id).
#[derive(Debug, Clone)]
pub struct Notifier {
    outbound: OutboundSender,
}

impl Notifier {
    pub(crate) fn new(outbound: OutboundSender) -> Self {
        Self { outbound }
    }

    pub fn notify(&self, topic: impl Into<String>, payload: Value) -> Result<()> {
        self.outbound
            .send(ResultEnvelope::notification(topic, payload))
    }
}

/// Delivery counters for the sink.
#[derive(Debug, Default)]
pub struct SinkStats {
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl SinkStats {
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    fn record(&self, delivered: bool) {
        if delivered {
            self.delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// The single consumer that feeds the host callback.
pub struct OutboundSink {
    stats: Arc<SinkStats>,
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl OutboundSink {
    /// Spawns the drain task and returns the sink plus the sender feeding it.
    pub fn spawn(callback: Arc<dyn HostCallback>) -> (Self, OutboundSender) {
        let (tx, mut rx) = mpsc::unbounded_channel::<ResultEnvelope>();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let stats = Arc::new(SinkStats::default());
        let stats_for_task = Arc::clone(&stats);

        let join_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    next = rx.recv() => {
                        let Some(envelope) = next else {
                            break;
                        };
                        stats_for_task.record(deliver(callback.as_ref(), &envelope));
                    }
                    _ = &mut stop_rx => {
                        while let Ok(envelope) = rx.try_recv() {
                            stats_for_task.record(deliver(callback.as_ref(), &envelope));
                        }
                        break;
                    }
                }
            }
            debug!("Outbound sink drained, stopping");
        });

        let sink = Self {
            stats,
            stop_tx: Some(stop_tx),
            join_handle: Some(join_handle),
        };
        (sink, OutboundSender { tx })
    }

    pub fn stats(&self) -> &Arc<SinkStats> {
        &self.stats
    }

    /// Delivers whatever is already queued, then stops the drain task.
    ///
    /// Envelopes sent after this point are rejected by [`OutboundSender::send`].
    pub async fn close(mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(join_handle) = self.join_handle.take() {
            join_handle
                .await
                .map_err(|err| DispatchError::Delivery(format!("outbound sink join: {}", err)))?;
        }
        Ok(())
    }
}

impl Drop for OutboundSink {
    fn drop(&mut self) {
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}

fn deliver(callback: &dyn HostCallback, envelope: &ResultEnvelope) -> bool {
    let message = match serde_json::to_string(envelope) {
        Ok(message) => message,
        Err(err) => {
            error!("Failed to serialize result for id '{}': {}", envelope.id, err);
            return false;
        }
    };

    match callback.deliver(&message) {
        Ok(()) => true,
        Err(err) => {
            error!("Host callback failed for id '{}': {}", envelope.id, err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_sink_delivers_in_send_order() {
        let (callback, mut rx) = ChannelCallback::new();
        let (sink, outbound) = OutboundSink::spawn(Arc::new(callback));

        outbound.send(ResultEnvelope::ok("1", json!({}))).unwrap();
        outbound.send(ResultEnvelope::error("2", "boom")).unwrap();

        let stats = Arc::clone(sink.stats());
        sink.close().await.unwrap();
        assert_eq!(stats.delivered(), 2);
        assert_eq!(stats.failed(), 0);
        assert!(outbound.send(ResultEnvelope::ok("3", json!({}))).is_err());

        let first: ResultEnvelope = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        let second: ResultEnvelope = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first.id, "1");
        assert_eq!(second.id, "2");
        assert!(second.is_error);
    }

    #[tokio::test]
    async fn test_failing_callback_does_not_stop_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_for_callback = Arc::clone(&seen);
        let callback = FnCallback::new(move |message: &str| {
            let envelope: ResultEnvelope = serde_json::from_str(message)?;
            if envelope.id == "bad" {
                return Err(DispatchError::Delivery("host rejected message".into()));
            }
            seen_for_callback.lock().unwrap().push(envelope.id);
            Ok(())
        });
        let (sink, outbound) = OutboundSink::spawn(Arc::new(callback));

        outbound.send(ResultEnvelope::ok("bad", json!({}))).unwrap();
        outbound.send(ResultEnvelope::ok("good", json!({}))).unwrap();

        let stats = Arc::clone(sink.stats());
        sink.close().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["good".to_string()]);
        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.delivered(), 1);
    }

    #[tokio::test]
    async fn test_notifier_sets_topic() {
        let (callback, mut rx) = ChannelCallback::new();
        let (_sink, outbound) = OutboundSink::spawn(Arc::new(callback));
        let notifier = Notifier::new(outbound);

        notifier
            .notify("didexchange_states", json!({ "state": "completed" }))
            .unwrap();

        let delivered: ResultEnvelope = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(delivered.topic.as_deref(), Some("didexchange_states"));
        assert_eq!(delivered.payload["state"], "completed");
    }
}
