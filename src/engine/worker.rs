use super::queue::InboundReceiver;
use crate::core::{CommandEnvelope, DispatchError, Result, ResultEnvelope};
use crate::lifecycle::{LifecycleController, not_found};
use crate::registry::{Executor, Handler, SharedRegistry};
use crate::sink::OutboundSender;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info_span, warn};

/// Dispatch counters shared by all workers.
#[derive(Debug, Default)]
pub struct DispatchStats {
    in_flight: AtomicUsize,
    processed: AtomicU64,
    failed: AtomicU64,
}

impl DispatchStats {
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Commands answered, successfully or not.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    /// Commands answered with an error result.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }
}

/// Everything a worker needs to turn a command into a result.
pub(crate) struct Dispatcher {
    pub(crate) registry: SharedRegistry,
    pub(crate) lifecycle: Arc<LifecycleController>,
    pub(crate) outbound: OutboundSender,
    pub(crate) stats: Arc<DispatchStats>,
}

impl Dispatcher {
    /// Resolves and executes one command. Always yields exactly one result.
    pub(crate) async fn dispatch(&self, envelope: CommandEnvelope) -> ResultEnvelope {
        let CommandEnvelope {
            id,
            namespace,
            method,
            payload,
        } = envelope;

        if id.is_empty() {
            warn!(%namespace, %method, "command received without an id");
        }

        // The snapshot is dropped before execution so a concurrent swap never waits on us.
        let executor = self
            .registry
            .snapshot()
            .lookup(&namespace, &method)
            .map(|entry| entry.executor.clone());

        let outcome = match executor {
            Some(Executor::Feature(handler)) => run_contained(handler, payload).await,
            Some(Executor::Lifecycle(command)) => {
                contain(self.lifecycle.execute(command, payload)).await
            }
            None => {
                debug!(%namespace, %method, "no handler installed");
                Err(not_found(&namespace, &method))
            }
        };

        if let Err(err) = &outcome {
            debug!(%namespace, %method, error = %err, "command failed");
        }
        ResultEnvelope::from_outcome(id, outcome)
    }

    async fn process(&self, envelope: CommandEnvelope) {
        self.stats.in_flight.fetch_add(1, Ordering::SeqCst);
        let result = self.dispatch(envelope).await;
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.stats.processed.fetch_add(1, Ordering::SeqCst);
        if result.is_error {
            self.stats.failed.fetch_add(1, Ordering::SeqCst);
        }

        if let Err(err) = self.outbound.send(result) {
            error!(error = %err, "result could not be queued for the host");
        }
    }
}

/// Spawns one worker. It runs until the inbound queue is closed and drained.
pub(crate) fn spawn_worker(
    index: usize,
    inbound: InboundReceiver,
    dispatcher: Arc<Dispatcher>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(envelope) = inbound.recv().await {
            let span = info_span!(
                "dispatch",
                worker = index,
                id = %envelope.id,
                namespace = %envelope.namespace,
                method = %envelope.method,
            );
            dispatcher.process(envelope).instrument(span).await;
        }
        debug!(worker = index, "inbound queue closed, worker exiting");
    })
}

/// Runs a feature handler, turning a panic into an error result.
async fn run_contained(handler: Handler, payload: Value) -> Result<Value> {
    match std::panic::catch_unwind(AssertUnwindSafe(|| handler(payload))) {
        Ok(future) => contain(future).await,
        Err(panic) => Err(panic_error(panic)),
    }
}

/// Polls `future` to completion; a panic while polling becomes an error result.
async fn contain<F>(future: F) -> Result<Value>
where
    F: Future<Output = Result<Value>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => Err(panic_error(panic)),
    }
}

fn panic_error(panic: Box<dyn Any + Send>) -> DispatchError {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    DispatchError::handler(format!("handler panicked: {}", detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{AgentFactory, AgentInstance, StartOptions};
    use crate::registry::HandlerEntry;
    use crate::sink::{ChannelCallback, Notifier, OutboundSink};
    use async_trait::async_trait;
    use serde_json::json;

    struct NoAgent;

    #[async_trait]
    impl AgentFactory for NoAgent {
        async fn create(
            &self,
            _options: &StartOptions,
            _notifier: Notifier,
        ) -> Result<Box<dyn AgentInstance>> {
            Err(DispatchError::Collaborator("no agent in this test".into()))
        }
    }

    struct PanickingAgent;

    #[async_trait]
    impl AgentFactory for PanickingAgent {
        async fn create(
            &self,
            _options: &StartOptions,
            _notifier: Notifier,
        ) -> Result<Box<dyn AgentInstance>> {
            panic!("framework failed to initialise");
        }
    }

    fn dispatcher(resident: Vec<HandlerEntry>) -> (Dispatcher, OutboundSink) {
        dispatcher_with(Arc::new(NoAgent), resident)
    }

    fn dispatcher_with(
        factory: Arc<dyn AgentFactory>,
        resident: Vec<HandlerEntry>,
    ) -> (Dispatcher, OutboundSink) {
        let (callback, _rx) = ChannelCallback::new();
        let (sink, outbound) = OutboundSink::spawn(Arc::new(callback));
        let registry = SharedRegistry::default();
        let lifecycle = LifecycleController::new(
            registry.clone(),
            factory,
            Vec::new(),
            resident,
            Notifier::new(outbound.clone()),
        )
        .unwrap();

        let dispatcher = Dispatcher {
            registry,
            lifecycle: Arc::new(lifecycle),
            outbound,
            stats: Arc::new(DispatchStats::default()),
        };
        (dispatcher, sink)
    }

    #[tokio::test]
    async fn test_unknown_route_is_contextual() {
        let (dispatcher, _sink) = dispatcher(Vec::new());

        let result = dispatcher
            .dispatch(CommandEnvelope::new("9", "outofband", "CreateRequest", json!({})))
            .await;
        assert!(result.is_error);
        assert_eq!(result.id, "9");
        assert!(result.error_message.contains("invalid"));
        assert!(result.error_message.contains("outofband"));
        assert!(result.error_message.contains("CreateRequest"));

        let stop = dispatcher
            .dispatch(CommandEnvelope::new("10", "agent", "Stop", json!({})))
            .await;
        assert_eq!(stop.error_message, "agent not running");
    }

    #[tokio::test]
    async fn test_failed_start_reports_collaborator_error() {
        let (dispatcher, _sink) = dispatcher(Vec::new());

        let result = dispatcher
            .dispatch(CommandEnvelope::new("1", "agent", "Start", json!({})))
            .await;
        assert!(result.is_error);
        assert!(result.error_message.contains("no agent in this test"));
        assert!(!dispatcher.lifecycle.is_running());
    }

    #[tokio::test]
    async fn test_panicking_handler_is_contained() {
        let (dispatcher, _sink) = dispatcher(vec![
            HandlerEntry::sync("test", "panic", |_| panic!("bad input")),
            HandlerEntry::new("test", "panicLater", |payload: Value| async move {
                tokio::task::yield_now().await;
                if payload.is_object() {
                    panic!("later");
                }
                Ok(payload)
            }),
        ]);

        let now = dispatcher
            .dispatch(CommandEnvelope::new("1", "test", "panic", json!({})))
            .await;
        assert!(now.is_error);
        assert!(now.error_message.contains("bad input"));

        let later = dispatcher
            .dispatch(CommandEnvelope::new("2", "test", "panicLater", json!({})))
            .await;
        assert!(later.is_error);
        assert!(later.error_message.contains("later"));
    }

    #[tokio::test]
    async fn test_panicking_factory_is_contained() {
        let (dispatcher, _sink) = dispatcher_with(Arc::new(PanickingAgent), Vec::new());

        let result = dispatcher
            .dispatch(CommandEnvelope::new("1", "agent", "Start", json!({})))
            .await;
        assert!(result.is_error);
        assert_eq!(result.id, "1");
        assert!(result.error_message.contains("framework failed to initialise"));
        assert!(!dispatcher.lifecycle.is_running());

        // The transition lock was released by the unwind; Start can be retried.
        let retry = dispatcher
            .dispatch(CommandEnvelope::new("2", "agent", "Start", json!({})))
            .await;
        assert!(retry.error_message.contains("framework failed to initialise"));
    }

    #[tokio::test]
    async fn test_handler_error_code_in_message() {
        let (dispatcher, _sink) = dispatcher(vec![HandlerEntry::sync("kms", "CreateKeySet", |_| {
            Err(DispatchError::handler_with_code(9000, "key type not supported"))
        })]);

        let result = dispatcher
            .dispatch(CommandEnvelope::new("3", "kms", "CreateKeySet", json!({})))
            .await;
        assert_eq!(
            result.error_message,
            "code: 9000, message: key type not supported"
        );
    }
}
