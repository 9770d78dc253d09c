//! The dispatch engine.
//!
//! ```text
//! host ──handle_message()──► HostBridge ──► InboundQueue ──► worker × N
//!                                                               │
//!                                          SharedRegistry ◄─────┤ lookup
//!                                                               ▼
//! host ◄──HostCallback── OutboundSink ◄──────────────── ResultEnvelope
//! ```
//!
//! An [`Engine`] is started explicitly with [`EngineBuilder::start`] and
//! stopped with [`Engine::shutdown`]; nothing about it is process-global.

pub mod config;
pub mod queue;
pub mod selftest;
pub mod worker;

pub use config::{EngineConfig, READY_TOPIC};
pub use worker::DispatchStats;

use crate::bridge::HostBridge;
use crate::core::{DispatchError, Result, ResultEnvelope};
use crate::lifecycle::{AgentFactory, HandlerProvider, LifecycleController};
use crate::registry::{RegistryShape, SharedRegistry};
use crate::sink::{HostCallback, Notifier, OutboundSink};
use log::{info, warn};
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use worker::{Dispatcher, spawn_worker};

/// Collects the engine's collaborators before starting it.
pub struct EngineBuilder {
    config: EngineConfig,
    factory: Arc<dyn AgentFactory>,
    providers: Vec<Arc<dyn HandlerProvider>>,
    callback: Arc<dyn HostCallback>,
}

impl EngineBuilder {
    pub fn new(factory: Arc<dyn AgentFactory>, callback: Arc<dyn HostCallback>) -> Self {
        Self {
            config: EngineConfig::default(),
            factory,
            providers: Vec::new(),
            callback,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds a handler set installed next to the agent's own on Start.
    pub fn provider(mut self, provider: Arc<dyn HandlerProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Starts the sink and the worker pool. Must be called from within a
    /// tokio runtime.
    ///
    /// The startup notification is queued before the bridge exists, so the
    /// host always sees it before any command result.
    pub fn start(self) -> Result<Engine> {
        self.config.validate().map_err(DispatchError::Config)?;
        let runtime = Handle::try_current()
            .map_err(|err| DispatchError::Config(format!("no tokio runtime: {}", err)))?;

        let (sink, outbound) = OutboundSink::spawn(self.callback);

        let resident = if self.config.self_test_handlers {
            selftest::handlers()
        } else {
            Vec::new()
        };
        let registry = SharedRegistry::default();
        let lifecycle = Arc::new(LifecycleController::new(
            registry.clone(),
            self.factory,
            self.providers,
            resident,
            Notifier::new(outbound.clone()),
        )?);

        if !self.config.test_mode {
            outbound.send(ResultEnvelope::notification(
                self.config.ready_topic.clone(),
                json!({}),
            ))?;
        }

        let (inbound_tx, inbound_rx) =
            queue::inbound_queue(self.config.queue_capacity, self.config.enqueue_timeout);
        let inbound_tx = Arc::new(inbound_tx);

        let stats = Arc::new(DispatchStats::default());
        let dispatcher = Arc::new(Dispatcher {
            registry,
            lifecycle: Arc::clone(&lifecycle),
            outbound: outbound.clone(),
            stats: Arc::clone(&stats),
        });
        let workers = (0..self.config.worker_count)
            .map(|index| spawn_worker(index, inbound_rx.clone(), Arc::clone(&dispatcher)))
            .collect();

        let bridge = HostBridge::new(
            Arc::clone(&inbound_tx),
            outbound,
            runtime,
            self.config.max_deferred,
        );

        info!(
            "Dispatch engine started with {} workers, queue capacity {}",
            self.config.worker_count, self.config.queue_capacity
        );

        Ok(Engine {
            config: self.config,
            lifecycle,
            inbound: inbound_tx,
            bridge,
            workers,
            sink: Some(sink),
            stats,
        })
    }
}

pub struct Engine {
    config: EngineConfig,
    lifecycle: Arc<LifecycleController>,
    inbound: Arc<queue::InboundSender>,
    bridge: HostBridge,
    workers: Vec<JoinHandle<()>>,
    sink: Option<OutboundSink>,
    stats: Arc<DispatchStats>,
}

impl Engine {
    pub fn builder(factory: Arc<dyn AgentFactory>, callback: Arc<dyn HostCallback>) -> EngineBuilder {
        EngineBuilder::new(factory, callback)
    }

    /// The host-facing entry point. Cheap to clone.
    pub fn bridge(&self) -> HostBridge {
        self.bridge.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &SharedRegistry {
        self.lifecycle.registry()
    }

    pub fn shape(&self) -> RegistryShape {
        self.registry().shape()
    }

    pub fn stats(&self) -> EngineStats {
        let (delivered, undeliverable) = self
            .sink
            .as_ref()
            .map(|sink| (sink.stats().delivered(), sink.stats().failed()))
            .unwrap_or_default();

        EngineStats {
            workers: self.workers.len(),
            queued: self.inbound.queued(),
            in_flight: self.stats.in_flight(),
            processed: self.stats.processed(),
            failed: self.stats.failed(),
            delivered,
            undeliverable,
            malformed: self.bridge.stats().malformed(),
            deferred: self.bridge.stats().deferred(),
            rejected: self.bridge.stats().rejected(),
        }
    }

    /// Stops accepting commands, lets the workers finish what is queued,
    /// closes a running agent, then stops the sink once everything produced
    /// so far has reached the host.
    pub async fn shutdown(mut self) -> Result<()> {
        self.inbound.close();

        for handle in self.workers.drain(..) {
            if let Err(err) = handle.await {
                warn!("Worker ended abnormally: {}", err);
            }
        }

        let closed = self.lifecycle.shutdown().await;
        if let Err(err) = &closed {
            warn!("Agent close during shutdown failed: {}", err);
        }

        if let Some(sink) = self.sink.take() {
            sink.close().await?;
        }

        info!("Dispatch engine stopped");
        closed
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.inbound.close();
        for handle in self.workers.drain(..) {
            handle.abort();
        }
    }
}

/// Engine statistics
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub workers: usize,
    pub queued: usize,
    pub in_flight: usize,
    pub processed: u64,
    pub failed: u64,
    pub delivered: u64,
    pub undeliverable: u64,
    pub malformed: u64,
    pub deferred: u64,
    pub rejected: u64,
}

impl std::fmt::Display for EngineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Engine Stats: {} workers, {} queued, {} in flight, {} processed ({} failed), {} delivered, {} undeliverable, {} malformed, {} deferred, {} rejected",
            self.workers,
            self.queued,
            self.in_flight,
            self.processed,
            self.failed,
            self.delivered,
            self.undeliverable,
            self.malformed,
            self.deferred,
            self.rejected
        )
    }
}
