//! Lifecycle controller.
//!
//! Owns the transition between the Bootstrap registry (only `agent/Start`)
//! and the Running registry (collaborator handler sets plus `agent/Stop`).
//! Transitions are serialised through the lock guarding the running agent,
//! so a Start racing another Start is rejected rather than overwriting it.

pub mod collaborator;
pub mod options;

pub use collaborator::{AgentFactory, AgentInstance, HandlerProvider, StaticAgentFactory};
pub use options::{AgentLogLevel, HttpResolverBinding, OutboundTransport, ReturnRoute, StartOptions};

use crate::core::{DispatchError, Result};
use crate::registry::{
    AGENT_NAMESPACE, HandlerEntry, LifecycleCommand, Registry, RegistryShape, START_METHOD,
    STOP_METHOD, SharedRegistry,
};
use crate::sink::Notifier;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{Level, event};

pub struct LifecycleController {
    registry: SharedRegistry,
    bootstrap: Registry,
    factory: Arc<dyn AgentFactory>,
    providers: Vec<Arc<dyn HandlerProvider>>,
    resident: Vec<HandlerEntry>,
    notifier: Notifier,
    agent: Mutex<Option<Box<dyn AgentInstance>>>,
}

impl LifecycleController {
    /// Creates the controller and installs the Bootstrap registry.
    ///
    /// `resident` entries are installed in both shapes.
    pub fn new(
        registry: SharedRegistry,
        factory: Arc<dyn AgentFactory>,
        providers: Vec<Arc<dyn HandlerProvider>>,
        resident: Vec<HandlerEntry>,
        notifier: Notifier,
    ) -> Result<Self> {
        let bootstrap = Registry::builder(RegistryShape::Bootstrap)
            .register_all(resident.iter().cloned())?
            .build();
        registry.replace(bootstrap.clone());

        Ok(Self {
            registry,
            bootstrap,
            factory,
            providers,
            resident,
            notifier,
            agent: Mutex::new(None),
        })
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.registry.shape() == RegistryShape::Running
    }

    pub async fn execute(&self, command: LifecycleCommand, payload: Value) -> Result<Value> {
        match command {
            LifecycleCommand::Start => self.start(payload).await,
            LifecycleCommand::Stop => self.stop().await,
        }
    }

    /// Bootstrap -> Running.
    pub async fn start(&self, payload: Value) -> Result<Value> {
        let mut agent = self.agent.lock().await;
        if agent.is_some() {
            return Err(DispatchError::AlreadyStarted);
        }

        let options = StartOptions::from_payload(&payload)?;
        let instance = self.factory.create(&options, self.notifier.clone()).await?;

        let running = match self.running_registry(instance.as_ref(), &options) {
            Ok(running) => running,
            Err(err) => {
                if let Err(close_err) = instance.close().await {
                    event!(
                        Level::WARN,
                        error = %close_err,
                        "failed to close agent after aborted start"
                    );
                }
                return Err(err);
            }
        };

        let routes = running.len();
        self.registry.replace(running);
        *agent = Some(instance);

        if let Some(level) = options.agent_log_level() {
            log::set_max_level(level.as_level_filter());
            event!(Level::DEBUG, %level, "agent log level applied");
        }

        event!(
            Level::INFO,
            routes,
            label = options.label.as_deref().unwrap_or_default(),
            "agent started"
        );
        Ok(json!({}))
    }

    /// Running -> Bootstrap. The registry is reset even when closing the
    /// agent fails; the close error is still returned.
    pub async fn stop(&self) -> Result<Value> {
        let mut agent = self.agent.lock().await;
        let instance = agent.take().ok_or(DispatchError::NotRunning)?;

        let closed = instance.close().await;
        self.registry.replace(self.bootstrap.clone());

        match closed {
            Ok(()) => {
                event!(Level::INFO, "agent stopped");
                Ok(json!({}))
            }
            Err(err) => {
                event!(Level::WARN, error = %err, "agent stopped with close error");
                Err(err)
            }
        }
    }

    /// Closes a running agent, if any. Used when the engine shuts down.
    pub async fn shutdown(&self) -> Result<()> {
        let mut agent = self.agent.lock().await;
        if let Some(instance) = agent.take() {
            let closed = instance.close().await;
            self.registry.replace(self.bootstrap.clone());
            closed?;
        }
        Ok(())
    }

    fn running_registry(
        &self,
        instance: &dyn AgentInstance,
        options: &StartOptions,
    ) -> Result<Registry> {
        let mut builder = Registry::builder(RegistryShape::Running)
            .register_all(self.resident.iter().cloned())?
            .register_all(instance.handlers()?)?;

        for provider in &self.providers {
            let entries = provider.handlers(options).map_err(|err| {
                DispatchError::Collaborator(format!("{}: {}", provider.name(), err))
            })?;
            builder = builder.register_all(entries)?;
        }

        Ok(builder.build())
    }
}

/// Error for a command with no installed handler.
///
/// The two lifecycle routes are only ever missing in the opposite state,
/// which gives them a more specific answer.
pub fn not_found(namespace: &str, method: &str) -> DispatchError {
    if namespace == AGENT_NAMESPACE && method == START_METHOD {
        DispatchError::AlreadyStarted
    } else if namespace == AGENT_NAMESPACE && method == STOP_METHOD {
        DispatchError::NotRunning
    } else {
        DispatchError::HandlerNotFound {
            namespace: namespace.to_string(),
            method: method.to_string(),
        }
    }
}
