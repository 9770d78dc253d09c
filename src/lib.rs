// ============================================================================
// Agent Worker Library
// ============================================================================

pub mod core;
pub mod registry;
pub mod lifecycle;
pub mod sink;
pub mod bridge;
pub mod engine;

// Re-export main types for convenience
pub use crate::core::{CommandEnvelope, DispatchError, Result, ResultEnvelope};
pub use bridge::HostBridge;
pub use engine::{Engine, EngineBuilder, EngineConfig, EngineStats, READY_TOPIC};

// Re-export registry and collaborator API
pub use registry::{
    AGENT_NAMESPACE, HandlerEntry, Registry, RegistryShape, START_METHOD, STOP_METHOD,
    SharedRegistry,
};
pub use lifecycle::{
    AgentFactory, AgentInstance, HandlerProvider, StartOptions, StaticAgentFactory,
};
pub use sink::{ChannelCallback, FnCallback, HostCallback, Notifier};

// ============================================================================
// Host-channel embedding
// ============================================================================

/// Starts an engine whose results arrive on a channel instead of a host function.
///
/// This is the embedding used by non-browser hosts: feed commands through
/// the returned engine's [`HostBridge`] and read JSON results from the
/// receiver.
///
/// # Examples
///
/// ```
/// use agent_worker::{EngineConfig, StaticAgentFactory, start_with_channel};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = EngineConfig::new().test_mode(true).self_test_handlers(true);
/// let (engine, mut results) =
///     start_with_channel(config, Arc::new(StaticAgentFactory::default()))?;
///
/// engine
///     .bridge()
///     .handle_message(r#"{"id":"1","namespace":"test","method":"echo","payload":{"x":1}}"#);
///
/// let message = results.recv().await.unwrap();
/// assert!(message.contains(r#""echo":{"x":1}"#));
///
/// engine.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub fn start_with_channel(
    config: EngineConfig,
    factory: std::sync::Arc<dyn AgentFactory>,
) -> Result<(Engine, tokio::sync::mpsc::UnboundedReceiver<String>)> {
    let (callback, results) = ChannelCallback::new();
    let engine = EngineBuilder::new(factory, std::sync::Arc::new(callback))
        .config(config)
        .start()?;
    Ok((engine, results))
}
