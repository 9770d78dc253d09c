use super::options::StartOptions;
use crate::core::Result;
use crate::registry::HandlerEntry;
use crate::sink::Notifier;
use async_trait::async_trait;

/// Builds the agent instance behind the Running registry.
///
/// Implemented by the protocol framework the engine wraps.
#[async_trait]
pub trait AgentFactory: Send + Sync {
    /// Creates an agent from decoded start options. `notifier` lets the
    /// agent publish unsolicited events to the host.
    async fn create(
        &self,
        options: &StartOptions,
        notifier: Notifier,
    ) -> Result<Box<dyn AgentInstance>>;
}

/// A running agent.
#[async_trait]
pub trait AgentInstance: Send + Sync {
    /// Feature handlers exposed by this agent.
    fn handlers(&self) -> Result<Vec<HandlerEntry>>;

    /// Releases the agent's resources.
    async fn close(&self) -> Result<()>;
}

/// Extra handler sets that sit beside the agent, e.g. a vault client bound
/// to `edv-server-url`.
pub trait HandlerProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn handlers(&self, options: &StartOptions) -> Result<Vec<HandlerEntry>>;
}

/// Factory for an agent that only exposes a fixed handler list.
///
/// Embedders without a protocol framework (and the stdio host) use it to
/// install their own feature handlers behind Start/Stop.
#[derive(Clone, Default)]
pub struct StaticAgentFactory {
    handlers: Vec<HandlerEntry>,
}

impl StaticAgentFactory {
    pub fn new(handlers: Vec<HandlerEntry>) -> Self {
        Self { handlers }
    }
}

#[async_trait]
impl AgentFactory for StaticAgentFactory {
    async fn create(
        &self,
        _options: &StartOptions,
        _notifier: Notifier,
    ) -> Result<Box<dyn AgentInstance>> {
        Ok(Box::new(StaticAgent {
            handlers: self.handlers.clone(),
        }))
    }
}

struct StaticAgent {
    handlers: Vec<HandlerEntry>,
}

#[async_trait]
impl AgentInstance for StaticAgent {
    fn handlers(&self) -> Result<Vec<HandlerEntry>> {
        Ok(self.handlers.clone())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
