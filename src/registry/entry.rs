use crate::core::Result;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Namespace reserved for lifecycle control commands.
pub const AGENT_NAMESPACE: &str = "agent";
/// Method that moves the engine from Bootstrap to Running.
pub const START_METHOD: &str = "Start";
/// Method that tears the running agent down.
pub const STOP_METHOD: &str = "Stop";

/// Type alias for an async feature handler: opaque payload in, opaque payload out.
pub type Handler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Control commands executed by the lifecycle controller instead of a feature handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleCommand {
    Start,
    Stop,
}

impl LifecycleCommand {
    pub fn method(self) -> &'static str {
        match self {
            Self::Start => START_METHOD,
            Self::Stop => STOP_METHOD,
        }
    }
}

/// How a registered command is executed.
#[derive(Clone)]
pub enum Executor {
    /// Handler supplied by an external collaborator (or the self-test set).
    Feature(Handler),
    /// Lifecycle transition owned by the engine.
    Lifecycle(LifecycleCommand),
}

/// A single `(namespace, method)` route.
#[derive(Clone)]
pub struct HandlerEntry {
    pub namespace: String,
    pub method: String,
    pub executor: Executor,
}

impl HandlerEntry {
    /// Registers an async feature handler.
    pub fn new<F, Fut>(namespace: impl Into<String>, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |payload| handler(payload).boxed());
        Self {
            namespace: namespace.into(),
            method: method.into(),
            executor: Executor::Feature(handler),
        }
    }

    /// Registers a handler that completes without suspending.
    pub fn sync<F>(namespace: impl Into<String>, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        Self::new(namespace, method, move |payload| {
            let handler = Arc::clone(&handler);
            async move { handler(payload) }
        })
    }

    pub(crate) fn lifecycle(command: LifecycleCommand) -> Self {
        Self {
            namespace: AGENT_NAMESPACE.to_string(),
            method: command.method().to_string(),
            executor: Executor::Lifecycle(command),
        }
    }

    pub fn is_lifecycle(&self) -> bool {
        matches!(self.executor, Executor::Lifecycle(_))
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let executor = match &self.executor {
            Executor::Feature(_) => "feature".to_string(),
            Executor::Lifecycle(command) => format!("lifecycle({:?})", command),
        };
        f.debug_struct("HandlerEntry")
            .field("namespace", &self.namespace)
            .field("method", &self.method)
            .field("executor", &executor)
            .finish()
    }
}
