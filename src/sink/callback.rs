use crate::core::{DispatchError, Result};
use tokio::sync::mpsc;

/// The host-resident function results are delivered to.
///
/// Called with the JSON text of one `ResultEnvelope`. The sink never calls
/// it from two places at once.
pub trait HostCallback: Send + Sync {
    fn deliver(&self, message: &str) -> Result<()>;
}

/// Forwards each message into a channel read by the embedding application.
#[derive(Debug, Clone)]
pub struct ChannelCallback {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelCallback {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl HostCallback for ChannelCallback {
    fn deliver(&self, message: &str) -> Result<()> {
        self.tx
            .send(message.to_string())
            .map_err(|_| DispatchError::Delivery("host channel closed".to_string()))
    }
}

/// Adapts a closure into a [`HostCallback`].
pub struct FnCallback<F> {
    f: F,
}

impl<F> FnCallback<F>
where
    F: Fn(&str) -> Result<()> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> HostCallback for FnCallback<F>
where
    F: Fn(&str) -> Result<()> + Send + Sync,
{
    fn deliver(&self, message: &str) -> Result<()> {
        (self.f)(message)
    }
}
