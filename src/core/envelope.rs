use super::error::{DispatchError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A command sent by the host.
///
/// `id` is assigned by the caller and only used to correlate the
/// [`ResultEnvelope`] produced for this command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandEnvelope {
    #[serde(default)]
    pub id: String,
    pub namespace: String,
    pub method: String,
    #[serde(default = "empty_payload")]
    pub payload: Value,
}

impl CommandEnvelope {
    pub fn new(
        id: impl Into<String>,
        namespace: impl Into<String>,
        method: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: id.into(),
            namespace: namespace.into(),
            method: method.into(),
            payload,
        }
    }

    /// Decodes an envelope from its JSON text form.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|err| DispatchError::MalformedEnvelope(err.to_string()))
    }

    /// Returns `true` when the command is addressed to `(namespace, method)`.
    pub fn targets(&self, namespace: &str, method: &str) -> bool {
        self.namespace == namespace && self.method == method
    }
}

/// A result or notification delivered to the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope {
    pub id: String,
    pub is_error: bool,
    pub error_message: String,
    pub payload: Value,
    /// Set only for unsolicited notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

impl ResultEnvelope {
    pub fn ok(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            is_error: false,
            error_message: String::new(),
            payload,
            topic: None,
        }
    }

    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_error: true,
            error_message: message.into(),
            payload: empty_payload(),
            topic: None,
        }
    }

    pub fn notification(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            id: String::new(),
            is_error: false,
            error_message: String::new(),
            payload,
            topic: Some(topic.into()),
        }
    }

    /// Builds the result for a command from its handler outcome.
    pub fn from_outcome(id: impl Into<String>, outcome: Result<Value>) -> Self {
        match outcome {
            Ok(payload) => Self::ok(id, payload),
            Err(err) => Self::error(id, err.to_string()),
        }
    }

    pub fn is_notification(&self) -> bool {
        self.topic.is_some()
    }
}

pub(crate) fn empty_payload() -> Value {
    Value::Object(serde_json::Map::new())
}
