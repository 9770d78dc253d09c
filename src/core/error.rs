use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("invalid namespace - {namespace} and/or method - {method}, agent not started")]
    HandlerNotFound { namespace: String, method: String },

    #[error("{}", render_handler_error(.code, .message))]
    Handler { code: Option<i64>, message: String },

    #[error("invalid start options: {0}")]
    InvalidOptions(String),

    #[error("agent already started")]
    AlreadyStarted,

    #[error("agent not running")]
    NotRunning,

    #[error("collaborator error: {0}")]
    Collaborator(String),

    #[error("inbound queue full: {0}")]
    QueueFull(String),

    #[error("inbound queue closed")]
    QueueClosed,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl DispatchError {
    /// Error raised by a feature handler, without a collaborator code.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            code: None,
            message: message.into(),
        }
    }

    /// Error raised by a feature handler carrying the collaborator's error code.
    pub fn handler_with_code(code: i64, message: impl Into<String>) -> Self {
        Self::Handler {
            code: Some(code),
            message: message.into(),
        }
    }
}

fn render_handler_error(code: &Option<i64>, message: &str) -> String {
    match code {
        Some(code) => format!("code: {}, message: {}", code, message),
        None => message.to_string(),
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_error_with_code() {
        let err = DispatchError::handler_with_code(2003, "connection not found");
        assert_eq!(err.to_string(), "code: 2003, message: connection not found");
    }

    #[test]
    fn test_handler_error_without_code() {
        let err = DispatchError::handler("boom");
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_not_found_names_both_parts() {
        let err = DispatchError::HandlerNotFound {
            namespace: "didexchange".to_string(),
            method: "CreateInvitation".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("invalid"));
        assert!(message.contains("didexchange"));
        assert!(message.contains("CreateInvitation"));
    }
}
