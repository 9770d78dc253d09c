use crate::core::{DispatchError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Configuration carried by the `agent/Start` payload.
///
/// All keys are optional; keys not listed here are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StartOptions {
    /// Label the agent uses in invitations when none is supplied.
    #[serde(default, rename = "agent-default-label")]
    pub label: Option<String>,

    /// DID method to HTTP resolver bindings, `method@url`.
    #[serde(default, rename = "http-resolver-url")]
    pub http_resolvers: Vec<HttpResolverBinding>,

    #[serde(default)]
    pub auto_accept: bool,

    #[serde(default)]
    pub outbound_transport: Vec<OutboundTransport>,

    #[serde(default)]
    pub transport_return_route: ReturnRoute,

    #[serde(default)]
    pub log_level: Option<String>,

    /// Namespace prefix for the agent's storage.
    #[serde(default)]
    pub db_namespace: Option<String>,

    #[serde(default)]
    pub domain: Option<String>,

    /// Base URL of the external encrypted vault.
    #[serde(default, rename = "edv-server-url")]
    pub vault_url: Option<String>,
}

impl StartOptions {
    /// Decodes and validates the `agent/Start` payload. A `null` payload
    /// yields the defaults.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        if payload.is_null() {
            return Ok(Self::default());
        }

        let options: Self = serde_json::from_value(payload.clone())
            .map_err(|err| DispatchError::InvalidOptions(err.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(level) = &self.log_level {
            level.parse::<AgentLogLevel>()?;
        }

        if let Some(url) = &self.vault_url {
            if !is_http_url(url) {
                return Err(DispatchError::InvalidOptions(format!(
                    "edv-server-url must be an http(s) URL, got '{}'",
                    url
                )));
            }
        }

        Ok(())
    }

    /// Parsed log level, if one was supplied.
    pub fn agent_log_level(&self) -> Option<AgentLogLevel> {
        self.log_level.as_deref().and_then(|level| level.parse().ok())
    }

    /// Transports used for outbound messages; HTTP when none were selected.
    pub fn effective_transports(&self) -> Vec<OutboundTransport> {
        if self.outbound_transport.is_empty() {
            vec![OutboundTransport::Http]
        } else {
            self.outbound_transport.clone()
        }
    }
}

/// Binds a DID method to the HTTP endpoint resolving it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HttpResolverBinding {
    pub method: String,
    pub url: String,
}

impl TryFrom<String> for HttpResolverBinding {
    type Error = String;

    fn try_from(raw: String) -> std::result::Result<Self, Self::Error> {
        let (method, url) = raw
            .split_once('@')
            .ok_or_else(|| format!("resolver binding '{}' must be method@url", raw))?;

        if method.is_empty() {
            return Err(format!("resolver binding '{}' has an empty method", raw));
        }
        if !is_http_url(url) {
            return Err(format!("resolver binding '{}' needs an http(s) URL", raw));
        }

        Ok(Self {
            method: method.to_string(),
            url: url.to_string(),
        })
    }
}

impl From<HttpResolverBinding> for String {
    fn from(binding: HttpResolverBinding) -> Self {
        format!("{}@{}", binding.method, binding.url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboundTransport {
    Http,
    Ws,
}

/// Return-route option advertised to peers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnRoute {
    #[default]
    None,
    All,
    Thread,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AgentLogLevel {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
}

impl AgentLogLevel {
    pub fn as_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Critical | Self::Error => log::LevelFilter::Error,
            Self::Warning => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
        }
    }
}

impl FromStr for AgentLogLevel {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "error" => Ok(Self::Error),
            "warning" | "warn" => Ok(Self::Warning),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            other => Err(DispatchError::InvalidOptions(format!(
                "unknown log level '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for AgentLogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Critical => "CRITICAL",
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        };
        f.write_str(name)
    }
}

fn is_http_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"));
    rest.is_some_and(|host| !host.is_empty())
}
