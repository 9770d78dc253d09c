#![allow(dead_code)]

use agent_worker::{
    AgentFactory, AgentInstance, DispatchError, Engine, EngineConfig, HandlerEntry, Notifier,
    Result, ResultEnvelope, StartOptions, start_with_channel,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

/// Stand-in for the protocol framework: exposes a small feature set and
/// counts how often it is closed.
#[derive(Default)]
pub struct MockFramework {
    pub closes: Arc<AtomicUsize>,
    pub fail_close: bool,
    pub announce_topic: Option<String>,
    pub panic_on_create: bool,
}

struct MockAgent {
    closes: Arc<AtomicUsize>,
    fail_close: bool,
}

#[async_trait]
impl AgentFactory for MockFramework {
    async fn create(
        &self,
        options: &StartOptions,
        notifier: Notifier,
    ) -> Result<Box<dyn AgentInstance>> {
        if self.panic_on_create {
            panic!("wallet store is corrupt");
        }
        if let Some(topic) = &self.announce_topic {
            notifier.notify(topic.clone(), json!({ "label": options.label }))?;
        }
        Ok(Box::new(MockAgent {
            closes: Arc::clone(&self.closes),
            fail_close: self.fail_close,
        }))
    }
}

#[async_trait]
impl AgentInstance for MockAgent {
    fn handlers(&self) -> Result<Vec<HandlerEntry>> {
        Ok(vec![
            HandlerEntry::sync("didexchange", "CreateInvitation", |payload| {
                Ok(json!({ "invitation": { "label": payload["alias"] } }))
            }),
            HandlerEntry::sync("mediator", "Register", |_| {
                Err(DispatchError::handler_with_code(5003, "router not reachable"))
            }),
        ])
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(DispatchError::Collaborator("failed to close store".into()));
        }
        Ok(())
    }
}

pub fn quiet_config() -> EngineConfig {
    EngineConfig::new().test_mode(true).self_test_handlers(true)
}

pub fn start(config: EngineConfig, framework: MockFramework) -> (Engine, UnboundedReceiver<String>) {
    start_with_channel(config, Arc::new(framework)).unwrap()
}

pub fn command(id: &str, namespace: &str, method: &str, payload: Value) -> String {
    json!({
        "id": id,
        "namespace": namespace,
        "method": method,
        "payload": payload,
    })
    .to_string()
}

/// Next delivered envelope, failing the test after two seconds.
pub async fn next_result(results: &mut UnboundedReceiver<String>) -> ResultEnvelope {
    let message = timeout(Duration::from_secs(2), results.recv())
        .await
        .expect("timed out waiting for a result")
        .expect("result channel closed");
    serde_json::from_str(&message).unwrap()
}

/// Sends one command and waits for its result.
pub async fn call(
    engine: &Engine,
    results: &mut UnboundedReceiver<String>,
    id: &str,
    namespace: &str,
    method: &str,
    payload: Value,
) -> ResultEnvelope {
    engine
        .bridge()
        .handle_message(&command(id, namespace, method, payload));
    let result = next_result(results).await;
    assert_eq!(result.id, id, "results arrived for an unexpected command");
    result
}

/// Polls `check` until it holds or a second has passed.
pub async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
