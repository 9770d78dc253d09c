//! Built-in `test` namespace used to exercise the dispatch path from the host.

use crate::core::DispatchError;
use crate::registry::HandlerEntry;
use serde_json::{Value, json};
use tokio::time::{Duration, sleep};

pub const TEST_NAMESPACE: &str = "test";

const DEFAULT_DELAY_MS: u64 = 1_000;

pub fn handlers() -> Vec<HandlerEntry> {
    vec![
        HandlerEntry::sync(TEST_NAMESPACE, "echo", |payload| Ok(json!({ "echo": payload }))),
        HandlerEntry::sync(TEST_NAMESPACE, "throwError", |_| {
            Err(DispatchError::handler("error thrown by test handler"))
        }),
        // Deliberately slow; occupies a worker for `delayMs`.
        HandlerEntry::new(TEST_NAMESPACE, "timeout", |payload: Value| async move {
            let delay_ms = payload
                .get("delayMs")
                .and_then(Value::as_u64)
                .unwrap_or(DEFAULT_DELAY_MS);
            sleep(Duration::from_millis(delay_ms)).await;
            Ok(json!({ "slept": delay_ms }))
        }),
    ]
}
