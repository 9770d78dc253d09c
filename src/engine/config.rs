use std::time::Duration;

/// Topic of the notification emitted once the engine accepts commands.
pub const READY_TOPIC: &str = "ready";

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of concurrent workers draining the inbound queue
    pub worker_count: usize,

    /// Capacity of the inbound queue
    pub queue_capacity: usize,

    /// How long a command waits for a queue slot before it is rejected
    pub enqueue_timeout: Duration,

    /// Commands allowed to wait for a queue slot at once; beyond this a full
    /// queue rejects immediately
    pub max_deferred: usize,

    /// Suppresses the startup notification
    pub test_mode: bool,

    /// Installs the `test` namespace (echo, throwError, timeout) in both registry shapes
    pub self_test_handlers: bool,

    /// Topic of the startup notification
    pub ready_topic: String,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self {
            worker_count: 2,
            queue_capacity: 256,
            enqueue_timeout: Duration::from_secs(30),
            max_deferred: 1024,
            test_mode: false,
            self_test_handlers: false,
            ready_topic: READY_TOPIC.to_string(),
        }
    }

    /// Set the number of workers
    pub fn worker_count(mut self, workers: usize) -> Self {
        self.worker_count = workers;
        self
    }

    /// Set the inbound queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the enqueue timeout
    pub fn enqueue_timeout(mut self, timeout: Duration) -> Self {
        self.enqueue_timeout = timeout;
        self
    }

    /// Set how many commands may wait for a queue slot
    pub fn max_deferred(mut self, max: usize) -> Self {
        self.max_deferred = max;
        self
    }

    pub fn test_mode(mut self, enabled: bool) -> Self {
        self.test_mode = enabled;
        self
    }

    pub fn self_test_handlers(mut self, enabled: bool) -> Self {
        self.self_test_handlers = enabled;
        self
    }

    pub fn ready_topic(mut self, topic: &str) -> Self {
        self.ready_topic = topic.to_string();
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be > 0".to_string());
        }

        if self.queue_capacity == 0 {
            return Err("queue_capacity must be > 0".to_string());
        }

        if self.enqueue_timeout.is_zero() {
            return Err("enqueue_timeout must be > 0".to_string());
        }

        if self.max_deferred > tokio::sync::Semaphore::MAX_PERMITS {
            return Err(format!(
                "max_deferred must be <= {}",
                tokio::sync::Semaphore::MAX_PERMITS
            ));
        }

        if self.ready_topic.is_empty() {
            return Err("ready_topic cannot be empty".to_string());
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.max_deferred, 1024);
        assert_eq!(config.ready_topic, READY_TOPIC);
        assert!(!config.test_mode);
        assert!(!config.self_test_handlers);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = EngineConfig::new()
            .worker_count(8)
            .queue_capacity(16)
            .enqueue_timeout(Duration::from_millis(250))
            .max_deferred(0)
            .test_mode(true)
            .self_test_handlers(true);

        assert_eq!(config.worker_count, 8);
        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.enqueue_timeout, Duration::from_millis(250));
        assert_eq!(config.max_deferred, 0);
        assert!(config.validate().is_ok());
        assert!(config.test_mode);
        assert!(config.self_test_handlers);
    }

    #[test]
    fn test_validate() {
        assert!(EngineConfig::new().worker_count(0).validate().is_err());
        assert!(EngineConfig::new().queue_capacity(0).validate().is_err());
        assert!(
            EngineConfig::new()
                .enqueue_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(EngineConfig::new().ready_topic("").validate().is_err());
        assert!(EngineConfig::new().max_deferred(usize::MAX).validate().is_err());
    }
}
