use serde::{Deserialize, Serialize};

use crate::error::TxQueueError;

/// Options for configuring a [`Database`](crate::database::Database) engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Number of worker threads, one connection each.
    pub worker_count: usize,
    /// Worker threads are named `{prefix}-{index}`.
    pub thread_name_prefix: String,
    /// Re-run a batch once after a lost connection if a ping can re-establish it.
    pub retry_on_connection_lost: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            worker_count: 1,
            thread_name_prefix: "txqueue-worker".to_string(),
            retry_on_connection_lost: true,
        }
    }
}

impl EngineOptions {
    #[must_use]
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn builder() -> EngineOptionsBuilder {
        EngineOptionsBuilder::new()
    }

    /// Parse options from JSON; missing fields take their defaults.
    ///
    /// # Errors
    /// Returns `TxQueueError::ConfigError` if the JSON is malformed or the options fail
    /// [`EngineOptions::validate`].
    pub fn from_json_str(json: &str) -> Result<Self, TxQueueError> {
        let opts: EngineOptions = serde_json::from_str(json)
            .map_err(|e| TxQueueError::ConfigError(format!("invalid engine options: {e}")))?;
        opts.validate()?;
        Ok(opts)
    }

    /// # Errors
    /// Returns `TxQueueError::ConfigError` for a zero worker count, or for a thread prefix
    /// that is empty or holds a NUL byte (threads cannot be named with one).
    pub fn validate(&self) -> Result<(), TxQueueError> {
        if self.worker_count == 0 {
            return Err(TxQueueError::ConfigError(
                "worker_count must be at least 1".into(),
            ));
        }
        if self.thread_name_prefix.trim().is_empty() {
            return Err(TxQueueError::ConfigError(
                "thread_name_prefix must not be empty".into(),
            ));
        }
        if self.thread_name_prefix.contains('\0') {
            return Err(TxQueueError::ConfigError(
                "thread_name_prefix must not contain NUL".into(),
            ));
        }
        Ok(())
    }
}

/// Fluent builder for [`EngineOptions`].
#[derive(Debug, Clone, Default)]
pub struct EngineOptionsBuilder {
    opts: EngineOptions,
}

impl EngineOptionsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            opts: EngineOptions::default(),
        }
    }

    #[must_use]
    pub fn workers(mut self, worker_count: usize) -> Self {
        self.opts.worker_count = worker_count;
        self
    }

    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.opts.thread_name_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn retry(mut self, retry_on_connection_lost: bool) -> Self {
        self.opts.retry_on_connection_lost = retry_on_connection_lost;
        self
    }

    #[must_use]
    pub fn finish(self) -> EngineOptions {
        self.opts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_fills_defaults() {
        let opts = EngineOptions::from_json_str(r#"{ "worker_count": 3 }"#).unwrap();
        assert_eq!(opts.worker_count, 3);
        assert_eq!(opts.thread_name_prefix, "txqueue-worker");
        assert!(opts.retry_on_connection_lost);
    }

    #[test]
    fn zero_workers_rejected() {
        let err = EngineOptions::from_json_str(r#"{ "worker_count": 0 }"#).unwrap_err();
        assert!(matches!(err, TxQueueError::ConfigError(_)));
    }

    #[test]
    fn builder_sets_fields() {
        let opts = EngineOptions::builder()
            .workers(2)
            .thread_name_prefix("db")
            .retry(false)
            .finish();
        assert_eq!(opts.worker_count, 2);
        assert_eq!(opts.thread_name_prefix, "db");
        assert!(!opts.retry_on_connection_lost);
        assert!(opts.validate().is_ok());
    }
}
