// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Scheduler startup parameters.
//!
//! Values arrive already typed from the embedder's configuration layer, as
//! JSON, or from the environment.

use std::thread;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Environment variable overriding the worker count.
pub const WORKERS_ENV: &str = "STRAND_WORKERS";

const DEFAULT_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid scheduler config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("max_pending must be at least 1")]
    ZeroPending,
    #[error("event_capacity must be at least 1")]
    ZeroEventCapacity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Worker threads. 0 means one per available core.
    pub workers: usize,
    /// Ready-queue length at which new strands are rejected with
    /// `Overloaded`. `None` means unbounded.
    pub max_pending: Option<usize>,
    /// Buffer size for `Scheduler::with_event_channel`.
    pub event_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            max_pending: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SchedulerConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, with `STRAND_WORKERS` applied if it holds a valid count.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = parse_workers(std::env::var(WORKERS_ENV).ok()) {
            config.workers = n;
        }
        config
    }

    pub fn with_workers(mut self, n: usize) -> Self {
        self.workers = n;
        self
    }

    pub fn with_max_pending(mut self, limit: usize) -> Self {
        self.max_pending = Some(limit);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_pending == Some(0) {
            return Err(ConfigError::ZeroPending);
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::ZeroEventCapacity);
        }
        Ok(())
    }

    /// Worker count with 0 resolved to available parallelism.
    pub fn resolved_workers(&self) -> usize {
        if self.workers == 0 {
            thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4)
        } else {
            self.workers
        }
    }
}

/// Parse a worker count. Missing, zero, or malformed values yield `None`;
/// the latter two are warned about.
fn parse_workers(value: Option<String>) -> Option<usize> {
    let value = value?;
    match value.trim().parse::<usize>() {
        Ok(0) => {
            warn!("{}=0 is invalid, using default", WORKERS_ENV);
            None
        }
        Ok(n) => Some(n),
        Err(_) => {
            warn!("{}='{}' is not a valid number, using default", WORKERS_ENV, value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = SchedulerConfig::default();
        assert_eq!(c.workers, 0);
        assert_eq!(c.max_pending, None);
        assert!(c.resolved_workers() >= 1);
    }

    #[test]
    fn json_partial_uses_defaults() {
        let c = SchedulerConfig::from_json(r#"{ "workers": 3 }"#).unwrap();
        assert_eq!(c.workers, 3);
        assert_eq!(c.event_capacity, DEFAULT_EVENT_CAPACITY);
        assert_eq!(c.resolved_workers(), 3);
    }

    #[test]
    fn json_full() {
        let c = SchedulerConfig::from_json(
            r#"{ "workers": 2, "max_pending": 16, "event_capacity": 8 }"#,
        )
        .unwrap();
        assert_eq!(c.max_pending, Some(16));
        assert_eq!(c.event_capacity, 8);
    }

    #[test]
    fn json_rejects_unknown_fields() {
        assert!(matches!(
            SchedulerConfig::from_json(r#"{ "threads": 2 }"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn json_rejects_zero_pending() {
        assert!(matches!(
            SchedulerConfig::from_json(r#"{ "max_pending": 0 }"#),
            Err(ConfigError::ZeroPending)
        ));
    }

    #[test]
    fn parse_workers_values() {
        assert_eq!(parse_workers(None), None);
        assert_eq!(parse_workers(Some("8".into())), Some(8));
        assert_eq!(parse_workers(Some(" 2 ".into())), Some(2));
        assert_eq!(parse_workers(Some("0".into())), None);
        assert_eq!(parse_workers(Some("many".into())), None);
    }

    #[test]
    fn builder_helpers() {
        let c = SchedulerConfig::default().with_workers(2).with_max_pending(10);
        assert_eq!(c.workers, 2);
        assert_eq!(c.max_pending, Some(10));
    }
}
