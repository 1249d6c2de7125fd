/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Engine configuration, loadable from a JSON file.
//!
//! ```
//! use backflow::config::EngineConfig;
//!
//! let config = EngineConfig::from_json_str(
//!     r#"{ "scheduler": { "worker_threads": 2 }, "push": { "queue_capacity": 256 } }"#,
//! )
//! .unwrap();
//! assert_eq!(config.scheduler.worker_threads, 2);
//! assert_eq!(config.push.queue_capacity, Some(256));
//! assert_eq!(config.multicast.replay_capacity, None);
//! ```

use crate::multicast::{ConnectPolicy, DisconnectPolicy};
use serde::Deserialize;
use std::fs::{self, canonicalize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_WORKER_THREADS: usize = 10;
pub const DEFAULT_THREAD_NAME: &str = "backflow-worker";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {path:?}")]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to read config file: {path:?}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to parse config JSON")]
    Malformed(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub push: PushConfig,
    pub multicast: MulticastConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub worker_threads: usize,
    pub thread_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: DEFAULT_WORKER_THREADS,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

/// Queue policy for push sources. `None` means unbounded.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct PushConfig {
    pub queue_capacity: Option<usize>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct MulticastConfig {
    /// `None` disables replay, `Some(0)` is treated the same way.
    pub replay_capacity: Option<usize>,
    /// Keeps every item ever seen; overrides `replay_capacity`.
    pub replay_unbounded: bool,
    pub connect: ConnectPolicy,
    pub disconnect: DisconnectPolicy,
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config_file = PathBuf::from(path.as_ref());
        debug!("config_file: {config_file:?}");

        let canonical = canonicalize(&config_file).map_err(|source| ConfigError::NotFound {
            path: config_file.clone(),
            source,
        })?;
        debug!("canonicalize: {canonical:?}");

        let data = fs::read_to_string(&canonical).map_err(|source| ConfigError::Unreadable {
            path: canonical.clone(),
            source,
        })?;

        Self::from_json_str(&data)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.worker_threads == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.worker_threads must be at least 1".to_string(),
            ));
        }
        if self.push.queue_capacity == Some(0) {
            return Err(ConfigError::Invalid(
                "push.queue_capacity must be at least 1 when set".to_string(),
            ));
        }
        if let ConnectPolicy::Threshold(0) = self.multicast.connect {
            return Err(ConfigError::Invalid(
                "multicast.connect threshold must be at least 1; use \"eager\" instead".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, EngineConfig, DEFAULT_WORKER_THREADS};
    use crate::multicast::{ConnectPolicy, DisconnectPolicy};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static TEST_FILE_COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn write_config(contents: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        let counter = TEST_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
        path.push(format!(
            "backflow-config-test-{}-{}.json",
            std::process::id(),
            counter
        ));

        fs::write(&path, contents).expect("config written");
        path
    }

    #[test]
    fn empty_object_yields_defaults() {
        let config = EngineConfig::from_json_str("{}").expect("defaults parse");

        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.scheduler.worker_threads, DEFAULT_WORKER_THREADS);
        assert_eq!(config.multicast.connect, ConnectPolicy::Threshold(1));
        assert_eq!(config.multicast.disconnect, DisconnectPolicy::Never);
    }

    #[test]
    fn multicast_policies_parse_from_snake_case() {
        let config = EngineConfig::from_json_str(
            r#"{ "multicast": { "replay_capacity": 2, "connect": "eager", "disconnect": "on_zero_subscribers" } }"#,
        )
        .expect("valid config");

        assert_eq!(config.multicast.replay_capacity, Some(2));
        assert_eq!(config.multicast.connect, ConnectPolicy::Eager);
        assert_eq!(
            config.multicast.disconnect,
            DisconnectPolicy::OnZeroSubscribers
        );

        let threshold = EngineConfig::from_json_str(r#"{ "multicast": { "connect": { "threshold": 3 } } }"#)
            .expect("threshold config");
        assert_eq!(threshold.multicast.connect, ConnectPolicy::Threshold(3));
    }

    #[test]
    fn zero_worker_threads_is_rejected() {
        let result = EngineConfig::from_json_str(r#"{ "scheduler": { "worker_threads": 0 } }"#);

        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_file_reports_not_found() {
        let result = EngineConfig::from_json_file("/definitely/not/here/backflow.json");

        assert!(matches!(result, Err(ConfigError::NotFound { .. })));
    }

    #[test]
    fn loads_from_file() {
        let path = write_config(r#"{ "push": { "queue_capacity": 8 } }"#);

        let config = EngineConfig::from_json_file(&path).expect("config loads");
        fs::remove_file(&path).expect("remove config file");

        assert_eq!(config.push.queue_capacity, Some(8));
    }
}
