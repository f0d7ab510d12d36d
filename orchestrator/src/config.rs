//! Run configuration consumed by the orchestrator
//!
//! The on-disk format is JSON. Only `plugin_identifier` is required; every
//! list defaults to empty.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{OrchestratorError, OrchestratorResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfiguration {
    pub plugin_identifier: String,
    #[serde(default)]
    pub plugin_config: Value,
    #[serde(default)]
    pub monitors: Vec<MonitorSpec>,
    #[serde(default)]
    pub loggers: Vec<LoggerSpec>,
    #[serde(default)]
    pub settings: HarnessSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSpec {
    pub identifier: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub listeners: Vec<ListenerSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerSpec {
    pub identifier: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggerSpec {
    pub identifier: String,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

/// Timing knobs of the harness itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessSettings {
    /// Total time monitors get to finish after cancellation at teardown
    pub monitor_grace_ms: u64,
    /// How long a console monitor waits for output to drain when queried
    pub drain_grace_ms: u64,
}

impl HarnessSettings {
    pub fn monitor_grace(&self) -> Duration {
        Duration::from_millis(self.monitor_grace_ms)
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            monitor_grace_ms: 2000,
            drain_grace_ms: 1000,
        }
    }
}

impl RunConfiguration {
    /// Configuration for `plugin_identifier` with no monitors or loggers
    pub fn new(plugin_identifier: impl Into<String>, plugin_config: Value) -> Self {
        Self {
            plugin_identifier: plugin_identifier.into(),
            plugin_config,
            monitors: Vec::new(),
            loggers: Vec::new(),
            settings: HarnessSettings::default(),
        }
    }

    pub fn with_monitor(mut self, spec: MonitorSpec) -> Self {
        self.monitors.push(spec);
        self
    }

    pub fn with_logger(mut self, spec: LoggerSpec) -> Self {
        self.loggers.push(spec);
        self
    }

    pub fn with_settings(mut self, settings: HarnessSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn from_json(json: &str) -> OrchestratorResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: &Path) -> OrchestratorResult<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }

    fn validate(&self) -> OrchestratorResult<()> {
        if self.plugin_identifier.trim().is_empty() {
            return Err(OrchestratorError::config("plugin_identifier must not be empty"));
        }
        for (index, monitor) in self.monitors.iter().enumerate() {
            if monitor.identifier.trim().is_empty() {
                return Err(OrchestratorError::config(format!("monitors[{index}].identifier must not be empty")));
            }
            for (listener_index, listener) in monitor.listeners.iter().enumerate() {
                if listener.identifier.trim().is_empty() {
                    return Err(OrchestratorError::config(format!(
                        "monitors[{index}].listeners[{listener_index}].identifier must not be empty"
                    )));
                }
            }
        }
        for (index, logger) in self.loggers.iter().enumerate() {
            if logger.identifier.trim().is_empty() {
                return Err(OrchestratorError::config(format!("loggers[{index}].identifier must not be empty")));
            }
        }
        Ok(())
    }
}

impl MonitorSpec {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            args: Vec::new(),
            listeners: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_listener(mut self, listener: ListenerSpec) -> Self {
        self.listeners.push(listener);
        self
    }
}

impl ListenerSpec {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            args: Vec::new(),
        }
    }
}

impl LoggerSpec {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            kwargs: Map::new(),
        }
    }

    pub fn with_kwarg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.kwargs.insert(key.into(), value);
        self
    }
}
