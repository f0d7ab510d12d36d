//! Listener that writes monitor events to the harness log

use async_trait::async_trait;
use serde_json::Value;
use tracing::Level;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::traits::Listener;
use shared::{harness_debug, harness_info, harness_warn, Component, MonitorEvent};

pub struct LogListener {
    identifier: String,
    level: Level,
}

impl LogListener {
    pub fn new(identifier: impl Into<String>, level: Level) -> Self {
        Self {
            identifier: identifier.into(),
            level,
        }
    }

    /// Optional first argument: `info` (the default) or `debug`
    pub fn from_args(identifier: &str, args: &[Value]) -> OrchestratorResult<Self> {
        let level = match args.first() {
            None => Level::INFO,
            Some(Value::String(name)) => match name.to_ascii_lowercase().as_str() {
                "info" => Level::INFO,
                "debug" => Level::DEBUG,
                _ => {
                    return Err(OrchestratorError::construction(
                        identifier,
                        format!("unsupported level '{name}', expected 'info' or 'debug'"),
                    ))
                }
            },
            Some(other) => {
                return Err(OrchestratorError::construction(
                    identifier,
                    format!("level must be a string, got {other}"),
                ))
            }
        };
        Ok(Self::new(identifier, level))
    }

    pub fn level(&self) -> Level {
        self.level
    }
}

#[async_trait]
impl Listener for LogListener {
    fn name(&self) -> String {
        self.identifier.clone()
    }

    async fn on_event(&self, event: &MonitorEvent) {
        let component = Component::Listener(self.identifier.clone());
        match event {
            MonitorEvent::Started { pid } => {
                harness_info!(component, "Monitor started (pid {:?})", pid);
            }
            MonitorEvent::Output { line } => {
                if self.level == Level::DEBUG {
                    harness_debug!(component, "| {}", line);
                } else {
                    harness_info!(component, "| {}", line);
                }
            }
            MonitorEvent::Fault(record) => {
                harness_warn!(component, "🐞 {} reported: {}", record.monitor, record.reason);
            }
            MonitorEvent::Stopped => {
                harness_debug!(component, "Monitor stopped");
            }
        }
    }
}
