//! Core shared types and identifiers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::SharedResult;

/// Label for the part of the harness a log line or record originates from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Component {
    /// The orchestrator control loop (singleton per run)
    Orchestrator,
    /// A plugin, by identifier
    Plugin(String),
    /// A monitor, by identifier
    Monitor(String),
    /// A listener, by identifier
    Listener(String),
    /// A logger, by identifier
    Logger(String),
    /// A supervised OS process, by pid
    Process(u32),
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Orchestrator => write!(f, "orchestrator"),
            Component::Plugin(name) => write!(f, "plugin:{name}"),
            Component::Monitor(name) => write!(f, "monitor:{name}"),
            Component::Listener(name) => write!(f, "listener:{name}"),
            Component::Logger(name) => write!(f, "logger:{name}"),
            Component::Process(pid) => write!(f, "process:{pid}"),
        }
    }
}

/// Fault data produced by a monitor and collected into logger buckets.
///
/// `details` is monitor specific; loggers treat it as opaque JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultRecord {
    pub id: Uuid,
    pub monitor: String,
    pub reason: String,
    pub detected_at: DateTime<Utc>,
    pub details: serde_json::Value,
}

impl FaultRecord {
    pub fn new(monitor: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            monitor: monitor.into(),
            reason: reason.into(),
            detected_at: Utc::now(),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn to_json_pretty(&self) -> SharedResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Events a monitor publishes to its listeners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum MonitorEvent {
    Started { pid: Option<u32> },
    Output { line: String },
    Fault(FaultRecord),
    Stopped,
}

impl MonitorEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorEvent::Started { .. } => "started",
            MonitorEvent::Output { .. } => "output",
            MonitorEvent::Fault(_) => "fault",
            MonitorEvent::Stopped => "stopped",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_display() {
        assert_eq!(Component::Orchestrator.to_string(), "orchestrator");
        assert_eq!(Component::Monitor("console".into()).to_string(), "monitor:console");
        assert_eq!(Component::Process(42).to_string(), "process:42");
    }

    #[test]
    fn test_fault_record_json() {
        let record = FaultRecord::new("monitors.exit", "terminated by signal 11")
            .with_details(serde_json::json!({ "signal": 11 }));

        let json = record.to_json_pretty().unwrap();
        let parsed: FaultRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, record);
        assert!(json.contains("\"signal\": 11"));
    }

    #[test]
    fn test_monitor_event_tagging() {
        let event = MonitorEvent::Output { line: "hello".into() };
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event"], "output");
        assert_eq!(json["data"]["line"], "hello");
        assert_eq!(event.kind(), "output");
    }
}
