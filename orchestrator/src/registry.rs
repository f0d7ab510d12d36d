//! Lookup table from symbolic identifiers to constructible implementations
//!
//! Identifiers such as `"monitors.console"` are resolved at run time against
//! factories registered when the registry is built. Monitors resolve to a
//! [`MonitorKind`]; everything else resolves straight to a factory.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::process::ProcessHandle;
use crate::services::{ConsoleApplication, ConsoleLogger, ConsoleMonitor, ExitMonitor, FileLogger, LogListener};
use crate::traits::{Listener, Logger, Monitor, Plugin};

pub type PluginFactory = Arc<dyn Fn(&str, &Value) -> OrchestratorResult<Box<dyn Plugin>> + Send + Sync>;
pub type MonitorFactory = Arc<dyn Fn(MonitorContext, &[Value]) -> OrchestratorResult<Box<dyn Monitor>> + Send + Sync>;
pub type ListenerFactory = Arc<dyn Fn(&str, &[Value]) -> OrchestratorResult<Box<dyn Listener>> + Send + Sync>;
pub type LoggerFactory = Arc<dyn Fn(&str, &Map<String, Value>) -> OrchestratorResult<Box<dyn Logger>> + Send + Sync>;

/// What a monitor is constructed against
#[derive(Debug, Clone)]
pub struct MonitorContext {
    /// Identifier the monitor was resolved from
    pub identifier: String,
    /// The running target process
    pub process: Arc<ProcessHandle>,
    /// How long a monitor may wait for output to drain when queried
    pub drain_grace: Duration,
}

/// The supported monitor variants
#[derive(Clone)]
pub enum MonitorKind {
    /// Scans the merged console output for fault patterns
    Console,
    /// Classifies the target's exit status
    Exit,
    /// Externally registered implementation
    Custom(MonitorFactory),
}

impl MonitorKind {
    pub fn label(&self) -> &'static str {
        match self {
            MonitorKind::Console => "ConsoleMonitor",
            MonitorKind::Exit => "ExitMonitor",
            MonitorKind::Custom(_) => "custom",
        }
    }

    pub fn build(&self, context: MonitorContext, args: &[Value]) -> OrchestratorResult<Box<dyn Monitor>> {
        match self {
            MonitorKind::Console => Ok(Box::new(ConsoleMonitor::from_args(context, args)?)),
            MonitorKind::Exit => Ok(Box::new(ExitMonitor::from_args(context, args)?)),
            MonitorKind::Custom(factory) => factory(context, args),
        }
    }
}

impl fmt::Debug for MonitorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The capability an identifier is expected to provide
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    Plugin,
    Monitor,
    Listener,
    Logger,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Plugin => write!(f, "plugin"),
            Capability::Monitor => write!(f, "monitor"),
            Capability::Listener => write!(f, "listener"),
            Capability::Logger => write!(f, "logger"),
        }
    }
}

#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, PluginFactory>,
    monitors: HashMap<String, MonitorKind>,
    listeners: HashMap<String, ListenerFactory>,
    loggers: HashMap<String, LoggerFactory>,
}

impl PluginRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in implementation, under its dotted
    /// identifier and its type name
    pub fn with_builtins() -> Self {
        Self::new()
            .with_plugin_aliases(&["plugins.console", "ConsoleApplication"], |identifier, config| {
                Ok(Box::new(ConsoleApplication::from_config(identifier, config)?))
            })
            .with_monitor_aliases(&["monitors.console", "ConsoleMonitor"], MonitorKind::Console)
            .with_monitor_aliases(&["monitors.exit", "ExitMonitor"], MonitorKind::Exit)
            .with_listener_aliases(&["listeners.log", "LogListener"], |identifier, args| {
                Ok(Box::new(LogListener::from_args(identifier, args)?))
            })
            .with_logger_aliases(&["loggers.file", "FileLogger"], |identifier, kwargs| {
                Ok(Box::new(FileLogger::from_kwargs(identifier, kwargs)?))
            })
            .with_logger_aliases(&["loggers.console", "ConsoleLogger"], |identifier, _| {
                Ok(Box::new(ConsoleLogger::new(identifier)))
            })
    }

    pub fn with_plugin<F>(mut self, identifier: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&str, &Value) -> OrchestratorResult<Box<dyn Plugin>> + Send + Sync + 'static,
    {
        self.plugins.insert(identifier.into(), Arc::new(factory));
        self
    }

    pub fn with_monitor(mut self, identifier: impl Into<String>, kind: MonitorKind) -> Self {
        self.monitors.insert(identifier.into(), kind);
        self
    }

    /// Register a custom monitor implementation
    pub fn with_monitor_factory<F>(self, identifier: impl Into<String>, factory: F) -> Self
    where
        F: Fn(MonitorContext, &[Value]) -> OrchestratorResult<Box<dyn Monitor>> + Send + Sync + 'static,
    {
        self.with_monitor(identifier, MonitorKind::Custom(Arc::new(factory)))
    }

    pub fn with_listener<F>(mut self, identifier: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&str, &[Value]) -> OrchestratorResult<Box<dyn Listener>> + Send + Sync + 'static,
    {
        self.listeners.insert(identifier.into(), Arc::new(factory));
        self
    }

    pub fn with_logger<F>(mut self, identifier: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&str, &Map<String, Value>) -> OrchestratorResult<Box<dyn Logger>> + Send + Sync + 'static,
    {
        self.loggers.insert(identifier.into(), Arc::new(factory));
        self
    }

    fn with_plugin_aliases<F>(mut self, identifiers: &[&str], factory: F) -> Self
    where
        F: Fn(&str, &Value) -> OrchestratorResult<Box<dyn Plugin>> + Send + Sync + 'static,
    {
        let factory: PluginFactory = Arc::new(factory);
        for identifier in identifiers {
            self.plugins.insert(identifier.to_string(), factory.clone());
        }
        self
    }

    fn with_monitor_aliases(mut self, identifiers: &[&str], kind: MonitorKind) -> Self {
        for identifier in identifiers {
            self.monitors.insert(identifier.to_string(), kind.clone());
        }
        self
    }

    fn with_listener_aliases<F>(mut self, identifiers: &[&str], factory: F) -> Self
    where
        F: Fn(&str, &[Value]) -> OrchestratorResult<Box<dyn Listener>> + Send + Sync + 'static,
    {
        let factory: ListenerFactory = Arc::new(factory);
        for identifier in identifiers {
            self.listeners.insert(identifier.to_string(), factory.clone());
        }
        self
    }

    fn with_logger_aliases<F>(mut self, identifiers: &[&str], factory: F) -> Self
    where
        F: Fn(&str, &Map<String, Value>) -> OrchestratorResult<Box<dyn Logger>> + Send + Sync + 'static,
    {
        let factory: LoggerFactory = Arc::new(factory);
        for identifier in identifiers {
            self.loggers.insert(identifier.to_string(), factory.clone());
        }
        self
    }

    pub fn resolve_plugin(&self, identifier: &str) -> OrchestratorResult<PluginFactory> {
        self.plugins
            .get(identifier)
            .cloned()
            .ok_or_else(|| OrchestratorError::PluginResolution {
                identifier: identifier.to_string(),
            })
    }

    pub fn resolve_monitor(&self, identifier: &str) -> OrchestratorResult<MonitorKind> {
        self.monitors
            .get(identifier)
            .cloned()
            .ok_or_else(|| OrchestratorError::resolution(Capability::Monitor.to_string(), identifier))
    }

    pub fn resolve_listener(&self, identifier: &str) -> OrchestratorResult<ListenerFactory> {
        self.listeners
            .get(identifier)
            .cloned()
            .ok_or_else(|| OrchestratorError::resolution(Capability::Listener.to_string(), identifier))
    }

    pub fn resolve_logger(&self, identifier: &str) -> OrchestratorResult<LoggerFactory> {
        self.loggers
            .get(identifier)
            .cloned()
            .ok_or_else(|| OrchestratorError::resolution(Capability::Logger.to_string(), identifier))
    }

    /// Every registered identifier, sorted by capability then name
    pub fn identifiers(&self) -> Vec<(Capability, String)> {
        let mut all: Vec<(Capability, String)> = self
            .plugins
            .keys()
            .map(|id| (Capability::Plugin, id.clone()))
            .chain(self.monitors.keys().map(|id| (Capability::Monitor, id.clone())))
            .chain(self.listeners.keys().map(|id| (Capability::Listener, id.clone())))
            .chain(self.loggers.keys().map(|id| (Capability::Logger, id.clone())))
            .collect();
        all.sort();
        all
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("identifiers", &self.identifiers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_resolve_by_both_names() {
        let registry = PluginRegistry::with_builtins();

        assert!(registry.resolve_plugin("plugins.console").is_ok());
        assert!(registry.resolve_plugin("ConsoleApplication").is_ok());
        assert!(matches!(registry.resolve_monitor("monitors.console"), Ok(MonitorKind::Console)));
        assert!(matches!(registry.resolve_monitor("ExitMonitor"), Ok(MonitorKind::Exit)));
        assert!(registry.resolve_listener("listeners.log").is_ok());
        assert!(registry.resolve_logger("loggers.file").is_ok());
        assert!(registry.resolve_logger("ConsoleLogger").is_ok());
    }

    #[test]
    fn test_unknown_plugin_names_identifier() {
        let registry = PluginRegistry::with_builtins();

        let err = match registry.resolve_plugin("plugins.missing") {
            Err(err) => err,
            Ok(_) => panic!("plugins.missing should not resolve"),
        };

        assert!(matches!(err, OrchestratorError::PluginResolution { .. }));
        assert!(err.to_string().contains("plugins.missing"));
    }

    #[test]
    fn test_unknown_monitor_is_resolution_error() {
        let registry = PluginRegistry::with_builtins();

        let err = registry.resolve_monitor("bogus").unwrap_err();

        assert_eq!(err.to_string(), "Unknown monitor 'bogus'");
    }

    #[test]
    fn test_identifiers_sorted_by_capability() {
        let registry = PluginRegistry::new()
            .with_logger("loggers.b", |name, _| Ok(Box::new(ConsoleLogger::new(name))))
            .with_monitor("monitors.a", MonitorKind::Exit)
            .with_logger("loggers.a", |name, _| Ok(Box::new(ConsoleLogger::new(name))));

        let ids = registry.identifiers();

        assert_eq!(
            ids,
            vec![
                (Capability::Monitor, "monitors.a".to_string()),
                (Capability::Logger, "loggers.a".to_string()),
                (Capability::Logger, "loggers.b".to_string()),
            ]
        );
    }
}
