//! Orchestrator-specific error types

use shared::SharedError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Plugin initialization failed: unknown plugin '{identifier}'")]
    PluginResolution { identifier: String },

    #[error("Plugin '{plugin}' failed to start: {message}")]
    PluginStart { plugin: String, message: String },

    #[error("Plugin '{plugin}' failed to stop: {message}")]
    PluginStop { plugin: String, message: String },

    #[error("Unknown {capability} '{identifier}'")]
    Resolution { capability: String, identifier: String },

    #[error("Failed to construct '{identifier}': {message}")]
    Construction { identifier: String, message: String },

    #[error("Failed to spawn {command:?}: {source}")]
    Spawn {
        command: Vec<String>,
        #[source]
        source: std::io::Error,
    },

    #[error("Command {command:?} exited with code {code}")]
    CommandFailed { command: Vec<String>, code: i32 },

    #[error("Logger '{logger}' failed to commit: {message}")]
    LoggerCommit { logger: String, message: String },

    #[error("Configuration error: {field}")]
    ConfigurationError { field: String },

    #[error("Invalid run state: {message}")]
    InvalidState { message: String },

    #[error("Shared component error: {0}")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl OrchestratorError {
    pub fn config(field: impl Into<String>) -> Self {
        Self::ConfigurationError { field: field.into() }
    }

    pub fn resolution(capability: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::Resolution {
            capability: capability.into(),
            identifier: identifier.into(),
        }
    }

    pub fn construction(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Construction {
            identifier: identifier.into(),
            message: message.into(),
        }
    }

    pub fn plugin_start(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PluginStart {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    pub fn plugin_stop(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PluginStop {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState { message: message.into() }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
