//! Console application plugin
//!
//! Spawns a configured binary as the supervised target.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::process::{set_environ, ProcessHandle};
use crate::traits::Plugin;
use shared::{harness_debug, logging, Component};

/// Settings accepted under `plugin_config`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConsoleSettings {
    pub binary: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub environ: Option<Map<String, Value>>,
}

impl ConsoleSettings {
    /// Full argument vector: binary followed by its arguments
    pub fn command(&self) -> Vec<String> {
        std::iter::once(self.binary.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

pub struct ConsoleApplication {
    identifier: String,
    settings: ConsoleSettings,
    process: OnceLock<Arc<ProcessHandle>>,
}

impl ConsoleApplication {
    pub fn new(identifier: impl Into<String>, settings: ConsoleSettings) -> Self {
        Self {
            identifier: identifier.into(),
            settings,
            process: OnceLock::new(),
        }
    }

    pub fn from_config(identifier: &str, config: &Value) -> OrchestratorResult<Self> {
        let settings: ConsoleSettings = serde_json::from_value(config.clone())
            .map_err(|e| OrchestratorError::construction(identifier, e.to_string()))?;
        if settings.binary.trim().is_empty() {
            return Err(OrchestratorError::construction(identifier, "binary must not be empty"));
        }
        Ok(Self::new(identifier, settings))
    }

    pub fn settings(&self) -> &ConsoleSettings {
        &self.settings
    }
}

#[async_trait]
impl Plugin for ConsoleApplication {
    fn name(&self) -> String {
        self.identifier.clone()
    }

    async fn start(&mut self) -> OrchestratorResult<()> {
        if self.process.get().is_some() {
            return Err(OrchestratorError::plugin_start(&self.identifier, "already started"));
        }

        let env = set_environ(self.settings.environ.as_ref());
        harness_debug!(
            Component::Plugin(self.identifier.clone()),
            "Spawning with {} environment variable(s)",
            env.len()
        );
        let handle = ProcessHandle::open(&self.settings.command(), Some(env), self.settings.cwd.as_deref())
            .map_err(|e| OrchestratorError::plugin_start(&self.identifier, e.to_string()))?;

        self.process
            .set(Arc::new(handle))
            .map_err(|_| OrchestratorError::plugin_start(&self.identifier, "already started"))
    }

    fn process(&self) -> Option<Arc<ProcessHandle>> {
        self.process.get().cloned()
    }

    fn is_running(&self) -> bool {
        self.process.get().is_some_and(|process| process.is_running())
    }

    async fn stop(&self) -> OrchestratorResult<()> {
        let Some(process) = self.process.get() else {
            return Err(OrchestratorError::plugin_stop(&self.identifier, "not started"));
        };
        logging::log_shutdown(&Component::Plugin(self.identifier.clone()), "terminating target");
        process.stop();
        Ok(())
    }
}
