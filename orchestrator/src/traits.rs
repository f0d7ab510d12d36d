//! Collaborator contracts with mockall annotations for testing
//!
//! The orchestrator only ever talks to plugins, monitors, listeners and
//! loggers through these traits. Built-in implementations live in
//! [`crate::services`]; embedders register their own through
//! [`crate::registry::PluginRegistry`].

use std::sync::Arc;

use shared::{FaultRecord, MonitorEvent};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::OrchestratorResult;
use crate::process::ProcessHandle;

/// The supervised target: owns exactly one process once started
#[mockall::automock]
#[async_trait::async_trait]
pub trait Plugin: Send + Sync {
    /// Identifier the plugin was resolved from
    fn name(&self) -> String;

    /// Spawn the target process. Failure aborts the run.
    async fn start(&mut self) -> OrchestratorResult<()>;

    /// The process created by `start`, if any
    fn process(&self) -> Option<Arc<ProcessHandle>>;

    fn is_running(&self) -> bool;

    /// Shut the target down. Failure is unrecoverable for the run.
    async fn stop(&self) -> OrchestratorResult<()>;
}

/// Background observer of a running target.
///
/// By the time the target's process has exited and the orchestrator asks
/// `detected_fault`, the answer must account for everything the process did
/// while alive; the orchestrator does not join the monitor first.
#[mockall::automock]
#[async_trait::async_trait]
pub trait Monitor: Send + Sync {
    fn name(&self) -> String;

    fn add_listener(&mut self, listener: Box<dyn Listener>);

    /// Start observing in a background task.
    ///
    /// The task must finish promptly once `cancel` fires.
    fn start(&mut self, cancel: CancellationToken) -> OrchestratorResult<JoinHandle<()>>;

    async fn detected_fault(&self) -> bool;

    async fn get_data(&self) -> FaultRecord;
}

/// Observer attached to a single monitor
#[mockall::automock]
#[async_trait::async_trait]
pub trait Listener: Send + Sync {
    fn name(&self) -> String;

    async fn on_event(&self, event: &MonitorEvent);
}

/// Sink that buckets fault records and commits them once per run
#[mockall::automock]
#[async_trait::async_trait]
pub trait Logger: Send + Sync {
    fn name(&self) -> String;

    async fn add_to_bucket(&mut self, record: FaultRecord);

    /// Commit everything bucketed during the run
    async fn add_fault(&mut self) -> OrchestratorResult<()>;
}

/// Deliver `event` to every listener in attachment order
pub async fn notify_listeners(listeners: &[Box<dyn Listener>], event: &MonitorEvent) {
    for listener in listeners {
        listener.on_event(event).await;
    }
}
