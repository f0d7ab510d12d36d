//! Main orchestrator implementation
//!
//! Drives one run: resolve and start the plugin, attach monitors and loggers,
//! block until the target exits, run the fault-detection pass and tear the
//! monitors down. `stop` only needs `&self`, so a signal handler can call it
//! while `run` is blocked on the target.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use shared::{harness_debug, harness_error, harness_info, harness_warn, logging, Component};

use crate::{
    config::RunConfiguration,
    detection::{self, DetectionSummary},
    error::{OrchestratorError, OrchestratorResult},
    process::{ExitStatus, ProcessHandle},
    registry::{MonitorContext, PluginFactory, PluginRegistry},
    state::RunPhase,
    traits::{Logger, Monitor, Plugin},
};

/// A monitor started by the orchestrator together with its background task
struct AttachedMonitor {
    identifier: String,
    monitor: Box<dyn Monitor>,
    /// Taken once the task has been joined or aborted
    task: Option<JoinHandle<()>>,
}

/// Drives a single supervised run
pub struct Orchestrator {
    config: RunConfiguration,
    registry: PluginRegistry,

    /// Current lifecycle phase, observable through `subscribe_phase`
    phase: watch::Sender<RunPhase>,

    /// Set by the first call to `run`; later calls are rejected untouched
    claimed: AtomicBool,

    /// Set once the plugin started successfully
    plugin: OnceLock<Arc<dyn Plugin>>,

    monitors: Mutex<Vec<AttachedMonitor>>,
    loggers: Mutex<Vec<Box<dyn Logger>>>,

    /// Parent of every monitor's cancellation token
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(config: RunConfiguration, registry: PluginRegistry) -> Self {
        let (phase, _) = watch::channel(RunPhase::Idle);
        Self {
            config,
            registry,
            phase,
            claimed: AtomicBool::new(false),
            plugin: OnceLock::new(),
            monitors: Mutex::new(Vec::new()),
            loggers: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Orchestrator over the built-in registry
    pub fn with_builtins(config: RunConfiguration) -> Self {
        Self::new(config, PluginRegistry::with_builtins())
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<RunPhase> {
        self.phase.subscribe()
    }

    pub fn plugin(&self) -> Option<Arc<dyn Plugin>> {
        self.plugin.get().cloned()
    }

    /// Identifiers of the monitors that were attached, in attachment order
    pub async fn monitor_identifiers(&self) -> Vec<String> {
        self.monitors
            .lock()
            .await
            .iter()
            .map(|attached| attached.identifier.clone())
            .collect()
    }

    pub async fn logger_count(&self) -> usize {
        self.loggers.lock().await.len()
    }

    /// Execute the run and return the target's exit status.
    ///
    /// Any failure before the target is being waited on aborts the run; a
    /// plugin that was already started is stopped on the way out. Only the
    /// first call runs: any other call, concurrent or later, fails with
    /// [`OrchestratorError::InvalidState`] and leaves the first run alone.
    pub async fn run(&self) -> OrchestratorResult<ExitStatus> {
        if self.claimed.swap(true, Ordering::SeqCst) {
            return Err(OrchestratorError::invalid_state(format!(
                "run already executed (phase: {})",
                self.phase()
            )));
        }

        let result = self.drive().await;

        if let Err(e) = &result {
            logging::log_error(&Component::Orchestrator, "Run", e);
            self.advance(RunPhase::Failed).ok();
            self.abort_plugin().await;
        }
        self.teardown_monitors().await;

        result
    }

    async fn drive(&self) -> OrchestratorResult<ExitStatus> {
        let identifier = self.config.plugin_identifier.as_str();
        let factory = self.registry.resolve_plugin(identifier)?;
        self.advance(RunPhase::PluginResolved)?;

        let process = self.start_plugin(identifier, &factory).await?;
        self.advance(RunPhase::PluginStarted)?;

        self.attach_monitors(&process).await?;
        self.advance(RunPhase::MonitorsAttached)?;

        self.attach_loggers().await?;
        self.advance(RunPhase::LoggersAttached)?;

        self.advance(RunPhase::Waiting)?;
        let status = process.wait(None).await;
        harness_info!(Component::Orchestrator, "Target process finished with {}", status);

        self.advance(RunPhase::FaultDetection)?;
        let summary = self.detect_faults().await?;
        harness_info!(
            Component::Orchestrator,
            "Fault detection complete: {} fault(s) from {} monitor(s), {} logger(s) committed",
            summary.faults,
            summary.monitors_visited,
            summary.loggers_committed
        );

        self.advance(RunPhase::Done)?;
        Ok(status)
    }

    async fn start_plugin(&self, identifier: &str, factory: &PluginFactory) -> OrchestratorResult<Arc<ProcessHandle>> {
        let mut plugin = factory(identifier, &self.config.plugin_config)
            .map_err(|e| OrchestratorError::plugin_start(identifier, e.to_string()))?;

        logging::log_startup(&Component::Plugin(identifier.to_string()), "plugin");
        plugin.start().await.map_err(|e| match e {
            e @ OrchestratorError::PluginStart { .. } => e,
            other => OrchestratorError::plugin_start(identifier, other.to_string()),
        })?;

        let process = plugin
            .process()
            .ok_or_else(|| OrchestratorError::plugin_start(identifier, "plugin started without a process"))?;

        self.plugin
            .set(Arc::from(plugin))
            .map_err(|_| OrchestratorError::invalid_state("plugin already started"))?;
        Ok(process)
    }

    /// Attach every configured monitor and its listeners to the target.
    ///
    /// Unknown monitor identifiers are reported and skipped.
    async fn attach_monitors(&self, process: &Arc<ProcessHandle>) -> OrchestratorResult<()> {
        let mut monitors = self.monitors.lock().await;

        for spec in &self.config.monitors {
            harness_info!(Component::Orchestrator, "Attaching monitor '{}'", spec.identifier);
            let kind = match self.registry.resolve_monitor(&spec.identifier) {
                Ok(kind) => kind,
                Err(e) => {
                    harness_warn!(Component::Orchestrator, "Unsupported monitor: {}", e);
                    continue;
                }
            };

            let context = MonitorContext {
                identifier: spec.identifier.clone(),
                process: process.clone(),
                drain_grace: self.config.settings.drain_grace(),
            };
            let mut monitor = kind.build(context, &spec.args)?;

            for listener_spec in &spec.listeners {
                harness_info!(Component::Orchestrator, "Attaching listener '{}'", listener_spec.identifier);
                let factory = self.registry.resolve_listener(&listener_spec.identifier)?;
                monitor.add_listener(factory(&listener_spec.identifier, &listener_spec.args)?);
            }

            let task = monitor.start(self.cancel.child_token())?;
            harness_debug!(
                Component::Monitor(spec.identifier.clone()),
                "Started as {} monitor",
                kind.label()
            );
            monitors.push(AttachedMonitor {
                identifier: spec.identifier.clone(),
                monitor,
                task: Some(task),
            });
        }

        Ok(())
    }

    async fn attach_loggers(&self) -> OrchestratorResult<()> {
        let mut loggers = self.loggers.lock().await;

        for spec in &self.config.loggers {
            harness_info!(Component::Orchestrator, "Attaching logger '{}'", spec.identifier);
            let factory = self.registry.resolve_logger(&spec.identifier)?;
            loggers.push(factory(&spec.identifier, &spec.kwargs)?);
        }

        Ok(())
    }

    async fn detect_faults(&self) -> OrchestratorResult<DetectionSummary> {
        let monitors = self.monitors.lock().await;
        let mut loggers = self.loggers.lock().await;

        let monitor_refs: Vec<&dyn Monitor> = monitors.iter().map(|attached| attached.monitor.as_ref()).collect();
        detection::run_pass(&monitor_refs, &mut loggers).await
    }

    /// Cancel every monitor and join them within the configured grace period
    async fn teardown_monitors(&self) {
        self.cancel.cancel();

        let grace = self.config.settings.monitor_grace();
        let deadline = tokio::time::Instant::now() + grace;
        let mut monitors = self.monitors.lock().await;

        for attached in monitors.iter_mut() {
            let Some(mut task) = attached.task.take() else {
                continue;
            };
            let component = Component::Monitor(attached.identifier.clone());
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(())) => {
                    harness_debug!(component, "Monitor stopped");
                }
                Ok(Err(e)) => {
                    harness_warn!(component, "Monitor task ended abnormally: {}", e);
                }
                Err(_) => {
                    harness_warn!(component, "Monitor did not stop within {:?}, aborting", grace);
                    task.abort();
                }
            }
        }
    }

    /// Best-effort stop of a started plugin after an aborted run
    async fn abort_plugin(&self) {
        let Some(plugin) = self.plugin.get() else {
            return;
        };
        if plugin.is_running() {
            if let Err(e) = plugin.stop().await {
                harness_error!(Component::Plugin(plugin.name()), "Failed to stop after aborted run: {}", e);
            }
        }
    }

    /// Ask the plugin to shut its target down.
    ///
    /// A no-op when the plugin never started or its process already exited.
    pub async fn stop(&self) -> OrchestratorResult<()> {
        let Some(plugin) = self.plugin.get() else {
            harness_info!(Component::Orchestrator, "Plugin did not start.");
            return Ok(());
        };

        if !plugin.is_running() {
            match plugin.process().and_then(|process| process.exit_status()) {
                Some(status) => {
                    harness_info!(Component::Orchestrator, "Plugin process exited prior with {}", status);
                }
                None => {
                    harness_info!(Component::Orchestrator, "Plugin is not running.");
                }
            }
            return Ok(());
        }

        logging::log_shutdown(&Component::Plugin(plugin.name()), "stop requested");
        plugin.stop().await.map_err(|e| match e {
            e @ OrchestratorError::PluginStop { .. } => e,
            other => OrchestratorError::plugin_stop(plugin.name(), other.to_string()),
        })
    }

    fn advance(&self, target: RunPhase) -> OrchestratorResult<()> {
        let current = self.phase();
        if !current.can_transition_to(target) {
            return Err(OrchestratorError::invalid_state(format!(
                "cannot move from {current} to {target}"
            )));
        }
        self.phase.send_replace(target);
        harness_debug!(Component::Orchestrator, "Phase {} -> {}", current, target);
        Ok(())
    }
}
