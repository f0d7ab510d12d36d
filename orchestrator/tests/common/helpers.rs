//! Scripted collaborators and builder patterns for orchestrator tests
//!
//! The scripted monitor and journal logger append to a shared [`Journal`]
//! so tests can assert on the exact order the orchestrator drove them in.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ::orchestrator::traits::MockPlugin;
use ::orchestrator::{
    ExitStatus, Listener, Logger, LoggerSpec, Monitor, MonitorSpec, Orchestrator, OrchestratorError,
    OrchestratorResult, Plugin, PluginRegistry, RunConfiguration,
};
use shared::FaultRecord;

use super::fixtures::TestFixtures;

/// Ordered record of collaborator calls
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Index of the first entry starting with `prefix`
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.entries().iter().position(|entry| entry.starts_with(prefix))
    }

    /// Index of the last entry starting with `prefix`
    pub fn last_position(&self, prefix: &str) -> Option<usize> {
        self.entries().iter().rposition(|entry| entry.starts_with(prefix))
    }
}

/// Monitor whose verdict is fixed at construction; its task idles until cancelled
pub struct ScriptedMonitor {
    name: String,
    fault: bool,
    journal: Journal,
}

#[async_trait]
impl Monitor for ScriptedMonitor {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn add_listener(&mut self, listener: Box<dyn Listener>) {
        self.journal.push(format!("listener:{}:{}", self.name, listener.name()));
    }

    fn start(&mut self, cancel: CancellationToken) -> OrchestratorResult<JoinHandle<()>> {
        self.journal.push(format!("start:{}", self.name));
        Ok(tokio::spawn(async move { cancel.cancelled().await }))
    }

    async fn detected_fault(&self) -> bool {
        self.journal.push(format!("detect:{}", self.name));
        self.fault
    }

    async fn get_data(&self) -> FaultRecord {
        self.journal.push(format!("data:{}", self.name));
        FaultRecord::new(self.name.clone(), "scripted fault")
    }
}

/// Monitor whose task ignores cancellation
pub struct StuckMonitor;

#[async_trait]
impl Monitor for StuckMonitor {
    fn name(&self) -> String {
        TestFixtures::STUCK_MONITOR.to_string()
    }

    fn add_listener(&mut self, _listener: Box<dyn Listener>) {}

    fn start(&mut self, _cancel: CancellationToken) -> OrchestratorResult<JoinHandle<()>> {
        Ok(tokio::spawn(tokio::time::sleep(Duration::from_secs(3600))))
    }

    async fn detected_fault(&self) -> bool {
        false
    }

    async fn get_data(&self) -> FaultRecord {
        FaultRecord::new(self.name(), "never")
    }
}

/// Logger that journals every bucket and commit; optionally fails to commit
pub struct JournalLogger {
    name: String,
    fail_commit: bool,
    journal: Journal,
}

#[async_trait]
impl Logger for JournalLogger {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn add_to_bucket(&mut self, record: FaultRecord) {
        self.journal.push(format!("bucket:{}:{}", self.name, record.monitor));
    }

    async fn add_fault(&mut self) -> OrchestratorResult<()> {
        self.journal.push(format!("commit:{}", self.name));
        if self.fail_commit {
            return Err(OrchestratorError::LoggerCommit {
                logger: self.name.clone(),
                message: "scripted failure".to_string(),
            });
        }
        Ok(())
    }
}

/// Helper functions for common test scenarios
pub struct TestHelpers;

impl TestHelpers {
    /// Built-in registry plus the scripted collaborators, all journaling into `journal`.
    ///
    /// Any identifier starting with `monitors.fake` is a scripted monitor; its
    /// first argument is its verdict. Any identifier starting with
    /// `loggers.journal` is a journal logger; `{"fail": true}` makes it fail.
    pub fn registry(journal: &Journal, monitors: &[&str], loggers: &[&str]) -> PluginRegistry {
        let mut registry = PluginRegistry::with_builtins().with_monitor_factory(TestFixtures::STUCK_MONITOR, |_, _| {
            Ok(Box::new(StuckMonitor) as Box<dyn Monitor>)
        });

        for identifier in monitors {
            let journal = journal.clone();
            registry = registry.with_monitor_factory(*identifier, move |context, args| {
                Ok(Box::new(ScriptedMonitor {
                    name: context.identifier,
                    fault: args.first().and_then(Value::as_bool).unwrap_or(false),
                    journal: journal.clone(),
                }) as Box<dyn Monitor>)
            });
        }
        for identifier in loggers {
            let journal = journal.clone();
            registry = registry.with_logger(*identifier, move |name, kwargs| {
                Ok(Box::new(JournalLogger {
                    name: name.to_string(),
                    fail_commit: kwargs.get("fail").and_then(Value::as_bool).unwrap_or(false),
                    journal: journal.clone(),
                }) as Box<dyn Logger>)
            });
        }
        registry
    }

    /// Registry whose only plugin fails in `start`
    pub fn failing_plugin_registry(journal: &Journal) -> PluginRegistry {
        Self::registry(journal, &[TestFixtures::FAKE_MONITOR], &[TestFixtures::JOURNAL_LOGGER]).with_plugin(
            "plugins.broken",
            |name, _| {
                let name = name.to_string();
                let mut plugin = MockPlugin::new();
                plugin.expect_name().return_const(name.clone());
                plugin
                    .expect_start()
                    .times(1)
                    .returning(move || Err(OrchestratorError::plugin_start(name.clone(), "refused")));
                plugin.expect_process().never();
                Ok(Box::new(plugin) as Box<dyn Plugin>)
            },
        )
    }

    /// Run with a hard timeout so a hung run fails the test instead of the suite
    pub async fn run_bounded(orchestrator: &Orchestrator) -> OrchestratorResult<ExitStatus> {
        tokio::time::timeout(TestFixtures::RUN_TIMEOUT, orchestrator.run())
            .await
            .expect("run did not complete in time")
    }
}

/// Builder for orchestrators over the test registry
pub struct OrchestratorBuilder {
    config: RunConfiguration,
    registry: Option<PluginRegistry>,
    journal: Journal,
}

impl OrchestratorBuilder {
    /// Orchestrator running `script` through the console plugin
    pub fn new(script: &str) -> Self {
        Self::with_plugin(TestFixtures::PLUGIN, TestFixtures::shell(script))
    }

    pub fn with_plugin(identifier: &str, plugin_config: Value) -> Self {
        Self {
            config: RunConfiguration::new(identifier, plugin_config).with_settings(TestFixtures::fast_settings()),
            registry: None,
            journal: Journal::default(),
        }
    }

    pub fn monitor(mut self, identifier: &str, args: Vec<Value>) -> Self {
        self.config = self.config.with_monitor(MonitorSpec::new(identifier).with_args(args));
        self
    }

    pub fn monitor_spec(mut self, spec: MonitorSpec) -> Self {
        self.config = self.config.with_monitor(spec);
        self
    }

    pub fn logger(mut self, identifier: &str, kwargs: Map<String, Value>) -> Self {
        let mut spec = LoggerSpec::new(identifier);
        spec.kwargs = kwargs;
        self.config = self.config.with_logger(spec);
        self
    }

    pub fn registry(mut self, registry: PluginRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    /// Build against the supplied registry, or one that knows every
    /// `monitors.fake*` and `loggers.journal*` identifier in the configuration
    pub fn build(self) -> (Orchestrator, Journal) {
        let registry = match self.registry {
            Some(registry) => registry,
            None => {
                let monitors: Vec<&str> = self
                    .config
                    .monitors
                    .iter()
                    .map(|spec| spec.identifier.as_str())
                    .filter(|id| id.starts_with(TestFixtures::FAKE_MONITOR))
                    .collect();
                let loggers: Vec<&str> = self
                    .config
                    .loggers
                    .iter()
                    .map(|spec| spec.identifier.as_str())
                    .filter(|id| id.starts_with(TestFixtures::JOURNAL_LOGGER))
                    .collect();
                TestHelpers::registry(&self.journal, &monitors, &loggers)
            }
        };
        (Orchestrator::new(self.config, registry), self.journal)
    }
}
