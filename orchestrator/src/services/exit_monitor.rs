//! Exit status monitor
//!
//! Classifies how the target ended. Death by signal is a fault unless the
//! harness itself asked the process to stop; configured exit codes are
//! faults as well.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::process::{ExitStatus, ProcessHandle};
use crate::registry::MonitorContext;
use crate::traits::{notify_listeners, Listener, Monitor};
use shared::{harness_debug, harness_warn, Component, FaultRecord, MonitorEvent};

pub struct ExitMonitor {
    identifier: String,
    process: Arc<ProcessHandle>,
    fault_codes: Vec<i32>,
    listeners: Vec<Box<dyn Listener>>,
    verdict: Arc<OnceLock<Option<FaultRecord>>>,
    drain_grace: Duration,
    started: bool,
}

impl ExitMonitor {
    pub fn new(context: MonitorContext, fault_codes: Vec<i32>) -> Self {
        Self {
            identifier: context.identifier,
            process: context.process,
            fault_codes,
            listeners: Vec::new(),
            verdict: Arc::new(OnceLock::new()),
            drain_grace: context.drain_grace,
            started: false,
        }
    }

    /// Arguments are exit codes, given either inline or as one list
    pub fn from_args(context: MonitorContext, args: &[Value]) -> OrchestratorResult<Self> {
        let values: Vec<&Value> = match args {
            [Value::Array(codes)] => codes.iter().collect(),
            args => args.iter().collect(),
        };

        let fault_codes = values
            .into_iter()
            .map(|value| {
                value
                    .as_i64()
                    .and_then(|code| i32::try_from(code).ok())
                    .ok_or_else(|| {
                        OrchestratorError::construction(&context.identifier, format!("invalid exit code {value}"))
                    })
            })
            .collect::<OrchestratorResult<Vec<_>>>()?;

        Ok(Self::new(context, fault_codes))
    }

    pub fn fault_codes(&self) -> &[i32] {
        &self.fault_codes
    }

    fn component(&self) -> Component {
        Component::Monitor(self.identifier.clone())
    }

    /// Settle the verdict once the exit status is known
    fn verdict(&self) -> Option<&Option<FaultRecord>> {
        if let Some(verdict) = self.verdict.get() {
            return Some(verdict);
        }
        let status = self.process.exit_status()?;
        Some(self.verdict.get_or_init(|| {
            classify(&self.identifier, status, self.process.stop_requested(), &self.fault_codes)
        }))
    }
}

/// Fault record for `status`, if it counts as a fault
fn classify(identifier: &str, status: ExitStatus, stop_requested: bool, fault_codes: &[i32]) -> Option<FaultRecord> {
    let reason = match status {
        ExitStatus::Signaled(_) if stop_requested => return None,
        ExitStatus::Signaled(_) => format!("target {status}"),
        ExitStatus::Exited(code) if fault_codes.contains(&code) => format!("target exited with fault code {code}"),
        ExitStatus::Exited(_) | ExitStatus::Unknown => return None,
    };

    Some(FaultRecord::new(identifier, reason).with_details(json!({
        "exit_code": status.code(),
        "signal": status.signal(),
    })))
}

#[async_trait]
impl Monitor for ExitMonitor {
    fn name(&self) -> String {
        self.identifier.clone()
    }

    fn add_listener(&mut self, listener: Box<dyn Listener>) {
        if self.started {
            harness_warn!(self.component(), "Listener '{}' added after start is ignored", listener.name());
            return;
        }
        self.listeners.push(listener);
    }

    fn start(&mut self, cancel: CancellationToken) -> OrchestratorResult<JoinHandle<()>> {
        if self.started {
            return Err(OrchestratorError::invalid_state(format!("monitor '{}' already started", self.identifier)));
        }
        self.started = true;

        let component = self.component();
        let identifier = self.identifier.clone();
        let process = self.process.clone();
        let fault_codes = self.fault_codes.clone();
        let verdict = self.verdict.clone();
        let listeners = std::mem::take(&mut self.listeners);

        Ok(tokio::spawn(async move {
            notify_listeners(&listeners, &MonitorEvent::Started { pid: process.pid() }).await;

            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                status = process.wait(None) => Some(status),
            };

            if let Some(status) = status {
                harness_debug!(component, "Observed {}", status);
                let record = verdict.get_or_init(|| classify(&identifier, status, process.stop_requested(), &fault_codes));
                if let Some(record) = record {
                    notify_listeners(&listeners, &MonitorEvent::Fault(record.clone())).await;
                }
            }

            notify_listeners(&listeners, &MonitorEvent::Stopped).await;
        }))
    }

    async fn detected_fault(&self) -> bool {
        if self.process.is_running() {
            let waited = tokio::time::timeout(self.drain_grace, self.process.wait(None)).await;
            if waited.is_err() {
                harness_warn!(self.component(), "Target still running, no exit status to classify");
            }
        }
        matches!(self.verdict(), Some(Some(_)))
    }

    async fn get_data(&self) -> FaultRecord {
        match self.verdict() {
            Some(Some(record)) => record.clone(),
            _ => FaultRecord::new(self.identifier.clone(), "no fault detected"),
        }
    }
}
