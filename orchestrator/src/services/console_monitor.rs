//! Console output monitor
//!
//! Reads the merged stdout/stderr of the target line by line and flags the
//! first line matching a fault pattern. Every line is forwarded to the
//! attached listeners as a [`MonitorEvent::Output`].

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::process::ProcessHandle;
use crate::registry::MonitorContext;
use crate::traits::{notify_listeners, Listener, Monitor};
use shared::{harness_debug, harness_info, harness_warn, Component, FaultRecord, MonitorEvent};

/// Patterns every console monitor scans for
pub const DEFAULT_FAULT_PATTERNS: &[&str] = &[
    r"==\d+==\s*ERROR: AddressSanitizer",
    r"(Leak|Memory|Thread|UndefinedBehavior)Sanitizer",
    r"runtime error: ",
    r"Assertion .* failed",
    r"Assertion failure",
    r"Segmentation fault",
    r"thread '.*' panicked at",
    r"Hit MOZ_CRASH",
];

/// State shared between the monitor and its background task
#[derive(Debug)]
struct ScanState {
    fault: OnceLock<FaultRecord>,
    drained: watch::Sender<bool>,
}

pub struct ConsoleMonitor {
    identifier: String,
    process: Arc<ProcessHandle>,
    patterns: Arc<Vec<Regex>>,
    listeners: Vec<Box<dyn Listener>>,
    state: Arc<ScanState>,
    drain_grace: Duration,
    started: bool,
}

impl ConsoleMonitor {
    /// Build a monitor from the default patterns plus `extra_patterns`
    pub fn new(context: MonitorContext, extra_patterns: &[String]) -> OrchestratorResult<Self> {
        let patterns = DEFAULT_FAULT_PATTERNS
            .iter()
            .copied()
            .chain(extra_patterns.iter().map(String::as_str))
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| OrchestratorError::construction(&context.identifier, e.to_string()))
            })
            .collect::<OrchestratorResult<Vec<_>>>()?;

        let (drained, _) = watch::channel(false);
        Ok(Self {
            identifier: context.identifier,
            process: context.process,
            patterns: Arc::new(patterns),
            listeners: Vec::new(),
            state: Arc::new(ScanState {
                fault: OnceLock::new(),
                drained,
            }),
            drain_grace: context.drain_grace,
            started: false,
        })
    }

    /// Arguments are additional regex patterns
    pub fn from_args(context: MonitorContext, args: &[Value]) -> OrchestratorResult<Self> {
        let extra = args
            .iter()
            .map(|arg| match arg {
                Value::String(pattern) => Ok(pattern.clone()),
                other => Err(OrchestratorError::construction(
                    &context.identifier,
                    format!("pattern must be a string, got {other}"),
                )),
            })
            .collect::<OrchestratorResult<Vec<_>>>()?;
        Self::new(context, &extra)
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    fn component(&self) -> Component {
        Component::Monitor(self.identifier.clone())
    }
}

/// First pattern matching `line`, if any
fn matching_pattern<'a>(patterns: &'a [Regex], line: &str) -> Option<&'a Regex> {
    patterns.iter().find(|pattern| pattern.is_match(line))
}

#[async_trait]
impl Monitor for ConsoleMonitor {
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
        let pid = self.process.pid();
        let mut reader = self.process.output();
        let patterns = self.patterns.clone();
        let state = self.state.clone();
        let listeners = std::mem::take(&mut self.listeners);

        Ok(tokio::spawn(async move {
            notify_listeners(&listeners, &MonitorEvent::Started { pid }).await;

            loop {
                let line = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        harness_debug!(component, "Cancelled after {} line(s)", reader.position());
                        break;
                    }
                    line = reader.next_line() => line,
                };
                let Some(line) = line else {
                    state.drained.send_replace(true);
                    harness_debug!(component, "Output drained after {} line(s)", reader.position());
                    if reader.skipped() > 0 {
                        harness_warn!(component, "{} line(s) dropped before they were scanned", reader.skipped());
                    }
                    break;
                };

                notify_listeners(&listeners, &MonitorEvent::Output { line: line.clone() }).await;
                if state.fault.get().is_some() {
                    continue;
                }
                if let Some(pattern) = matching_pattern(&patterns, &line) {
                    let record = FaultRecord::new(identifier.clone(), line.trim().to_string()).with_details(json!({
                        "pattern": pattern.as_str(),
                        "line": line,
                        "line_number": reader.position(),
                        "pid": pid,
                    }));
                    harness_info!(component, "Fault pattern matched: {}", pattern.as_str());
                    if state.fault.set(record.clone()).is_ok() {
                        notify_listeners(&listeners, &MonitorEvent::Fault(record)).await;
                    }
                }
            }

            notify_listeners(&listeners, &MonitorEvent::Stopped).await;
        }))
    }

    /// Waits up to the drain grace for the output to be fully scanned
    async fn detected_fault(&self) -> bool {
        if self.started {
            let mut drained = self.state.drained.subscribe();
            if tokio::time::timeout(self.drain_grace, drained.wait_for(|done| *done))
                .await
                .is_err()
            {
                harness_warn!(self.component(), "Output not drained within {:?}", self.drain_grace);
            }
        }
        self.state.fault.get().is_some()
    }

    async fn get_data(&self) -> FaultRecord {
        match self.state.fault.get() {
            Some(record) => record.clone(),
            None => FaultRecord::new(self.identifier.clone(), "no fault detected"),
        }
    }
}
