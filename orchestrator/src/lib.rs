//! Fault-detection harness core
//!
//! Supervises one target process per run, watches it through pluggable
//! monitors and routes detected faults to pluggable loggers. The
//! [`Orchestrator`] drives a run; [`PluginRegistry`] maps configuration
//! identifiers to implementations; [`ProcessHandle`] wraps the OS process.

pub mod config;
pub mod detection;
pub mod error;
pub mod orchestrator;
pub mod os_signals;
pub mod process;
pub mod registry;
pub mod services;
pub mod state;
pub mod traits;

// Re-export commonly used types
pub use config::{HarnessSettings, ListenerSpec, LoggerSpec, MonitorSpec, RunConfiguration};
pub use detection::{run_pass, DetectionSummary};
pub use error::{OrchestratorError, OrchestratorResult};
pub use orchestrator::Orchestrator;
pub use process::{set_environ, Environment, ExitStatus, OutputReader, ProcessHandle};
pub use registry::{Capability, MonitorContext, MonitorKind, PluginRegistry};
pub use state::RunPhase;
pub use traits::{Listener, Logger, Monitor, Plugin};
