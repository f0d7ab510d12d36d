//! Built-in implementations of the collaborator traits
//!
//! These are what `PluginRegistry::with_builtins` registers: one console
//! plugin, two monitors, one listener and two loggers.

pub mod console_logger;
pub mod console_monitor;
pub mod console_plugin;
pub mod exit_monitor;
pub mod file_logger;
pub mod log_listener;

pub use console_logger::ConsoleLogger;
pub use console_monitor::{ConsoleMonitor, DEFAULT_FAULT_PATTERNS};
pub use console_plugin::{ConsoleApplication, ConsoleSettings};
pub use exit_monitor::ExitMonitor;
pub use file_logger::FileLogger;
pub use log_listener::LogListener;

#[cfg(test)]
mod tests;
