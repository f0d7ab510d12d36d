//! Run lifecycle state machine
//!
//! A run moves strictly forward through the phases below; any failure ends
//! it in [`RunPhase::Failed`]. Neither terminal phase can be left, which is
//! what keeps an orchestrator to a single run.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunPhase {
    Idle,
    PluginResolved,
    PluginStarted,
    MonitorsAttached,
    LoggersAttached,
    Waiting,
    FaultDetection,
    Done,
    Failed,
}

impl RunPhase {
    /// The phase that follows this one on the success path
    pub fn next(self) -> Option<RunPhase> {
        match self {
            RunPhase::Idle => Some(RunPhase::PluginResolved),
            RunPhase::PluginResolved => Some(RunPhase::PluginStarted),
            RunPhase::PluginStarted => Some(RunPhase::MonitorsAttached),
            RunPhase::MonitorsAttached => Some(RunPhase::LoggersAttached),
            RunPhase::LoggersAttached => Some(RunPhase::Waiting),
            RunPhase::Waiting => Some(RunPhase::FaultDetection),
            RunPhase::FaultDetection => Some(RunPhase::Done),
            RunPhase::Done | RunPhase::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Failed)
    }

    pub fn can_transition_to(self, target: RunPhase) -> bool {
        match target {
            RunPhase::Failed => !self.is_terminal(),
            target => self.next() == Some(target),
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::PluginResolved => "plugin-resolved",
            RunPhase::PluginStarted => "plugin-started",
            RunPhase::MonitorsAttached => "monitors-attached",
            RunPhase::LoggersAttached => "loggers-attached",
            RunPhase::Waiting => "waiting",
            RunPhase::FaultDetection => "fault-detection",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}
