//! Fault-detection pass
//!
//! Runs once per run, after the target has exited. Collection visits every
//! monitor before finalization commits any logger, so loggers that aggregate
//! across monitors see the complete bucket.

use shared::{harness_debug, harness_error, harness_info, Component};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::traits::{Logger, Monitor};

/// What a pass observed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionSummary {
    pub monitors_visited: usize,
    pub faults: usize,
    pub loggers_committed: usize,
}

/// Collect fault records from `monitors` into `loggers`, then commit every logger.
///
/// A failed commit does not stop the remaining loggers from committing; the
/// first failure is returned once all of them had their turn.
pub async fn run_pass(monitors: &[&dyn Monitor], loggers: &mut [Box<dyn Logger>]) -> OrchestratorResult<DetectionSummary> {
    let mut summary = DetectionSummary::default();

    for monitor in monitors {
        summary.monitors_visited += 1;
        if !monitor.detected_fault().await {
            harness_debug!(Component::Monitor(monitor.name()), "No fault detected");
            continue;
        }

        let record = monitor.get_data().await;
        harness_info!(
            Component::Monitor(monitor.name()),
            "🐞 Fault detected: {}",
            record.reason
        );
        summary.faults += 1;
        for logger in loggers.iter_mut() {
            logger.add_to_bucket(record.clone()).await;
        }
    }

    let mut first_error: Option<OrchestratorError> = None;
    for logger in loggers.iter_mut() {
        match logger.add_fault().await {
            Ok(()) => summary.loggers_committed += 1,
            Err(e) => {
                harness_error!(Component::Logger(logger.name()), "Commit failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(summary),
    }
}
