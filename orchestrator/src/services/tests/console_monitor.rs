//! Tests for the console output monitor

use serde_json::json;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::common::{context_for, RecordingListener, TEST_TIMEOUT};
use crate::error::OrchestratorError;
use crate::services::{ConsoleMonitor, DEFAULT_FAULT_PATTERNS};
use crate::traits::Monitor;

#[tokio::test]
async fn test_detects_sanitizer_report() {
    let context = context_for(
        "monitors.console",
        "echo starting; echo '==4242==ERROR: AddressSanitizer: heap-use-after-free'; exit 1",
    );
    let process = context.process.clone();
    let mut monitor = ConsoleMonitor::from_args(context, &[]).unwrap();
    let listener = RecordingListener::default();
    monitor.add_listener(Box::new(listener.clone()));

    let task = monitor.start(CancellationToken::new()).unwrap();
    process.wait(None).await;

    assert!(monitor.detected_fault().await);
    let record = monitor.get_data().await;
    assert_eq!(record.monitor, "monitors.console");
    assert!(record.reason.contains("AddressSanitizer"));
    assert_eq!(record.details["pattern"], json!(DEFAULT_FAULT_PATTERNS[0]));

    timeout(TEST_TIMEOUT, task).await.unwrap().unwrap();
    assert_eq!(listener.kinds(), vec!["started", "output", "output", "fault", "stopped"]);
}

#[tokio::test]
async fn test_clean_output_is_not_a_fault() {
    let context = context_for("monitors.console", "echo all good; echo still fine");
    let process = context.process.clone();
    let mut monitor = ConsoleMonitor::from_args(context, &[]).unwrap();

    let _task = monitor.start(CancellationToken::new()).unwrap();
    process.wait(None).await;

    assert!(!monitor.detected_fault().await);
    assert_eq!(monitor.get_data().await.reason, "no fault detected");
}

#[tokio::test]
async fn test_extra_patterns_from_args() {
    let context = context_for("monitors.console", "echo 'CUSTOM-CRASH 42'");
    let process = context.process.clone();
    let mut monitor = ConsoleMonitor::from_args(context, &[json!(r"CUSTOM-CRASH \d+")]).unwrap();
    assert_eq!(monitor.pattern_count(), DEFAULT_FAULT_PATTERNS.len() + 1);

    let _task = monitor.start(CancellationToken::new()).unwrap();
    process.wait(None).await;

    assert!(monitor.detected_fault().await);
    assert_eq!(monitor.get_data().await.reason, "CUSTOM-CRASH 42");
}

#[tokio::test]
async fn test_first_match_wins() {
    let context = context_for(
        "monitors.console",
        "echo 'Segmentation fault'; echo \"thread 'main' panicked at src/main.rs:1:1\"",
    );
    let process = context.process.clone();
    let mut monitor = ConsoleMonitor::from_args(context, &[]).unwrap();
    let listener = RecordingListener::default();
    monitor.add_listener(Box::new(listener.clone()));

    let task = monitor.start(CancellationToken::new()).unwrap();
    process.wait(None).await;

    assert!(monitor.detected_fault().await);
    let record = monitor.get_data().await;
    assert_eq!(record.reason, "Segmentation fault");
    assert_eq!(record.details["line_number"], json!(1));

    timeout(TEST_TIMEOUT, task).await.unwrap().unwrap();
    let faults = listener.kinds().into_iter().filter(|kind| *kind == "fault").count();
    assert_eq!(faults, 1);
}

#[tokio::test]
async fn test_invalid_arguments_are_construction_errors() {
    let bad_regex = ConsoleMonitor::from_args(context_for("monitors.console", "true"), &[json!("(unclosed")]);
    assert!(matches!(bad_regex, Err(OrchestratorError::Construction { .. })));

    let not_a_string = ConsoleMonitor::from_args(context_for("monitors.console", "true"), &[json!(7)]);
    assert!(matches!(not_a_string, Err(OrchestratorError::Construction { .. })));
}

#[tokio::test]
async fn test_cancellation_stops_background_task() {
    let context = context_for("monitors.console", "sleep 30");
    let mut monitor = ConsoleMonitor::from_args(context, &[]).unwrap();
    let listener = RecordingListener::default();
    monitor.add_listener(Box::new(listener.clone()));
    let cancel = CancellationToken::new();

    let task = monitor.start(cancel.clone()).unwrap();
    cancel.cancel();

    timeout(TEST_TIMEOUT, task).await.unwrap().unwrap();
    assert_eq!(listener.kinds(), vec!["started", "stopped"]);
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let mut monitor = ConsoleMonitor::from_args(context_for("monitors.console", "true"), &[]).unwrap();

    let _task = monitor.start(CancellationToken::new()).unwrap();
    let second = monitor.start(CancellationToken::new());

    assert!(matches!(second, Err(OrchestratorError::InvalidState { .. })));
}
