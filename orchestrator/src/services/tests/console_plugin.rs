//! Tests for the console application plugin

use serde_json::json;

use crate::error::OrchestratorError;
use crate::services::ConsoleApplication;
use crate::traits::Plugin;

#[test]
fn test_settings_from_config() {
    let plugin = ConsoleApplication::from_config(
        "plugins.console",
        &json!({ "binary": "sh", "args": ["-c", "exit 0"], "environ": { "A": "1" } }),
    )
    .unwrap();

    assert_eq!(plugin.settings().command(), vec!["sh", "-c", "exit 0"]);
    assert_eq!(plugin.name(), "plugins.console");
    assert!(plugin.process().is_none());
    assert!(!plugin.is_running());
}

#[test]
fn test_missing_binary_is_construction_error() {
    let missing = ConsoleApplication::from_config("plugins.console", &json!({ "args": [] }));
    assert!(matches!(missing, Err(OrchestratorError::Construction { .. })));

    let blank = ConsoleApplication::from_config("plugins.console", &json!({ "binary": " " }));
    assert!(matches!(blank, Err(OrchestratorError::Construction { .. })));
}

#[tokio::test]
async fn test_start_exposes_process_with_environment() {
    let mut plugin = ConsoleApplication::from_config(
        "plugins.console",
        &json!({
            "binary": "sh",
            "args": ["-c", "echo $FAULTWATCH_PLUGIN_OPTS"],
            "environ": { "FAULTWATCH_PLUGIN_OPTS": { "depth": 3, "mode": "fast" } }
        }),
    )
    .unwrap();

    plugin.start().await.unwrap();
    let process = plugin.process().unwrap();
    process.wait(None).await;

    let mut reader = process.output();
    assert_eq!(reader.next_line().await.as_deref(), Some("depth=3,mode=fast"));
    assert!(!plugin.is_running());
}

#[tokio::test]
async fn test_spawn_failure_is_start_error() {
    let mut plugin =
        ConsoleApplication::from_config("plugins.console", &json!({ "binary": "/nonexistent/faultwatch-target" }))
            .unwrap();

    let result = plugin.start().await;

    assert!(matches!(result, Err(OrchestratorError::PluginStart { .. })));
    assert!(plugin.process().is_none());
}

#[tokio::test]
async fn test_stop_terminates_target() {
    let mut plugin =
        ConsoleApplication::from_config("plugins.console", &json!({ "binary": "sleep", "args": ["30"] })).unwrap();
    plugin.start().await.unwrap();
    assert!(plugin.is_running());

    plugin.stop().await.unwrap();
    let status = plugin.process().unwrap().wait(None).await;

    assert!(status.signal().is_some());
    assert!(!plugin.is_running());
}

#[tokio::test]
async fn test_stop_before_start_fails() {
    let plugin = ConsoleApplication::from_config("plugins.console", &json!({ "binary": "true" })).unwrap();

    let result = plugin.stop().await;

    assert!(matches!(result, Err(OrchestratorError::PluginStop { .. })));
}
