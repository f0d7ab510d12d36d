//! Test fixtures and data for orchestrator tests

use std::time::Duration;

use orchestrator::HarnessSettings;
use serde_json::{json, Value};

/// Standard test data and fixtures
pub struct TestFixtures;

impl TestFixtures {
    /// Built-in plugin identifier
    pub const PLUGIN: &'static str = "plugins.console";

    /// Scripted collaborators registered by `TestHelpers::registry`
    pub const FAKE_MONITOR: &'static str = "monitors.fake";
    pub const STUCK_MONITOR: &'static str = "monitors.stuck";
    pub const JOURNAL_LOGGER: &'static str = "loggers.journal";

    /// Upper bound for any single run in these suites
    pub const RUN_TIMEOUT: Duration = Duration::from_secs(10);

    /// A sanitizer report as a target would print it
    pub const ASAN_LINE: &'static str = "==31337==ERROR: AddressSanitizer: heap-buffer-overflow on address 0x602000000011";

    /// `plugins.console` configuration running `script` under `sh -c`
    pub fn shell(script: &str) -> Value {
        json!({ "binary": "sh", "args": ["-c", script] })
    }

    /// Short grace periods so teardown-heavy tests stay fast
    pub fn fast_settings() -> HarnessSettings {
        HarnessSettings {
            monitor_grace_ms: 200,
            drain_grace_ms: 1000,
        }
    }
}
