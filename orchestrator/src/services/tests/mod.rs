//! Service-specific tests
//!
//! Each built-in service has its own test file; shared fixtures live in
//! `common` below.

mod console_monitor;
mod console_plugin;

// Common test utilities for services
pub mod common {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use shared::MonitorEvent;

    use crate::process::ProcessHandle;
    use crate::registry::MonitorContext;
    use crate::traits::Listener;

    /// Standard timeout for background tasks in tests
    pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn cmd(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    /// Spawn `sh -c script` and wrap it in a monitor context
    pub fn context_for(identifier: &str, script: &str) -> MonitorContext {
        let process = ProcessHandle::open(&cmd(&["sh", "-c", script]), None, None).expect("spawn test target");
        MonitorContext {
            identifier: identifier.to_string(),
            process: Arc::new(process),
            drain_grace: Duration::from_secs(2),
        }
    }

    /// Listener that records every event it sees
    #[derive(Clone, Default)]
    pub struct RecordingListener {
        pub events: Arc<Mutex<Vec<MonitorEvent>>>,
    }

    impl RecordingListener {
        pub fn kinds(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().iter().map(MonitorEvent::kind).collect()
        }

        pub fn events(&self) -> Vec<MonitorEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Listener for RecordingListener {
        fn name(&self) -> String {
            "listeners.recording".to_string()
        }

        async fn on_event(&self, event: &MonitorEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }
}
