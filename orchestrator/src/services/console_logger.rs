//! Logger that reports committed faults through the harness log

use async_trait::async_trait;

use crate::error::OrchestratorResult;
use crate::traits::Logger;
use shared::{harness_error, harness_info, Component, FaultRecord};

pub struct ConsoleLogger {
    identifier: String,
    bucket: Vec<FaultRecord>,
    committed: usize,
}

impl ConsoleLogger {
    pub fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            bucket: Vec::new(),
            committed: 0,
        }
    }

    pub fn bucket(&self) -> &[FaultRecord] {
        &self.bucket
    }

    /// Total number of records committed so far
    pub fn committed(&self) -> usize {
        self.committed
    }
}

#[async_trait]
impl Logger for ConsoleLogger {
    fn name(&self) -> String {
        self.identifier.clone()
    }

    async fn add_to_bucket(&mut self, record: FaultRecord) {
        self.bucket.push(record);
    }

    async fn add_fault(&mut self) -> OrchestratorResult<()> {
        let component = Component::Logger(self.identifier.clone());
        if self.bucket.is_empty() {
            harness_info!(component, "✅ No faults recorded");
            return Ok(());
        }

        for record in self.bucket.drain(..) {
            harness_error!(
                component,
                fault_id = %record.id,
                monitor = %record.monitor,
                details = %record.details,
                "🐞 {}",
                record.reason
            );
            self.committed += 1;
        }
        Ok(())
    }
}
