//! File logger
//!
//! Buckets fault records in memory during the run and writes them as one
//! JSON document into the configured directory on commit.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use tokio::fs;
use uuid::Uuid;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::traits::Logger;
use shared::{harness_debug, logging, Component, FaultRecord};

pub struct FileLogger {
    identifier: String,
    directory: PathBuf,
    run_id: Uuid,
    bucket: Vec<FaultRecord>,
    written: Vec<PathBuf>,
}

impl FileLogger {
    pub fn new(identifier: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            identifier: identifier.into(),
            directory: directory.into(),
            run_id: Uuid::new_v4(),
            bucket: Vec::new(),
            written: Vec::new(),
        }
    }

    /// Requires a `path` keyword naming the output directory
    pub fn from_kwargs(identifier: &str, kwargs: &Map<String, Value>) -> OrchestratorResult<Self> {
        match kwargs.get("path") {
            Some(Value::String(path)) if !path.is_empty() => Ok(Self::new(identifier, path)),
            Some(other) => Err(OrchestratorError::construction(
                identifier,
                format!("path must be a non-empty string, got {other}"),
            )),
            None => Err(OrchestratorError::construction(identifier, "missing required keyword 'path'")),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Records collected since the last commit
    pub fn bucket(&self) -> &[FaultRecord] {
        &self.bucket
    }

    /// Files written by previous commits
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn commit_error(&self, message: impl ToString) -> OrchestratorError {
        OrchestratorError::LoggerCommit {
            logger: self.identifier.clone(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl Logger for FileLogger {
    fn name(&self) -> String {
        self.identifier.clone()
    }

    async fn add_to_bucket(&mut self, record: FaultRecord) {
        harness_debug!(Component::Logger(self.identifier.clone()), "Bucketed fault {}", record.id);
        self.bucket.push(record);
    }

    async fn add_fault(&mut self) -> OrchestratorResult<()> {
        let component = Component::Logger(self.identifier.clone());
        if self.bucket.is_empty() {
            harness_debug!(component, "Nothing to commit");
            return Ok(());
        }

        let committed_at = Utc::now();
        let document = json!({
            "run_id": self.run_id,
            "committed_at": committed_at,
            "faults": self.bucket,
        });
        let contents = serde_json::to_string_pretty(&document).map_err(|e| self.commit_error(e))?;

        fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| self.commit_error(format!("{}: {e}", self.directory.display())))?;
        let path = self.directory.join(format!(
            "faults-{}-{}.json",
            committed_at.format("%Y%m%dT%H%M%S"),
            self.run_id
        ));
        fs::write(&path, contents)
            .await
            .map_err(|e| self.commit_error(format!("{}: {e}", path.display())))?;

        logging::log_success(
            &component,
            &format!("Committed {} fault(s) to {}", self.bucket.len(), path.display()),
        );
        self.bucket.clear();
        self.written.push(path);
        Ok(())
    }
}
