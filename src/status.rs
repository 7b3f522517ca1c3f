//! Per-source run status registry
//!
//! Tracks long-running ingestion runs with progress and counters. One run per
//! source may be in flight at a time; pollers clone snapshots out by source key.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Snapshot of one ingestion run
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub source: String,
    pub run_id: Uuid,
    pub running: bool,
    /// 0..=100, monotonic per enumeration unit, forced to 100 at terminal
    pub progress: u8,
    pub message: String,
    pub error: Option<String>,
    pub new_companies: u64,
    pub skipped_companies: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunStatus {
    fn started(source: &str, message: &str) -> Self {
        Self {
            source: source.to_string(),
            run_id: Uuid::new_v4(),
            running: true,
            progress: 0,
            message: message.to_string(),
            error: None,
            new_companies: 0,
            skipped_companies: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !self.running
    }
}

/// Registry of ingestion runs keyed by source id
pub struct RunRegistry {
    runs: DashMap<String, RunStatus>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self {
            runs: DashMap::new(),
        }
    }

    /// Claim the source for a new run.
    ///
    /// The occupied-and-running check and the fresh-status insert happen under
    /// one entry lock, so exactly one of two concurrent callers wins.
    pub fn begin(self: &Arc<Self>, source: &str, message: &str) -> Result<RunHandle> {
        let status = RunStatus::started(source, message);
        let run_id = status.run_id;

        match self.runs.entry(source.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().running {
                    return Err(AppError::AlreadyRunning(source.to_string()));
                }
                entry.insert(status);
            }
            Entry::Vacant(entry) => {
                entry.insert(status);
            }
        }

        Ok(RunHandle {
            registry: Arc::clone(self),
            source: source.to_string(),
            run_id,
        })
    }

    pub fn status(&self, source: &str) -> Option<RunStatus> {
        self.runs.get(source).map(|r| r.clone())
    }

    pub fn all(&self) -> Vec<RunStatus> {
        self.runs.iter().map(|r| r.clone()).collect()
    }

    pub fn is_running(&self, source: &str) -> bool {
        self.runs.get(source).map(|r| r.running).unwrap_or(false)
    }
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Writer half of one run's status, held by the ingestion task
#[derive(Clone)]
pub struct RunHandle {
    registry: Arc<RunRegistry>,
    source: String,
    run_id: Uuid,
}

impl RunHandle {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn update(&self, apply: impl FnOnce(&mut RunStatus)) {
        if let Some(mut status) = self.registry.runs.get_mut(&self.source) {
            apply(&mut status);
        }
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.update(|s| s.message = message.into());
    }

    pub fn set_progress(&self, progress: u8) {
        self.update(|s| s.progress = progress.min(100));
    }

    pub fn add_new(&self, count: u64) {
        self.update(|s| s.new_companies += count);
    }

    pub fn add_skipped(&self, count: u64) {
        self.update(|s| s.skipped_companies += count);
    }

    /// (new, skipped) so far
    pub fn counters(&self) -> (u64, u64) {
        self.registry
            .status(&self.source)
            .map(|s| (s.new_companies, s.skipped_companies))
            .unwrap_or((0, 0))
    }

    /// Terminal success: running=false, progress=100
    pub fn complete(&self, message: impl Into<String>) {
        self.update(|s| {
            s.running = false;
            s.progress = 100;
            s.message = message.into();
            s.finished_at = Some(Utc::now());
        });
    }

    /// Terminal failure: running=false, progress=100, error recorded
    pub fn fail(&self, error: impl Into<String>) {
        self.update(|s| {
            s.running = false;
            s.progress = 100;
            s.error = Some(error.into());
            s.finished_at = Some(Utc::now());
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_is_single_flight() {
        let registry = Arc::new(RunRegistry::new());
        let handle = registry.begin("pappers", "starting").unwrap();

        let second = registry.begin("pappers", "starting");
        assert!(matches!(second, Err(AppError::AlreadyRunning(_))));

        // a different source may run concurrently
        assert!(registry.begin("societe", "starting").is_ok());

        handle.complete("done");
        assert!(registry.begin("pappers", "starting").is_ok());
    }

    #[test]
    fn test_complete_lands_terminal_state() {
        let registry = Arc::new(RunRegistry::new());
        let handle = registry.begin("pappers", "starting").unwrap();
        handle.set_progress(37);
        handle.add_new(5);
        handle.add_skipped(2);
        handle.complete("Done: 5 new companies");

        let status = registry.status("pappers").unwrap();
        assert!(!status.running);
        assert_eq!(status.progress, 100);
        assert_eq!(status.new_companies, 5);
        assert_eq!(status.skipped_companies, 2);
        assert!(status.error.is_none());
        assert!(status.finished_at.is_some());
    }

    #[test]
    fn test_fail_lands_terminal_state_with_error() {
        let registry = Arc::new(RunRegistry::new());
        let handle = registry.begin("societe", "starting").unwrap();
        handle.set_progress(12);
        handle.fail("Source error: quota reached");

        let status = registry.status("societe").unwrap();
        assert!(!status.running);
        assert_eq!(status.progress, 100);
        assert_eq!(status.error.as_deref(), Some("Source error: quota reached"));
    }

    #[test]
    fn test_progress_clamps_to_100() {
        let registry = Arc::new(RunRegistry::new());
        let handle = registry.begin("pappers", "starting").unwrap();
        handle.set_progress(250);
        assert_eq!(registry.status("pappers").unwrap().progress, 100);
    }

    #[test]
    fn test_unknown_source_has_no_status() {
        let registry = RunRegistry::new();
        assert!(registry.status("infogreffe").is_none());
        assert!(!registry.is_running("infogreffe"));
    }

    #[test]
    fn test_status_serializes_for_pollers() {
        let registry = Arc::new(RunRegistry::new());
        let handle = registry.begin("pappers", "starting").unwrap();
        handle.add_new(3);
        handle.complete("Done: 3 new companies");

        let status = registry.status("pappers").unwrap();
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["source"], "pappers");
        assert_eq!(json["running"], false);
        assert_eq!(json["progress"], 100);
        assert_eq!(json["new_companies"], 3);
        assert!(json["run_id"].is_string());
    }
}
