//! Company data sources
//!
//! Each source enumerates accounting firms in the Île-de-France region and
//! loads the new ones into the store. Runs execute in background tasks and
//! report through the run registry; one run per source at a time.

pub mod pappers;
pub mod societe;

use std::future::Future;
use std::sync::Arc;

use uuid::Uuid;

use crate::browser::HttpBrowserEngine;
use crate::error::{AppError, Result};
use crate::sources::pappers::{PappersHttpClient, PappersIngest};
use crate::sources::societe::SocieteIngest;
use crate::state::AppState;
use crate::status::RunHandle;

/// NAF code for accounting activities
pub const NAF_ACCOUNTING: &str = "6920Z";

/// Île-de-France departments covered by every source
pub const IDF_DEPARTMENTS: [&str; 8] = ["75", "77", "78", "91", "92", "93", "94", "95"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pappers,
    Societe,
}

impl SourceKind {
    /// Stable key used by the run registry and the CLI
    pub fn id(&self) -> &'static str {
        match self {
            SourceKind::Pappers => "pappers",
            SourceKind::Societe => "societe",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Pappers => "Pappers API",
            SourceKind::Societe => "Société.com",
        }
    }
}

/// Launch a background ingestion run for the given source.
///
/// The source's run slot is claimed before the task is spawned, so a second
/// call while a run is in flight fails with `AlreadyRunning` instead of
/// starting a duplicate. Returns the new run's id.
pub fn spawn_scrape(state: &Arc<AppState>, kind: SourceKind) -> Result<Uuid> {
    match kind {
        SourceKind::Pappers => {
            let api_key = state
                .settings
                .pappers_api_key
                .clone()
                .ok_or_else(|| AppError::Config("PAPPERS_API_KEY is not set".to_string()))?;

            let handle = state.runs.begin(kind.id(), "Starting Pappers search")?;
            let run_id = handle.run_id();
            let ingest = PappersIngest::new(
                Arc::new(PappersHttpClient::new(api_key)),
                Arc::clone(&state.store),
            );

            tokio::spawn(async move {
                let run = ingest.run(&handle);
                drive_run(handle.clone(), run).await;
            });

            Ok(run_id)
        }
        SourceKind::Societe => {
            let handle = state.runs.begin(kind.id(), "Starting Société.com crawl")?;
            let run_id = handle.run_id();
            let ingest = SocieteIngest::new(
                Arc::new(HttpBrowserEngine::new()),
                Arc::clone(&state.store),
            );

            tokio::spawn(async move {
                let run = ingest.run(&handle);
                drive_run(handle.clone(), run).await;
            });

            Ok(run_id)
        }
    }
}

/// Drive an ingestion future to its terminal status.
///
/// Every run ends with either `complete` or `fail`, so pollers never observe
/// a run stuck in the running state after its task returned.
pub async fn drive_run<F>(handle: RunHandle, fut: F)
where
    F: Future<Output = Result<String>>,
{
    match fut.await {
        Ok(message) => {
            tracing::info!("Run '{}' finished: {}", handle.source(), message);
            handle.complete(message);
        }
        Err(e) => {
            tracing::error!("Run '{}' failed: {}", handle.source(), e);
            handle.fail(e.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::RunRegistry;

    #[test]
    fn test_source_ids_are_stable() {
        assert_eq!(SourceKind::Pappers.id(), "pappers");
        assert_eq!(SourceKind::Societe.id(), "societe");
        assert_eq!(SourceKind::Societe.name(), "Société.com");
    }

    #[tokio::test]
    async fn test_drive_run_completes_on_success() {
        let registry = Arc::new(RunRegistry::new());
        let handle = registry.begin("pappers", "starting").unwrap();

        drive_run(handle, async { Ok("Done: 3 new companies".to_string()) }).await;

        let status = registry.status("pappers").unwrap();
        assert!(!status.running);
        assert_eq!(status.progress, 100);
        assert_eq!(status.message, "Done: 3 new companies");
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn test_drive_run_fails_on_error() {
        let registry = Arc::new(RunRegistry::new());
        let handle = registry.begin("pappers", "starting").unwrap();

        drive_run(handle, async {
            Err(AppError::Source("API quota exceeded".to_string()))
        })
        .await;

        let status = registry.status("pappers").unwrap();
        assert!(!status.running);
        assert!(status.error.as_deref().unwrap_or("").contains("quota"));
    }

    #[tokio::test]
    async fn test_spawn_scrape_requires_pappers_key() {
        let state = Arc::new(AppState::in_memory_for_tests(None));
        let result = spawn_scrape(&state, SourceKind::Pappers);
        assert!(matches!(result, Err(AppError::Config(_))));
        assert!(!state.runs.is_running("pappers"));
    }
}
