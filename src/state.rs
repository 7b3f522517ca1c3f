//! Application state management

use std::sync::Arc;

use crate::config::Settings;
use crate::db::{CompanyStore, SqliteDb};
use crate::error::Result;
use crate::scoring::{AiScorer, HeuristicScorer, Scorer};
use crate::status::RunRegistry;

/// Application state shared across all commands
pub struct AppState {
    /// Environment-driven configuration
    pub settings: Settings,

    /// Company store backed by SQLite
    pub store: Arc<dyn CompanyStore>,

    /// Ingestion run registry
    pub runs: Arc<RunRegistry>,

    /// Prospection scorer, AI-backed when an OpenAI key is configured
    pub scorer: Arc<dyn Scorer>,
}

impl AppState {
    pub fn new(settings: Settings) -> Result<Self> {
        std::fs::create_dir_all(&settings.data_dir)?;
        tracing::info!("Data directory: {:?}", settings.data_dir);

        let db = SqliteDb::new(&settings.database_path())?;
        let store: Arc<dyn CompanyStore> = Arc::new(db);

        let scorer: Arc<dyn Scorer> = match &settings.openai_api_key {
            Some(key) => {
                tracing::info!("AI scoring enabled with model {}", settings.openai_model);
                Arc::new(AiScorer::new(key.clone(), settings.openai_model.clone()))
            }
            None => Arc::new(HeuristicScorer),
        };

        Ok(Self {
            settings,
            store,
            runs: Arc::new(RunRegistry::new()),
            scorer,
        })
    }

    #[cfg(test)]
    pub(crate) fn in_memory_for_tests(pappers_api_key: Option<String>) -> Self {
        let settings = Settings {
            pappers_api_key,
            openai_api_key: None,
            openai_model: "gpt-3.5-turbo".to_string(),
            data_dir: std::path::PathBuf::from("."),
        };
        let db = SqliteDb::in_memory().expect("in-memory database");

        Self {
            settings,
            store: Arc::new(db),
            runs: Arc::new(RunRegistry::new()),
            scorer: Arc::new(HeuristicScorer),
        }
    }
}
