//! Runtime configuration loaded from the environment

use std::path::PathBuf;

/// Runtime settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// Pappers API key; required only to run the Pappers source
    pub pappers_api_key: Option<String>,

    /// OpenAI API key; enables the AI scorer when present
    pub openai_api_key: Option<String>,

    /// Chat model used by the AI scorer
    pub openai_model: String,

    /// Directory holding the SQLite database
    pub data_dir: PathBuf,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            pappers_api_key: non_empty_var("PAPPERS_API_KEY"),
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            openai_model: std::env::var("OPENAI_MODEL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "gpt-3.5-turbo".to_string()),
            data_dir: std::env::var("FIRMSCOUT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("firmscout.db")
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        std::env::remove_var("OPENAI_MODEL");
        std::env::remove_var("FIRMSCOUT_DATA_DIR");
        let settings = Settings::from_env();
        assert_eq!(settings.openai_model, "gpt-3.5-turbo");
        assert_eq!(settings.database_path(), PathBuf::from("./data/firmscout.db"));
    }
}
