use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{LebaroneError, Result};
use crate::materializer::DEFAULT_ITERATION_LIMIT;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    #[serde(default)]
    pub user_name: String,
    /// Per-definition step ceiling for a single materialization pass.
    #[serde(default = "default_max_catch_up_iterations")]
    pub max_catch_up_iterations: usize,
}

fn default_max_catch_up_iterations() -> usize {
    DEFAULT_ITERATION_LIMIT
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            user_name: String::new(),
            max_catch_up_iterations: default_max_catch_up_iterations(),
        }
    }
}

const DB_FILE: &str = "lebarone.db";

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn settings_path() -> PathBuf {
    home().join(".config").join("lebarone").join("settings.json")
}

fn default_data_dir() -> PathBuf {
    home().join("Documents").join("lebarone")
}

/// A missing file yields the defaults; an unparsable one is logged and
/// also yields the defaults.
pub fn load_settings() -> Settings {
    let path = settings_path();
    let Ok(content) = std::fs::read_to_string(&path) else {
        return Settings::default();
    };
    serde_json::from_str(&content).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "ignoring unreadable settings file");
        Settings::default()
    })
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let path = settings_path();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| LebaroneError::Settings(e.to_string()))?;
    std::fs::write(&path, format!("{json}\n"))?;
    Ok(())
}

pub fn db_path() -> PathBuf {
    database_in(Path::new(&load_settings().data_dir))
}

pub fn database_in(data_dir: &Path) -> PathBuf {
    data_dir.join(DB_FILE)
}

/// Expand a leading `~` and anchor relative paths at the working directory.
pub fn expand_data_dir(raw: &str) -> Result<PathBuf> {
    let path = match raw.strip_prefix('~') {
        Some(rest) => home().join(rest.trim_start_matches('/')),
        None => PathBuf::from(raw),
    };
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
