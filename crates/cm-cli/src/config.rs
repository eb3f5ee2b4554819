//! Engine configuration: TOML file with environment overrides.
//!
//! Precedence, lowest to highest: built-in defaults, the config file
//! (CM_CONFIG or <data_dir>/config.toml), then CM_* environment variables.

use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Where the SQLite database lives.
    pub data_dir: PathBuf,
    /// Bind address for `cm serve`.
    pub bind: String,
    /// Generative service endpoint. None means tier 1 is disabled and
    /// every opinion request serves from tier 2 or 3.
    pub generative_url: Option<String>,
    pub generative_api_key: Option<String>,
    /// Budget for one tier-1 generation call.
    pub tier1_timeout_ms: u64,
    /// Budget for the optional web-research call, shorter than tier 1
    /// since research is a garnish, not the meal.
    pub research_timeout_ms: u64,
    /// How long a derived profile stays cached before rebuild.
    pub profile_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            bind: "127.0.0.1:8787".to_string(),
            generative_url: None,
            generative_api_key: None,
            tier1_timeout_ms: 8_000,
            research_timeout_ms: 3_000,
            profile_ttl_secs: 300,
        }
    }
}

impl EngineConfig {
    /// Load config from disk and environment.
    pub fn load() -> Self {
        let mut config = match config_path() {
            Some(path) => Self::from_file(&path).unwrap_or_else(|e| {
                tracing::warn!("config file {} unusable: {e}", path.display());
                Self::default()
            }),
            None => Self::default(),
        };
        config.apply_env();
        config
    }

    fn from_file(path: &Path) -> std::result::Result<Self, String> {
        let raw = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        toml::from_str(&raw).map_err(|e| e.to_string())
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("CM_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(bind) = std::env::var("CM_BIND") {
            self.bind = bind;
        }
        if let Ok(url) = std::env::var("CM_GENERATIVE_URL")
            && !url.is_empty()
        {
            self.generative_url = Some(url);
        }
        if let Ok(key) = std::env::var("CM_GENERATIVE_API_KEY")
            && !key.is_empty()
        {
            self.generative_api_key = Some(key);
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("casts.db")
    }
}

fn config_path() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var("CM_CONFIG") {
        return Some(PathBuf::from(explicit));
    }
    let default = resolved_data_dir().join("config.toml");
    default.exists().then_some(default)
}

fn resolved_data_dir() -> PathBuf {
    std::env::var("CM_DATA_DIR")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(default_data_dir)
}

fn default_data_dir() -> PathBuf {
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".castmind"))
        .unwrap_or_else(|| PathBuf::from(".castmind"))
}
