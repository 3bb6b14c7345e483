use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub lastfm_username: Option<String>,
    pub lastfm_api_key: Option<String>,
    pub db_path: Option<String>,
    pub page_size: Option<u32>,
    pub request_timeout_sec: Option<u64>,

    // Feature configs
    pub sync: Option<SyncConfig>,
    pub stats: Option<StatsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SyncConfig {
    pub interval_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
}

/// How many rows each `stats` section lists.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct StatsConfig {
    pub recent_tracks: Option<usize>,
    pub top_artists: Option<usize>,
    pub top_albums: Option<usize>,
    pub top_songs: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
