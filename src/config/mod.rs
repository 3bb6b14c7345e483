mod file_config;

pub use file_config::{FileConfig, StatsConfig, SyncConfig};

use crate::feed::LASTFM_MAX_PAGE_SIZE;
use crate::sync::SyncSettings;
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_DIR_NAME: &str = "scrobble-mirror";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DB_FILE_NAME: &str = "scrobbles.db";

pub const DEFAULT_PAGE_SIZE: u32 = 150;
pub const DEFAULT_REQUEST_TIMEOUT_SEC: u64 = 30;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub lastfm_username: Option<String>,
    pub lastfm_api_key: Option<String>,
    pub db_path: Option<PathBuf>,
    pub page_size: u32,
    pub request_timeout_sec: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            lastfm_username: None,
            lastfm_api_key: None,
            db_path: None,
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout_sec: DEFAULT_REQUEST_TIMEOUT_SEC,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub lastfm_username: String,
    pub lastfm_api_key: String,
    pub db_path: PathBuf,
    pub page_size: u32,
    pub request_timeout_sec: u64,

    // Feature configs (with defaults)
    pub sync: SyncJobSettings,
    pub stats: StatsSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let lastfm_username = file
            .lastfm_username
            .or_else(|| cli.lastfm_username.clone())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "lastfm_username must be specified via --user or in config file"
                )
            })?;
        let lastfm_api_key = file
            .lastfm_api_key
            .or_else(|| cli.lastfm_api_key.clone())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "lastfm_api_key must be specified via --api-key or in config file"
                )
            })?;

        let db_path = match file.db_path.map(PathBuf::from).or_else(|| cli.db_path.clone()) {
            Some(path) => path,
            None => default_db_path()?,
        };
        if db_path.is_dir() {
            bail!("db_path is a directory: {:?}", db_path);
        }

        let page_size = file.page_size.unwrap_or(cli.page_size);
        if page_size == 0 || page_size > LASTFM_MAX_PAGE_SIZE {
            bail!(
                "page_size must be between 1 and {}, got {}",
                LASTFM_MAX_PAGE_SIZE,
                page_size
            );
        }

        let request_timeout_sec = file.request_timeout_sec.unwrap_or(cli.request_timeout_sec);
        if request_timeout_sec == 0 {
            bail!("request_timeout_sec must be greater than 0");
        }

        // Sync settings - merge file config with defaults
        let sync_file = file.sync.unwrap_or_default();
        let sync_defaults = SyncJobSettings::default();
        let sync = SyncJobSettings {
            interval_secs: sync_file.interval_secs.unwrap_or(sync_defaults.interval_secs),
            max_retries: sync_file.max_retries.unwrap_or(sync_defaults.max_retries),
            initial_backoff_ms: sync_file
                .initial_backoff_ms
                .unwrap_or(sync_defaults.initial_backoff_ms),
            max_backoff_ms: sync_file.max_backoff_ms.unwrap_or(sync_defaults.max_backoff_ms),
            backoff_multiplier: sync_file
                .backoff_multiplier
                .unwrap_or(sync_defaults.backoff_multiplier),
        };
        if sync.interval_secs == 0 {
            bail!("sync.interval_secs must be greater than 0");
        }
        if sync.backoff_multiplier < 1.0 {
            bail!(
                "sync.backoff_multiplier must be at least 1.0, got {}",
                sync.backoff_multiplier
            );
        }

        let stats_file = file.stats.unwrap_or_default();
        let stats_defaults = StatsSettings::default();
        let stats = StatsSettings {
            recent_tracks: stats_file.recent_tracks.unwrap_or(stats_defaults.recent_tracks),
            top_artists: stats_file.top_artists.unwrap_or(stats_defaults.top_artists),
            top_albums: stats_file.top_albums.unwrap_or(stats_defaults.top_albums),
            top_songs: stats_file.top_songs.unwrap_or(stats_defaults.top_songs),
        };

        Ok(Self {
            lastfm_username,
            lastfm_api_key,
            db_path,
            page_size,
            request_timeout_sec,
            sync,
            stats,
        })
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            username: self.lastfm_username.clone(),
            api_key: self.lastfm_api_key.clone(),
            page_size: self.page_size,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_sec)
    }
}

/// Daemon schedule and per-page retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncJobSettings {
    pub interval_secs: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for SyncJobSettings {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSettings {
    pub recent_tracks: usize,
    pub top_artists: usize,
    pub top_albums: usize,
    pub top_songs: usize,
}

impl Default for StatsSettings {
    fn default() -> Self {
        Self {
            recent_tracks: 10,
            top_artists: 10,
            top_albums: 10,
            top_songs: 10,
        }
    }
}

/// Candidate config file locations, most general first.
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![Path::new("/etc").join(APP_DIR_NAME).join(CONFIG_FILE_NAME)];
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        paths.push(PathBuf::from(xdg).join(APP_DIR_NAME).join(CONFIG_FILE_NAME));
    }
    if let Some(home) = dirs::home_dir() {
        paths.push(
            home.join(".config")
                .join(APP_DIR_NAME)
                .join(CONFIG_FILE_NAME),
        );
    }
    paths
}

/// Picks the config file to load: an explicit path must exist, otherwise the
/// first existing search path is used.
pub fn locate_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.is_file() {
            bail!("Config file not found: {:?}", path);
        }
        return Ok(Some(path.to_path_buf()));
    }
    Ok(config_search_paths().into_iter().find(|p| p.is_file()))
}

pub fn default_db_path() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine cache directory, set db_path"))?;
    Ok(cache_dir.join(APP_DIR_NAME).join(DB_FILE_NAME))
}
