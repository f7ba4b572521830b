use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_PORT: u16 = 6786;
const DEFAULT_METADATA_URL: &str =
    "https://raw.githubusercontent.com/0xSilverest/anilist-fetcher/main/anilist_data.json";
const DEFAULT_RESCAN_SECS: u64 = 60;
const DEFAULT_WORKERS: usize = 8;
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;
const DEFAULT_IPC_TIMEOUT_SECS: u64 = 5;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 90;
const DEFAULT_IPC_SOCKET: &str = "/tmp/mpvsocket";

fn app_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("remotty")
}

fn app_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("remotty")
}

fn default_library_root() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join("Anime")
}

/// On-disk configuration. Every key is optional; unknown keys are ignored.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, Eq)]
pub struct FileConfig {
    pub port: Option<u16>,
    pub library_root: Option<PathBuf>,
    pub metadata_url: Option<String>,
    pub metadata_cache: Option<PathBuf>,
    pub cover_cache_dir: Option<PathBuf>,
    pub thumbnail_dir: Option<PathBuf>,
    pub rescan_interval_secs: Option<u64>,
    pub workers: Option<usize>,
    pub tool_timeout_secs: Option<u64>,
    pub ipc_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
    pub mpv_path: Option<PathBuf>,
    pub mixer_path: Option<PathBuf>,
    pub ipc_socket: Option<PathBuf>,
    pub localhost: Option<bool>,
}

impl From<&Config> for FileConfig {
    fn from(config: &Config) -> Self {
        FileConfig {
            port: Some(config.port),
            library_root: Some(config.library_root.clone()),
            metadata_url: Some(config.metadata_url.clone()),
            metadata_cache: Some(config.metadata_cache.clone()),
            cover_cache_dir: Some(config.cover_cache_dir.clone()),
            thumbnail_dir: Some(config.thumbnail_dir.clone()),
            rescan_interval_secs: Some(config.rescan_interval.as_secs()),
            workers: Some(config.workers),
            tool_timeout_secs: Some(config.tool_timeout.as_secs()),
            ipc_timeout_secs: Some(config.ipc_timeout.as_secs()),
            idle_timeout_secs: Some(config.idle_timeout.as_secs()),
            mpv_path: Some(config.mpv_path.clone()),
            mixer_path: Some(config.mixer_path.clone()),
            ipc_socket: Some(config.ipc_socket.clone()),
            localhost: Some(config.localhost),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub library_root: PathBuf,
    pub metadata_url: String,
    pub metadata_cache: PathBuf,
    pub cover_cache_dir: PathBuf,
    pub thumbnail_dir: PathBuf,
    pub rescan_interval: Duration,
    pub workers: usize,
    pub tool_timeout: Duration,
    pub ipc_timeout: Duration,
    pub idle_timeout: Duration,
    pub mpv_path: PathBuf,
    pub mixer_path: PathBuf,
    pub ipc_socket: PathBuf,
    pub localhost: bool,
}

impl Config {
    /// CLI flags win over the file, the file wins over built-in defaults.
    pub fn resolve(file: Option<FileConfig>, args: &crate::cli::Args) -> Self {
        let file = file.unwrap_or_default();
        let secs = |v: Option<u64>, default: u64| Duration::from_secs(v.unwrap_or(default).max(1));
        Config {
            port: args.port.or(file.port).unwrap_or(DEFAULT_PORT),
            library_root: args
                .library
                .clone()
                .or(file.library_root)
                .unwrap_or_else(default_library_root),
            metadata_url: file
                .metadata_url
                .unwrap_or_else(|| DEFAULT_METADATA_URL.to_string()),
            metadata_cache: file
                .metadata_cache
                .unwrap_or_else(|| app_config_dir().join("anilist_data.json")),
            cover_cache_dir: file
                .cover_cache_dir
                .unwrap_or_else(|| app_cache_dir().join("covers")),
            thumbnail_dir: file
                .thumbnail_dir
                .unwrap_or_else(|| app_cache_dir().join("thumbnails")),
            rescan_interval: secs(args.interval.or(file.rescan_interval_secs), DEFAULT_RESCAN_SECS),
            workers: args.workers.or(file.workers).unwrap_or(DEFAULT_WORKERS).max(1),
            tool_timeout: secs(file.tool_timeout_secs, DEFAULT_TOOL_TIMEOUT_SECS),
            ipc_timeout: secs(file.ipc_timeout_secs, DEFAULT_IPC_TIMEOUT_SECS),
            idle_timeout: secs(file.idle_timeout_secs, DEFAULT_IDLE_TIMEOUT_SECS),
            mpv_path: file.mpv_path.unwrap_or_else(|| PathBuf::from("mpv")),
            mixer_path: file.mixer_path.unwrap_or_else(|| PathBuf::from("amixer")),
            ipc_socket: file
                .ipc_socket
                .unwrap_or_else(|| PathBuf::from(DEFAULT_IPC_SOCKET)),
            localhost: args.localhost || file.localhost.unwrap_or(false),
        }
    }
}

/// Where a generated config is written on first run.
pub fn default_config_path() -> PathBuf {
    app_config_dir().join("config.toml")
}

pub fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_owned());
    }
    let cwd_config = PathBuf::from("remotty.toml");
    if cwd_config.exists() {
        return Some(cwd_config);
    }
    let xdg_config = default_config_path();
    if xdg_config.exists() {
        return Some(xdg_config);
    }
    None
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

pub fn load_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: FileConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Write `config` to `path` as TOML, creating parent directories.
pub fn write_config(path: &Path, config: &FileConfig) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

/// Locate and parse the config file. When none exists, the built-in
/// defaults are written to `generate_at` so the user has something to edit.
/// A file that does not parse is reported and left untouched.
pub fn load_or_generate(explicit: Option<&Path>, generate_at: &Path) -> Option<FileConfig> {
    match find_config_file(explicit) {
        Some(path) => match load_config(&path) {
            Ok(cfg) => {
                tracing::debug!("Loaded config from {}", path.display());
                Some(cfg)
            }
            Err(e) => {
                tracing::warn!("Failed to load config file {}: {} -- using defaults", path.display(), e);
                None
            }
        },
        None => {
            let defaults = Config::resolve(None, &crate::cli::Args::default());
            match write_config(generate_at, &FileConfig::from(&defaults)) {
                Ok(()) => tracing::info!("Wrote default config to {}", generate_at.display()),
                Err(e) => tracing::warn!("Could not write default config to {}: {}", generate_at.display(), e),
            }
            None
        }
    }
}
