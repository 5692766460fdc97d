use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults; the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Database store directory (overrides the XDG default).
    pub database_dir: Option<PathBuf>,
    /// Artifact store directory (overrides the XDG default).
    pub artifact_dir: Option<PathBuf>,
    /// Staging directory for tool-safe filename copies (overrides the XDG default).
    pub staging_dir: Option<PathBuf>,
    /// Cores handed to the fingerprinter. 0 = auto-detect.
    pub cores: usize,
    /// External tool locations.
    pub tools: ToolConfig,
}

/// Where to find the external tools.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// The audfprint launcher: a binary or wrapper script, looked up on PATH
    /// unless given as an absolute path.
    pub audfprint: String,
    /// The ffmpeg binary audfprint decodes through.
    pub ffmpeg: String,
    /// Optional directory prepended to PATH so bundled tool builds win over
    /// whatever the system carries.
    pub path_prefix: Option<PathBuf>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            audfprint: "audfprint".into(),
            ffmpeg: "ffmpeg".into(),
            path_prefix: None,
        }
    }
}

impl AppConfig {
    /// Load config from `path_override` or `~/.config/ridgeline/config.toml`.
    /// Returns default config if no file exists.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load(path_override: Option<&Path>) -> Self {
        let config_path = match path_override {
            Some(path) => Some(path.to_path_buf()),
            None => Self::config_path(),
        };
        match config_path {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            Some(path) if path_override.is_some() => {
                log::warn!("Config file {} not found. Using defaults.", path.display());
                Self::default()
            }
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Directory holding `.pklz` databases and their `.txt` listings.
    pub fn databases_root(&self) -> PathBuf {
        self.database_dir
            .clone()
            .unwrap_or_else(|| data_dir().join("databases"))
    }

    /// Directory holding `.afpt` artifacts and their `.json` sidecars.
    pub fn artifacts_root(&self) -> PathBuf {
        self.artifact_dir
            .clone()
            .unwrap_or_else(|| data_dir().join("precompute"))
    }

    /// Directory where tool-unsafe filenames are copied before analysis.
    pub fn staging_root(&self) -> PathBuf {
        self.staging_dir
            .clone()
            .unwrap_or_else(|| data_dir().join("ascii"))
    }

    /// Resolve core count for fingerprinting: 0 → auto-detect.
    pub fn resolve_cores(&self) -> usize {
        if self.cores > 0 {
            self.cores
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Resolve the XDG data directory, falling back to the current directory.
fn data_dir() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        dirs.data_dir().to_path_buf()
    } else {
        PathBuf::from(".")
    }
}
