//! Settings file discovery, loading and writing.
//!
//! Lookup order when no `--config` path is given:
//! - `settings.toml` in the current working directory
//! - `settings.toml` in the platform config directory:
//!   - Windows:  `%APPDATA%\TmObsSync\settings.toml`
//!   - Linux:    `$XDG_CONFIG_HOME/tm-obs-sync/settings.toml` (or `~/.config/...`)
//!   - macOS:    `~/Library/Application Support/TmObsSync/settings.toml`

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::domain::{Settings, SettingsError};

/// File name looked for in each candidate directory.
pub const SETTINGS_FILE_NAME: &str = "settings.toml";

/// Error type for settings file operations.
#[derive(Debug, Error)]
pub enum SettingsFileError {
    /// No settings file exists at any candidate location.
    #[error("settings file not found (looked in: {})", display_paths(.0))]
    NotFound(Vec<PathBuf>),

    /// A file system I/O error occurred.
    #[error("I/O error accessing settings at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse settings TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The settings could not be serialized to TOML.
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The file parsed but its content is not usable.
    #[error("invalid settings: {0}")]
    Invalid(#[from] SettingsError),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Picks the settings file to use.
///
/// An explicit path must exist; otherwise the candidates above are tried.
///
/// # Errors
///
/// [`SettingsFileError::NotFound`] listing every location tried.
pub fn find_settings_file(explicit: Option<&Path>) -> Result<PathBuf, SettingsFileError> {
    let candidates = match explicit {
        Some(path) => vec![path.to_path_buf()],
        None => default_candidates(),
    };
    candidates
        .iter()
        .find(|path| path.is_file())
        .cloned()
        .ok_or(SettingsFileError::NotFound(candidates))
}

fn default_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(2);
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join(SETTINGS_FILE_NAME));
    }
    if let Some(dir) = platform_config_dir() {
        candidates.push(dir.join(SETTINGS_FILE_NAME));
    }
    candidates
}

/// Parses and validates settings text.
///
/// # Errors
///
/// [`SettingsFileError::Parse`] for malformed TOML and
/// [`SettingsFileError::Invalid`] when validation fails.
pub fn parse_settings(text: &str) -> Result<Settings, SettingsFileError> {
    let settings: Settings = toml::from_str(text)?;
    settings.validate()?;
    Ok(settings)
}

/// Reads, parses and validates the settings file at `path`.
pub fn load_settings(path: &Path) -> Result<Settings, SettingsFileError> {
    let text = std::fs::read_to_string(path).map_err(|source| SettingsFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_settings(&text)
}

/// Writes `settings` to `path`, creating parent directories.
///
/// # Errors
///
/// [`SettingsFileError::Io`] for file-system failures or
/// [`SettingsFileError::Serialize`] if serialization fails.
pub fn save_settings(path: &Path, settings: &Settings) -> Result<(), SettingsFileError> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| SettingsFileError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(settings)?;
    std::fs::write(path, content).map_err(|source| SettingsFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// The platform config directory for this application.
pub fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("TmObsSync"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("tm-obs-sync"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("TmObsSync")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
