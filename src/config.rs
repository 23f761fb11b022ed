//! Encoder configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$FORMWIRE_CONFIG` (environment variable)
//! 2. `~/.config/formwire/config.toml` (Linux/macOS)
//!    `%APPDATA%\formwire\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default read size for file-backed part bodies (64 KB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Encoder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Read size in bytes for file-backed sources (default: 65536 = 64 KB).
    pub chunk_size: usize,
    /// Fixed boundary token. Random when absent.
    pub boundary: Option<String>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            boundary: None,
        }
    }
}

impl EncoderConfig {
    /// Chunk size with zero mapped to the default.
    pub fn effective_chunk_size(&self) -> usize {
        if self.chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            self.chunk_size
        }
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> EncoderConfig {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<EncoderConfig>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    EncoderConfig::default()
}

/// Persist `config` as pretty TOML at [`config_file_path`], creating the
/// parent directory if needed.
pub fn save_config(config: &EncoderConfig) -> anyhow::Result<()> {
    let Some(path) = config_file_path() else {
        anyhow::bail!("no config directory for formwire on this platform");
    };
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, toml::to_string_pretty(config)?)?;
    tracing::info!(path = %path.display(), chunk_size = config.chunk_size, "Saved encoder config");
    Ok(())
}

/// `$FORMWIRE_CONFIG` if set, else `formwire/config.toml` under the
/// platform config directory.
pub fn config_file_path() -> Option<PathBuf> {
    match std::env::var_os("FORMWIRE_CONFIG") {
        Some(path) => Some(PathBuf::from(path)),
        None => dirs::config_dir().map(|dir| dir.join("formwire").join("config.toml")),
    }
}
