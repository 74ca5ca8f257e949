//! Archiver configuration (TOML).
//!
//! The file is looked up at:
//! 1. `$MAILARCHIVER_CONFIG` (environment variable)
//! 2. `~/.config/mailarchiver/config.toml` (Linux)
//!    `~/Library/Application Support/mailarchiver/config.toml` (macOS)
//!    `%APPDATA%\mailarchiver\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ArchiveError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    /// Where and how messages are archived.
    pub archive: ArchiveConfig,
    /// Rules suppressing archiving for matching messages.
    #[serde(deserialize_with = "lenient_ignore")]
    pub ignore: IgnoreConfig,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default tracing filter when no `-v` flag or `RUST_LOG` is given.
    pub log_level: String,
    /// Override directory for the log file.
    pub log_dir: Option<PathBuf>,
}

/// Archive settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Master switch; when false nothing is written.
    pub enabled: bool,
    /// Archive root directory.
    pub root: PathBuf,
    /// Preview bodies longer than this are truncated (default: 2,000,000).
    pub max_preview_bytes: usize,
    /// Attachments longer than this are truncated (default: 50,000,000).
    pub max_attachment_bytes: usize,
    /// Transport name recorded when the caller does not supply one.
    pub transport: String,
}

/// Ignore rules as written in the config file.
///
/// Every field tolerates a wrong shape: anything that is not a list of
/// strings becomes an empty list, and non-string items are dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreConfig {
    /// Sender addresses.
    #[serde(deserialize_with = "lenient_list")]
    pub from: Vec<String>,
    /// Recipient addresses (To, Cc or Bcc).
    #[serde(deserialize_with = "lenient_list")]
    pub to: Vec<String>,
    /// Subject patterns: `/regex/flags` or a plain substring.
    #[serde(deserialize_with = "lenient_list")]
    pub subject_regex: Vec<String>,
    /// Template tags from the `X-Archive-Template` header.
    #[serde(deserialize_with = "lenient_list")]
    pub templates: Vec<String>,
}

// ── Default implementations ─────────────────────────────────────

/// Default preview cap in bytes.
pub const DEFAULT_MAX_PREVIEW_BYTES: usize = 2_000_000;

/// Default per-attachment cap in bytes.
pub const DEFAULT_MAX_ATTACHMENT_BYTES: usize = 50_000_000;

/// Transport name used when none is known.
pub const DEFAULT_TRANSPORT: &str = "default";

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            log_dir: None,
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root: default_archive_root(),
            max_preview_bytes: DEFAULT_MAX_PREVIEW_BYTES,
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
            transport: DEFAULT_TRANSPORT.to_string(),
        }
    }
}

fn default_archive_root() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("mailarchiver").join("archive"))
        .unwrap_or_else(|| PathBuf::from("mail-archive"))
}

// ── Lenient deserializers ───────────────────────────────────────

fn lenient_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Item {
        Text(String),
        Other(serde::de::IgnoredAny),
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Shape {
        List(Vec<Item>),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Shape::deserialize(deserializer)? {
        Shape::List(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Item::Text(s) => Some(s),
                Item::Other(_) => None,
            })
            .collect(),
        Shape::Other(_) => Vec::new(),
    })
}

fn lenient_ignore<'de, D>(deserializer: D) -> std::result::Result<IgnoreConfig, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Shape {
        Table(IgnoreConfig),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Shape::deserialize(deserializer)? {
        Shape::Table(cfg) => cfg,
        Shape::Other(_) => IgnoreConfig::default(),
    })
}

// ── Load / save ─────────────────────────────────────────────────

/// Load the configuration file if there is one.
///
/// A missing or unreadable file falls back to the built-in defaults; a broken
/// config never stops mail from being archived.
pub fn load_config() -> Config {
    let Some(path) = config_file_path().filter(|p| p.exists()) else {
        return Config::default();
    };

    load_config_from(&path).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "Ignoring unusable config file");
        Config::default()
    })
}

/// Load configuration from a specific file.
pub fn load_config_from(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path).map_err(|e| ArchiveError::io(path, e))?;
    toml::from_str::<Config>(&contents).map_err(|e| ArchiveError::Config {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Write `config` as TOML to [`config_file_path`], returning the path.
pub fn save_config(config: &Config) -> anyhow::Result<PathBuf> {
    use anyhow::Context;

    let path = config_file_path().context("No configuration directory on this platform")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create {}", parent.display()))?;
    }
    std::fs::write(&path, toml::to_string_pretty(config)?)
        .with_context(|| format!("Cannot write {}", path.display()))?;
    tracing::info!(path = %path.display(), "Wrote config file");
    Ok(path)
}

/// `$MAILARCHIVER_CONFIG` when set, else `<config dir>/mailarchiver/config.toml`.
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILARCHIVER_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mailarchiver").join("config.toml"))
}

/// Directory for `mailarchiver.log`.
pub fn log_dir(config: &Config) -> PathBuf {
    config.general.log_dir.clone().unwrap_or_else(|| {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mailarchiver")
    })
}
