//! Configuration for the storage layer.
//!
//! Settings are read from TOML through typed sections. Each section type
//! names its table with [`Configurable::PREFIX`]; missing tables and fields
//! fall back to defaults so an empty file is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

// ============================================================================
// Configurable Trait
// ============================================================================

/// Trait for types that can be loaded from a TOML section
///
/// # Example
///
/// ```ignore
/// use dashstore::core::config::Configurable;
///
/// #[derive(Debug, serde::Deserialize, Default)]
/// pub struct FeedConfig {
///     pub refresh_secs: u64,
/// }
///
/// impl Configurable for FeedConfig {
///     const PREFIX: &'static str = "feeds";
/// }
/// ```
pub trait Configurable: DeserializeOwned + Default {
    /// TOML table name holding this section
    const PREFIX: &'static str;
}

// ============================================================================
// Configuration Store
// ============================================================================

/// Parsed TOML document with typed section access
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    root: toml::Table,
}

impl ConfigStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn parse(content: &str) -> Result<Self> {
        let root = toml::from_str(content).context("invalid TOML configuration")?;
        Ok(Self { root })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading storage configuration");
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("in config file {}", path.display()))
    }

    /// Load several files in order, later files overriding earlier ones key by key.
    ///
    /// Missing files are skipped, so a shipped default plus an optional user
    /// file can be passed unconditionally. Unreadable or malformed files are errors.
    pub fn layered<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> Result<Self> {
        let mut store = Self::empty();
        for path in paths {
            let path = path.as_ref();
            if !path.exists() {
                debug!(path = %path.display(), "Config layer absent, skipped");
                continue;
            }
            store.overlay(Self::from_file(path)?);
        }
        Ok(store)
    }

    /// Typed section, or its defaults when the table is absent
    pub fn get<C: Configurable>(&self) -> Result<C> {
        let section = match self.root.get(C::PREFIX) {
            Some(value) => value.clone(),
            None => toml::Value::Table(toml::Table::new()),
        };
        section
            .try_into()
            .with_context(|| format!("invalid [{}] section", C::PREFIX))
    }

    /// Apply `upper` on top of this store; its values win.
    pub fn overlay(&mut self, upper: ConfigStore) {
        overlay_table(&mut self.root, upper.root);
    }
}

fn overlay_table(lower: &mut toml::Table, upper: toml::Table) {
    for (key, value) in upper {
        match value {
            toml::Value::Table(upper_table) => {
                if let Some(toml::Value::Table(lower_table)) = lower.get_mut(&key) {
                    overlay_table(lower_table, upper_table);
                    continue;
                }
                lower.insert(key, toml::Value::Table(upper_table));
            }
            value => {
                lower.insert(key, value);
            }
        }
    }
}

// ============================================================================
// Storage Sections
// ============================================================================

/// Default quota of a local file store, matching common browser storage limits.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// `[storage]`: where the local tiers live
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_persistent_file")]
    pub persistent_file: String,

    /// Directory for session-scoped files; the system temp dir when unset
    #[serde(default)]
    pub session_dir: Option<PathBuf>,

    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            persistent_file: default_persistent_file(),
            session_dir: None,
            quota_bytes: default_quota_bytes(),
        }
    }
}

impl StorageSettings {
    pub fn persistent_path(&self) -> PathBuf {
        self.data_dir.join(&self.persistent_file)
    }

    pub fn session_dir(&self) -> PathBuf {
        self.session_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("dashstore"))
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".dashstore")
}

fn default_persistent_file() -> String {
    "local.json".to_string()
}

fn default_quota_bytes() -> usize {
    DEFAULT_QUOTA_BYTES
}

impl Configurable for StorageSettings {
    const PREFIX: &'static str = "storage";
}

/// `[remote]`: how the remote table is reached
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSettings {
    #[serde(default = "default_table")]
    pub table: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            table: default_table(),
            timeout_ms: default_timeout_ms(),
            user_agent: None,
        }
    }
}

impl RemoteSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("dashstore/{}", env!("CARGO_PKG_VERSION")))
    }
}

fn default_table() -> String {
    "kv_store".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Configurable for RemoteSettings {
    const PREFIX: &'static str = "remote";
}
