//! Host settings for the CLI, loaded from `credbroker.toml`.
//!
//! ```toml
//! data_dir = "data"
//!
//! [lease]
//! default_ttl = "1h"
//! max_ttl = "24h"
//!
//! [http]
//! timeout = "30s"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::duration::{deserialize_ttl, deserialize_ttl_opt};
use crate::lease::LeaseDefaults;

const SETTINGS_FILE: &str = "credbroker.toml";

fn default_lease_ttl() -> Duration {
    LeaseDefaults::default().default_ttl
}

fn default_lease_max_ttl() -> Duration {
    LeaseDefaults::default().max_ttl
}

/// Lease defaults applied when a credential sets no TTL of its own.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LeaseSettings {
    #[serde(
        default = "default_lease_ttl",
        deserialize_with = "deserialize_ttl"
    )]
    pub default_ttl: Duration,

    #[serde(
        default = "default_lease_max_ttl",
        deserialize_with = "deserialize_ttl"
    )]
    pub max_ttl: Duration,
}

impl Default for LeaseSettings {
    fn default() -> Self {
        Self {
            default_ttl: default_lease_ttl(),
            max_ttl: default_lease_max_ttl(),
        }
    }
}

impl LeaseSettings {
    pub fn defaults(&self) -> LeaseDefaults {
        LeaseDefaults {
            default_ttl: self.default_ttl,
            max_ttl: self.max_ttl,
        }
    }
}

/// Downstream HTTP settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Per-request timeout. No timeout when unset.
    #[serde(default, deserialize_with = "deserialize_ttl_opt")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Storage directory. Relative paths resolve against the settings file's
    /// directory; unset means that directory itself.
    pub data_dir: Option<PathBuf>,

    pub lease: LeaseSettings,

    pub http: HttpSettings,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }

    pub fn resolve_data_dir(&self, settings_dir: &Path) -> PathBuf {
        match &self.data_dir {
            Some(data_dir) if data_dir.is_absolute() => data_dir.clone(),
            Some(data_dir) => settings_dir.join(data_dir),
            None => settings_dir.to_path_buf(),
        }
    }
}

/// Settings with the data directory resolved.
#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    pub data_dir: PathBuf,
    pub lease: LeaseSettings,
    pub http: HttpSettings,
}

impl ResolvedSettings {
    /// Load settings; a missing file yields defaults rooted at the file's
    /// intended directory.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let path = if path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(path)
        } else {
            path.to_path_buf()
        };
        let settings_dir = path
            .parent()
            .context("Settings path has no parent directory")?;

        let settings = if path.exists() {
            Settings::load(&path)?
        } else {
            Settings::default()
        };

        Ok(Self {
            data_dir: settings.resolve_data_dir(settings_dir),
            lease: settings.lease,
            http: settings.http,
        })
    }
}

/// Returns the default settings path.
///
/// Resolution order:
/// 1. `./credbroker.toml` if it exists
/// 2. `credbroker/credbroker.toml` under the XDG data directory
pub fn default_settings_path() -> PathBuf {
    let local = PathBuf::from(SETTINGS_FILE);
    if local.exists() {
        return local;
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("credbroker").join(SETTINGS_FILE);
    }

    local
}
