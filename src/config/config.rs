// SPDX-License-Identifier: GPL-3.0-only
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::catalog::{Category, CategoryRegistry};
use crate::store::BackendKind;
use crate::utils::{validate_endpoint_url, validate_relative_path};

pub const CONFIG_PATH_VAR: &str = "STOCKMASTER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "stockmaster.toml";
const ENV_PREFIX: &str = "STOCKMASTER_";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which remote store backs the session
    pub backend: BackendKind,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Local API bind address (e.g., "127.0.0.1:8080")
    pub local_api_bind: SocketAddr,

    /// Background sync interval in seconds
    pub sync_interval_secs: u64,

    /// SQLite database holding the local cache
    pub cache_db_path: PathBuf,

    /// Age after which a cached product list is no longer used offline
    pub cache_max_age_secs: u64,

    pub probe_timeout_secs: u64,

    pub request_timeout_secs: u64,

    /// Directory with one JSON file per category
    pub products_dir: PathBuf,

    /// Fall back to the local JSON files when the remote store is unreachable
    pub local_fallback: bool,

    pub sheets: SheetsConfig,

    pub firestore: FirestoreConfig,

    /// Overrides the built-in category registry when non-empty
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    /// Deployed Apps Script web app URL
    pub script_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FirestoreConfig {
    pub endpoint: String,
    pub project_id: String,
    pub collection: String,
    pub api_key: Option<String>,
    pub auth_token: Option<String>,

    /// Snapshot polling interval for change detection
    pub watch_interval_secs: u64,
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            endpoint: String::from("https://firestore.googleapis.com"),
            project_id: String::new(),
            collection: String::from("products"),
            api_key: None,
            auth_token: None,
            watch_interval_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from TOML file with environment variable overrides
    pub fn load() -> anyhow::Result<Self> {
        let config_path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let mut config: Config = if std::path::Path::new(&config_path).exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file {}", config_path))?;
            toml::from_str(&contents).with_context(|| format!("Failed to parse config file {}", config_path))?
        } else {
            Config::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `STOCKMASTER_*` overrides. `lookup` receives the full variable name.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(val) = var("BACKEND") {
            self.backend = val.parse()?;
        }
        if let Some(val) = var("LOG_LEVEL") {
            self.log_level = val;
        }
        if let Some(val) = var("LOCAL_API_BIND") {
            self.local_api_bind = SocketAddr::from_str(&val).context("Invalid STOCKMASTER_LOCAL_API_BIND")?;
        }
        if let Some(val) = var("SYNC_INTERVAL_SECS") {
            self.sync_interval_secs = val.parse().context("Invalid STOCKMASTER_SYNC_INTERVAL_SECS")?;
        }
        if let Some(val) = var("CACHE_DB_PATH") {
            self.cache_db_path = PathBuf::from(val);
        }
        if let Some(val) = var("CACHE_MAX_AGE_SECS") {
            self.cache_max_age_secs = val.parse().context("Invalid STOCKMASTER_CACHE_MAX_AGE_SECS")?;
        }
        if let Some(val) = var("PRODUCTS_DIR") {
            self.products_dir = PathBuf::from(val);
        }
        if let Some(val) = var("SHEETS_SCRIPT_URL") {
            self.sheets.script_url = Some(val);
        }
        if let Some(val) = var("FIRESTORE_ENDPOINT") {
            self.firestore.endpoint = val;
        }
        if let Some(val) = var("FIRESTORE_PROJECT_ID") {
            self.firestore.project_id = val;
        }
        if let Some(val) = var("FIRESTORE_API_KEY") {
            self.firestore.api_key = Some(val);
        }
        if let Some(val) = var("FIRESTORE_AUTH_TOKEN") {
            self.firestore.auth_token = Some(val);
        }

        Ok(())
    }

    /// Reject settings the daemon cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sync_interval_secs == 0 {
            anyhow::bail!("sync_interval_secs must be greater than zero");
        }
        if self.probe_timeout_secs == 0 || self.request_timeout_secs == 0 {
            anyhow::bail!("probe_timeout_secs and request_timeout_secs must be greater than zero");
        }

        match self.backend {
            BackendKind::Sheets => {
                let url = self
                    .sheets
                    .script_url
                    .as_deref()
                    .context("backend \"sheets\" requires sheets.script_url")?;
                validate_endpoint_url(url).context("Invalid sheets.script_url")?;
            }
            BackendKind::Firestore => {
                if self.firestore.project_id.trim().is_empty() {
                    anyhow::bail!("backend \"firestore\" requires firestore.project_id");
                }
                if self.firestore.collection.is_empty() || self.firestore.collection.contains('/') {
                    anyhow::bail!("firestore.collection must be a single collection id");
                }
                if self.firestore.watch_interval_secs == 0 {
                    anyhow::bail!("firestore.watch_interval_secs must be greater than zero");
                }
                validate_endpoint_url(&self.firestore.endpoint).context("Invalid firestore.endpoint")?;
            }
            BackendKind::Local => {}
        }

        let mut keys = HashSet::new();
        for category in &self.categories {
            if !keys.insert(category.key.as_str()) {
                anyhow::bail!("Duplicate category key: {}", category.key);
            }
            if let Some(file) = &category.file {
                validate_relative_path(file)
                    .with_context(|| format!("Invalid file for category {}", category.key))?;
            }
        }

        Ok(())
    }

    pub fn category_registry(&self) -> CategoryRegistry {
        if self.categories.is_empty() {
            CategoryRegistry::builtin()
        } else {
            CategoryRegistry::new(self.categories.clone())
        }
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache_max_age_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            log_level: String::from("info"),
            local_api_bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            sync_interval_secs: 300, // 5 minutes
            cache_db_path: PathBuf::from("stockmaster-cache.db"),
            cache_max_age_secs: 3600,
            probe_timeout_secs: 5,
            request_timeout_secs: 30,
            products_dir: PathBuf::from("productos"),
            local_fallback: true,
            sheets: SheetsConfig::default(),
            firestore: FirestoreConfig::default(),
            categories: Vec::new(),
        }
    }
}
