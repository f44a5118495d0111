//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/desk.sqlite"
//!
//! [server]
//! bind = "127.0.0.1:7341"
//!
//! [collections]
//! read = ["dailytotals_t3global", "OBA"]
//! review = ["dailytotals_t3global", "OBA"]
//! full_scan_limit = 1000
//!
//! [client]
//! endpoint = "http://127.0.0.1:7341"
//! reviewer = "ana@example.com"
//!
//! [viewers.oba]
//! collection = "OBA"
//! filter = "exact_date"
//! confirm_prompt = "Do you confirm reviewing this file?"
//! ```
//!
//! Only `[db]` is required. Both allow-lists default to the six dated-total
//! collections; file collections must be listed explicitly.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use review_desk_core::allow_list::{AllowList, DATED_TOTAL_COLLECTIONS};
use review_desk_core::collection::DEFAULT_FULL_SCAN_LIMIT;
use review_desk_core::viewer::{FilterMode, ViewerProfile, DEFAULT_CONFIRM_PROMPT};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub collections: CollectionsConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub viewers: BTreeMap<String, ViewerConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectionsConfig {
    /// Collections the read endpoint serves.
    #[serde(default = "default_allowed")]
    pub read: Vec<String>,
    /// Collections the review endpoint may modify.
    #[serde(default = "default_allowed")]
    pub review: Vec<String>,
    #[serde(default = "default_full_scan_limit")]
    pub full_scan_limit: usize,
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            read: default_allowed(),
            review: default_allowed(),
            full_scan_limit: default_full_scan_limit(),
        }
    }
}

fn default_allowed() -> Vec<String> {
    DATED_TOTAL_COLLECTIONS.iter().map(|s| s.to_string()).collect()
}

fn default_full_scan_limit() -> usize {
    DEFAULT_FULL_SCAN_LIMIT
}

impl CollectionsConfig {
    pub fn read_allow(&self) -> AllowList {
        AllowList::new(self.read.iter().cloned())
    }

    pub fn review_allow(&self) -> AllowList {
        AllowList::new(self.review.iter().cloned())
    }
}

/// Settings for the CLI when it talks to a running server.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ClientConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Identity recorded as `reviewedBy`.
    #[serde(default)]
    pub reviewer: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ViewerConfig {
    pub collection: String,
    #[serde(default)]
    pub filter: FilterMode,
    #[serde(default)]
    pub confirm_prompt: Option<String>,
    #[serde(default)]
    pub headline_fields: Vec<String>,
}

impl Config {
    /// Resolves a CLI target: a configured viewer name, else a bare
    /// collection name with default viewer settings.
    pub fn viewer(&self, target: &str) -> ViewerProfile {
        match self.viewers.get(target) {
            Some(v) => ViewerProfile {
                name: target.to_string(),
                collection: v.collection.clone(),
                filter: v.filter,
                confirm_prompt: v
                    .confirm_prompt
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CONFIRM_PROMPT.to_string()),
                headline_fields: v.headline_fields.clone(),
            },
            None => ViewerProfile::for_collection(target),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.collections.full_scan_limit == 0 {
        anyhow::bail!("collections.full_scan_limit must be > 0");
    }

    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    for list in [&config.collections.read, &config.collections.review] {
        if list.iter().any(|c| c.trim().is_empty()) {
            anyhow::bail!("collection names must not be empty");
        }
    }

    if let Some(endpoint) = &config.client.endpoint {
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            anyhow::bail!(
                "client.endpoint must start with http:// or https://, got '{}'",
                endpoint
            );
        }
    }

    for (name, viewer) in &config.viewers {
        if viewer.collection.trim().is_empty() {
            anyhow::bail!("viewers.{}.collection must not be empty", name);
        }
    }

    Ok(())
}
