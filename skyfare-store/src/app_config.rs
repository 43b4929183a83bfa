use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub gateway: GatewayConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// SQLite URL, e.g. "sqlite://skyfare-cache.db"
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_search_ttl")]
    pub search_ttl_seconds: u64,
    /// Upper bound on any single remote call before the engine falls back
    /// to the local store.
    #[serde(default = "default_remote_timeout")]
    pub remote_timeout_secs: u64,
}

fn default_search_ttl() -> u64 {
    300
}

fn default_remote_timeout() -> u64 {
    10
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            search_ttl_seconds: default_search_ttl(),
            remote_timeout_secs: default_remote_timeout(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Add in the current environment file
            // Default to 'development' env
            // Note that this file is _optional_
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked in to git
            .add_source(config::File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of SKYFARE)
            // Eg.. `SKYFARE__SYNC__SEARCH_TTL_SECONDS=60`
            .add_source(config::Environment::with_prefix("SKYFARE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
