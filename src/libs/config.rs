//! Configuration for the persistence layer.
//!
//! Settings come from `config.json` in the data directory and are then
//! overridden by environment variables (a `.env` file is honoured through
//! `dotenv`). A missing remote section is a valid configuration: the process
//! starts in local-fallback mode and diagnostics report it.
//!
//! ```rust,no_run
//! use rollcall::libs::config::Config;
//!
//! let config = Config::read()?;
//! if config.remote.is_none() {
//!     println!("running offline");
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

use super::data_storage::DataStorage;
use crate::api::client::RemoteConfig;
use crate::libs::messages::Message;
use crate::{msg_debug, msg_info};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs::{self, File};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const REMOTE_URL_ENV: &str = "ROLLCALL_REMOTE_URL";
pub const REMOTE_KEY_ENV: &str = "ROLLCALL_REMOTE_KEY";

/// Connectivity probing and request deadlines. All durations are milliseconds.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Deadline for a reachability check of the remote service.
    pub probe_timeout_ms: u64,

    /// Deadline for the local network route check in diagnostics.
    pub network_timeout_ms: u64,

    /// Deadline for the generic external endpoint check in diagnostics.
    pub external_timeout_ms: u64,

    /// Deadline for the remote-service endpoint check in diagnostics.
    pub remote_timeout_ms: u64,

    /// Deadline for individual remote CRUD and auth requests.
    pub request_timeout_ms: u64,

    /// Endpoint used to tell "no internet" apart from "remote service down".
    pub external_probe_url: String,

    /// Address used for the route check. A UDP connect sends no packets; it only
    /// asks the OS whether a route exists.
    pub route_probe_addr: String,

    /// Path on the remote service answered without authentication.
    pub remote_health_path: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            probe_timeout_ms: 5_000,
            network_timeout_ms: 2_000,
            external_timeout_ms: 5_000,
            remote_timeout_ms: 5_000,
            request_timeout_ms: 10_000,
            external_probe_url: "https://www.google.com/generate_204".to_string(),
            route_probe_addr: "1.1.1.1:53".to_string(),
            remote_health_path: "auth/v1/health".to_string(),
        }
    }
}

impl ConnectionConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Timers and retry policy used while resolving the session at startup.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// After this long the state is published as degraded while the check keeps running.
    pub soft_timeout_ms: u64,

    /// After this long the check is abandoned and the mode forced to local fallback.
    pub hard_timeout_ms: u64,

    /// Reachability retries after the first failed attempt.
    pub check_retries: u32,

    /// Fixed delay between reachability attempts.
    pub retry_backoff_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            soft_timeout_ms: 8_000,
            hard_timeout_ms: 15_000,
            check_retries: 2,
            retry_backoff_ms: 1_000,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteConfig>,

    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    /// Reads the configuration from the default data directory.
    pub fn read() -> Result<Config> {
        Self::read_from(&DataStorage::new())
    }

    pub fn read_from(storage: &DataStorage) -> Result<Config> {
        let _ = dotenv::dotenv();

        let config_file_path = storage.get_path(CONFIG_FILE_NAME)?;
        let mut config = if config_file_path.exists() {
            let config_str = fs::read_to_string(&config_file_path)
                .with_context(|| format!("reading {}", config_file_path.display()))?;
            let config: Config = serde_json::from_str(&config_str)
                .with_context(|| format!("parsing {}", config_file_path.display()))?;
            msg_debug!(Message::ConfigLoaded(config_file_path.display().to_string()));
            config
        } else {
            msg_debug!(Message::ConfigFileNotFound);
            Config::default()
        };

        config.apply_env();
        Ok(config)
    }

    /// Overlays `ROLLCALL_REMOTE_URL` / `ROLLCALL_REMOTE_KEY`. Both must be
    /// non-empty for a remote section to be created from the environment alone.
    pub fn apply_env(&mut self) {
        let url = env::var(REMOTE_URL_ENV).ok().filter(|v| !v.trim().is_empty());
        let key = env::var(REMOTE_KEY_ENV).ok().filter(|v| !v.trim().is_empty());

        if let Some(remote) = self.remote.as_mut() {
            if let Some(url) = url {
                msg_debug!(Message::ConfigEnvOverride(REMOTE_URL_ENV));
                remote.api_url = url;
            }
            if let Some(key) = key {
                msg_debug!(Message::ConfigEnvOverride(REMOTE_KEY_ENV));
                remote.anon_key = key;
            }
        } else if let (Some(api_url), Some(anon_key)) = (url, key) {
            self.remote = Some(RemoteConfig { api_url, anon_key });
        }

        if self.remote.as_ref().is_some_and(|r| !r.is_complete()) {
            self.remote = None;
        }
        if self.remote.is_none() {
            msg_info!(Message::RemoteNotConfigured);
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&DataStorage::new())
    }

    pub fn save_to(&self, storage: &DataStorage) -> Result<()> {
        let config_file_path = storage.get_path(CONFIG_FILE_NAME)?;
        let config_file = File::create(&config_file_path)
            .with_context(|| format!("creating {}", config_file_path.display()))?;
        serde_json::to_writer_pretty(&config_file, &self)?;
        Ok(())
    }
}
