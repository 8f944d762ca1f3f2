use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::core::notifier::SubscribeOptions;
use crate::core::runs::TransitionPolicy;
use crate::core::store::IN_MEMORY;

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RunboardConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub runs: RunsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Relative paths are resolved against the data directory.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// 0 disables the ceiling.
    #[serde(default)]
    pub max_duration_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RunsConfig {
    #[serde(default)]
    pub transition_policy: TransitionPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    17990
}
fn default_db_path() -> PathBuf {
    PathBuf::from("runboard.db")
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_duration_secs: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl RunboardConfig {
    /// Reads `config.toml` from the data directory. A missing file yields
    /// the defaults.
    pub async fn load<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let config_path = data_dir.as_ref().join(CONFIG_FILE);
        if !config_path.exists() {
            info!("No {} found, using defaults.", CONFIG_FILE);
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(&config_path).await?;
        let config: RunboardConfig = toml::from_str(&content)?;

        info!(
            "Loaded config: server={}:{}, store={}, poll={}ms, policy={:?}",
            config.server.host,
            config.server.port,
            config.store.path.display(),
            config.stream.poll_interval_ms,
            config.runs.transition_policy
        );
        Ok(config)
    }

    pub fn db_path(&self, data_dir: &Path) -> PathBuf {
        if self.store.path.is_absolute() || self.store.path == Path::new(IN_MEMORY) {
            self.store.path.clone()
        } else {
            data_dir.join(&self.store.path)
        }
    }

    pub fn subscribe_options(&self) -> SubscribeOptions {
        SubscribeOptions {
            // a zero interval would spin the poll loop
            poll_interval: Duration::from_millis(self.stream.poll_interval_ms.max(10)),
            max_duration: match self.stream.max_duration_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}
