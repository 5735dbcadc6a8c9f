// Host configuration

use crate::Result;
use prerender_bridge::{Environment, PrerenderConfig};
use prerender_config::{ConfigManager, ConfigValidator, Validate};
use prerender_log::LogConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "PRERENDER";

/// Complete host configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub environment: Environment,
    pub listen: String,
    pub log: LogConfig,
    pub prerender: PrerenderConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Production,
            listen: "127.0.0.1:5000".to_string(),
            log: LogConfig::default(),
            prerender: PrerenderConfig::default(),
        }
    }
}

impl HostConfig {
    /// Load `.env`, the optional config file, then `PRERENDER_*` overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let manager = ConfigManager::with_prefix(ENV_PREFIX);
        manager.load_dotenv(None)?;
        if let Some(path) = path {
            manager.load_file(path)?;
        }
        manager.apply_env(env_key);
        Self::from_manager(&manager)
    }

    pub fn from_manager(manager: &ConfigManager) -> Result<Self> {
        Ok(manager.load_validated::<Self>()?)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().map_err(|e| {
            prerender_config::ConfigError::invalid("listen", format!("'{}': {}", self.listen, e))
                .into()
        })
    }
}

impl Validate for HostConfig {
    fn validate(&self) -> prerender_config::Result<()> {
        ConfigValidator::is_socket_addr(&self.listen, "listen")?;
        self.prerender.validate()
    }
}

/// Dotted config key for a stripped `PRERENDER_*` variable name
pub fn env_key(name: &str) -> Option<String> {
    match name {
        "environment" | "listen" => Some(name.to_string()),
        "debug" => None,
        _ => match name.strip_prefix("log_") {
            Some(rest) if !rest.is_empty() => Some(format!("log.{}", rest)),
            _ => Some(format!("prerender.{}", name)),
        },
    }
}
