// Boot module resolution

use crate::config::PrerenderConfig;
use crate::{PrerenderError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Hosting environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl Environment {
    /// Accepts `dev`/`development` and `prod`/`production`, case-insensitive
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Some(Self::Development),
            "prod" | "production" => Some(Self::Production),
            _ => None,
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// How markup is produced, chosen once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootModuleDescriptor {
    /// Run a build/watch command and render through its dev server
    Dev { watch_command: String },
    /// Load a prebuilt server module into a render worker
    Prod { module_path: PathBuf },
}

/// Select the boot module for `env`.
///
/// Errors are configuration errors and abort startup.
pub fn resolve(env: Environment, config: &PrerenderConfig) -> Result<BootModuleDescriptor> {
    match env {
        Environment::Development => {
            let command = config
                .dev_command
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .ok_or_else(|| {
                    PrerenderError::Configuration(
                        "prerender.dev_command is required in development".to_string(),
                    )
                })?;

            Ok(BootModuleDescriptor::Dev {
                watch_command: command.to_string(),
            })
        }
        Environment::Production => {
            let relative = config.boot_module_path.as_ref().ok_or_else(|| {
                PrerenderError::Configuration(
                    "prerender.boot_module_path is required in production".to_string(),
                )
            })?;

            let module_path = if relative.is_absolute() {
                relative.clone()
            } else {
                config.source_path.join(relative)
            };

            if !module_path.is_file() {
                return Err(PrerenderError::Configuration(format!(
                    "boot module not found: {}",
                    module_path.display()
                )));
            }

            Ok(BootModuleDescriptor::Prod { module_path })
        }
    }
}
