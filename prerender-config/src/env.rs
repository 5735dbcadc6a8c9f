// Environment variable loading

use crate::{ConfigError, Result};
use std::collections::BTreeMap;
use std::env;

/// Reads environment variables, optionally restricted to a prefix
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    /// Collect variables as lowercased keys with the prefix stripped.
    ///
    /// `PRERENDER_RENDER_TIMEOUT_MS` becomes `render_timeout_ms` for the
    /// prefix `PRERENDER`.
    pub fn load(&self) -> BTreeMap<String, String> {
        self.collect(env::vars())
    }

    fn collect(&self, vars: impl Iterator<Item = (String, String)>) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();

        for (key, value) in vars {
            match &self.prefix {
                Some(prefix) => {
                    let Some(rest) = key
                        .strip_prefix(prefix.as_str())
                        .and_then(|rest| rest.strip_prefix('_'))
                    else {
                        continue;
                    };
                    if !rest.is_empty() {
                        out.insert(rest.to_lowercase(), value);
                    }
                }
                None => {
                    out.insert(key.to_lowercase(), value);
                }
            }
        }

        out
    }

    /// Load a single variable, applying the prefix
    pub fn load_var(&self, key: &str) -> Result<String> {
        let full_key = match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, key.to_uppercase()),
            None => key.to_uppercase(),
        };

        env::var(&full_key).map_err(ConfigError::EnvError)
    }

    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(None)
    }
}
