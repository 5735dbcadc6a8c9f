//! Layered configuration for the prerendering host.
//!
//! Values are collected into a single JSON tree: configuration files are
//! deep-merged first, environment overrides are applied on top, and the
//! result is deserialized into a typed struct.
//!
//! ```
//! use prerender_config::{ConfigManager, FileFormat};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Settings {
//!     listen: String,
//!     #[serde(default)]
//!     workers: u32,
//! }
//!
//! let manager = ConfigManager::new();
//! manager.merge_str(r#"listen = "127.0.0.1:5000""#, FileFormat::Toml).unwrap();
//! manager.set("workers", 4).unwrap();
//!
//! let settings: Settings = manager.load().unwrap();
//! assert_eq!(settings.listen, "127.0.0.1:5000");
//! assert_eq!(settings.workers, 4);
//! ```

pub mod env;
pub mod error;
pub mod loader;
pub mod validation;

pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use validation::{ConfigValidator, Validate};

use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

/// Configuration tree addressed by dotted keys (`prerender.render_timeout_ms`)
#[derive(Clone)]
pub struct ConfigManager {
    root: Arc<RwLock<Value>>,
    env_prefix: Option<String>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            root: Arc::new(RwLock::new(Value::Object(Map::new()))),
            env_prefix: None,
        }
    }

    /// Create with an environment variable prefix such as `PRERENDER`
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            env_prefix: Some(prefix.into()),
            ..Self::new()
        }
    }

    /// Merge a file, detecting the format from its name
    pub fn load_file(&self, path: &Path) -> Result<()> {
        let data = ConfigLoader::auto(path)?.load_file(path)?;
        self.merge_value(data);
        Ok(())
    }

    /// Merge configuration text in a known format
    pub fn merge_str(&self, content: &str, format: FileFormat) -> Result<()> {
        let data = ConfigLoader::new(format).parse(content)?;
        self.merge_value(data);
        Ok(())
    }

    /// Load a `.env` file into the process environment.
    ///
    /// With no path, a missing `./.env` is not an error.
    pub fn load_dotenv(&self, path: Option<&Path>) -> Result<()> {
        match path {
            Some(path) => dotenvy::from_path(path)
                .map(|_| ())
                .map_err(|e| ConfigError::Dotenv(e.to_string())),
            None => match dotenvy::dotenv() {
                Ok(_) => Ok(()),
                Err(e) if e.not_found() => Ok(()),
                Err(e) => Err(ConfigError::Dotenv(e.to_string())),
            },
        }
    }

    /// Apply prefixed environment variables as overrides.
    ///
    /// `route` maps a stripped, lowercased variable name to the dotted key it
    /// should set, or `None` to ignore the variable.
    pub fn apply_env<F>(&self, route: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let loader = EnvLoader::new(self.env_prefix.clone());
        for (name, raw) in loader.load() {
            if let Some(key) = route(&name) {
                self.set_raw(&key, &raw);
            }
        }
    }

    /// Set a dotted key from an environment-style string.
    ///
    /// JSON literals (numbers, booleans, arrays, objects) are kept typed,
    /// anything else is stored as a string.
    pub fn set_raw(&self, key: &str, raw: &str) {
        let value = serde_json::from_str::<Value>(raw)
            .ok()
            .filter(|v| !v.is_string())
            .unwrap_or_else(|| Value::String(raw.to_string()));
        insert_path(&mut self.root.write(), key, value);
    }

    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| ConfigError::SerializationError(e.to_string()))?;
        insert_path(&mut self.root.write(), key, value);
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let root = self.root.read();
        let value = lookup_path(&root, key).ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;

        serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::DeserializationError(format!("{}: {}", key, e)))
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    pub fn has(&self, key: &str) -> bool {
        lookup_path(&self.root.read(), key).is_some()
    }

    /// Deserialize the whole tree
    pub fn load<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.root.read().clone())
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))
    }

    /// Deserialize and validate in one step
    pub fn load_validated<T: DeserializeOwned + Validate>(&self) -> Result<T> {
        let config: T = self.load()?;
        config.validate()?;
        Ok(config)
    }

    fn merge_value(&self, data: Value) {
        merge(&mut self.root.write(), data);
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Deep merge: objects merge key by key, everything else is replaced
fn merge(target: &mut Value, incoming: Value) {
    match (target, incoming) {
        (Value::Object(target), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match target.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, incoming) => *target = incoming,
    }
}

fn insert_path(root: &mut Value, key: &str, value: Value) {
    let mut node = root;
    for part in key.split('.') {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        node = &mut node[part];
    }
    *node = value;
}

fn lookup_path<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(root, |node, part| node.get(part))
}
