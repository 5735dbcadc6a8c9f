// Configuration validation

use crate::{ConfigError, Result};
use std::net::SocketAddr;
use std::path::Path;

/// Implemented by typed configuration sections
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Reusable field checks
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::invalid(field, "cannot be empty"));
        }
        Ok(())
    }

    pub fn in_range<T: PartialOrd + std::fmt::Display>(
        value: T,
        min: T,
        max: T,
        field: &str,
    ) -> Result<()> {
        if value < min || value > max {
            return Err(ConfigError::invalid(
                field,
                format!("{} is outside {}..={}", value, min, max),
            ));
        }
        Ok(())
    }

    pub fn is_socket_addr(value: &str, field: &str) -> Result<()> {
        value
            .parse::<SocketAddr>()
            .map(|_| ())
            .map_err(|e| ConfigError::invalid(field, format!("'{}': {}", value, e)))
    }

    pub fn is_url(value: &str, field: &str) -> Result<()> {
        if !value.starts_with("http://") && !value.starts_with("https://") {
            return Err(ConfigError::invalid(field, "must be an http(s) URL"));
        }
        Ok(())
    }

    pub fn file_exists(path: &Path, field: &str) -> Result<()> {
        if !path.is_file() {
            return Err(ConfigError::invalid(
                field,
                format!("file not found: {}", path.display()),
            ));
        }
        Ok(())
    }

    /// Every path pattern must be rooted
    pub fn rooted_paths<S: AsRef<str>>(patterns: &[S], field: &str) -> Result<()> {
        for pattern in patterns {
            let pattern = pattern.as_ref();
            if !pattern.starts_with('/') && !pattern.starts_with('*') {
                return Err(ConfigError::invalid(
                    field,
                    format!("pattern '{}' must start with '/'", pattern),
                ));
            }
        }
        Ok(())
    }
}
