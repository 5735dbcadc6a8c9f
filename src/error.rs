// Host error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Configuration error: {0}")]
    Config(#[from] prerender_config::ConfigError),

    #[error(transparent)]
    Prerender(#[from] prerender_bridge::PrerenderError),

    #[error("Logging error: {0}")]
    Log(#[from] prerender_log::LogError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("File not found: {0}")]
    FileNotFound(String),
}

impl HostError {
    /// Errors that must abort startup with the configuration exit code
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Prerender(prerender_bridge::PrerenderError::Configuration(_))
        )
    }

    /// Process exit code for a startup failure
    pub fn exit_code(&self) -> i32 {
        if self.is_configuration() { 2 } else { 1 }
    }
}

pub type Result<T> = std::result::Result<T, HostError>;
