// Error types for the prerendering bridge

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrerenderError {
    /// The dev toolchain never became ready, crashed, or was stopped
    #[error("Render engine unavailable: {0}")]
    RenderEngineUnavailable(String),

    #[error("Render timed out after {0:?}")]
    RenderTimeout(Duration),

    #[error("Render failed: {cause}")]
    RenderFailed { cause: String },

    /// Missing or invalid boot module configuration; fatal at startup
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Dev server already running (pid {0:?})")]
    AlreadyRunning(Option<u32>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl PrerenderError {
    pub fn render_failed(cause: impl std::fmt::Display) -> Self {
        Self::RenderFailed {
            cause: cause.to_string(),
        }
    }

    /// Collapse transport-level errors into the render taxonomy
    pub fn into_render_error(self) -> Self {
        match self {
            err @ (Self::RenderEngineUnavailable(_)
            | Self::RenderTimeout(_)
            | Self::RenderFailed { .. }) => err,
            other => Self::render_failed(other),
        }
    }

    /// Short label used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RenderEngineUnavailable(_) => "engine_unavailable",
            Self::RenderTimeout(_) => "timeout",
            Self::RenderFailed { .. } => "render_failed",
            Self::Configuration(_) => "configuration",
            Self::AlreadyRunning(_) => "already_running",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Http(_) => "http",
        }
    }
}

impl From<prerender_config::ConfigError> for PrerenderError {
    fn from(err: prerender_config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PrerenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_become_render_failed() {
        let io = PrerenderError::Io(std::io::Error::other("broken pipe"));
        let err = io.into_render_error();
        assert_eq!(err.kind(), "render_failed");
        assert!(err.to_string().contains("broken pipe"));
    }

    #[test]
    fn test_render_taxonomy_is_preserved() {
        let err = PrerenderError::RenderTimeout(Duration::from_millis(5)).into_render_error();
        assert!(matches!(err, PrerenderError::RenderTimeout(_)));

        let err = PrerenderError::RenderEngineUnavailable("exited".into()).into_render_error();
        assert_eq!(err.kind(), "engine_unavailable");
    }

    #[test]
    fn test_config_error_conversion() {
        let err: PrerenderError = prerender_config::ConfigError::invalid("dev_command", "empty").into();
        assert!(matches!(err, PrerenderError::Configuration(_)));
    }
}
