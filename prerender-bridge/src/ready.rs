//! Ready-signal detection for the dev toolchain.
//!
//! A detector either inspects each console line the dev process prints
//! (passive) or actively probes something until the server answers. The
//! process manager runs both hooks and settles on the first URL reported.

use crate::{PrerenderError, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07]*\x07").expect("static ANSI pattern")
});

/// Remove terminal color and cursor sequences from a console line
pub fn strip_ansi(line: &str) -> std::borrow::Cow<'_, str> {
    ANSI_ESCAPE.replace_all(line, "")
}

/// Reports the URL the dev server listens on once it is ready
#[async_trait]
pub trait ReadySignalDetector: Send + Sync {
    /// Called with every stdout/stderr line, ANSI sequences already removed
    fn inspect_line(&self, _line: &str) -> Option<String> {
        None
    }

    /// Called once after spawn; active detectors resolve when the server answers
    async fn probe(&self) -> Option<String> {
        None
    }
}

/// Scrapes console output with regular expressions.
///
/// The URL is taken from the first named group that participated in the
/// match, else from group 1, else from the whole match.
#[derive(Debug, Clone)]
pub struct RegexReadyDetector {
    patterns: Vec<Regex>,
}

impl RegexReadyDetector {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|e| {
                    PrerenderError::Configuration(format!(
                        "invalid readiness pattern '{}': {}",
                        p.as_ref(),
                        e
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if patterns.is_empty() {
            return Err(PrerenderError::Configuration(
                "at least one readiness pattern is required".to_string(),
            ));
        }

        Ok(Self { patterns })
    }

    fn extract(regex: &Regex, line: &str) -> Option<String> {
        let caps = regex.captures(line)?;

        let named = regex
            .capture_names()
            .flatten()
            .find_map(|name| caps.name(name));

        named
            .or_else(|| caps.get(1))
            .or_else(|| caps.get(0))
            .map(|m| m.as_str().trim().to_string())
            .filter(|url| !url.is_empty())
    }
}

#[async_trait]
impl ReadySignalDetector for RegexReadyDetector {
    fn inspect_line(&self, line: &str) -> Option<String> {
        self.patterns
            .iter()
            .find_map(|regex| Self::extract(regex, line))
    }
}

/// Polls an HTTP endpoint until it answers with a non-5xx status
#[derive(Debug, Clone)]
pub struct HttpPollDetector {
    url: String,
    interval: Duration,
    client: reqwest::Client,
}

impl HttpPollDetector {
    pub fn new(url: impl Into<String>, interval: Duration) -> Self {
        Self {
            url: url.into(),
            interval,
            client: reqwest::Client::new(),
        }
    }

    /// Base URL reported on success: the probe URL without its path
    fn base_url(&self) -> String {
        match url::Url::parse(&self.url) {
            Ok(parsed) => parsed.origin().ascii_serialization(),
            Err(_) => self.url.clone(),
        }
    }
}

#[async_trait]
impl ReadySignalDetector for HttpPollDetector {
    async fn probe(&self) -> Option<String> {
        loop {
            match self.client.get(&self.url).send().await {
                Ok(response) if !response.status().is_server_error() => {
                    return Some(self.base_url());
                }
                Ok(response) => {
                    tracing::trace!(url = %self.url, status = %response.status(), "dev server not ready");
                }
                Err(e) => {
                    tracing::trace!(url = %self.url, error = %e, "dev server not reachable yet");
                }
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANGULAR_PATTERN: &str = r"Local\:\s+(?<openbrowser>https?\:\/\/(.+))";

    #[test]
    fn test_angular_cli_line() {
        let detector = RegexReadyDetector::new(&[ANGULAR_PATTERN]).unwrap();
        assert_eq!(
            detector.inspect_line("  ➜  Local:   http://localhost:4200/"),
            Some("http://localhost:4200/".to_string())
        );
        assert_eq!(detector.inspect_line("Building..."), None);
    }

    #[test]
    fn test_group_one_fallback() {
        let detector = RegexReadyDetector::new(&[r"listening on (\S+)"]).unwrap();
        assert_eq!(
            detector.inspect_line("server listening on http://127.0.0.1:3000 now"),
            Some("http://127.0.0.1:3000".to_string())
        );
    }

    #[test]
    fn test_whole_match_fallback() {
        let detector = RegexReadyDetector::new(&[r"https?://\S+"]).unwrap();
        assert_eq!(
            detector.inspect_line("open http://localhost:8080"),
            Some("http://localhost:8080".to_string())
        );
    }

    #[test]
    fn test_patterns_tried_in_order() {
        let detector =
            RegexReadyDetector::new(&[r"Local:\s+(\S+)", r"Network:\s+(\S+)"]).unwrap();
        assert_eq!(
            detector.inspect_line("Network: http://10.0.0.2:4200"),
            Some("http://10.0.0.2:4200".to_string())
        );
    }

    #[test]
    fn test_invalid_pattern_is_configuration_error() {
        assert!(matches!(
            RegexReadyDetector::new(&["(unclosed"]),
            Err(PrerenderError::Configuration(_))
        ));
        assert!(RegexReadyDetector::new::<&str>(&[]).is_err());
    }

    #[test]
    fn test_strip_ansi() {
        let colored = "\x1b[32m➜\x1b[39m  \x1b[1mLocal\x1b[22m:   \x1b[36mhttp://localhost:4200/\x1b[39m";
        let plain = strip_ansi(colored);
        assert_eq!(plain, "➜  Local:   http://localhost:4200/");

        let detector = RegexReadyDetector::new(&[ANGULAR_PATTERN]).unwrap();
        assert_eq!(
            detector.inspect_line(&plain),
            Some("http://localhost:4200/".to_string())
        );
    }

    #[test]
    fn test_poll_base_url() {
        let detector = HttpPollDetector::new("http://localhost:4200/health", Duration::from_millis(10));
        assert_eq!(detector.base_url(), "http://localhost:4200");
    }

    #[tokio::test]
    async fn test_poll_detector_resolves_when_server_answers() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let detector =
            HttpPollDetector::new(format!("{}/health", server.uri()), Duration::from_millis(10));
        let url = tokio::time::timeout(Duration::from_secs(5), detector.probe())
            .await
            .unwrap();
        assert_eq!(url, Some(server.uri()));
    }
}
