// Render request/result payloads exchanged with the rendering runtime

use crate::{PrerenderError, Result};
use http::{HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Connection-level headers never taken from a render result
pub(crate) const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "content-length",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
];

/// Input to a single render, created per eligible HTTP request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    /// Path and query of the original request, e.g. `/about?tab=team`
    pub request_url: String,
    /// Scheme and authority the browser used, e.g. `https://example.com`
    pub absolute_base_url: String,
}

impl RenderRequest {
    pub fn new(request_url: impl Into<String>, absolute_base_url: impl Into<String>) -> Self {
        Self {
            request_url: request_url.into(),
            absolute_base_url: absolute_base_url.into(),
        }
    }

    /// Path component without the query string
    pub fn path(&self) -> &str {
        self.request_url
            .split_once('?')
            .map_or(self.request_url.as_str(), |(path, _)| path)
    }
}

/// Output of the rendering runtime.
///
/// Deserializes from `{html, status?, headers?, redirectUrl?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderResult {
    #[serde(default)]
    pub html: String,

    #[serde(rename = "status", alias = "statusCode", default = "default_status")]
    pub status_code: u16,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

fn default_status() -> u16 {
    200
}

impl RenderResult {
    pub fn html(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            status_code: 200,
            headers: HashMap::new(),
            redirect_url: None,
        }
    }

    pub fn redirect(location: impl Into<String>, status_code: u16) -> Self {
        Self {
            html: String::new(),
            status_code,
            headers: HashMap::new(),
            redirect_url: Some(location.into()),
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Check that the result can be written as an HTTP response.
    ///
    /// A status outside 200..=499, an invalid header, or an invalid redirect
    /// location is a render failure. Connection-level headers are dropped.
    pub fn validated(mut self) -> Result<Self> {
        match &self.redirect_url {
            Some(location) => {
                HeaderValue::from_str(location).map_err(|_| {
                    PrerenderError::render_failed(format!("invalid redirect location {:?}", location))
                })?;
            }
            None => {
                let status = StatusCode::from_u16(self.status_code).map_err(|_| {
                    PrerenderError::render_failed(format!("invalid status code {}", self.status_code))
                })?;
                if !(200..500).contains(&status.as_u16()) {
                    return Err(PrerenderError::render_failed(format!(
                        "render returned status {}",
                        status
                    )));
                }
            }
        }

        self.headers
            .retain(|name, _| !HOP_BY_HOP_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)));

        for (name, value) in &self.headers {
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                PrerenderError::render_failed(format!("invalid header name {:?}", name))
            })?;
            HeaderValue::from_str(value).map_err(|_| {
                PrerenderError::render_failed(format!("invalid value for header {:?}", name))
            })?;
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_names() {
        let req = RenderRequest::new("/about", "http://localhost:5000");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["requestUrl"], "/about");
        assert_eq!(json["absoluteBaseUrl"], "http://localhost:5000");
    }

    #[test]
    fn test_request_path_strips_query() {
        assert_eq!(RenderRequest::new("/search?q=x", "").path(), "/search");
        assert_eq!(RenderRequest::new("/search", "").path(), "/search");
    }

    #[test]
    fn test_result_defaults() {
        let result: RenderResult = serde_json::from_str(r#"{"html": "<h1>About</h1>"}"#).unwrap();
        assert_eq!(result.status_code, 200);
        assert!(result.headers.is_empty());
        assert!(result.redirect_url.is_none());
    }

    #[test]
    fn test_result_full_payload() {
        let result: RenderResult = serde_json::from_str(
            r#"{"html": "", "statusCode": 301, "headers": {"X-Rendered": "1"}, "redirectUrl": "/new"}"#,
        )
        .unwrap();
        assert_eq!(result.status_code, 301);
        assert_eq!(result.headers.get("X-Rendered").map(String::as_str), Some("1"));
        assert_eq!(result.redirect_url.as_deref(), Some("/new"));
    }

    #[test]
    fn test_validated_accepts_client_errors_and_strips_hop_headers() {
        let result = RenderResult::html("<p>missing</p>")
            .with_status(404)
            .with_header("Content-Length", "3")
            .with_header("X-Rendered", "1")
            .validated()
            .unwrap();
        assert_eq!(result.status_code, 404);
        assert_eq!(result.headers.len(), 1);
        assert!(result.headers.contains_key("X-Rendered"));
    }

    #[test]
    fn test_validated_rejects_unwritable_status() {
        for status in [99, 100, 500, 503, 1000] {
            let err = RenderResult::html("<h1>A</h1>").with_status(status).validated().unwrap_err();
            assert_eq!(err.kind(), "render_failed", "status {status}");
        }
    }

    #[test]
    fn test_validated_rejects_invalid_headers() {
        let err = RenderResult::html("")
            .with_header("bad name", "x")
            .validated()
            .unwrap_err();
        assert!(err.to_string().contains("bad name"));

        let err = RenderResult::html("")
            .with_header("x-multi", "a\nb")
            .validated()
            .unwrap_err();
        assert_eq!(err.kind(), "render_failed");
    }

    #[test]
    fn test_validated_redirect_keeps_any_status() {
        let result = RenderResult::redirect("/login", 200).validated().unwrap();
        assert_eq!(result.redirect_url.as_deref(), Some("/login"));

        let err = RenderResult::redirect("/bad\r\nSet-Cookie: x", 302)
            .validated()
            .unwrap_err();
        assert_eq!(err.kind(), "render_failed");
    }
}
