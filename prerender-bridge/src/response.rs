// HTTP response produced by the bridge

use crate::RenderResult;
use std::collections::HashMap;

/// Transport-neutral HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn not_found() -> Self {
        Self::new(404)
    }

    pub fn bad_request() -> Self {
        Self::new(400)
    }

    /// `text/html` response with the given status
    pub fn html(status: u16, html: impl Into<String>) -> Self {
        Self::new(status)
            .with_header("Content-Type", "text/html; charset=utf-8")
            .with_body(html.into().into_bytes())
    }

    pub fn redirect(location: impl Into<String>, status: u16) -> Self {
        let status = if (300..400).contains(&status) { status } else { 302 };
        Self::new(status).with_header("Location", location)
    }

    /// Write a render result: redirect, or html with the runtime's status and headers.
    ///
    /// Expects a result that passed [`RenderResult::validated`].
    pub fn from_render(result: &RenderResult) -> Self {
        let mut response = match &result.redirect_url {
            Some(location) => Self::redirect(location.clone(), result.status_code),
            None => Self::html(result.status_code, result.html.clone()),
        };

        for (name, value) in &result.headers {
            response.set_header(name, value.clone());
        }
        response
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(&name.into(), value.into());
        self
    }

    /// Insert or replace a header, matching names case-insensitively
    pub fn set_header(&mut self, name: &str, value: String) {
        self.headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
        self.headers.insert(name.to_string(), value);
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
