// Request dispatch: static files, prerendering, or the client shell

use crate::HostError;
use crate::static_files::{StaticFileService, has_extension};
use prerender_bridge::{HttpResponse, PrerenderBridge, RenderRequest};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Transport-neutral inbound request
#[derive(Debug, Clone, Default)]
pub struct IncomingRequest {
    pub method: String,
    /// Path and query, e.g. `/search?q=x`
    pub uri: String,
    /// Header names are lowercase
    pub headers: HashMap<String, String>,
}

impl IncomingRequest {
    pub fn get(uri: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            uri: uri.into(),
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn path(&self) -> &str {
        self.uri.split_once('?').map_or(self.uri.as_str(), |(path, _)| path)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// The host application
#[derive(Clone)]
pub struct App {
    bridge: Arc<PrerenderBridge>,
    static_files: StaticFileService,
    default_host: String,
}

impl App {
    /// `default_host` is used when a request carries no `Host` header
    pub fn new(
        bridge: Arc<PrerenderBridge>,
        static_files: StaticFileService,
        default_host: impl Into<String>,
    ) -> Self {
        Self {
            bridge,
            static_files,
            default_host: default_host.into(),
        }
    }

    pub fn bridge(&self) -> &Arc<PrerenderBridge> {
        &self.bridge
    }

    pub async fn handle(&self, request: IncomingRequest) -> HttpResponse {
        let is_head = request.method.eq_ignore_ascii_case("HEAD");
        if !is_head && !request.method.eq_ignore_ascii_case("GET") {
            return HttpResponse::new(405).with_header("Allow", "GET, HEAD");
        }

        let mut response = self.dispatch(&request).await;
        if is_head {
            response.body.clear();
        }
        response
    }

    async fn dispatch(&self, request: &IncomingRequest) -> HttpResponse {
        let path = request.path();

        if has_extension(path) {
            return self.serve_static(path).await;
        }

        if self.bridge.should_prerender(path) {
            let render = RenderRequest::new(request.uri.clone(), self.absolute_base_url(request));
            return self.bridge.serve(render).await;
        }

        debug!(path, "not prerendered");
        if self.static_files.exists(path) {
            return self.serve_static(path).await;
        }
        self.bridge.shell().response().await
    }

    async fn serve_static(&self, path: &str) -> HttpResponse {
        match self.static_files.serve(path).await {
            Ok(response) => response,
            Err(HostError::InvalidPath(reason)) => {
                debug!(path, reason = %reason, "rejected static path");
                HttpResponse::bad_request()
            }
            Err(HostError::FileNotFound(_)) => HttpResponse::not_found(),
            Err(e) => {
                tracing::warn!(path, "static file error: {}", e);
                HttpResponse::not_found()
            }
        }
    }

    /// `{scheme}://{host}` as seen by the browser
    pub fn absolute_base_url(&self, request: &IncomingRequest) -> String {
        let scheme = request
            .header("x-forwarded-proto")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or("http");
        let host = request
            .header("host")
            .filter(|v| !v.is_empty())
            .unwrap_or(self.default_host.as_str());
        format!("{}://{}", scheme, host)
    }
}
