//! Render capability and its development implementation.
//!
//! A [`Renderer`] turns a [`RenderRequest`] into a [`RenderResult`]. The
//! host picks one implementation at startup from the boot module
//! descriptor: [`DevServerRenderer`] proxies to the live dev server,
//! [`ModuleRenderer`](crate::worker::ModuleRenderer) calls a prebuilt
//! server module through a render worker.

use crate::dev_server::DevProcessManager;
use crate::request::HOP_BY_HOP_HEADERS;
use crate::{PrerenderError, RenderRequest, RenderResult, Result};
use async_trait::async_trait;
use reqwest::header::{self, HeaderMap};
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<RenderResult>;

    /// Wait until the renderer can accept work. Not covered by the render timeout.
    async fn prepare(&self) -> Result<()> {
        Ok(())
    }

    /// Build generation the renderer currently serves
    fn generation(&self) -> u64 {
        0
    }

    async fn shutdown(&self) {}
}

/// Renders by requesting the page from the running dev server
pub struct DevServerRenderer {
    dev: Arc<DevProcessManager>,
    client: reqwest::Client,
}

impl DevServerRenderer {
    pub fn new(dev: Arc<DevProcessManager>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { dev, client })
    }

    pub fn dev_server(&self) -> &Arc<DevProcessManager> {
        &self.dev
    }

    async fn fetch(&self, base: &str, request: &RenderRequest) -> Result<RenderResult> {
        let url = format!("{}{}", base.trim_end_matches('/'), request.request_url);
        let forwarded = url::Url::parse(&request.absolute_base_url).ok();

        let mut call = self.client.get(&url).header(header::ACCEPT, "text/html");
        if let Some(base_url) = &forwarded {
            if let Some(host) = base_url.host_str() {
                let host = match base_url.port() {
                    Some(port) => format!("{}:{}", host, port),
                    None => host.to_string(),
                };
                call = call.header("X-Forwarded-Host", host);
            }
            call = call.header("X-Forwarded-Proto", base_url.scheme());
        }

        debug!(url = %url, "rendering through dev server");
        let response = call.send().await?;
        let status = response.status();

        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(PrerenderError::render_failed(format!(
                "dev server answered {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        if status.is_redirection() {
            let location = response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    PrerenderError::render_failed(format!("dev server sent {} without Location", status))
                })?;
            return Ok(RenderResult::redirect(location, status.as_u16()));
        }

        let is_json = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));

        if is_json {
            return Ok(response.json::<RenderResult>().await?);
        }

        let headers = copy_headers(response.headers());
        let html = response.text().await?;
        let mut result = RenderResult::html(html).with_status(status.as_u16());
        result.headers = headers;
        Ok(result)
    }
}

fn copy_headers(headers: &HeaderMap) -> std::collections::HashMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| !HOP_BY_HOP_HEADERS.contains(&name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

#[async_trait]
impl Renderer for DevServerRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RenderResult> {
        let base = self.dev.get_ready_url().await?;
        self.fetch(&base, request).await
    }

    async fn prepare(&self) -> Result<()> {
        self.dev.get_ready_url().await.map(|_| ())
    }

    fn generation(&self) -> u64 {
        self.dev.generation()
    }

    async fn shutdown(&self) {
        if let Err(e) = self.dev.stop().await {
            tracing::warn!("failed to stop dev server: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev_server::DevServerOptions;
    use crate::ready::ReadySignalDetector;
    use std::time::Duration;
    use wiremock::matchers::{header as header_eq, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Reports a fixed URL from the first console line
    struct FixedUrl(String);

    #[async_trait]
    impl ReadySignalDetector for FixedUrl {
        fn inspect_line(&self, _line: &str) -> Option<String> {
            Some(self.0.clone())
        }
    }

    async fn renderer_for(server: &MockServer) -> (DevServerRenderer, Arc<DevProcessManager>) {
        let dev = Arc::new(DevProcessManager::new(
            Arc::new(FixedUrl(server.uri())),
            DevServerOptions {
                startup_timeout: Duration::from_secs(10),
                ..Default::default()
            },
        ));
        dev.start("echo ready; sleep 30").await.unwrap();
        (DevServerRenderer::new(dev.clone()).unwrap(), dev)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_html_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/about"))
            .and(header_eq("X-Forwarded-Host", "example.com"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .insert_header("x-frame-options", "DENY")
                    .set_body_string("<h1>About</h1>"),
            )
            .mount(&server)
            .await;

        let (renderer, dev) = renderer_for(&server).await;
        let result = renderer
            .render(&RenderRequest::new("/about", "https://example.com"))
            .await
            .unwrap();

        assert_eq!(result.html, "<h1>About</h1>");
        assert_eq!(result.status_code, 200);
        assert_eq!(result.headers.get("x-frame-options").map(String::as_str), Some("DENY"));
        assert!(!result.headers.contains_key("content-length"));
        assert_eq!(renderer.generation(), 1);

        dev.stop().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_not_found_status_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("<p>missing</p>"))
            .mount(&server)
            .await;

        let (renderer, dev) = renderer_for(&server).await;
        let result = renderer
            .render(&RenderRequest::new("/nope", "http://localhost:5000"))
            .await
            .unwrap();
        assert_eq!(result.status_code, 404);
        dev.stop().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_json_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "html": "<h1>JSON</h1>",
                "status": 201
            })))
            .mount(&server)
            .await;

        let (renderer, dev) = renderer_for(&server).await;
        let result = renderer
            .render(&RenderRequest::new("/", "http://localhost:5000"))
            .await
            .unwrap();
        assert_eq!(result.html, "<h1>JSON</h1>");
        assert_eq!(result.status_code, 201);
        dev.stop().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_redirect_becomes_redirect_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/new-home"))
            .mount(&server)
            .await;

        let (renderer, dev) = renderer_for(&server).await;
        let result = renderer
            .render(&RenderRequest::new("/old", "http://localhost:5000"))
            .await
            .unwrap();
        assert_eq!(result.redirect_url.as_deref(), Some("/new-home"));
        assert_eq!(result.status_code, 301);
        dev.stop().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_server_error_is_render_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let (renderer, dev) = renderer_for(&server).await;
        let err = renderer
            .render(&RenderRequest::new("/", "http://localhost:5000"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "render_failed");
        dev.stop().await.unwrap();
    }
}
