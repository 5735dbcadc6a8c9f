// Render invocation with timeout enforcement

use crate::renderer::Renderer;
use crate::{PrerenderError, RenderRequest, RenderResult, Result};
use std::sync::Arc;
use std::time::Duration;

/// Calls the renderer under the render timeout.
///
/// The render itself runs on a detached task: when the caller goes away
/// or the timeout fires, the render still completes and its result is
/// discarded.
#[derive(Clone)]
pub struct RenderInvoker {
    renderer: Arc<dyn Renderer>,
    timeout: Duration,
}

impl RenderInvoker {
    pub fn new(renderer: Arc<dyn Renderer>, timeout: Duration) -> Self {
        Self { renderer, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn generation(&self) -> u64 {
        self.renderer.generation()
    }

    /// Render `request`; every failure comes back as a render error.
    ///
    /// Results that cannot be written as a response, or that carry a
    /// server error status, are failures too.
    pub async fn invoke(&self, request: RenderRequest) -> Result<RenderResult> {
        self.renderer
            .prepare()
            .await
            .map_err(PrerenderError::into_render_error)?;

        let renderer = self.renderer.clone();
        let task = tokio::spawn(async move { renderer.render(&request).await });

        match tokio::time::timeout(self.timeout, task).await {
            Err(_) => Err(PrerenderError::RenderTimeout(self.timeout)),
            Ok(Err(join)) => Err(PrerenderError::render_failed(format!("render task failed: {}", join))),
            Ok(Ok(result)) => result
                .and_then(RenderResult::validated)
                .map_err(PrerenderError::into_render_error),
        }
    }

    pub async fn shutdown(&self) {
        self.renderer.shutdown().await;
    }
}
