//! Fallback and cache control around the render invoker.
//!
//! Every request that reaches [`PrerenderBridge::serve`] gets a response:
//! the rendered page when rendering succeeds, the static shell with
//! status 200 when it does not. Render failures are logged once per
//! request and never surface as 5xx.

use crate::cache::RenderCache;
use crate::invoker::RenderInvoker;
use crate::matcher::UrlMatcher;
use crate::renderer::Renderer;
use crate::shell::StaticShell;
use crate::{HttpResponse, RenderRequest};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Per-request render state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Matched,
    Rendering,
    Succeeded { from_cache: bool },
    Failed,
}

/// Counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Renders started
    pub renders: u64,
    pub successes: u64,
    pub cache_hits: u64,
    /// Requests answered with the shell after a render failure
    pub fallbacks: u64,
}

#[derive(Default)]
struct Counters {
    renders: AtomicU64,
    successes: AtomicU64,
    cache_hits: AtomicU64,
    fallbacks: AtomicU64,
}

pub struct PrerenderBridge {
    matcher: UrlMatcher,
    invoker: RenderInvoker,
    cache: Option<RenderCache>,
    shell: StaticShell,
    counters: Counters,
}

impl PrerenderBridge {
    pub fn builder(renderer: Arc<dyn Renderer>) -> PrerenderBridgeBuilder {
        PrerenderBridgeBuilder {
            renderer,
            timeout: Duration::from_millis(5000),
            matcher: UrlMatcher::default(),
            cache_capacity: None,
            shell: StaticShell::default(),
        }
    }

    pub fn matcher(&self) -> &UrlMatcher {
        &self.matcher
    }

    pub fn shell(&self) -> &StaticShell {
        &self.shell
    }

    pub fn should_prerender(&self, path: &str) -> bool {
        self.matcher.should_prerender(path)
    }

    /// Render `request` or fall back to the shell
    pub async fn serve(&self, request: RenderRequest) -> HttpResponse {
        let (response, state) = self.serve_with_state(request).await;
        debug!(?state, status = response.status, "prerender finished");
        response
    }

    async fn serve_with_state(&self, request: RenderRequest) -> (HttpResponse, RenderState) {
        let url = request.request_url.clone();
        let mut state = RenderState::Matched;
        debug!(url = %url, ?state, "prerender request");

        let generation = self.invoker.generation();
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(generation, &url) {
                self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                state = RenderState::Succeeded { from_cache: true };
                return (HttpResponse::from_render(&hit), state);
            }
        }

        state = RenderState::Rendering;
        debug!(url = %url, ?state, "rendering");
        self.counters.renders.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        match self.invoker.invoke(request).await {
            Ok(result) => {
                self.counters.successes.fetch_add(1, Ordering::Relaxed);
                let response = HttpResponse::from_render(&result);
                if let Some(cache) = &self.cache {
                    cache.insert(generation, url.clone(), result);
                }
                info!(
                    url = %url,
                    status = response.status,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "prerendered"
                );
                (response, RenderState::Succeeded { from_cache: false })
            }
            Err(err) => {
                self.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
                warn!(
                    url = %url,
                    kind = err.kind(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "prerender failed, serving shell: {}",
                    err
                );
                (self.shell.response().await, RenderState::Failed)
            }
        }
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            renders: self.counters.renders.load(Ordering::Relaxed),
            successes: self.counters.successes.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            fallbacks: self.counters.fallbacks.load(Ordering::Relaxed),
        }
    }

    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    pub async fn shutdown(&self) {
        self.invoker.shutdown().await;
    }
}

pub struct PrerenderBridgeBuilder {
    renderer: Arc<dyn Renderer>,
    timeout: Duration,
    matcher: UrlMatcher,
    cache_capacity: Option<usize>,
    shell: StaticShell,
}

impl PrerenderBridgeBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn matcher(mut self, matcher: UrlMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Cache render results per URL; only used in development
    pub fn dev_cache(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    pub fn shell(mut self, shell: StaticShell) -> Self {
        self.shell = shell;
        self
    }

    pub fn build(self) -> PrerenderBridge {
        PrerenderBridge {
            matcher: self.matcher,
            invoker: RenderInvoker::new(self.renderer, self.timeout),
            cache: self.cache_capacity.map(RenderCache::new),
            shell: self.shell,
            counters: Counters::default(),
        }
    }
}
