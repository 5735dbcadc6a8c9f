//! Server-side prerendering bridge for single-page applications.
//!
//! The bridge decides per request path whether a page should be rendered
//! on the server, renders it through the SPA toolchain, and falls back to
//! the static client shell whenever rendering is not possible.
//!
//! Two rendering paths exist, selected once at startup:
//!
//! - **development**: a build/watch command is supervised by the
//!   [`DevProcessManager`]; pages are requested from the dev server once it
//!   reports readiness, and results are cached per build generation.
//! - **production**: a prebuilt server module is loaded into a long-lived
//!   render worker and called for each page.
//!
//! ```no_run
//! use prerender_bridge::{Environment, PrerenderConfig, PrerenderService, RenderRequest};
//!
//! # async fn example() -> prerender_bridge::Result<()> {
//! let config = PrerenderConfig::default().with_source_path("ClientApp");
//! let service = PrerenderService::start(Environment::Production, &config).await?;
//!
//! let bridge = service.bridge();
//! if bridge.should_prerender("/about") {
//!     let response = bridge
//!         .serve(RenderRequest::new("/about", "http://localhost:5000"))
//!         .await;
//!     assert_eq!(response.status, 200);
//! }
//!
//! service.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod boot;
pub mod bridge;
pub mod cache;
pub mod config;
pub mod dev_server;
pub mod error;
pub mod invoker;
pub mod matcher;
pub mod ready;
pub mod renderer;
pub mod request;
pub mod response;
pub mod shell;
pub mod worker;

pub use boot::{BootModuleDescriptor, Environment, resolve};
pub use bridge::{BridgeStats, PrerenderBridge, PrerenderBridgeBuilder, RenderState};
pub use cache::RenderCache;
pub use config::PrerenderConfig;
pub use dev_server::{DevProcessManager, DevServerOptions, DevServerState, ReadyPhase};
pub use error::{PrerenderError, Result};
pub use invoker::RenderInvoker;
pub use matcher::{ExclusionRuleSet, PathPattern, RenderMode, ServerRoute, UrlMatcher};
pub use ready::{HttpPollDetector, ReadySignalDetector, RegexReadyDetector};
pub use renderer::{DevServerRenderer, Renderer};
pub use request::{RenderRequest, RenderResult};
pub use response::HttpResponse;
pub use shell::StaticShell;
pub use worker::{ModuleRenderer, RenderWorker, WorkerCommand};

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Bridge plus the dev process it depends on, wired from configuration
pub struct PrerenderService {
    environment: Environment,
    bridge: Arc<PrerenderBridge>,
    dev_server: Option<Arc<DevProcessManager>>,
}

impl PrerenderService {
    /// Resolve the boot module and build the bridge.
    ///
    /// In development this spawns the dev process; readiness is awaited
    /// lazily by the first render. Configuration errors are returned
    /// before anything is spawned.
    pub async fn start(environment: Environment, config: &PrerenderConfig) -> Result<Self> {
        let descriptor = resolve(environment, config)?;
        let matcher = config.matcher()?;

        let (builder, dev_server) = match &descriptor {
            BootModuleDescriptor::Dev { watch_command } => {
                let detector: Arc<dyn ReadySignalDetector> = match &config.ready_probe_url {
                    Some(url) => Arc::new(HttpPollDetector::new(url.clone(), READY_POLL_INTERVAL)),
                    None => Arc::new(RegexReadyDetector::new(&config.cli_regexes)?),
                };

                let dev = Arc::new(DevProcessManager::new(
                    detector,
                    DevServerOptions {
                        working_dir: Some(config.source_path.clone()),
                        env: config.dev_env.clone(),
                        startup_timeout: config.startup_timeout(),
                        ..Default::default()
                    },
                ));
                dev.start(watch_command).await?;

                let renderer = Arc::new(DevServerRenderer::new(dev.clone())?);
                let builder = PrerenderBridge::builder(renderer).dev_cache(config.dev_cache_capacity);
                (builder, Some(dev))
            }
            BootModuleDescriptor::Prod { module_path } => {
                info!(module = %module_path.display(), "using prebuilt server module");
                let renderer = Arc::new(ModuleRenderer::new(module_path.clone(), config.worker()));
                (PrerenderBridge::builder(renderer), None)
            }
        };

        let bridge = builder
            .timeout(config.render_timeout())
            .matcher(matcher)
            .shell(StaticShell::file(config.shell_path()))
            .build();

        info!(%environment, "prerendering enabled");
        Ok(Self {
            environment,
            bridge: Arc::new(bridge),
            dev_server,
        })
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn bridge(&self) -> Arc<PrerenderBridge> {
        self.bridge.clone()
    }

    pub fn dev_server(&self) -> Option<&Arc<DevProcessManager>> {
        self.dev_server.as_ref()
    }

    /// Stop the dev process or the render worker
    pub async fn shutdown(&self) {
        self.bridge.shutdown().await;
    }
}
