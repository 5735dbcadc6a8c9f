//! SPA host with server-side prerendering.
//!
//! Serves the built browser assets of a single-page application and
//! prerenders page routes through the SPA toolchain, answering with the
//! client shell whenever prerendering is skipped or fails.
//!
//! ```no_run
//! use prerender::{Host, HostConfig, shutdown_signal};
//!
//! # async fn example() -> prerender::Result<()> {
//! let config = HostConfig::load(None)?;
//! let host = Host::start(&config).await?;
//! host.run(shutdown_signal()).await
//! # }
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod server;
pub mod static_files;

pub use app::{App, IncomingRequest};
pub use config::HostConfig;
pub use error::{HostError, Result};
pub use server::Server;
pub use static_files::StaticFileService;

pub use prerender_bridge as bridge;

use prerender_bridge::PrerenderService;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

/// A configured host: prerendering service plus the request handler
pub struct Host {
    service: PrerenderService,
    app: App,
    listen: SocketAddr,
}

impl Host {
    /// Resolve the boot module and start the dev process if configured.
    ///
    /// Configuration problems are reported before anything is spawned.
    pub async fn start(config: &HostConfig) -> Result<Self> {
        let listen = config.listen_addr()?;
        let service = PrerenderService::start(config.environment, &config.prerender).await?;
        let static_files = StaticFileService::new(config.prerender.static_root.clone());
        let app = App::new(service.bridge(), static_files, listen.to_string());

        Ok(Self {
            service,
            app,
            listen,
        })
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    pub fn service(&self) -> &PrerenderService {
        &self.service
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = Server::bind(self.listen).await?;
        self.run_on(listener, shutdown).await
    }

    /// Serve on an existing listener, then stop the dev process or render worker
    pub async fn run_on<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let Self { service, app, .. } = self;
        let served = Server::new(app).serve(listener, shutdown).await;

        info!("stopping prerendering");
        service.shutdown().await;
        served
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
