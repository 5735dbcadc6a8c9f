// HTTP/1 server loop adapting hyper requests to the host application

use crate::app::{App, IncomingRequest};
use crate::Result;
use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, body::Incoming as IncomingBody};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

pub struct Server {
    app: Arc<App>,
}

impl Server {
    pub fn new(app: App) -> Self {
        Self { app: Arc::new(app) }
    }

    pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
        Ok(TcpListener::bind(addr).await?)
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// Connections already accepted keep running on their own tasks.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "listening");
        }

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, remote) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("failed to accept connection: {}", e);
                            continue;
                        }
                    };

                    let io = TokioIo::new(stream);
                    let app = self.app.clone();

                    tokio::spawn(async move {
                        let service = service_fn(move |req: Request<IncomingBody>| {
                            let app = app.clone();
                            async move { handle_request(req, app).await }
                        });

                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                            debug!(%remote, "error serving connection: {:?}", err);
                        }
                    });
                }
                _ = &mut shutdown => {
                    info!("shutdown requested, no longer accepting connections");
                    break;
                }
            }
        }

        Ok(())
    }
}

async fn handle_request(
    req: Request<IncomingBody>,
    app: Arc<App>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let uri = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let mut incoming = IncomingRequest {
        method: req.method().to_string(),
        uri,
        headers: Default::default(),
    };
    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            incoming.headers.insert(name.as_str().to_string(), value.to_string());
        }
    }

    let response = app.handle(incoming).await;

    let mut builder = Response::builder().status(response.status);
    for (key, value) in &response.headers {
        builder = builder.header(key.as_str(), value.as_str());
    }

    Ok(builder
        .body(Full::new(Bytes::from(response.body)))
        .unwrap_or_else(|e| {
            warn!("invalid response: {}", e);
            let mut fallback = Response::new(Full::new(Bytes::new()));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        }))
}
