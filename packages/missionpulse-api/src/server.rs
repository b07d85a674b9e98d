//! Hyper server setup and request handling.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming as IncomingBody};
use hyper::{Request, Response};
use hyper_util::rt::TokioExecutor;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder as ConnectionBuilder;
use tokio::net::TcpListener;

use crate::router::Router;

/// HTTP server for the MissionPulse API.
pub struct Server {
    addr: SocketAddr,
    router: Arc<Router>,
}

impl Server {
    /// Creates a new server instance.
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind to
    /// * `router` - Request router
    pub fn new(addr: SocketAddr, router: Router) -> Self {
        Self {
            addr,
            router: Arc::new(router),
        }
    }

    /// Starts the HTTP server.
    ///
    /// Accept failures are logged and skipped.
    ///
    /// # Errors
    /// Returns the bind error if the address is unavailable.
    pub async fn serve(self) -> Result<(), std::io::Error> {
        let listener = TcpListener::bind(self.addr).await?;
        tracing::info!("Server listening on http://{}", self.addr);

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };
            let io = TokioIo::new(stream);
            let router = Arc::clone(&self.router);

            tokio::task::spawn(async move {
                let builder = ConnectionBuilder::new(TokioExecutor::new());
                if let Err(err) = builder
                    .serve_connection(
                        io,
                        hyper::service::service_fn(move |req| handle_request(req, router.clone())),
                    )
                    .await
                {
                    tracing::debug!("Error serving connection from {}: {}", peer, err);
                }
            });
        }
    }
}

/// Handles an incoming HTTP request.
///
/// Routing never fails at this level: every error is already rendered as a
/// JSON envelope by the router.
async fn handle_request(
    req: Request<IncomingBody>,
    router: Arc<Router>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(router.route(req).await.map(Full::new))
}
