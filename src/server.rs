//! HTTP server and graceful shutdown.
//!
//! The server hands every request to one [`Handler`], usually a
//! [`Pipeline`](crate::Pipeline). It does no routing.
//!
//! On shutdown (SIGTERM, Ctrl-C, or the future passed to
//! [`Server::serve_with_shutdown`]) the server:
//! 1. Stops `listener.accept()`: no new connections are made.
//! 2. Asks every open connection to finish its in-flight request and close.
//!    Idle keep-alive connections close at once.
//! 3. Waits up to the drain timeout, then aborts whatever is still open.
//! 4. Returns, which lets `main` exit cleanly.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::request::{BodyError, Request};
use crate::response::Response;

/// Largest request body buffered by default: 2 MiB.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// How long shutdown waits for open connections by default.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    listener: Option<TcpListener>,
    body_limit: usize,
    drain_timeout: Duration,
}

impl Server {
    /// Configures the server to bind to `addr` when it starts serving.
    ///
    /// ```rust
    /// use resdk::Server;
    /// let server = Server::bind("127.0.0.1:3000").unwrap();
    /// assert!(Server::bind("nowhere").is_err());
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        Ok(Self::new(addr.parse()?, None))
    }

    /// Serves on a listener that is already bound.
    ///
    /// Bind to port 0 and read [`local_addr`](Self::local_addr) to get a free
    /// port:
    ///
    /// ```rust
    /// # async fn run() -> Result<(), resdk::Error> {
    /// let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    /// let server = resdk::Server::from_listener(listener)?;
    /// assert_ne!(server.local_addr().port(), 0);
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_listener(listener: TcpListener) -> Result<Self, Error> {
        Ok(Self::new(listener.local_addr()?, Some(listener)))
    }

    fn new(addr: SocketAddr, listener: Option<TcpListener>) -> Self {
        Self {
            addr,
            listener,
            body_limit: DEFAULT_BODY_LIMIT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// The address served on. For [`bind`](Self::bind) this is the address as
    /// given, so port 0 stays 0 until the server is running.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Requests with a larger body get `413 Payload Too Large` and never
    /// reach the handler.
    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    /// Upper bound on how long shutdown waits for open connections.
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Serves `handler` until SIGTERM or Ctrl-C, then drains.
    pub async fn serve(self, handler: impl Handler) -> Result<(), Error> {
        self.serve_with_shutdown(handler, shutdown_signal()).await
    }

    /// Serves `handler` until `signal` resolves, then drains.
    pub async fn serve_with_shutdown(
        self,
        handler: impl Handler,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = match self.listener {
            Some(listener) => listener,
            None => TcpListener::bind(self.addr).await?,
        };
        let handler = handler.into_boxed_handler();
        let body_limit = self.body_limit;

        info!(addr = %listener.local_addr()?, body_limit, "resdk listening");

        let builder = ConnBuilder::new(TokioExecutor::new());
        let graceful = GracefulShutdown::new();
        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Shutdown first, so a signal stops accepting even while
                // connections are still queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let handler = Arc::clone(&handler);
                    let io = TokioIo::new(stream);

                    // Called once per request on the connection.
                    let svc = service_fn(move |req| {
                        let handler = Arc::clone(&handler);
                        async move { dispatch(handler, req, remote_addr, body_limit).await }
                    });

                    let conn = graceful.watch(builder.serve_connection(io, svc).into_owned());

                    tasks.spawn(async move {
                        if let Err(e) = conn.await {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished tasks so the set does not grow without bound.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        drop(listener);

        tokio::select! {
            () = graceful.shutdown() => {}
            () = tokio::time::sleep(self.drain_timeout) => {
                warn!(
                    timeout = ?self.drain_timeout,
                    open = tasks.len(),
                    "drain timed out, aborting open connections"
                );
                tasks.abort_all();
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("resdk stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Buffers one request and runs the handler on it.
///
/// Infallible: every failure becomes a response, hyper never sees an error.
async fn dispatch(
    handler: BoxedHandler,
    req: hyper::Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
    body_limit: usize,
) -> Result<http::Response<http_body_util::Full<bytes::Bytes>>, std::convert::Infallible> {
    let response = match Request::from_hyper(req, body_limit).await {
        Ok(req) => handler.call(req).await,
        Err(e @ BodyError::TooLarge(_)) => {
            warn!(peer = %remote_addr, "{e}");
            Response::status(http::StatusCode::PAYLOAD_TOO_LARGE)
        }
        Err(e @ BodyError::Read(_)) => {
            warn!(peer = %remote_addr, "{e}");
            Response::status(http::StatusCode::BAD_REQUEST)
        }
    };

    Ok(response.into_inner())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT (Ctrl-C on Windows).
///
/// If a handler cannot be installed that arm never fires; the other still can.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
