//! HTTP serving with connection-level control.
//!
//! `axum::serve` is not used here because the denial gates need a capability
//! it cannot provide: closing a connection without writing any response. The
//! accept loop below serves each connection itself (via `hyper-util`) and
//! races the connection future against a per-connection
//! [`ConnectionDropHandle`] planted in every request's extensions. When a
//! gate triggers the handle, the serve future is dropped and the socket
//! closes with no status line on the wire.
//!
//! # Shutdown
//!
//! On SIGINT/SIGTERM the loop stops accepting, then waits for in-flight
//! connections through `hyper-util`'s graceful-shutdown watcher, bounded by
//! the configured grace period; whatever remains after the deadline is
//! aborted when the tasks are dropped.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::extract::connect_info::ConnectInfo;
use hyper::body::Incoming;
use hyper::http::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tokio_util::task::TaskTracker;
use tower::{ServiceExt, service_fn};
use tracing::{debug, info, warn};

use crate::middleware::ConnectionDropHandle;
use crate::utils::shutdown_signal;

/// Serve the router on the listener until a shutdown signal arrives.
///
/// Each accepted connection gets its own task, its own
/// [`ConnectionDropHandle`], and a `ConnectInfo` extension carrying the peer
/// address for client identity resolution.
///
/// # Errors
///
/// Returns an error only for listener-level failures; per-connection errors
/// are logged and do not stop the loop.
pub async fn serve(listener: TcpListener, router: Router) -> std::io::Result<()> {
    serve_with_grace(listener, router, Duration::from_secs(10)).await
}

/// [`serve`] with an explicit shutdown grace period.
pub async fn serve_with_grace(
    listener: TcpListener,
    router: Router,
    grace: Duration,
) -> std::io::Result<()> {
    let graceful = GracefulShutdown::new();
    let tracker = TaskTracker::new();
    let mut shutdown = std::pin::pin!(shutdown_signal());

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, remote_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        continue;
                    }
                };

                let conn = connection_task(stream, remote_addr, router.clone(), &graceful);
                tracker.spawn(conn);
            }
            () = &mut shutdown => {
                info!("Shutdown signal received, no longer accepting connections");
                break;
            }
        }
    }

    // Stop accepting before draining
    drop(listener);
    tracker.close();

    let drain = async {
        graceful.shutdown().await;
        tracker.wait().await;
    };

    tokio::select! {
        () = drain => {
            info!("All connections drained");
        }
        () = tokio::time::sleep(grace) => {
            warn!(grace_secs = grace.as_secs(), "Grace period elapsed, aborting remaining connections");
        }
    }

    Ok(())
}

/// Build the future that serves one accepted connection.
fn connection_task(
    stream: tokio::net::TcpStream,
    remote_addr: SocketAddr,
    router: Router,
    graceful: &GracefulShutdown,
) -> impl Future<Output = ()> + Send + 'static {
    let drop_handle = ConnectionDropHandle::new();
    let request_handle = drop_handle.clone();

    // Every request on this connection carries the peer address and the
    // drop capability in its extensions
    let service = TowerToHyperService::new(service_fn(move |mut req: Request<Incoming>| {
        req.extensions_mut().insert(ConnectInfo(remote_addr));
        req.extensions_mut().insert(request_handle.clone());
        router.clone().oneshot(req)
    }));

    let builder = ConnBuilder::new(TokioExecutor::new());
    let conn = builder
        .serve_connection_with_upgrades(TokioIo::new(stream), service)
        .into_owned();
    let conn = graceful.watch(conn);

    async move {
        tokio::select! {
            result = conn => {
                if let Err(e) = result {
                    debug!(peer = %remote_addr, error = %e, "Connection ended with error");
                }
            }
            () = drop_handle.dropped() => {
                // A gate denied the request; dropping the serve future closes
                // the socket without a response on the wire
                debug!(peer = %remote_addr, "Connection dropped without response");
            }
        }
    }
}
