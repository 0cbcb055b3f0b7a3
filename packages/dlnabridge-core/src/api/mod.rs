//! HTTP API layer.
//!
//! This module contains thin handlers that delegate to the DLNA components.
//! It provides the router construction and server startup functionality.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::content::ContentDirectory;
use crate::context::NetworkContext;
use crate::description::DeviceDescriptor;
use crate::lifecycle::Lifecycle;
use crate::profiles::ProfileResolver;
use crate::services::PlaybackSessionTracker;
use crate::ssdp::DiscoveryBroadcaster;
use crate::stream::StreamingProxy;

mod control;
pub mod http;
mod stream;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared application state for the API layer.
///
/// Cheap to clone: every component sits behind an `Arc`. One `AppState`
/// exists per run of the DLNA stack.
#[derive(Clone)]
pub struct AppState {
    pub content: Arc<ContentDirectory>,
    pub proxy: Arc<StreamingProxy>,
    pub tracker: Arc<PlaybackSessionTracker>,
    pub discovery: Arc<DiscoveryBroadcaster>,
    pub resolver: Arc<ProfileResolver>,
    pub descriptor: Arc<DeviceDescriptor>,
    pub network: NetworkContext,
    /// Operator restart/shutdown requests.
    pub lifecycle: Arc<dyn Lifecycle>,
}

/// A running HTTP server.
pub struct ServerHandle {
    /// Port actually bound (differs from the configured one when that was 0).
    pub port: u16,
    pub task: JoinHandle<std::io::Result<()>>,
}

/// Binds `bind` and serves the router until `shutdown` fires.
///
/// The bound port is written back to the state's [`NetworkContext`] before
/// this returns so discovery announces the real address.
pub async fn start_server(
    state: AppState,
    bind: SocketAddr,
    shutdown: CancellationToken,
) -> Result<ServerHandle, ServerError> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    let port = listener.local_addr()?.port();

    // Set port and signal waiters
    state.network.set_port(port);

    log::info!("[Server] Listening on http://{}:{}", bind.ip(), port);
    let app = http::create_router(state);

    let task = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
    });

    Ok(ServerHandle { port, task })
}
