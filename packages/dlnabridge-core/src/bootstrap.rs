//! Composition root.
//!
//! [`Bootstrap`] holds everything that lives for the whole process (config,
//! network context, device identity, profile rules, media source factory).
//! [`Bootstrap::launch`] builds one run of the DLNA stack from an upstream
//! configuration snapshot, in dependency order:
//!
//! 1. media source (from the snapshot)
//! 2. session tracker, content directory, streaming proxy
//! 3. HTTP server (binds and publishes the real port)
//! 4. SSDP discovery (announces the now-known description URL)
//!
//! [`DlnaStack::shutdown`] tears the run down in reverse so a later launch
//! can bind the same ports.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{start_server, AppState, ServerError};
use crate::config::{Config, UpstreamConfig};
use crate::content::ContentDirectory;
use crate::context::{LocalIpDetector, NetworkContext, NetworkError};
use crate::description::DeviceDescriptor;
use crate::error::ErrorCode;
use crate::lifecycle::Lifecycle;
use crate::media_source::{HttpMediaSourceFactory, MediaSourceFactory, UpstreamError};
use crate::profiles::ProfileResolver;
use crate::services::PlaybackSessionTracker;
use crate::ssdp::{DiscoveryBroadcaster, DiscoveryError};
use crate::stream::StreamingProxy;

/// How long a stopping HTTP server may take to drain before it is aborted.
const SERVER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised while launching the DLNA stack.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Media source unavailable: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("HTTP server failed: {0}")]
    Server(#[from] ServerError),

    #[error("Discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
}

/// Process-lifetime dependencies of the DLNA stack.
pub struct Bootstrap {
    config: Config,
    network: NetworkContext,
    descriptor: Arc<DeviceDescriptor>,
    resolver: Arc<ProfileResolver>,
    factory: Arc<dyn MediaSourceFactory>,
}

impl Bootstrap {
    pub fn new(config: Config, network: NetworkContext, factory: Arc<dyn MediaSourceFactory>) -> Self {
        let descriptor = DeviceDescriptor::from_config(&config);
        log::info!(
            "[Bootstrap] Device '{}' ({})",
            descriptor.friendly_name,
            descriptor.udn()
        );
        Self {
            config,
            network,
            descriptor: Arc::new(descriptor),
            resolver: Arc::new(ProfileResolver::with_builtin_profiles()),
            factory,
        }
    }

    /// Builds the production wiring: detected (or configured) advertise IP
    /// and the HTTP media source.
    ///
    /// # Errors
    ///
    /// Fails when no advertise IP is configured and none can be detected.
    pub fn from_config(config: Config) -> Result<Self, NetworkError> {
        let network = match config.advertise_ip {
            Some(ip) => NetworkContext::explicit(config.http_port, ip),
            None => NetworkContext::auto_detect(config.http_port, LocalIpDetector::arc())?,
        };
        let factory = Arc::new(HttpMediaSourceFactory::new(config.upstream_timeout()));
        Ok(Self::new(config, network, factory))
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn network(&self) -> &NetworkContext {
        &self.network
    }

    #[must_use]
    pub fn descriptor(&self) -> &Arc<DeviceDescriptor> {
        &self.descriptor
    }

    /// Builds and starts one run of the DLNA stack.
    ///
    /// Everything the run spawns stops when `parent` is cancelled. On error
    /// nothing is left bound.
    pub async fn launch(
        &self,
        upstream: &UpstreamConfig,
        parent: &CancellationToken,
        lifecycle: Arc<dyn Lifecycle>,
    ) -> Result<DlnaStack, LaunchError> {
        let config = &self.config;
        let cancel = parent.child_token();

        let source = self.factory.create(upstream)?;
        let tracker = Arc::new(PlaybackSessionTracker::new(
            source.clone(),
            Some(upstream.user_id.clone()),
        ));
        let content = Arc::new(ContentDirectory::new(
            source.clone(),
            self.network.clone(),
            config.browse_cache_ttl(),
            self.descriptor.friendly_name.clone(),
        ));
        let proxy = Arc::new(StreamingProxy::new(
            source,
            tracker.clone(),
            config.upstream_timeout(),
            cancel.clone(),
        )?);
        let discovery = Arc::new(DiscoveryBroadcaster::new(
            config.ssdp.clone(),
            &self.descriptor.uuid,
            self.network.clone(),
        ));

        let state = AppState {
            content,
            proxy,
            tracker,
            discovery: discovery.clone(),
            resolver: self.resolver.clone(),
            descriptor: self.descriptor.clone(),
            network: self.network.clone(),
            lifecycle,
        };

        let bind = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.http_port);
        let server = start_server(state.clone(), bind, cancel.clone()).await?;

        if let Err(e) = discovery.start(&cancel).await {
            log::error!("[Bootstrap] Discovery failed to start ({}): {}", e.code(), e);
            cancel.cancel();
            stop_server(server.task).await;
            return Err(e.into());
        }

        log::info!(
            "[Bootstrap] DLNA stack up at {}",
            self.network.description_url()
        );
        Ok(DlnaStack {
            state,
            port: server.port,
            cancel,
            server: server.task,
        })
    }
}

/// One running instance of the DLNA stack.
pub struct DlnaStack {
    pub state: AppState,
    /// HTTP port bound by this run.
    pub port: u16,
    cancel: CancellationToken,
    server: JoinHandle<std::io::Result<()>>,
}

impl DlnaStack {
    /// Sends byebye, ends all sessions, stops the HTTP server and releases
    /// every socket before returning.
    pub async fn shutdown(self) {
        self.state.discovery.stop().await;
        let ended = self.state.tracker.end_all();
        if ended > 0 {
            log::info!("[Bootstrap] Ended {} playback session(s)", ended);
        }
        self.cancel.cancel();
        stop_server(self.server).await;
        log::info!("[Bootstrap] DLNA stack stopped");
    }
}

async fn stop_server(mut task: JoinHandle<std::io::Result<()>>) {
    match tokio::time::timeout(SERVER_SHUTDOWN_TIMEOUT, &mut task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => log::warn!("[Server] Exited with error: {}", e),
        Ok(Err(e)) => log::warn!("[Server] Task ended abnormally: {}", e),
        Err(_) => {
            log::warn!("[Server] Graceful shutdown timed out, aborting");
            task.abort();
        }
    }
}
