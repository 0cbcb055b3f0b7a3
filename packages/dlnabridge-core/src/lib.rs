//! DLNA Bridge Core - DLNA/UPnP media server engine.
//!
//! This crate exposes a remote media library (reached over HTTP through the
//! [`MediaSource`](media_source::MediaSource) trait) to DLNA renderers and
//! control points on the local network. It is used by the standalone
//! `dlnabridge-server` binary and can be embedded elsewhere.
//!
//! # Architecture
//!
//! - [`profiles`]: Client capability profiles and the header-based resolver
//! - [`ssdp`]: SSDP discovery (NOTIFY announcements, M-SEARCH responses)
//! - [`content`]: ContentDirectory Browse/Search and DIDL-Lite
//! - [`soap`]: SOAP envelopes and UPnP faults
//! - [`stream`]: Streaming proxy with Range handling and progress estimation
//! - [`services`]: Playback session tracking and the lifecycle supervisor
//! - [`api`]: HTTP router (description, control, events, streams, operator)
//! - [`bootstrap`]: Composition root building one run of the stack
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`MediaSource`](media_source::MediaSource): The upstream media library
//! - [`IpDetector`](context::IpDetector): Local IP detection
//! - [`HealthProbe`](services::HealthProbe): Liveness check of a running stack
//! - [`ConfigSource`](services::ConfigSource): Upstream configuration snapshots
//! - [`Lifecycle`](lifecycle::Lifecycle): Restart/shutdown requests from handlers

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod content;
pub mod context;
pub mod description;
pub mod error;
pub mod lifecycle;
pub mod media_source;
pub mod profiles;
pub mod protocol_constants;
pub mod services;
pub mod soap;
pub mod ssdp;
pub mod stream;
pub mod utils;

// Re-export commonly used types at the crate root
pub use config::{Config, SsdpConfig, SupervisorConfig, UpstreamConfig};
pub use context::{IpDetector, LocalIpDetector, NetworkContext, NetworkError, UrlBuilder};
pub use error::{BridgeError, BridgeResult, ErrorCode};
pub use lifecycle::{Lifecycle, NoopLifecycle};

// Re-export component types
pub use content::{BrowseFlag, BrowseResult, ContentDirectory};
pub use description::DeviceDescriptor;
pub use media_source::{HttpMediaSource, HttpMediaSourceFactory, MediaSource, UpstreamError};
pub use profiles::{DeviceProfile, ProfileResolver};
pub use ssdp::{DiscoveryBroadcaster, DiscoveryError};
pub use stream::StreamingProxy;

// Re-export service types
pub use services::{
    ActiveSession, ConfigSource, HttpHealthProbe, PlaybackSessionTracker, SharedConfigSource,
    Supervisor, SupervisorHandle, SupervisorState,
};

// Re-export bootstrap and API types
pub use api::{start_server, AppState, ServerError};
pub use bootstrap::{Bootstrap, DlnaStack, LaunchError};
