//! SSDP discovery: announces the media server and answers M-SEARCH.

mod broadcaster;
pub mod message;

use thiserror::Error;

pub use broadcaster::DiscoveryBroadcaster;
pub use message::{advertisements, Advertisement, SearchRequest};

/// Errors raised while setting up the discovery socket.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Failed to create or bind the UDP socket.
    #[error("failed to bind SSDP socket: {0}")]
    SocketBind(#[source] std::io::Error),

    /// Failed to join the SSDP multicast group.
    #[error("failed to join multicast group: {0}")]
    MulticastJoin(#[source] std::io::Error),

    /// Bind or announce address is unusable (IPv6 is not supported).
    #[error("invalid SSDP address: {0}")]
    InvalidAddress(String),
}
