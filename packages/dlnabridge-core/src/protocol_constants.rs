//! Fixed protocol constants that should NOT be changed.
//!
//! UPnP Device Architecture, SSDP and DLNA guideline values. Renderers
//! expect them verbatim.

// ─────────────────────────────────────────────────────────────────────────────
// SSDP
// ─────────────────────────────────────────────────────────────────────────────

/// SSDP multicast group and port.
pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250:1900";

/// Default SSDP port, bound by the discovery listener.
pub const SSDP_PORT: u16 = 1900;

/// Advertisement lifetime announced in `CACHE-CONTROL: max-age`.
///
/// UPnP 1.0 requires at least 1800 seconds.
pub const SSDP_MAX_AGE_SECS: u64 = 1800;

/// UPnP 1.0 recommends a multicast TTL of 4 for SSDP.
pub const SSDP_MULTICAST_TTL: u32 = 4;

/// Maximum size of an SSDP datagram we are willing to read.
pub const SSDP_MAX_DATAGRAM: usize = 8192;

// ─────────────────────────────────────────────────────────────────────────────
// UPnP Types
// ─────────────────────────────────────────────────────────────────────────────

/// Root device type advertised by the bridge.
pub const MEDIA_SERVER_URN: &str = "urn:schemas-upnp-org:device:MediaServer:1";

/// ContentDirectory service type.
pub const CONTENT_DIRECTORY_URN: &str = "urn:schemas-upnp-org:service:ContentDirectory:1";

/// ConnectionManager service type.
pub const CONNECTION_MANAGER_URN: &str = "urn:schemas-upnp-org:service:ConnectionManager:1";

/// Search target for root devices.
pub const ROOT_DEVICE_ST: &str = "upnp:rootdevice";

/// Search target matching every advertisement.
pub const SSDP_ALL_ST: &str = "ssdp:all";

/// GENA subscription lifetime granted to subscribers (seconds).
pub const GENA_SUBSCRIPTION_TIMEOUT_SECS: u64 = 1800;

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Paths
// ─────────────────────────────────────────────────────────────────────────────

pub const DEVICE_DESCRIPTION_PATH: &str = "/device.xml";
pub const CONTENT_DIRECTORY_SCPD_PATH: &str = "/ContentDirectory/scpd.xml";
pub const CONTENT_DIRECTORY_CONTROL_PATH: &str = "/ContentDirectory/control";
pub const CONTENT_DIRECTORY_EVENT_PATH: &str = "/ContentDirectory/event";
pub const CONNECTION_MANAGER_SCPD_PATH: &str = "/ConnectionManager/scpd.xml";
pub const CONNECTION_MANAGER_CONTROL_PATH: &str = "/ConnectionManager/control";
pub const CONNECTION_MANAGER_EVENT_PATH: &str = "/ConnectionManager/event";

/// Prefix of per-item stream URLs; the item id follows verbatim.
pub const STREAM_PATH_PREFIX: &str = "/stream/";

// ─────────────────────────────────────────────────────────────────────────────
// ContentDirectory
// ─────────────────────────────────────────────────────────────────────────────

/// Object id of the ContentDirectory root container.
pub const ROOT_OBJECT_ID: &str = "0";

/// Parent id reported for the root container.
pub const ROOT_PARENT_ID: &str = "-1";

/// Properties the Search action accepts in its criteria.
pub const SEARCH_CAPABILITIES: &str = "upnp:class";

/// Properties results are sorted by.
pub const SORT_CAPABILITIES: &str = "dc:title";

// ─────────────────────────────────────────────────────────────────────────────
// DLNA
// ─────────────────────────────────────────────────────────────────────────────

/// DLNA.ORG_FLAGS for streamed content: streaming transfer mode,
/// background transfer mode, connection stalling, DLNA 1.5.
pub const DLNA_FLAGS: &str = "01700000000000000000000000000000";

/// Header announcing real-time transfer mode.
pub const TRANSFER_MODE_HEADER: &str = "transferMode.dlna.org";

/// Header carrying the `<res>` fourth protocolInfo field.
pub const CONTENT_FEATURES_HEADER: &str = "contentFeatures.dlna.org";

/// DLNA time-based seek request header.
pub const TIME_SEEK_RANGE_HEADER: &str = "TimeSeekRange.dlna.org";

// ─────────────────────────────────────────────────────────────────────────────
// Media
// ─────────────────────────────────────────────────────────────────────────────

/// Upstream positions are expressed in 100ns ticks.
pub const TICKS_PER_SECOND: u64 = 10_000_000;

/// Minimum interval between progress reports forwarded upstream (seconds).
pub const PROGRESS_REPORT_INTERVAL_SECS: u64 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Application name used in protocol data (SERVER header, device description).
pub const APP_NAME: &str = "DLNA Bridge";

/// Service identifier returned by the health endpoint.
pub const SERVICE_ID: &str = "dlnabridge";

/// Manufacturer advertised in the device description.
pub const MANUFACTURER: &str = "DLNA Bridge Project";

/// Model name advertised in the device description.
pub const MODEL_NAME: &str = "DLNA Bridge Media Server";

/// Default HTTP port for the DLNA service.
pub const DEFAULT_HTTP_PORT: u16 = 8200;

/// Value of the SSDP `SERVER` header.
pub fn server_header() -> String {
    format!(
        "{}/{} UPnP/1.0 DLNADOC/1.50 {}/{}",
        std::env::consts::OS,
        std::env::consts::ARCH,
        SERVICE_ID,
        env!("CARGO_PKG_VERSION")
    )
}
