//! Where renderers reach the bridge.
//!
//! [`NetworkContext`] holds the advertised `ip:port` pair behind one lock so
//! SSDP `LOCATION` headers, the device description and DIDL `<res>` URLs are
//! always built from a consistent snapshot. The IP is either pinned from
//! config or re-detected from the host on each housekeeping tick.

use std::net::IpAddr;
#[cfg(test)]
use std::net::Ipv4Addr;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::protocol_constants::{
    CONNECTION_MANAGER_CONTROL_PATH, CONNECTION_MANAGER_EVENT_PATH, CONNECTION_MANAGER_SCPD_PATH,
    CONTENT_DIRECTORY_CONTROL_PATH, CONTENT_DIRECTORY_EVENT_PATH, CONTENT_DIRECTORY_SCPD_PATH,
    DEVICE_DESCRIPTION_PATH, STREAM_PATH_PREFIX,
};

#[derive(Debug, Clone)]
struct Advertised {
    ip: String,
    port: u16,
}

/// Advertised endpoint shared by discovery, description and content.
///
/// The port starts at the configured value (0 means ephemeral) and is
/// replaced by the bound port once the listener is up.
#[derive(Clone)]
pub struct NetworkContext {
    endpoint: Arc<RwLock<Advertised>>,
    detector: Option<Arc<dyn IpDetector>>,
}

impl NetworkContext {
    /// Pins the advertised IP; [`refresh_ip`](Self::refresh_ip) never moves it.
    #[must_use]
    pub fn explicit(bind_port: u16, advertise_ip: IpAddr) -> Self {
        Self::with_endpoint(advertise_ip.to_string(), bind_port, None)
    }

    /// Detects the advertised IP now and on every refresh.
    ///
    /// # Errors
    ///
    /// Fails when the first detection does.
    pub fn auto_detect(
        preferred_port: u16,
        detector: Arc<dyn IpDetector>,
    ) -> Result<Self, NetworkError> {
        let ip = detector.detect()?;
        Ok(Self::with_endpoint(ip, preferred_port, Some(detector)))
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        Self::explicit(0, IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    fn with_endpoint(ip: String, port: u16, detector: Option<Arc<dyn IpDetector>>) -> Self {
        Self {
            endpoint: Arc::new(RwLock::new(Advertised { ip, port })),
            detector,
        }
    }

    pub fn detect_ip(&self) -> Result<String, NetworkError> {
        self.detector
            .as_ref()
            .ok_or(NetworkError::NoDetector)?
            .detect()
    }

    #[must_use]
    pub fn get_port(&self) -> u16 {
        self.endpoint.read().port
    }

    #[must_use]
    pub fn get_local_ip(&self) -> String {
        self.endpoint.read().ip.clone()
    }

    pub fn set_port(&self, port: u16) {
        self.endpoint.write().port = port;
    }

    pub fn set_local_ip(&self, ip: String) {
        self.endpoint.write().ip = ip;
    }

    /// Re-runs detection and stores the result when it changed.
    ///
    /// Returns `true` if the address changed. A no-op in explicit mode.
    pub fn refresh_ip(&self) -> bool {
        let detected = match self.detect_ip() {
            Ok(ip) => ip,
            Err(NetworkError::NoDetector) => return false,
            Err(e) => {
                log::warn!("[Network] IP re-detection failed: {}", e);
                return false;
            }
        };

        let mut endpoint = self.endpoint.write();
        if endpoint.ip == detected {
            return false;
        }
        log::info!("[Network] Local IP changed {} -> {}", endpoint.ip, detected);
        endpoint.ip = detected;
        true
    }

    /// Snapshot of the current endpoint for URL building.
    #[must_use]
    pub fn url_builder(&self) -> UrlBuilder {
        let endpoint = self.endpoint.read();
        UrlBuilder::new(endpoint.ip.clone(), endpoint.port)
    }

    /// SSDP `LOCATION` value.
    #[must_use]
    pub fn description_url(&self) -> String {
        self.url_builder().description_url()
    }

    #[must_use]
    pub fn stream_url(&self, item_id: &str) -> String {
        self.url_builder().stream_url(item_id)
    }
}

/// Source of the host address renderers should use.
pub trait IpDetector: Send + Sync {
    fn detect(&self) -> Result<String, NetworkError>;
}

/// Picks the primary interface address via `local-ip-address`.
#[derive(Debug, Clone, Default)]
pub struct LocalIpDetector;

impl LocalIpDetector {
    #[must_use]
    pub fn arc() -> Arc<dyn IpDetector> {
        Arc::new(Self)
    }
}

impl IpDetector for LocalIpDetector {
    fn detect(&self) -> Result<String, NetworkError> {
        let ip = local_ip_address::local_ip().map_err(|e| NetworkError::Detection(e.to_string()))?;
        if ip.is_loopback() || ip.is_unspecified() {
            return Err(NetworkError::Detection(format!(
                "{} is not reachable from the LAN",
                ip
            )));
        }
        Ok(ip.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Local IP detection failed: {0}")]
    Detection(String),

    #[error("Advertise IP is pinned by configuration")]
    NoDetector,
}

/// Absolute URLs handed to renderers for one `ip:port` snapshot.
pub struct UrlBuilder {
    base: String,
}

impl UrlBuilder {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            base: format!("http://{}:{}", ip.into(), port),
        }
    }

    /// e.g. `http://192.168.1.100:8200`
    #[must_use]
    pub fn base_url(&self) -> String {
        self.base.clone()
    }

    #[must_use]
    pub fn description_url(&self) -> String {
        format!("{}{}", self.base, DEVICE_DESCRIPTION_PATH)
    }

    /// Item ids are upstream hex tokens and go into the path verbatim.
    #[must_use]
    pub fn stream_url(&self, item_id: &str) -> String {
        format!("{}{}{}", self.base, STREAM_PATH_PREFIX, item_id)
    }
}

/// Relative service URLs as they appear in the device description.
pub struct ServicePaths {
    pub scpd: &'static str,
    pub control: &'static str,
    pub event: &'static str,
}

pub const CONTENT_DIRECTORY_PATHS: ServicePaths = ServicePaths {
    scpd: CONTENT_DIRECTORY_SCPD_PATH,
    control: CONTENT_DIRECTORY_CONTROL_PATH,
    event: CONTENT_DIRECTORY_EVENT_PATH,
};

pub const CONNECTION_MANAGER_PATHS: ServicePaths = ServicePaths {
    scpd: CONNECTION_MANAGER_SCPD_PATH,
    control: CONNECTION_MANAGER_CONTROL_PATH,
    event: CONNECTION_MANAGER_EVENT_PATH,
};
