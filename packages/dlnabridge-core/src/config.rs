//! Configuration snapshot types.
//!
//! A [`Config`] is built once by the embedding application and handed to the
//! composition root. Components receive the pieces they need at construction
//! and never observe later edits: an upstream configuration change is applied
//! through a supervised restart instead (see [`crate::services::supervisor`]).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{DEFAULT_HTTP_PORT, SSDP_MAX_AGE_SECS, SSDP_PORT};

/// Connection details for the upstream media server.
///
/// Treated as an immutable snapshot: every (re)start of the DLNA stack builds
/// its media source from the snapshot current at that moment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the media server (e.g. `http://192.168.1.10:8096`).
    pub server_url: String,
    /// User whose library is exposed.
    pub user_id: String,
    /// Access token obtained by the external credential exchange.
    #[serde(default)]
    pub access_token: Option<String>,
}

/// SSDP socket and announcement schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SsdpConfig {
    /// Local address the discovery socket binds to.
    pub bind_addr: SocketAddr,
    /// Destination of NOTIFY announcements (normally the multicast group).
    pub announce_addr: SocketAddr,
    /// Interval between periodic alive bursts (milliseconds).
    pub alive_interval_ms: u64,
    /// Number of times each announcement is repeated per burst.
    pub burst_count: u32,
    /// Delay between repeats inside a burst (milliseconds).
    pub burst_spacing_ms: u64,
    /// Advertised `CACHE-CONTROL: max-age` (seconds).
    pub max_age_secs: u64,
}

impl Default for SsdpConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), SSDP_PORT),
            announce_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(239, 255, 255, 250)), SSDP_PORT),
            alive_interval_ms: 30_000,
            burst_count: 3,
            burst_spacing_ms: 100,
            max_age_secs: SSDP_MAX_AGE_SECS,
        }
    }
}

impl SsdpConfig {
    pub fn alive_interval(&self) -> Duration {
        Duration::from_millis(self.alive_interval_ms)
    }

    pub fn burst_spacing(&self) -> Duration {
        Duration::from_millis(self.burst_spacing_ms)
    }
}

/// Timers and thresholds driving the service supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// How often the idle supervisor checks for upstream configuration (ms).
    pub config_poll_interval_ms: u64,
    /// Interval between health probes while running (ms).
    pub health_interval_ms: u64,
    /// Timeout of a single health probe (ms).
    pub health_timeout_ms: u64,
    /// Consecutive probe failures that trigger a restart.
    pub failure_threshold: u32,
    /// Fixed delay between stopping and restarting the stack (ms).
    pub restart_backoff_ms: u64,
    /// Interval of the stale-session cleanup task (ms).
    pub cleanup_interval_ms: u64,
    /// Sessions without progress for this long are ended (ms).
    pub session_stale_ms: u64,
    /// Playing sessions without progress for this long are marked paused (ms).
    pub stalled_grace_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            config_poll_interval_ms: 5_000,
            health_interval_ms: 30_000,
            health_timeout_ms: 5_000,
            failure_threshold: 3,
            restart_backoff_ms: 5_000,
            cleanup_interval_ms: 60_000,
            session_stale_ms: 300_000,
            stalled_grace_ms: 30_000,
        }
    }
}

impl SupervisorConfig {
    pub fn config_poll_interval(&self) -> Duration {
        Duration::from_millis(self.config_poll_interval_ms)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    pub fn restart_backoff(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    pub fn session_stale(&self) -> Duration {
        Duration::from_millis(self.session_stale_ms)
    }

    pub fn stalled_grace(&self) -> Duration {
        Duration::from_millis(self.stalled_grace_ms)
    }
}

/// Configuration for the DLNA bridge.
///
/// All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Server
    /// HTTP port for description, control and stream endpoints (0 = auto-assign).
    pub http_port: u16,

    /// IP address renderers reach us at. Auto-detected when unset.
    pub advertise_ip: Option<IpAddr>,

    // Identity
    /// Name shown by renderers. Defaults to "DLNA Bridge on <hostname>".
    pub friendly_name: Option<String>,

    /// Device UUID. Defaults to a UUIDv5 derived from the hostname.
    pub device_uuid: Option<String>,

    // Discovery
    pub ssdp: SsdpConfig,

    // Lifecycle
    pub supervisor: SupervisorConfig,

    // Content
    /// How long a container's child listing is reused for paging (seconds).
    pub browse_cache_ttl_secs: u64,

    // Upstream
    /// Connect/read timeout for upstream requests (seconds).
    pub upstream_timeout_secs: u64,

    /// Upstream server connection; `None` until credentials are available.
    pub upstream: Option<UpstreamConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            advertise_ip: None,
            friendly_name: None,
            device_uuid: None,
            ssdp: SsdpConfig::default(),
            supervisor: SupervisorConfig::default(),
            browse_cache_ttl_secs: 30,
            upstream_timeout_secs: 15,
            upstream: None,
        }
    }
}

impl Config {
    pub fn browse_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.browse_cache_ttl_secs)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.ssdp.burst_count == 0 {
            return Err("ssdp.burst_count must be >= 1".to_string());
        }
        if self.ssdp.alive_interval_ms == 0 {
            return Err("ssdp.alive_interval_ms must be > 0".to_string());
        }
        if self.ssdp.max_age_secs < 1800 {
            return Err("ssdp.max_age_secs must be >= 1800 (UPnP 1.0)".to_string());
        }
        let sup = &self.supervisor;
        if sup.failure_threshold == 0 {
            return Err("supervisor.failure_threshold must be >= 1".to_string());
        }
        for (name, value) in [
            ("config_poll_interval_ms", sup.config_poll_interval_ms),
            ("health_interval_ms", sup.health_interval_ms),
            ("health_timeout_ms", sup.health_timeout_ms),
            ("cleanup_interval_ms", sup.cleanup_interval_ms),
            ("session_stale_ms", sup.session_stale_ms),
        ] {
            if value == 0 {
                return Err(format!("supervisor.{} must be > 0", name));
            }
        }
        if self.upstream_timeout_secs == 0 {
            return Err("upstream_timeout_secs must be > 0".to_string());
        }
        if let Some(upstream) = &self.upstream {
            if !upstream.server_url.starts_with("http://")
                && !upstream.server_url.starts_with("https://")
            {
                return Err(format!(
                    "upstream.server_url must be an http(s) URL, got '{}'",
                    upstream.server_url
                ));
            }
        }
        Ok(())
    }
}
