//! SSDP announcer and M-SEARCH responder.
//!
//! One UDP socket serves both directions: periodic `ssdp:alive` bursts go to
//! the announce address, and search responses are sent unicast back to the
//! requester from the same socket.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::message::{self, Advertisement};
use super::DiscoveryError;
use crate::config::SsdpConfig;
use crate::context::NetworkContext;
use crate::protocol_constants::{server_header, SSDP_MAX_DATAGRAM, SSDP_MULTICAST_TTL};

/// Back-off after a failed `recv_from` so a broken socket cannot spin.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// State shared by the announce loop, the listener and manual triggers.
#[derive(Clone)]
struct Announcer {
    socket: Arc<UdpSocket>,
    ads: Arc<Vec<Advertisement>>,
    config: Arc<SsdpConfig>,
    network: NetworkContext,
    server: Arc<str>,
}

impl Announcer {
    async fn send_alive_burst(&self) {
        for round in 0..self.config.burst_count {
            // Re-read per round: the HTTP port or local IP may change between bursts.
            let location = self.network.description_url();
            for ad in self.ads.iter() {
                let msg =
                    message::notify_alive(ad, &location, self.config.max_age_secs, &self.server);
                self.send(&msg, self.config.announce_addr).await;
            }
            if round + 1 < self.config.burst_count {
                tokio::time::sleep(self.config.burst_spacing()).await;
            }
        }
        log::debug!(
            "[SSDP] Sent alive burst ({} advertisements x {})",
            self.ads.len(),
            self.config.burst_count
        );
    }

    async fn send_byebye_burst(&self) {
        for round in 0..self.config.burst_count {
            for ad in self.ads.iter() {
                self.send(&message::notify_byebye(ad), self.config.announce_addr)
                    .await;
            }
            if round + 1 < self.config.burst_count {
                tokio::time::sleep(self.config.burst_spacing()).await;
            }
        }
        log::info!("[SSDP] Sent byebye burst");
    }

    async fn send(&self, msg: &str, dest: SocketAddr) {
        if let Err(e) = self.socket.send_to(msg.as_bytes(), dest).await {
            log::warn!("[SSDP] Send to {} failed: {}", dest, e);
        }
    }

    async fn handle_datagram(&self, data: &[u8], src: SocketAddr) {
        let Ok(text) = std::str::from_utf8(data) else {
            return;
        };
        let Some(request) = message::parse_msearch(text) else {
            return;
        };

        let matches = message::matching(&self.ads, &request.st);
        if matches.is_empty() {
            log::trace!("[SSDP] Ignoring M-SEARCH for {} from {}", request.st, src);
            return;
        }

        log::debug!(
            "[SSDP] M-SEARCH for {} from {} ({} responses)",
            request.st,
            src,
            matches.len()
        );
        let location = self.network.description_url();
        for ad in matches {
            let resp =
                message::search_response(ad, &location, self.config.max_age_secs, &self.server);
            self.send(&resp, src).await;
        }
    }

    async fn announce_loop(self, cancel: CancellationToken) {
        loop {
            self.send_alive_burst().await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.alive_interval()) => {}
            }
        }
    }

    async fn listen_loop(self, cancel: CancellationToken) {
        let mut buf = vec![0u8; SSDP_MAX_DATAGRAM];
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                res = self.socket.recv_from(&mut buf) => match res {
                    Ok((len, src)) => self.handle_datagram(&buf[..len], src).await,
                    Err(e) => {
                        log::warn!("[SSDP] Receive failed: {}", e);
                        tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                    }
                },
            }
        }
    }
}

struct Running {
    announcer: Announcer,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Advertises the bridge on the local network.
///
/// `start` binds the socket and spawns the announce and listen loops;
/// `stop` cancels them, sends `ssdp:byebye` and releases the socket so a
/// later `start` can bind the same port again.
pub struct DiscoveryBroadcaster {
    config: Arc<SsdpConfig>,
    network: NetworkContext,
    ads: Arc<Vec<Advertisement>>,
    running: Mutex<Option<Running>>,
}

impl DiscoveryBroadcaster {
    pub fn new(config: SsdpConfig, device_uuid: &str, network: NetworkContext) -> Self {
        Self {
            config: Arc::new(config),
            network,
            ads: Arc::new(message::advertisements(device_uuid)),
            running: Mutex::new(None),
        }
    }

    /// Binds the discovery socket and starts announcing.
    ///
    /// The loops stop when `parent` is cancelled or [`stop`](Self::stop) is
    /// called. Calling `start` while already running is a no-op.
    ///
    /// # Errors
    ///
    /// Fails if the socket cannot be bound or the multicast group joined.
    pub async fn start(&self, parent: &CancellationToken) -> Result<(), DiscoveryError> {
        if self.is_running() {
            log::warn!("[SSDP] Broadcaster already running");
            return Ok(());
        }

        let socket = Arc::new(create_socket(&self.config)?);
        if let Ok(addr) = socket.local_addr() {
            log::info!(
                "[SSDP] Listening on {}, announcing to {}",
                addr,
                self.config.announce_addr
            );
        }

        let announcer = Announcer {
            socket,
            ads: self.ads.clone(),
            config: self.config.clone(),
            network: self.network.clone(),
            server: server_header().into(),
        };
        let cancel = parent.child_token();
        let tasks = vec![
            tokio::spawn(announcer.clone().announce_loop(cancel.clone())),
            tokio::spawn(announcer.clone().listen_loop(cancel.clone())),
        ];

        *self.running.lock() = Some(Running {
            announcer,
            cancel,
            tasks,
        });
        Ok(())
    }

    /// Sends an immediate alive burst (operator-triggered refresh).
    ///
    /// Returns `false` if the broadcaster is not running.
    pub async fn send_manual_alive(&self) -> bool {
        let announcer = self.running.lock().as_ref().map(|r| r.announcer.clone());
        match announcer {
            Some(announcer) => {
                log::info!("[SSDP] Manual alive requested");
                announcer.send_alive_burst().await;
                true
            }
            None => false,
        }
    }

    /// Stops the loops, sends byebye and releases the socket.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };
        running.cancel.cancel();
        for task in running.tasks {
            if let Err(e) = task.await {
                log::warn!("[SSDP] Task ended abnormally: {}", e);
            }
        }
        running.announcer.send_byebye_burst().await;
        log::info!("[SSDP] Stopped");
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Address the discovery socket is bound to, while running.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running
            .lock()
            .as_ref()
            .and_then(|r| r.announcer.socket.local_addr().ok())
    }
}

fn ipv4(addr: SocketAddr) -> Result<Ipv4Addr, DiscoveryError> {
    match addr.ip() {
        IpAddr::V4(ip) => Ok(ip),
        IpAddr::V6(_) => Err(DiscoveryError::InvalidAddress(format!(
            "{} is not an IPv4 address",
            addr
        ))),
    }
}

fn create_socket(config: &SsdpConfig) -> Result<UdpSocket, DiscoveryError> {
    let bind_ip = ipv4(config.bind_addr)?;
    let announce_ip = ipv4(config.announce_addr)?;

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(DiscoveryError::SocketBind)?;

    // Allows rebinding 1900 on restart and sharing it with other SSDP stacks.
    if let Err(e) = socket.set_reuse_address(true) {
        log::warn!("[SSDP] Failed to set SO_REUSEADDR: {}", e);
    }
    #[cfg(unix)]
    if let Err(e) = socket.set_reuse_port(true) {
        log::warn!("[SSDP] Failed to set SO_REUSEPORT: {}", e);
    }

    if let Err(e) = socket.set_multicast_ttl_v4(SSDP_MULTICAST_TTL) {
        log::warn!("[SSDP] Failed to set multicast TTL: {}", e);
    }

    socket
        .set_nonblocking(true)
        .map_err(DiscoveryError::SocketBind)?;
    socket
        .bind(&config.bind_addr.into())
        .map_err(DiscoveryError::SocketBind)?;

    if announce_ip.is_multicast() {
        socket
            .join_multicast_v4(&announce_ip, &bind_ip)
            .map_err(DiscoveryError::MulticastJoin)?;
    }

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket).map_err(DiscoveryError::SocketBind)
}
