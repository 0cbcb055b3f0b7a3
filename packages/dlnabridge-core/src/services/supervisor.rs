//! Service supervisor: owns the DLNA stack's lifecycle.
//!
//! ```text
//! Idle ──config available──▶ Starting ──launched──▶ Running
//!  ▲                            │ launch failed        │ probe failures / operator restart
//!  │                            ▼                      ▼
//!  └────────── Stopping ◀─── (Idle)              Restarting ──backoff──▶ Starting
//! ```
//!
//! Every transition runs under one lifecycle lock, so a restart requested
//! while another is in flight waits for it instead of interleaving. Request
//! handling never touches that lock.
//!
//! While running, two background tasks accompany the stack: a health probe
//! against the device description and a slower housekeeping pass (stale
//! sessions, stalled reads, listing cache, IP changes). Both are cancelled
//! before the stack is torn down.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::AppState;
use crate::bootstrap::{Bootstrap, DlnaStack};
use crate::config::{SupervisorConfig, UpstreamConfig};
use crate::lifecycle::Lifecycle;
use crate::protocol_constants::DEVICE_DESCRIPTION_PATH;

// ─────────────────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorState {
    Idle,
    Starting,
    Running,
    Restarting,
    Stopping,
}

// ─────────────────────────────────────────────────────────────────────────────
// Health probing
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HealthError {
    #[error("Health probe timed out")]
    Timeout,

    #[error("Health probe request failed: {0}")]
    Request(String),

    #[error("Health probe returned HTTP {0}")]
    Status(u16),
}

/// Checks that a running stack still answers.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self, port: u16) -> Result<(), HealthError>;
}

/// Fetches the device description over loopback.
pub struct HttpHealthProbe {
    client: reqwest::Client,
}

impl HttpHealthProbe {
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn check(&self, port: u16) -> Result<(), HealthError> {
        let url = format!("http://127.0.0.1:{}{}", port, DEVICE_DESCRIPTION_PATH);
        let resp = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                HealthError::Timeout
            } else {
                HealthError::Request(e.to_string())
            }
        })?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(HealthError::Status(resp.status().as_u16()))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration source
// ─────────────────────────────────────────────────────────────────────────────

/// Supplies the current upstream configuration snapshot, if any.
pub trait ConfigSource: Send + Sync {
    fn current(&self) -> Option<UpstreamConfig>;
}

/// In-process snapshot the operator (or the binary) can replace.
#[derive(Default)]
pub struct SharedConfigSource {
    inner: RwLock<Option<UpstreamConfig>>,
}

impl SharedConfigSource {
    pub fn new(initial: Option<UpstreamConfig>) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }

    /// Replaces the snapshot; the supervisor picks it up on its next poll.
    pub fn set(&self, config: Option<UpstreamConfig>) {
        *self.inner.write() = config;
    }
}

impl ConfigSource for SharedConfigSource {
    fn current(&self) -> Option<UpstreamConfig> {
        self.inner.read().clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Command {
    Restart(String),
    Shutdown,
}

/// Queues lifecycle requests for the supervisor's run loop.
#[derive(Clone)]
pub struct SupervisorHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl Lifecycle for SupervisorHandle {
    fn request_restart(&self, reason: &str) {
        if self.tx.send(Command::Restart(reason.to_string())).is_err() {
            log::warn!("[Supervisor] Not running, restart request dropped");
        }
    }

    fn request_shutdown(&self) {
        if self.tx.send(Command::Shutdown).is_err() {
            log::warn!("[Supervisor] Not running, shutdown request dropped");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Supervisor
// ─────────────────────────────────────────────────────────────────────────────

struct Active {
    stack: DlnaStack,
    upstream: UpstreamConfig,
    monitor_cancel: CancellationToken,
    monitors: Vec<JoinHandle<()>>,
}

pub struct Supervisor {
    bootstrap: Bootstrap,
    settings: SupervisorConfig,
    config_source: Arc<dyn ConfigSource>,
    probe: Arc<dyn HealthProbe>,
    lifecycle_lock: tokio::sync::Mutex<Option<Active>>,
    state_tx: watch::Sender<SupervisorState>,
    restarts: AtomicU64,
    /// Set when the last launch failed so polling retries it.
    retry_pending: AtomicBool,
    root: CancellationToken,
    commands_tx: mpsc::UnboundedSender<Command>,
    commands_rx: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
}

impl Supervisor {
    pub fn new(
        bootstrap: Bootstrap,
        config_source: Arc<dyn ConfigSource>,
        probe: Arc<dyn HealthProbe>,
    ) -> Self {
        let settings = bootstrap.config().supervisor.clone();
        let (state_tx, _) = watch::channel(SupervisorState::Idle);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        Self {
            bootstrap,
            settings,
            config_source,
            probe,
            lifecycle_lock: tokio::sync::Mutex::new(None),
            state_tx,
            restarts: AtomicU64::new(0),
            retry_pending: AtomicBool::new(false),
            root: CancellationToken::new(),
            commands_tx,
            commands_rx: Mutex::new(Some(commands_rx)),
        }
    }

    #[must_use]
    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            tx: self.commands_tx.clone(),
        }
    }

    #[must_use]
    pub fn state(&self) -> SupervisorState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state_tx.subscribe()
    }

    /// Completed supervised restarts since creation.
    #[must_use]
    pub fn restart_count(&self) -> u64 {
        self.restarts.load(Ordering::Relaxed)
    }

    /// Components of the running stack, if any.
    pub async fn app_state(&self) -> Option<AppState> {
        self.lifecycle_lock
            .lock()
            .await
            .as_ref()
            .map(|active| active.stack.state.clone())
    }

    fn set_state(&self, state: SupervisorState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            log::info!("[Supervisor] {:?} -> {:?}", previous, state);
        }
    }

    /// Drives the supervisor until `cancel` fires or a shutdown is requested,
    /// then stops the stack.
    ///
    /// While idle the config source is polled; lifecycle requests from
    /// [`SupervisorHandle`]s and the health monitor are handled here.
    pub async fn run(&self, cancel: CancellationToken) {
        let Some(mut commands) = self.commands_rx.lock().take() else {
            log::warn!("[Supervisor] run() called twice");
            return;
        };

        let mut poll = tokio::time::interval(self.settings.config_poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_seen: Option<UpstreamConfig> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = poll.tick() => self.poll_config(&mut last_seen).await,
                Some(command) = commands.recv() => match command {
                    Command::Restart(reason) => self.restart(&reason).await,
                    Command::Shutdown => {
                        log::info!("[Supervisor] Shutdown requested");
                        break;
                    }
                },
            }
        }

        self.stop().await;
        self.root.cancel();
    }

    async fn poll_config(&self, last_seen: &mut Option<UpstreamConfig>) {
        let current = self.config_source.current();
        if current != *last_seen {
            *last_seen = current.clone();
            self.apply_config(current).await;
        } else if current.is_some()
            && self.state() == SupervisorState::Idle
            && self.retry_pending.load(Ordering::Relaxed)
        {
            log::info!("[Supervisor] Retrying launch");
            self.start().await;
        }
    }

    /// Starts the stack from the current config snapshot. No-op when already
    /// running or when no upstream is configured.
    pub async fn start(&self) -> bool {
        let mut active = self.lifecycle_lock.lock().await;
        if active.is_some() {
            return true;
        }
        let Some(upstream) = self.config_source.current() else {
            log::debug!("[Supervisor] No upstream configured, staying idle");
            return false;
        };
        self.launch_locked(&mut active, upstream).await
    }

    /// Stops the stack: byebye, sessions ended, sockets and timers released.
    pub async fn stop(&self) {
        let mut active = self.lifecycle_lock.lock().await;
        if let Some(current) = active.take() {
            self.set_state(SupervisorState::Stopping);
            self.teardown(current).await;
        }
        self.set_state(SupervisorState::Idle);
    }

    /// Stops the stack, waits the backoff, and starts it again from the
    /// latest config snapshot.
    pub async fn restart(&self, reason: &str) {
        let mut active = self.lifecycle_lock.lock().await;
        let upstream = self
            .config_source
            .current()
            .or_else(|| active.as_ref().map(|a| a.upstream.clone()));
        self.restart_locked(&mut active, upstream, reason).await;
    }

    /// Applies an upstream configuration snapshot: starts, restarts or stops
    /// the stack as needed.
    pub async fn apply_config(&self, upstream: Option<UpstreamConfig>) {
        let mut active = self.lifecycle_lock.lock().await;
        let running = active.as_ref().map(|a| a.upstream.clone());
        match (running, upstream) {
            (None, Some(upstream)) => {
                self.launch_locked(&mut active, upstream).await;
            }
            (Some(current), Some(upstream)) if current != upstream => {
                self.restart_locked(&mut active, Some(upstream), "upstream configuration changed")
                    .await;
            }
            (Some(_), None) => {
                log::info!("[Supervisor] Upstream configuration removed");
                if let Some(current) = active.take() {
                    self.set_state(SupervisorState::Stopping);
                    self.teardown(current).await;
                }
                self.set_state(SupervisorState::Idle);
            }
            _ => {}
        }
    }

    async fn restart_locked(
        &self,
        active: &mut Option<Active>,
        upstream: Option<UpstreamConfig>,
        reason: &str,
    ) {
        log::info!("[Supervisor] Restarting: {}", reason);
        self.set_state(SupervisorState::Restarting);
        if let Some(current) = active.take() {
            self.teardown(current).await;
        }
        tokio::time::sleep(self.settings.restart_backoff()).await;

        match upstream {
            Some(upstream) => {
                if self.launch_locked(active, upstream).await {
                    self.restarts.fetch_add(1, Ordering::Relaxed);
                }
            }
            None => self.set_state(SupervisorState::Idle),
        }
    }

    async fn launch_locked(&self, active: &mut Option<Active>, upstream: UpstreamConfig) -> bool {
        self.set_state(SupervisorState::Starting);
        let lifecycle: Arc<dyn Lifecycle> = Arc::new(self.handle());
        match self.bootstrap.launch(&upstream, &self.root, lifecycle).await {
            Ok(stack) => {
                let monitor_cancel = self.root.child_token();
                let monitors = vec![
                    tokio::spawn(health_loop(
                        self.probe.clone(),
                        stack.port,
                        self.settings.clone(),
                        self.commands_tx.clone(),
                        monitor_cancel.clone(),
                    )),
                    tokio::spawn(housekeeping_loop(
                        stack.state.clone(),
                        self.settings.clone(),
                        monitor_cancel.clone(),
                    )),
                ];
                *active = Some(Active {
                    stack,
                    upstream,
                    monitor_cancel,
                    monitors,
                });
                self.retry_pending.store(false, Ordering::Relaxed);
                self.set_state(SupervisorState::Running);
                true
            }
            Err(e) => {
                log::error!("[Supervisor] Launch failed: {}", e);
                self.retry_pending.store(true, Ordering::Relaxed);
                self.set_state(SupervisorState::Idle);
                false
            }
        }
    }

    async fn teardown(&self, active: Active) {
        active.monitor_cancel.cancel();
        for monitor in active.monitors {
            if let Err(e) = monitor.await {
                log::warn!("[Supervisor] Monitor ended abnormally: {}", e);
            }
        }
        active.stack.shutdown().await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Background tasks
// ─────────────────────────────────────────────────────────────────────────────

async fn health_loop(
    probe: Arc<dyn HealthProbe>,
    port: u16,
    settings: SupervisorConfig,
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
) {
    let period = settings.health_interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut failures = 0u32;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            r = tokio::time::timeout(settings.health_timeout(), probe.check(port)) => {
                r.unwrap_or(Err(HealthError::Timeout))
            }
        };

        match result {
            Ok(()) => {
                if failures > 0 {
                    log::info!("[Supervisor] Health probe recovered");
                }
                failures = 0;
            }
            Err(e) => {
                failures += 1;
                log::warn!(
                    "[Supervisor] Health probe failed ({}/{}): {}",
                    failures,
                    settings.failure_threshold,
                    e
                );
                if failures >= settings.failure_threshold {
                    let reason = format!("health probe failed {} times: {}", failures, e);
                    if commands.send(Command::Restart(reason)).is_err() {
                        log::warn!("[Supervisor] Run loop gone, health restart dropped");
                    }
                    return;
                }
            }
        }
    }
}

async fn housekeeping_loop(state: AppState, settings: SupervisorConfig, cancel: CancellationToken) {
    let period = settings.cleanup_interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let ended = state.tracker.cleanup_stale(settings.session_stale());
        let stalled = state.tracker.mark_stalled(settings.stalled_grace());
        state.content.purge_cache();
        if ended > 0 || stalled > 0 {
            log::info!(
                "[Supervisor] Housekeeping: {} stale session(s) ended, {} marked paused",
                ended,
                stalled
            );
        }

        if state.network.refresh_ip() {
            state.discovery.send_manual_alive().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::AtomicU32;

    use super::*;
    use crate::bootstrap::tests::{test_config, upstream, MemoryFactory};
    use crate::config::Config;
    use crate::context::NetworkContext;

    /// Fails the first `failures` checks, then reports healthy.
    struct ScriptedProbe {
        failures: AtomicU32,
        calls: AtomicU32,
    }

    impl ScriptedProbe {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                failures: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl HealthProbe for ScriptedProbe {
        async fn check(&self, _port: u16) -> Result<(), HealthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures.load(Ordering::SeqCst);
            if left == 0 {
                return Ok(());
            }
            self.failures.store(left - 1, Ordering::SeqCst);
            Err(HealthError::Status(500))
        }
    }

    fn fast_settings() -> SupervisorConfig {
        SupervisorConfig {
            config_poll_interval_ms: 20,
            health_interval_ms: 20,
            health_timeout_ms: 200,
            failure_threshold: 3,
            restart_backoff_ms: 10,
            cleanup_interval_ms: 20,
            session_stale_ms: 60_000,
            stalled_grace_ms: 30_000,
        }
    }

    fn supervisor(
        factory: Arc<MemoryFactory>,
        source: Arc<SharedConfigSource>,
        probe: Arc<dyn HealthProbe>,
    ) -> Arc<Supervisor> {
        let config = Config {
            supervisor: fast_settings(),
            ..test_config()
        };
        let network = NetworkContext::explicit(0, IpAddr::V4(Ipv4Addr::LOCALHOST));
        let boot = Bootstrap::new(config, network, factory);
        Arc::new(Supervisor::new(boot, source, probe))
    }

    fn spawn_run(sup: &Arc<Supervisor>, cancel: &CancellationToken) -> JoinHandle<()> {
        let sup = sup.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { sup.run(cancel).await })
    }

    async fn wait_for(supervisor: &Supervisor, want: SupervisorState) {
        let mut rx = supervisor.subscribe();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == want))
            .await
            .expect("state not reached")
            .unwrap();
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..200 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn stays_idle_until_upstream_configured() {
        let source = Arc::new(SharedConfigSource::new(None));
        let sup = supervisor(Arc::new(MemoryFactory::new()), source.clone(), ScriptedProbe::new(0));
        let cancel = CancellationToken::new();
        let task = spawn_run(&sup, &cancel);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sup.state(), SupervisorState::Idle);
        assert!(sup.app_state().await.is_none());

        source.set(Some(upstream()));
        wait_for(&sup, SupervisorState::Running).await;
        assert!(sup.app_state().await.is_some());

        cancel.cancel();
        task.await.unwrap();
        assert_eq!(sup.state(), SupervisorState::Idle);
    }

    #[tokio::test]
    async fn repeated_probe_failures_trigger_restart_with_same_identity() {
        let source = Arc::new(SharedConfigSource::new(Some(upstream())));
        let probe = ScriptedProbe::new(3);
        let factory = Arc::new(MemoryFactory::new());
        let sup = supervisor(factory.clone(), source, probe.clone());
        let cancel = CancellationToken::new();
        let task = spawn_run(&sup, &cancel);

        wait_for(&sup, SupervisorState::Running).await;
        let before = sup.app_state().await.unwrap().descriptor.uuid.clone();

        wait_until(|| sup.restart_count() == 1).await;
        wait_for(&sup, SupervisorState::Running).await;
        assert!(probe.calls.load(Ordering::SeqCst) >= 3);
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
        let after = sup.app_state().await.unwrap().descriptor.uuid.clone();
        assert_eq!(before, after);

        // Healthy from now on: no further restarts.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(sup.restart_count(), 1);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn stop_releases_ports_for_next_start() {
        let source = Arc::new(SharedConfigSource::new(Some(upstream())));
        let sup = supervisor(Arc::new(MemoryFactory::new()), source, ScriptedProbe::new(0));
        assert!(sup.start().await);
        let state = sup.app_state().await.unwrap();
        let ssdp_addr = state.discovery.local_addr().unwrap();
        let port = state.network.get_port();

        sup.stop().await;
        assert_eq!(sup.state(), SupervisorState::Idle);
        assert!(!state.discovery.is_running());
        drop(tokio::net::TcpListener::bind(("0.0.0.0", port)).await.unwrap());
        drop(tokio::net::UdpSocket::bind(ssdp_addr).await.unwrap());

        assert!(sup.start().await);
        assert_eq!(sup.state(), SupervisorState::Running);
        sup.stop().await;
    }

    #[tokio::test]
    async fn concurrent_restarts_are_serialised() {
        let source = Arc::new(SharedConfigSource::new(Some(upstream())));
        let factory = Arc::new(MemoryFactory::new());
        let sup = supervisor(factory.clone(), source, ScriptedProbe::new(0));
        assert!(sup.start().await);

        tokio::join!(sup.restart("first"), sup.restart("second"));
        assert_eq!(sup.restart_count(), 2);
        assert_eq!(sup.state(), SupervisorState::Running);
        // One stack per launch, never two alive at once.
        assert_eq!(factory.created.load(Ordering::SeqCst), 3);
        sup.stop().await;
    }

    #[tokio::test]
    async fn failed_launch_returns_to_idle_and_is_retried() {
        let source = Arc::new(SharedConfigSource::new(Some(upstream())));
        let factory = Arc::new(MemoryFactory::new());
        factory.failures.store(2, Ordering::SeqCst);
        let sup = supervisor(factory.clone(), source, ScriptedProbe::new(0));
        let cancel = CancellationToken::new();
        let task = spawn_run(&sup, &cancel);

        wait_for(&sup, SupervisorState::Running).await;
        assert_eq!(factory.failures.load(Ordering::SeqCst), 0);
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn removing_upstream_config_stops_the_stack() {
        let source = Arc::new(SharedConfigSource::new(Some(upstream())));
        let sup = supervisor(Arc::new(MemoryFactory::new()), source.clone(), ScriptedProbe::new(0));
        let cancel = CancellationToken::new();
        let task = spawn_run(&sup, &cancel);
        wait_for(&sup, SupervisorState::Running).await;

        source.set(None);
        wait_for(&sup, SupervisorState::Idle).await;
        assert!(sup.app_state().await.is_none());

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn changed_upstream_config_restarts_the_stack() {
        let source = Arc::new(SharedConfigSource::new(Some(upstream())));
        let factory = Arc::new(MemoryFactory::new());
        let sup = supervisor(factory.clone(), source.clone(), ScriptedProbe::new(0));
        let cancel = CancellationToken::new();
        let task = spawn_run(&sup, &cancel);
        wait_for(&sup, SupervisorState::Running).await;

        source.set(Some(UpstreamConfig {
            access_token: Some("rotated".into()),
            ..upstream()
        }));
        wait_until(|| sup.restart_count() == 1).await;
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn handle_requests_reach_the_run_loop() {
        let source = Arc::new(SharedConfigSource::new(Some(upstream())));
        let sup = supervisor(Arc::new(MemoryFactory::new()), source, ScriptedProbe::new(0));
        let task = spawn_run(&sup, &CancellationToken::new());
        wait_for(&sup, SupervisorState::Running).await;

        let handle = sup.handle();
        handle.request_restart("test");
        wait_until(|| sup.restart_count() == 1).await;

        handle.request_shutdown();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sup.state(), SupervisorState::Idle);
    }

    #[tokio::test]
    async fn http_probe_checks_device_description() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path(DEVICE_DESCRIPTION_PATH))
            .respond_with(wiremock::ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let probe = HttpHealthProbe::new(Duration::from_secs(1)).unwrap();
        assert!(probe.check(server.address().port()).await.is_ok());
    }

    #[tokio::test]
    async fn http_probe_reports_error_status() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path(DEVICE_DESCRIPTION_PATH))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let probe = HttpHealthProbe::new(Duration::from_secs(1)).unwrap();
        assert!(matches!(
            probe.check(server.address().port()).await,
            Err(HealthError::Status(500))
        ));
    }

    #[tokio::test]
    async fn http_probe_fails_on_closed_port() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let probe = HttpHealthProbe::new(Duration::from_secs(1)).unwrap();
        assert!(matches!(
            probe.check(port).await,
            Err(HealthError::Request(_)) | Err(HealthError::Timeout)
        ));
    }

    #[tokio::test]
    async fn health_restart_without_run_loop_is_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let cancel = CancellationToken::new();
        let settings = SupervisorConfig {
            failure_threshold: 1,
            ..fast_settings()
        };
        tokio::time::timeout(
            Duration::from_secs(5),
            health_loop(ScriptedProbe::new(u32::MAX), 1, settings, tx, cancel),
        )
        .await
        .unwrap();
    }
}
