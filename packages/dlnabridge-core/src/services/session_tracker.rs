//! Active playback sessions fed by the streaming proxy.
//!
//! Sessions live in a `DashMap` keyed by session id: the relay guards of
//! concurrent streams insert and update their own entries while the
//! supervisor's cleanup task sweeps stale ones. Upstream progress and stop
//! reports are spawned so a slow media server never stalls a relay.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::media_source::MediaSource;
use crate::utils::now_millis;

/// Lifecycle of a playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Starting,
    Playing,
    Paused,
    Ended,
}

/// Client details captured when a stream starts.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub endpoint: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
struct PlaybackSession {
    session_id: String,
    item_id: String,
    user_id: Option<String>,
    state: SessionState,
    started_at: u64,
    last_progress_at: u64,
    last_progress: Instant,
    last_position_ticks: u64,
    is_paused: bool,
    paused_at: Option<u64>,
    client: ClientInfo,
}

impl PlaybackSession {
    fn snapshot(&self) -> ActiveSession {
        ActiveSession {
            session_id: self.session_id.clone(),
            item_id: self.item_id.clone(),
            user_id: self.user_id.clone(),
            state: self.state,
            started_at: self.started_at,
            last_progress_at: self.last_progress_at,
            position_ticks: self.last_position_ticks,
            is_paused: self.is_paused,
            paused_at: self.paused_at,
            client_endpoint: self.client.endpoint.clone(),
            user_agent: self.client.user_agent.clone(),
        }
    }
}

/// Read-only view of a session for the operator surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSession {
    pub session_id: String,
    pub item_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub state: SessionState,
    /// Unix millis.
    pub started_at: u64,
    /// Unix millis.
    pub last_progress_at: u64,
    pub position_ticks: u64,
    pub is_paused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// Result of [`PlaybackSessionTracker::record_progress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressOutcome {
    Updated(SessionState),
    /// Unknown or already ended session; nothing was done.
    NotFound,
}

/// Tracks playback sessions and mirrors them to the upstream server.
pub struct PlaybackSessionTracker {
    sessions: DashMap<String, PlaybackSession>,
    source: Arc<dyn MediaSource>,
    user_id: Option<String>,
}

impl PlaybackSessionTracker {
    pub fn new(source: Arc<dyn MediaSource>, user_id: Option<String>) -> Self {
        Self {
            sessions: DashMap::new(),
            source,
            user_id,
        }
    }

    /// Registers a new session in the `Starting` state and returns its id.
    pub fn start_session(&self, item_id: &str, client: ClientInfo) -> String {
        let session_id = uuid::Uuid::new_v4().simple().to_string();
        let now = now_millis();
        log::info!(
            "[Session] Started {} for item {} (client: {})",
            session_id,
            item_id,
            client.endpoint.as_deref().unwrap_or("unknown")
        );
        self.sessions.insert(
            session_id.clone(),
            PlaybackSession {
                session_id: session_id.clone(),
                item_id: item_id.to_string(),
                user_id: self.user_id.clone(),
                state: SessionState::Starting,
                started_at: now,
                last_progress_at: now,
                last_progress: Instant::now(),
                last_position_ticks: 0,
                is_paused: false,
                paused_at: None,
                client,
            },
        );
        session_id
    }

    /// Updates position and pause state, then forwards a progress report.
    ///
    /// While playing the position never moves backwards; a lower value is
    /// ignored in favour of the last known one.
    pub fn record_progress(
        &self,
        session_id: &str,
        position_ticks: u64,
        is_paused: bool,
    ) -> ProgressOutcome {
        let (item_id, position, state) = {
            let Some(mut session) = self.sessions.get_mut(session_id) else {
                log::debug!("[Session] Progress for unknown session {}", session_id);
                return ProgressOutcome::NotFound;
            };

            session.last_position_ticks = if is_paused {
                position_ticks
            } else {
                position_ticks.max(session.last_position_ticks)
            };
            session.last_progress = Instant::now();
            session.last_progress_at = now_millis();

            if is_paused {
                if !session.is_paused {
                    session.paused_at = Some(session.last_progress_at);
                }
                session.state = SessionState::Paused;
            } else {
                session.paused_at = None;
                session.state = SessionState::Playing;
            }
            session.is_paused = is_paused;

            (
                session.item_id.clone(),
                session.last_position_ticks,
                session.state,
            )
        };

        self.report_progress(session_id.to_string(), item_id, position, is_paused);
        ProgressOutcome::Updated(state)
    }

    /// Removes a session and reports it stopped. Returns `false` if unknown.
    pub fn end_session(&self, session_id: &str) -> bool {
        self.end_session_at(session_id, None)
    }

    /// Like [`end_session`](Self::end_session), first advancing the position
    /// to `final_ticks` when known.
    pub fn end_session_at(&self, session_id: &str, final_ticks: Option<u64>) -> bool {
        match self.sessions.remove(session_id) {
            Some((_, mut session)) => {
                if let Some(ticks) = final_ticks {
                    session.last_position_ticks = session.last_position_ticks.max(ticks);
                }
                self.finish(session, "ended");
                true
            }
            None => false,
        }
    }

    /// Ends sessions without progress for longer than `threshold`.
    ///
    /// Returns the number removed; an immediate second call returns 0.
    pub fn cleanup_stale(&self, threshold: Duration) -> usize {
        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|s| s.last_progress.elapsed() > threshold)
            .map(|s| s.key().clone())
            .collect();

        let mut removed = 0;
        for id in stale {
            // Re-check: the relay may have reported progress since the scan.
            if let Some((_, session)) = self
                .sessions
                .remove_if(&id, |_, s| s.last_progress.elapsed() > threshold)
            {
                self.finish(session, "stale");
                removed += 1;
            }
        }
        if removed > 0 {
            log::info!("[Session] Cleaned up {} stale session(s)", removed);
        }
        removed
    }

    /// Moves playing sessions whose reads stalled longer than `grace` to
    /// `Paused`. Returns the number of sessions paused.
    pub fn mark_stalled(&self, grace: Duration) -> usize {
        let mut paused = Vec::new();
        for mut session in self.sessions.iter_mut() {
            if matches!(session.state, SessionState::Starting | SessionState::Playing)
                && session.last_progress.elapsed() > grace
            {
                session.state = SessionState::Paused;
                session.is_paused = true;
                session.paused_at = Some(now_millis());
                paused.push((
                    session.session_id.clone(),
                    session.item_id.clone(),
                    session.last_position_ticks,
                ));
            }
        }

        let count = paused.len();
        for (session_id, item_id, position) in paused {
            log::debug!("[Session] {} stalled, marking paused", session_id);
            self.report_progress(session_id, item_id, position, true);
        }
        count
    }

    /// Ends every session (stack shutdown).
    pub fn end_all(&self) -> usize {
        let ids: Vec<String> = self.sessions.iter().map(|s| s.key().clone()).collect();
        ids.iter().filter(|id| self.end_session(id)).count()
    }

    /// Snapshot of all active sessions.
    #[must_use]
    pub fn active(&self) -> Vec<ActiveSession> {
        let mut sessions: Vec<_> = self.sessions.iter().map(|s| s.snapshot()).collect();
        sessions.sort_by_key(|s| s.started_at);
        sessions
    }

    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<ActiveSession> {
        self.sessions.get(session_id).map(|s| s.snapshot())
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    fn finish(&self, mut session: PlaybackSession, reason: &str) {
        session.state = SessionState::Ended;
        log::info!(
            "[Session] {} {} (item {}, position {} ticks)",
            session.session_id,
            reason,
            session.item_id,
            session.last_position_ticks
        );

        let source = self.source.clone();
        tokio::spawn(async move {
            if let Err(e) = source
                .report_stopped(
                    &session.session_id,
                    &session.item_id,
                    session.last_position_ticks,
                )
                .await
            {
                log::warn!(
                    "[Session] Stop report for {} failed: {}",
                    session.session_id,
                    e
                );
            }
        });
    }

    fn report_progress(&self, session_id: String, item_id: String, position: u64, paused: bool) {
        let source = self.source.clone();
        tokio::spawn(async move {
            if let Err(e) = source
                .report_progress(&session_id, &item_id, position, paused)
                .await
            {
                log::warn!("[Session] Progress report for {} failed: {}", session_id, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_source::memory::MemoryMediaSource;
    use crate::media_source::UpstreamError;

    fn tracker() -> (PlaybackSessionTracker, Arc<MemoryMediaSource>) {
        let source = Arc::new(MemoryMediaSource::new("http://upstream"));
        (
            PlaybackSessionTracker::new(source.clone(), Some("user-1".into())),
            source,
        )
    }

    /// Lets spawned report tasks run.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn progress_moves_starting_to_playing_and_reports() {
        let (tracker, source) = tracker();
        let id = tracker.start_session("item-1", ClientInfo::default());
        assert_eq!(tracker.get(&id).unwrap().state, SessionState::Starting);

        let outcome = tracker.record_progress(&id, 5_000, false);
        assert_eq!(outcome, ProgressOutcome::Updated(SessionState::Playing));
        settle().await;

        let reports = source.progress.lock().clone();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].item_id, "item-1");
        assert_eq!(reports[0].position_ticks, 5_000);
    }

    #[tokio::test]
    async fn pause_and_resume() {
        let (tracker, _) = tracker();
        let id = tracker.start_session("item-1", ClientInfo::default());
        tracker.record_progress(&id, 100, false);

        assert_eq!(
            tracker.record_progress(&id, 100, true),
            ProgressOutcome::Updated(SessionState::Paused)
        );
        let s = tracker.get(&id).unwrap();
        assert!(s.is_paused);
        assert!(s.paused_at.is_some());

        tracker.record_progress(&id, 200, false);
        let s = tracker.get(&id).unwrap();
        assert_eq!(s.state, SessionState::Playing);
        assert!(s.paused_at.is_none());
    }

    #[tokio::test]
    async fn position_never_decreases_while_playing() {
        let (tracker, _) = tracker();
        let id = tracker.start_session("item-1", ClientInfo::default());
        tracker.record_progress(&id, 1_000, false);
        tracker.record_progress(&id, 400, false);
        assert_eq!(tracker.get(&id).unwrap().position_ticks, 1_000);
    }

    #[tokio::test]
    async fn progress_after_end_is_noop() {
        let (tracker, source) = tracker();
        let id = tracker.start_session("item-1", ClientInfo::default());
        tracker.record_progress(&id, 700, false);
        assert!(tracker.end_session(&id));
        settle().await;

        assert_eq!(tracker.record_progress(&id, 900, false), ProgressOutcome::NotFound);
        assert!(!tracker.end_session(&id));
        settle().await;

        let stopped = source.stopped.lock().clone();
        assert_eq!(stopped.len(), 1);
        assert_eq!(stopped[0].position_ticks, 700);
        assert_eq!(source.progress.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_stale_is_idempotent() {
        let (tracker, source) = tracker();
        let old = tracker.start_session("a", ClientInfo::default());
        tokio::time::advance(Duration::from_secs(200)).await;
        let fresh = tracker.start_session("b", ClientInfo::default());
        tokio::time::advance(Duration::from_secs(150)).await;

        assert_eq!(tracker.cleanup_stale(Duration::from_secs(300)), 1);
        assert_eq!(tracker.cleanup_stale(Duration::from_secs(300)), 0);
        assert!(tracker.get(&old).is_none());
        assert!(tracker.get(&fresh).is_some());

        settle().await;
        assert_eq!(source.stopped.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_sessions_become_paused() {
        let (tracker, source) = tracker();
        let id = tracker.start_session("a", ClientInfo::default());
        tracker.record_progress(&id, 50, false);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(tracker.mark_stalled(Duration::from_secs(30)), 0);

        tokio::time::advance(Duration::from_secs(25)).await;
        assert_eq!(tracker.mark_stalled(Duration::from_secs(30)), 1);
        assert_eq!(tracker.get(&id).unwrap().state, SessionState::Paused);
        // Already paused sessions are left alone.
        assert_eq!(tracker.mark_stalled(Duration::from_secs(30)), 0);

        settle().await;
        assert!(source.progress.lock().last().unwrap().is_paused);
    }

    #[tokio::test]
    async fn upstream_failures_do_not_affect_tracking() {
        let (tracker, source) = tracker();
        source.fail_with(Some(UpstreamError::Timeout));
        let id = tracker.start_session("a", ClientInfo::default());
        assert_eq!(
            tracker.record_progress(&id, 10, false),
            ProgressOutcome::Updated(SessionState::Playing)
        );
        settle().await;
        assert_eq!(tracker.count(), 1);
    }

    #[tokio::test]
    async fn end_all_and_active_snapshot() {
        let (tracker, source) = tracker();
        tracker.start_session(
            "a",
            ClientInfo {
                endpoint: Some("192.168.1.20:50000".into()),
                user_agent: Some("VLC/3.0".into()),
            },
        );
        tracker.start_session("b", ClientInfo::default());

        let active = tracker.active();
        assert_eq!(active.len(), 2);
        let json = serde_json::to_value(&active[0]).unwrap();
        assert!(json.get("sessionId").is_some());
        assert_eq!(json["userId"], "user-1");

        assert_eq!(tracker.end_all(), 2);
        assert_eq!(tracker.count(), 0);
        settle().await;
        assert_eq!(source.stopped.lock().len(), 2);
    }
}
