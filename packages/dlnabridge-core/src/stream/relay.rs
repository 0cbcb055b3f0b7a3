//! Byte relay from the upstream response to the client.
//!
//! The relay never buffers beyond the chunk in flight. A [`RelayGuard`]
//! travels inside the body stream: it registers the playback session when
//! the first byte is delivered, forwards progress at a fixed interval, and
//! ends the session when the body is dropped (completion, upstream error or
//! client disconnect). Dropping the body also drops the upstream response,
//! which closes the upstream connection. Cancelling the stack's token ends
//! every relay so the HTTP server can shut down without waiting on players.

use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::seek::ProgressEstimator;
use crate::services::{ClientInfo, PlaybackSessionTracker};

/// Tracks delivery of one proxied stream and its playback session.
pub struct RelayGuard {
    tracker: Arc<PlaybackSessionTracker>,
    item_id: String,
    client: Option<ClientInfo>,
    session_id: Option<String>,
    estimator: ProgressEstimator,
    report_interval: Duration,
    delivered: u64,
    first_byte_at: Option<Instant>,
    last_report: Option<Instant>,
}

impl RelayGuard {
    pub fn new(
        tracker: Arc<PlaybackSessionTracker>,
        item_id: impl Into<String>,
        client: ClientInfo,
        estimator: ProgressEstimator,
        report_interval: Duration,
    ) -> Self {
        Self {
            tracker,
            item_id: item_id.into(),
            client: Some(client),
            session_id: None,
            estimator,
            report_interval,
            delivered: 0,
            first_byte_at: None,
            last_report: None,
        }
    }

    fn position(&self) -> u64 {
        let elapsed = self.first_byte_at.map(|t| t.elapsed()).unwrap_or_default();
        self.estimator.position(self.delivered, elapsed)
    }

    /// Accounts for a chunk about to be sent to the client.
    pub fn on_chunk(&mut self, len: usize) {
        if len == 0 {
            return;
        }

        if self.session_id.is_none() {
            let client = self.client.take().unwrap_or_default();
            let id = self.tracker.start_session(&self.item_id, client);
            self.first_byte_at = Some(Instant::now());
            self.session_id = Some(id);
        }
        self.delivered += len as u64;

        let due = self
            .last_report
            .map_or(true, |t| t.elapsed() >= self.report_interval);
        if due {
            if let Some(id) = &self.session_id {
                self.tracker.record_progress(id, self.position(), false);
            }
            self.last_report = Some(Instant::now());
        }
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

impl Drop for RelayGuard {
    fn drop(&mut self) {
        let Some(id) = self.session_id.take() else {
            log::debug!("[Stream] Relay for {} closed before first byte", self.item_id);
            return;
        };
        log::info!(
            "[Stream] Relay for {} finished: session={}, bytes={}",
            self.item_id,
            id,
            self.delivered
        );
        let position = self.position();
        self.tracker.end_session_at(&id, Some(position));
    }
}

/// Wraps an upstream byte stream, feeding `guard` as chunks pass through.
///
/// An upstream read error ends the body with an I/O error so the client
/// sees a truncated transfer rather than silently short content.
pub fn relay<S, E>(
    upstream: S,
    mut guard: RelayGuard,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    stream! {
        let mut upstream = std::pin::pin!(upstream);
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => None,
                chunk = upstream.next() => Some(chunk),
            };
            let Some(chunk) = next else {
                log::debug!("[Stream] Relay cancelled after {} bytes", guard.delivered());
                break;
            };
            let Some(chunk) = chunk else {
                break;
            };
            match chunk {
                Ok(bytes) => {
                    guard.on_chunk(bytes.len());
                    yield Ok(bytes);
                }
                Err(e) => {
                    log::warn!(
                        "[Stream] Upstream read failed after {} bytes: {}",
                        guard.delivered(),
                        e
                    );
                    yield Err(std::io::Error::other(e.to_string()));
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_source::memory::MemoryMediaSource;
    use crate::protocol_constants::TICKS_PER_SECOND;
    use crate::services::SessionState;

    fn tracker() -> (Arc<PlaybackSessionTracker>, Arc<MemoryMediaSource>) {
        let source = Arc::new(MemoryMediaSource::new("http://upstream"));
        (
            Arc::new(PlaybackSessionTracker::new(source.clone(), None)),
            source,
        )
    }

    fn guard(tracker: &Arc<PlaybackSessionTracker>) -> RelayGuard {
        RelayGuard::new(
            tracker.clone(),
            "item-1",
            ClientInfo::default(),
            ProgressEstimator::by_bytes(0, Some(1000), Some(100 * TICKS_PER_SECOND)),
            Duration::from_secs(10),
        )
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn session_registered_on_first_byte_and_ended_on_drop() {
        let (tracker, source) = tracker();
        let mut guard = guard(&tracker);
        guard.on_chunk(0);
        assert_eq!(tracker.count(), 0);

        guard.on_chunk(100);
        let id = guard.session_id().unwrap().to_string();
        assert_eq!(tracker.get(&id).unwrap().state, SessionState::Playing);

        guard.on_chunk(400);
        drop(guard);
        assert_eq!(tracker.count(), 0);

        settle().await;
        let stopped = source.stopped.lock().clone();
        assert_eq!(stopped.len(), 1);
        assert_eq!(stopped[0].position_ticks, 50 * TICKS_PER_SECOND);
    }

    #[tokio::test]
    async fn guard_without_bytes_registers_nothing() {
        let (tracker, source) = tracker();
        drop(guard(&tracker));
        settle().await;
        assert!(source.stopped.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn progress_reported_at_interval() {
        let (tracker, source) = tracker();
        let mut guard = guard(&tracker);
        guard.on_chunk(10);
        guard.on_chunk(10);
        settle().await;
        assert_eq!(source.progress.lock().len(), 1);

        tokio::time::advance(Duration::from_secs(11)).await;
        guard.on_chunk(10);
        settle().await;
        assert_eq!(source.progress.lock().len(), 2);
        drop(guard);
    }

    #[tokio::test]
    async fn relay_passes_bytes_and_surfaces_errors() {
        let (tracker, _) = tracker();
        let upstream = futures::stream::iter(vec![
            Ok::<_, String>(Bytes::from_static(b"abc")),
            Err("connection reset".to_string()),
            Ok(Bytes::from_static(b"never")),
        ]);
        let items: Vec<_> = relay(upstream, guard(&tracker), CancellationToken::new())
            .collect()
            .await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &Bytes::from_static(b"abc"));
        assert!(items[1].is_err());
        assert_eq!(tracker.count(), 0);
    }

    #[tokio::test]
    async fn cancellation_ends_relay() {
        let (tracker, _) = tracker();
        let cancel = CancellationToken::new();
        let upstream = futures::stream::iter(vec![Ok::<_, String>(Bytes::from_static(b"abc"))])
            .chain(futures::stream::pending());
        let mut body = Box::pin(relay(upstream, guard(&tracker), cancel.clone()));

        assert!(body.next().await.unwrap().is_ok());
        assert_eq!(tracker.count(), 1);

        cancel.cancel();
        assert!(body.next().await.is_none());
        drop(body);
        assert_eq!(tracker.count(), 0);
    }
}
