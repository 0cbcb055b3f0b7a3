//! Streaming proxy: resolves an item for a client profile and relays bytes.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use axum::response::Response;
use tokio_util::sync::CancellationToken;

use super::relay::{relay, RelayGuard};
use super::seek::{parse_content_range, ProgressEstimator};
use crate::content::dlna_features;
use crate::error::{BridgeError, BridgeResult};
use crate::media_source::{MediaSource, PlaybackRequest, UpstreamError};
use crate::profiles::DeviceProfile;
use crate::protocol_constants::{
    CONTENT_FEATURES_HEADER, PROGRESS_REPORT_INTERVAL_SECS, TRANSFER_MODE_HEADER,
};
use crate::services::{ClientInfo, PlaybackSessionTracker};

/// Upstream response headers copied to the client.
const RELAYED_HEADERS: [HeaderName; 5] = [
    header::CONTENT_LENGTH,
    header::CONTENT_RANGE,
    header::ACCEPT_RANGES,
    header::LAST_MODIFIED,
    header::ETAG,
];

/// A client stream request after header extraction.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub method: Method,
    /// Client `Range` header, forwarded for direct play only.
    pub range: Option<HeaderValue>,
    /// Resume position for transcoded delivery.
    pub start_ticks: Option<u64>,
    pub client: ClientInfo,
}

impl StreamRequest {
    #[must_use]
    pub fn get() -> Self {
        Self {
            method: Method::GET,
            range: None,
            start_ticks: None,
            client: ClientInfo::default(),
        }
    }
}

/// Relays media from the upstream server without storing it.
pub struct StreamingProxy {
    source: Arc<dyn MediaSource>,
    tracker: Arc<PlaybackSessionTracker>,
    http: reqwest::Client,
    timeout: Duration,
    report_interval: Duration,
    cancel: CancellationToken,
}

impl StreamingProxy {
    /// Relays end when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(
        source: Arc<dyn MediaSource>,
        tracker: Arc<PlaybackSessionTracker>,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<Self, UpstreamError> {
        // No overall timeout: streams last as long as playback does.
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()?;
        Ok(Self {
            source,
            tracker,
            http,
            timeout,
            report_interval: Duration::from_secs(PROGRESS_REPORT_INTERVAL_SECS),
            cancel,
        })
    }

    #[must_use]
    pub fn tracker(&self) -> &Arc<PlaybackSessionTracker> {
        &self.tracker
    }

    /// Opens `item_id` for a client with `profile`.
    ///
    /// # Errors
    ///
    /// - `ItemNotFound` for unknown ids, `InvalidRequest` for containers
    /// - `NotPlayable` when the profile can neither play nor transcode it
    /// - `UpstreamUnavailable` (502) / `UpstreamTimeout` (504) for upstream
    ///   failures and non-2xx responses
    pub async fn open_stream(
        &self,
        item_id: &str,
        profile: &DeviceProfile,
        request: StreamRequest,
    ) -> BridgeResult<Response> {
        let entry = self.source.get_entry(item_id).await?;
        if entry.kind.is_container() {
            return Err(BridgeError::InvalidRequest(format!(
                "{} is a container",
                item_id
            )));
        }

        let method = profile
            .playback_method(&entry.media)
            .ok_or_else(|| BridgeError::NotPlayable(item_id.to_string()))?;
        let direct = method.is_direct();
        let start_ticks = if direct { None } else { request.start_ticks };

        let target = self
            .source
            .resolve_playback_url(&entry, &PlaybackRequest { method, start_ticks })
            .await?;

        log::info!(
            "[Stream] {} {} for {} ({}, profile {})",
            request.method,
            item_id,
            request.client.endpoint.as_deref().unwrap_or("unknown"),
            if direct { "direct" } else { "transcode" },
            profile.name
        );

        let mut upstream_req = self.http.request(request.method.clone(), &target.url);
        if direct && target.supports_range {
            if let Some(range) = &request.range {
                log::debug!("[Stream] Forwarding range {:?}", range);
                upstream_req = upstream_req.header(header::RANGE, range.clone());
            }
        }

        let upstream = tokio::time::timeout(self.timeout, upstream_req.send())
            .await
            .map_err(|_| UpstreamError::Timeout)?
            .map_err(UpstreamError::from)?;

        let status = upstream.status();
        if !status.is_success() {
            log::warn!("[Stream] Upstream returned {} for {}", status, item_id);
            return Err(BridgeError::UpstreamUnavailable(format!(
                "media server returned {}",
                status
            )));
        }

        let mut headers = HeaderMap::new();
        for name in RELAYED_HEADERS {
            if let Some(value) = upstream.headers().get(&name) {
                headers.insert(name, value.clone());
            }
        }
        let content_type = upstream
            .headers()
            .get(header::CONTENT_TYPE)
            .cloned()
            .or_else(|| HeaderValue::from_str(&target.mime_type).ok());
        if let Some(content_type) = content_type {
            headers.insert(header::CONTENT_TYPE, content_type);
        }
        insert_dlna_header(&mut headers, TRANSFER_MODE_HEADER, "Streaming");
        insert_dlna_header(&mut headers, CONTENT_FEATURES_HEADER, &dlna_features(direct));

        let body = if request.method == Method::HEAD {
            Body::empty()
        } else {
            let estimator = if direct {
                let (offset, total) = upstream
                    .headers()
                    .get(header::CONTENT_RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_content_range)
                    .map_or((0, upstream.content_length().or(entry.size)), |(first, total)| {
                        (first, total.or(entry.size))
                    });
                ProgressEstimator::by_bytes(offset, total, entry.duration_ticks)
            } else {
                ProgressEstimator::by_time(start_ticks.unwrap_or(0), entry.duration_ticks)
            };
            let guard = RelayGuard::new(
                self.tracker.clone(),
                item_id,
                request.client,
                estimator,
                self.report_interval,
            );
            Body::from_stream(relay(upstream.bytes_stream(), guard, self.cancel.clone()))
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

fn insert_dlna_header(headers: &mut HeaderMap, name: &str, value: &str) {
    // from_bytes lowercases the mixed-case DLNA names.
    if let (Ok(name), Ok(value)) = (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        headers.insert(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use crate::media_source::memory::MemoryMediaSource;
    use crate::profiles::builtin::baseline;
    use futures::StreamExt;
    use wiremock::matchers::{header as has_header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        server: MockServer,
        source: Arc<MemoryMediaSource>,
        proxy: StreamingProxy,
    }

    async fn fixture() -> Fixture {
        let server = MockServer::start().await;
        let source = Arc::new(MemoryMediaSource::new(server.uri()));
        source.add(MemoryMediaSource::folder("music", None, "Music"));
        source.add(MemoryMediaSource::audio("a1", "music", "Song", "mp3"));
        source.add(MemoryMediaSource::video("v1", "music", "Clip", "mkv", "hevc"));
        let tracker = Arc::new(PlaybackSessionTracker::new(source.clone(), None));
        let proxy = StreamingProxy::new(
            source.clone(),
            tracker,
            Duration::from_millis(500),
            CancellationToken::new(),
        )
        .unwrap();
        Fixture {
            server,
            source,
            proxy,
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn direct_play_forwards_range_and_relays_206() {
        let f = fixture().await;
        Mock::given(method("GET"))
            .and(path("/media/a1"))
            .and(has_header("range", "bytes=1000-"))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("content-range", "bytes 1000-1999/2000")
                    .insert_header("content-type", "audio/mpeg")
                    .set_body_bytes(vec![7u8; 1000]),
            )
            .expect(1)
            .mount(&f.server)
            .await;

        let request = StreamRequest {
            range: Some(HeaderValue::from_static("bytes=1000-")),
            ..StreamRequest::get()
        };
        let resp = f.proxy.open_stream("a1", &baseline(), request).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(resp.headers()["content-range"], "bytes 1000-1999/2000");
        assert_eq!(resp.headers()["transfermode.dlna.org"], "Streaming");
        assert!(resp.headers()["contentfeatures.dlna.org"]
            .to_str()
            .unwrap()
            .contains("DLNA.ORG_OP=01"));

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.len(), 1000);
        assert_eq!(f.proxy.tracker().count(), 0);

        settle().await;
        let stopped = f.source.stopped.lock().clone();
        assert_eq!(stopped.len(), 1);
        assert_eq!(stopped[0].item_id, "a1");
        // Whole file delivered: position reaches the full runtime.
        assert_eq!(stopped[0].position_ticks, 100 * crate::protocol_constants::TICKS_PER_SECOND);
    }

    #[tokio::test]
    async fn transcode_suppresses_range_and_passes_resume_position() {
        let f = fixture().await;
        Mock::given(method("GET"))
            .and(path("/transcode/v1.ts"))
            .and(query_param("start", "300000000"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "video/mp2t")
                    .set_body_bytes(vec![1u8; 64]),
            )
            .expect(1)
            .mount(&f.server)
            .await;

        let request = StreamRequest {
            range: Some(HeaderValue::from_static("bytes=500-")),
            start_ticks: Some(300_000_000),
            ..StreamRequest::get()
        };
        let resp = f.proxy.open_stream("v1", &baseline(), request).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers()["contentfeatures.dlna.org"]
            .to_str()
            .unwrap()
            .contains("DLNA.ORG_CI=1"));
        let _ = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();

        let received = f.server.received_requests().await.unwrap();
        assert!(received[0].headers.get("range").is_none());
    }

    #[tokio::test]
    async fn upstream_error_status_is_bad_gateway() {
        let f = fixture().await;
        Mock::given(path("/media/a1"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&f.server)
            .await;

        let err = f
            .proxy
            .open_stream("a1", &baseline(), StreamRequest::get())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(f.proxy.tracker().count(), 0);
    }

    #[tokio::test]
    async fn slow_upstream_is_gateway_timeout() {
        let f = fixture().await;
        Mock::given(path("/media/a1"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&f.server)
            .await;

        let err = f
            .proxy
            .open_stream("a1", &baseline(), StreamRequest::get())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn unknown_item_and_unplayable_item() {
        let f = fixture().await;
        let err = f
            .proxy
            .open_stream("missing", &baseline(), StreamRequest::get())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let picky = DeviceProfile {
            direct_play: Vec::new(),
            transcoding: Vec::new(),
            ..baseline()
        };
        let err = f
            .proxy
            .open_stream("a1", &picky, StreamRequest::get())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::NotPlayable(_)));
    }

    #[tokio::test]
    async fn head_request_registers_no_session() {
        let f = fixture().await;
        Mock::given(method("HEAD"))
            .and(path("/media/a1"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "audio/mpeg"))
            .mount(&f.server)
            .await;

        let request = StreamRequest {
            method: Method::HEAD,
            ..StreamRequest::get()
        };
        let resp = f.proxy.open_stream("a1", &baseline(), request).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
        settle().await;
        assert!(f.source.stopped.lock().is_empty());
    }

    #[tokio::test]
    async fn client_disconnect_ends_session() {
        let f = fixture().await;
        Mock::given(path("/media/a1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 256 * 1024]))
            .mount(&f.server)
            .await;

        let resp = f
            .proxy
            .open_stream("a1", &baseline(), StreamRequest::get())
            .await
            .unwrap();
        let mut body = resp.into_body().into_data_stream();
        let first = body.next().await.unwrap().unwrap();
        assert!(!first.is_empty());
        assert_eq!(f.proxy.tracker().count(), 1);

        drop(body);
        assert_eq!(f.proxy.tracker().count(), 0);
        settle().await;
        assert_eq!(f.source.stopped.lock().len(), 1);
    }
}
