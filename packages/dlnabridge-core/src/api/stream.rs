//! Stream endpoint: `GET|HEAD /stream/{item_id}`.

use std::net::SocketAddr;

use axum::{
    extract::{connect_info::ConnectInfo, Path, Query, State},
    http::{header, HeaderMap, Method},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::AppState;
use crate::services::ClientInfo;
use crate::stream::{requested_start_ticks, StreamRequest};

#[derive(Debug, Deserialize)]
pub(super) struct StreamQuery {
    #[serde(rename = "StartTimeTicks")]
    start_time_ticks: Option<u64>,
}

pub(super) async fn stream_item(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    Query(query): Query<StreamQuery>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let profile = state.resolver.resolve(&headers);
    let request = StreamRequest {
        method,
        range: headers.get(header::RANGE).cloned(),
        start_ticks: requested_start_ticks(query.start_time_ticks, &headers),
        client: ClientInfo {
            endpoint: Some(addr.to_string()),
            user_agent: headers
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(String::from),
        },
    };

    match state.proxy.open_stream(&item_id, &profile, request).await {
        Ok(response) => response,
        Err(e) => {
            log::warn!("[Stream] {} failed: {}", item_id, e);
            e.into_response()
        }
    }
}
