//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to the DLNA components for
//! business logic.

use axum::{
    extract::State,
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::control::{connection_manager_control, content_directory_control};
use super::stream::stream_item;
use super::AppState;
use crate::description::{connection_manager_scpd, content_directory_scpd};
use crate::error::BridgeError;
use crate::protocol_constants::{
    server_header, CONNECTION_MANAGER_CONTROL_PATH, CONNECTION_MANAGER_EVENT_PATH,
    CONNECTION_MANAGER_SCPD_PATH, CONTENT_DIRECTORY_CONTROL_PATH, CONTENT_DIRECTORY_EVENT_PATH,
    CONTENT_DIRECTORY_SCPD_PATH, DEVICE_DESCRIPTION_PATH, GENA_SUBSCRIPTION_TIMEOUT_SECS,
    SERVICE_ID,
};

const XML_CONTENT_TYPE: &str = "text/xml; charset=\"utf-8\"";

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // UPnP device surface
        .route(DEVICE_DESCRIPTION_PATH, get(device_description))
        .route(CONTENT_DIRECTORY_SCPD_PATH, get(content_directory_description))
        .route(CONNECTION_MANAGER_SCPD_PATH, get(connection_manager_description))
        .route(CONTENT_DIRECTORY_CONTROL_PATH, post(content_directory_control))
        .route(CONNECTION_MANAGER_CONTROL_PATH, post(connection_manager_control))
        .route(CONTENT_DIRECTORY_EVENT_PATH, any(handle_event_subscription))
        .route(CONNECTION_MANAGER_EVENT_PATH, any(handle_event_subscription))
        // Media
        .route("/stream/{item_id}", get(stream_item))
        // Operator surface
        .route("/health", get(health_check))
        .route("/api/discovery/refresh", post(refresh_discovery))
        .route("/api/restart", post(request_restart))
        .route("/api/sessions", get(list_sessions))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Description documents
// ─────────────────────────────────────────────────────────────────────────────

fn xml_response(body: String) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, XML_CONTENT_TYPE.to_string()),
            (header::SERVER, server_header()),
        ],
        body,
    )
        .into_response()
}

async fn device_description(State(state): State<AppState>) -> Response {
    let base_url = state.network.url_builder().base_url();
    xml_response(state.descriptor.to_xml(&base_url))
}

async fn content_directory_description() -> Response {
    xml_response(content_directory_scpd())
}

async fn connection_manager_description() -> Response {
    xml_response(connection_manager_scpd())
}

// ─────────────────────────────────────────────────────────────────────────────
// GENA
// ─────────────────────────────────────────────────────────────────────────────

/// Accepts event subscriptions without ever sending NOTIFYs.
///
/// Some control points refuse to browse a server whose services reject
/// SUBSCRIBE, so new subscriptions get a SID and the standard timeout.
async fn handle_event_subscription(method: Method, headers: HeaderMap) -> Response {
    let sid = headers.get("SID").and_then(|v| v.to_str().ok());
    match method.as_str() {
        "SUBSCRIBE" => {
            let sid = match sid {
                // Renewal
                Some(existing) => existing.to_string(),
                None => {
                    let nt = headers.get("NT").and_then(|v| v.to_str().ok());
                    if nt != Some("upnp:event") {
                        log::debug!("[GENA] SUBSCRIBE with invalid NT header: {:?}", nt);
                        return StatusCode::PRECONDITION_FAILED.into_response();
                    }
                    format!("uuid:{}", Uuid::new_v4())
                }
            };
            log::debug!("[GENA] Subscription {}", sid);
            (
                StatusCode::OK,
                [
                    ("SID", sid),
                    ("TIMEOUT", format!("Second-{}", GENA_SUBSCRIPTION_TIMEOUT_SECS)),
                    ("SERVER", server_header()),
                ],
            )
                .into_response()
        }
        "UNSUBSCRIBE" => match sid {
            Some(_) => StatusCode::OK.into_response(),
            None => StatusCode::PRECONDITION_FAILED.into_response(),
        },
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Operator surface
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe: "Is the process running?"
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "discovery": state.discovery.is_running(),
        "activeSessions": state.tracker.count(),
    }))
}

async fn refresh_discovery(State(state): State<AppState>) -> Response {
    if state.discovery.send_manual_alive().await {
        Json(json!({ "status": "ok" })).into_response()
    } else {
        BridgeError::NotRunning("discovery is not running".into()).into_response()
    }
}

/// Schedules a supervised restart and returns before it happens.
async fn request_restart(State(state): State<AppState>) -> impl IntoResponse {
    state.lifecycle.request_restart("operator request");
    (StatusCode::ACCEPTED, Json(json!({ "status": "restarting" })))
}

async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.tracker.active();
    Json(json!({
        "count": sessions.len(),
        "sessions": sessions,
    }))
}
