//! SOAP control endpoints for ContentDirectory:1 and ConnectionManager:1.

use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
};

use super::AppState;
use crate::content::search::validate_sort_criteria;
use crate::content::{protocol_info, BrowseFlag, BrowseResult};
use crate::media_source::{mime_for_container, EntryKind};
use crate::profiles::{DeviceProfile, MediaType};
use crate::protocol_constants::{
    CONNECTION_MANAGER_URN, CONTENT_DIRECTORY_URN, SEARCH_CAPABILITIES, SORT_CAPABILITIES,
};
use crate::soap::{self, ok_response, response_envelope, SoapFault, SoapRequest};

fn parse(headers: &HeaderMap, body: &str) -> Result<SoapRequest, SoapFault> {
    let action = headers.get("SOAPACTION").and_then(|v| v.to_str().ok());
    soap::parse_request(action, body)
}

fn respond(result: Result<String, SoapFault>) -> Response {
    match result {
        Ok(envelope) => ok_response(envelope),
        Err(fault) => {
            log::debug!("[SOAP] {}", fault);
            fault.into_response()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ContentDirectory
// ─────────────────────────────────────────────────────────────────────────────

pub(super) async fn content_directory_control(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let request = match parse(&headers, &body) {
        Ok(request) => request,
        Err(fault) => return respond(Err(fault)),
    };
    let profile = state.resolver.resolve(&headers);
    respond(dispatch_content_directory(&state, &request, &profile).await)
}

async fn dispatch_content_directory(
    state: &AppState,
    request: &SoapRequest,
    profile: &DeviceProfile,
) -> Result<String, SoapFault> {
    let content = &state.content;
    match request.action.as_str() {
        "Browse" => {
            let object_id = request.require("ObjectID")?;
            let flag: BrowseFlag = request.require("BrowseFlag")?.parse()?;
            let starting_index = request.require_u32("StartingIndex")?;
            let requested_count = request.require_u32("RequestedCount")?;
            validate_sort_criteria(request.arg("SortCriteria").unwrap_or_default())?;
            let result = content
                .browse(object_id, flag, starting_index, requested_count, profile)
                .await?;
            Ok(result_envelope("Browse", &result))
        }
        "Search" => {
            let container_id = request.require("ContainerID")?;
            let criteria = request.require("SearchCriteria")?;
            let starting_index = request.require_u32("StartingIndex")?;
            let requested_count = request.require_u32("RequestedCount")?;
            validate_sort_criteria(request.arg("SortCriteria").unwrap_or_default())?;
            let result = content
                .search(container_id, criteria, starting_index, requested_count, profile)
                .await?;
            Ok(result_envelope("Search", &result))
        }
        "GetSearchCapabilities" => Ok(response_envelope(
            "GetSearchCapabilities",
            CONTENT_DIRECTORY_URN,
            &[("SearchCaps", SEARCH_CAPABILITIES)],
        )),
        "GetSortCapabilities" => Ok(response_envelope(
            "GetSortCapabilities",
            CONTENT_DIRECTORY_URN,
            &[("SortCaps", SORT_CAPABILITIES)],
        )),
        "GetSystemUpdateID" => Ok(response_envelope(
            "GetSystemUpdateID",
            CONTENT_DIRECTORY_URN,
            &[("Id", &content.system_update_id().to_string())],
        )),
        other => {
            log::debug!("[SOAP] Unknown ContentDirectory action: {}", other);
            Err(SoapFault::invalid_action())
        }
    }
}

fn result_envelope(action: &str, result: &BrowseResult) -> String {
    response_envelope(
        action,
        CONTENT_DIRECTORY_URN,
        &[
            ("Result", &result.didl),
            ("NumberReturned", &result.number_returned.to_string()),
            ("TotalMatches", &result.total_matches.to_string()),
            ("UpdateID", &result.update_id.to_string()),
        ],
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// ConnectionManager
// ─────────────────────────────────────────────────────────────────────────────

pub(super) async fn connection_manager_control(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let result = parse(&headers, &body).and_then(|request| {
        dispatch_connection_manager(&request, &state.resolver.default_profile())
    });
    respond(result)
}

fn dispatch_connection_manager(
    request: &SoapRequest,
    default_profile: &DeviceProfile,
) -> Result<String, SoapFault> {
    match request.action.as_str() {
        "GetProtocolInfo" => Ok(response_envelope(
            "GetProtocolInfo",
            CONNECTION_MANAGER_URN,
            &[("Source", &source_protocol_info(default_profile)), ("Sink", "")],
        )),
        "GetCurrentConnectionIDs" => Ok(response_envelope(
            "GetCurrentConnectionIDs",
            CONNECTION_MANAGER_URN,
            &[("ConnectionIDs", "0")],
        )),
        "GetCurrentConnectionInfo" => {
            let id = request.require("ConnectionID")?;
            if id.trim() != "0" {
                return Err(SoapFault::invalid_args(format!("ConnectionID {}", id)));
            }
            Ok(response_envelope(
                "GetCurrentConnectionInfo",
                CONNECTION_MANAGER_URN,
                &[
                    ("RcsID", "-1"),
                    ("AVTransportID", "-1"),
                    ("ProtocolInfo", ""),
                    ("PeerConnectionManager", ""),
                    ("PeerConnectionID", "-1"),
                    ("Direction", "Output"),
                    ("Status", "OK"),
                ],
            ))
        }
        other => {
            log::debug!("[SOAP] Unknown ConnectionManager action: {}", other);
            Err(SoapFault::invalid_action())
        }
    }
}

/// Comma-separated protocolInfo of every direct-play format in `profile`.
fn source_protocol_info(profile: &DeviceProfile) -> String {
    let mut entries: Vec<String> = Vec::new();
    for rule in &profile.direct_play {
        let kind = match rule.media_type {
            MediaType::Audio => EntryKind::Audio,
            MediaType::Video => EntryKind::Video,
            MediaType::Photo => EntryKind::Photo,
        };
        for container in &rule.containers {
            let info = protocol_info(&mime_for_container(kind, Some(container)), true);
            if !entries.contains(&info) {
                entries.push(info);
            }
        }
    }
    entries.join(",")
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;
    use crate::api::http::tests::serve;
    use crate::content::didl::parse_didl;
    use crate::media_source::memory::MemoryMediaSource;
    use crate::media_source::UpstreamError;
    use crate::profiles::builtin;

    fn library() -> MemoryMediaSource {
        let source = MemoryMediaSource::new("http://upstream");
        source.add(MemoryMediaSource::folder("music", None, "Music"));
        source.add(MemoryMediaSource::folder("films", None, "Films"));
        for (id, title) in [("t1", "charlie"), ("t2", "Alpha"), ("t3", "bravo")] {
            source.add(MemoryMediaSource::audio(id, "music", title, "mp3"));
        }
        source.add(MemoryMediaSource::folder("live", Some("music"), "Live Sets"));
        source
    }

    fn envelope(action: &str, args: &str) -> String {
        format!(
            r#"<?xml version="1.0"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><u:{action} xmlns:u="urn:x">{args}</u:{action}></s:Body></s:Envelope>"#
        )
    }

    async fn call(base: &str, service: &str, urn: &str, action: &str, args: &str) -> (StatusCode, String) {
        let resp = reqwest::Client::new()
            .post(format!("{}/{}/control", base, service))
            .header("SOAPACTION", format!("\"{}#{}\"", urn, action))
            .header("Content-Type", "text/xml; charset=\"utf-8\"")
            .body(envelope(action, args))
            .send()
            .await
            .unwrap();
        (resp.status(), resp.text().await.unwrap())
    }

    fn element(xml: &str, name: &str) -> String {
        let open = format!("<{}>", name);
        let close = format!("</{}>", name);
        let start = xml.find(&open).unwrap() + open.len();
        let end = xml[start..].find(&close).unwrap() + start;
        quick_xml::escape::unescape(&xml[start..end]).unwrap().into_owned()
    }

    async fn browse(base: &str, object_id: &str, flag: &str, start: u32, count: u32) -> (StatusCode, String) {
        call(
            base,
            "ContentDirectory",
            CONTENT_DIRECTORY_URN,
            "Browse",
            &format!(
                "<ObjectID>{object_id}</ObjectID><BrowseFlag>{flag}</BrowseFlag><Filter>*</Filter>\
                 <StartingIndex>{start}</StartingIndex><RequestedCount>{count}</RequestedCount><SortCriteria></SortCriteria>"
            ),
        )
        .await
    }

    #[tokio::test]
    async fn browse_root_lists_library_views() {
        let server = serve(library()).await;
        let (status, body) = browse(&server.base, "0", "BrowseDirectChildren", 0, 0).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(element(&body, "TotalMatches"), "2");

        let objects = parse_didl(&element(&body, "Result")).unwrap();
        let titles: Vec<_> = objects.iter().map(|o| o.title.as_str()).collect();
        assert_eq!(titles, ["Films", "Music"]);
        assert!(objects.iter().all(|o| o.parent_id == "0"));
    }

    #[tokio::test]
    async fn browse_pages_are_stable_and_count_the_full_listing() {
        let server = serve(library()).await;
        let (_, first) = browse(&server.base, "music", "BrowseDirectChildren", 0, 2).await;
        let (_, second) = browse(&server.base, "music", "BrowseDirectChildren", 2, 2).await;

        assert_eq!(element(&first, "NumberReturned"), "2");
        assert_eq!(element(&first, "TotalMatches"), "4");
        assert_eq!(element(&second, "NumberReturned"), "2");
        assert_eq!(element(&second, "TotalMatches"), "4");

        let mut ids: Vec<String> = parse_didl(&element(&first, "Result"))
            .unwrap()
            .into_iter()
            .chain(parse_didl(&element(&second, "Result")).unwrap())
            .map(|o| o.id)
            .collect();
        assert_eq!(ids, ["t2", "t3", "t1", "live"]);
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }

    #[tokio::test]
    async fn browse_metadata_and_unknown_object() {
        let server = serve(library()).await;
        let (status, body) = browse(&server.base, "t1", "BrowseMetadata", 0, 0).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(element(&body, "NumberReturned"), "1");
        let objects = parse_didl(&element(&body, "Result")).unwrap();
        assert_eq!(objects[0].id, "t1");
        assert_eq!(objects[0].parent_id, "music");

        let (status, body) = browse(&server.base, "nope", "BrowseMetadata", 0, 0).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(element(&body, "errorCode"), "701");
    }

    #[tokio::test]
    async fn invalid_arguments_and_actions_fault() {
        let server = serve(library()).await;
        let (_, body) = browse(&server.base, "0", "BrowseEverything", 0, 0).await;
        assert_eq!(element(&body, "errorCode"), "402");

        let (status, body) = call(
            &server.base,
            "ContentDirectory",
            CONTENT_DIRECTORY_URN,
            "DestroyObject",
            "<ObjectID>t1</ObjectID>",
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(element(&body, "errorCode"), "401");
    }

    #[tokio::test]
    async fn descending_title_sort_faults_709() {
        let server = serve(library()).await;
        let (_, body) = call(
            &server.base,
            "ContentDirectory",
            CONTENT_DIRECTORY_URN,
            "Browse",
            "<ObjectID>music</ObjectID><BrowseFlag>BrowseDirectChildren</BrowseFlag><Filter>*</Filter>\
             <StartingIndex>0</StartingIndex><RequestedCount>0</RequestedCount><SortCriteria>-dc:title</SortCriteria>",
        )
        .await;
        assert_eq!(element(&body, "errorCode"), "709");
    }

    #[tokio::test]
    async fn upstream_outage_is_action_failed_not_empty_page() {
        let server = serve(library()).await;
        server.source.fail_with(Some(UpstreamError::Http("refused".into())));
        let (_, body) = browse(&server.base, "music", "BrowseDirectChildren", 0, 0).await;
        assert_eq!(element(&body, "errorCode"), "501");
    }

    #[tokio::test]
    async fn search_by_class_and_unsupported_criteria() {
        let server = serve(library()).await;
        let search = |criteria: &'static str| {
            let base = server.base.clone();
            async move {
                call(
                    &base,
                    "ContentDirectory",
                    CONTENT_DIRECTORY_URN,
                    "Search",
                    &format!(
                        "<ContainerID>music</ContainerID><SearchCriteria>{}</SearchCriteria><Filter>*</Filter>\
                         <StartingIndex>0</StartingIndex><RequestedCount>0</RequestedCount><SortCriteria>+dc:title</SortCriteria>",
                        criteria
                    ),
                )
                .await
            }
        };

        let (status, body) = search("upnp:class derivedfrom &quot;object.item.audioItem&quot;").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(element(&body, "TotalMatches"), "3");

        let (_, body) = search("dc:title contains &quot;a&quot;").await;
        assert_eq!(element(&body, "errorCode"), "708");
    }

    #[tokio::test]
    async fn capability_actions() {
        let server = serve(library()).await;
        let (_, body) = call(&server.base, "ContentDirectory", CONTENT_DIRECTORY_URN, "GetSearchCapabilities", "").await;
        assert_eq!(element(&body, "SearchCaps"), SEARCH_CAPABILITIES);
        let (_, body) = call(&server.base, "ContentDirectory", CONTENT_DIRECTORY_URN, "GetSortCapabilities", "").await;
        assert_eq!(element(&body, "SortCaps"), SORT_CAPABILITIES);
        let (_, body) = call(&server.base, "ContentDirectory", CONTENT_DIRECTORY_URN, "GetSystemUpdateID", "").await;
        assert_eq!(
            element(&body, "Id"),
            server.state.content.system_update_id().to_string()
        );
    }

    #[tokio::test]
    async fn connection_manager_actions() {
        let server = serve(library()).await;
        let (status, body) = call(&server.base, "ConnectionManager", CONNECTION_MANAGER_URN, "GetProtocolInfo", "").await;
        assert_eq!(status, StatusCode::OK);
        let source = element(&body, "Source");
        assert!(source.contains("http-get:*:audio/mpeg:DLNA.ORG_OP=01"));
        assert!(source.contains("http-get:*:video/mp4:"));

        let (_, body) = call(&server.base, "ConnectionManager", CONNECTION_MANAGER_URN, "GetCurrentConnectionIDs", "").await;
        assert_eq!(element(&body, "ConnectionIDs"), "0");

        let (_, body) = call(
            &server.base,
            "ConnectionManager",
            CONNECTION_MANAGER_URN,
            "GetCurrentConnectionInfo",
            "<ConnectionID>0</ConnectionID>",
        )
        .await;
        assert_eq!(element(&body, "Direction"), "Output");

        let (_, body) = call(
            &server.base,
            "ConnectionManager",
            CONNECTION_MANAGER_URN,
            "GetCurrentConnectionInfo",
            "<ConnectionID>7</ConnectionID>",
        )
        .await;
        assert_eq!(element(&body, "errorCode"), "402");
    }

    #[test]
    fn protocol_info_list_has_no_duplicates() {
        let list = source_protocol_info(&builtin::baseline());
        let entries: Vec<_> = list.split(',').collect();
        let mut unique = entries.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(entries.len(), unique.len());
    }
}
