//! SOAP envelope handling for the UPnP control endpoints.
//!
//! Parses inbound action requests, builds response envelopes, and renders
//! [`SoapFault`]s with their UPnP error code.

use std::borrow::Cow;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use thiserror::Error;

use crate::media_source::UpstreamError;
use crate::utils::escape_xml;

const XML_CONTENT_TYPE: &str = "text/xml; charset=\"utf-8\"";

// ─────────────────────────────────────────────────────────────────────────────
// Faults
// ─────────────────────────────────────────────────────────────────────────────

/// UPnP error codes used by the control endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpnpErrorCode {
    InvalidAction = 401,
    InvalidArgs = 402,
    ActionFailed = 501,
    NoSuchObject = 701,
    UnsupportedSearchCriteria = 708,
    UnsupportedSortCriteria = 709,
}

impl UpnpErrorCode {
    #[must_use]
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    fn default_description(self) -> &'static str {
        match self {
            Self::InvalidAction => "Invalid Action",
            Self::InvalidArgs => "Invalid Args",
            Self::ActionFailed => "Action Failed",
            Self::NoSuchObject => "No such object",
            Self::UnsupportedSearchCriteria => "Unsupported or invalid search criteria",
            Self::UnsupportedSortCriteria => "Unsupported or invalid sort criteria",
        }
    }
}

/// A UPnP protocol fault returned to the control point.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("UPnP error {}: {description}", .code.as_u16())]
pub struct SoapFault {
    pub code: UpnpErrorCode,
    pub description: String,
}

impl SoapFault {
    pub fn new(code: UpnpErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    pub fn invalid_action() -> Self {
        let code = UpnpErrorCode::InvalidAction;
        Self::new(code, code.default_description())
    }

    pub fn invalid_args(detail: impl std::fmt::Display) -> Self {
        Self::new(UpnpErrorCode::InvalidArgs, format!("Invalid Args: {}", detail))
    }

    pub fn action_failed(detail: impl std::fmt::Display) -> Self {
        Self::new(UpnpErrorCode::ActionFailed, format!("Action Failed: {}", detail))
    }

    pub fn no_such_object(id: &str) -> Self {
        Self::new(UpnpErrorCode::NoSuchObject, format!("No such object: {}", id))
    }

    pub fn unsupported_search(criteria: &str) -> Self {
        Self::new(
            UpnpErrorCode::UnsupportedSearchCriteria,
            format!("Unsupported search criteria: {}", criteria),
        )
    }

    pub fn unsupported_sort(criteria: &str) -> Self {
        Self::new(
            UpnpErrorCode::UnsupportedSortCriteria,
            format!("Unsupported sort criteria: {}", criteria),
        )
    }

    /// Renders the fault envelope.
    #[must_use]
    pub fn to_xml(&self) -> String {
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="utf-8"?>"#,
                r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">"#,
                "<s:Body><s:Fault><faultcode>s:Client</faultcode><faultstring>UPnPError</faultstring>",
                r#"<detail><UPnPError xmlns="urn:schemas-upnp-org:control-1-0">"#,
                "<errorCode>{}</errorCode><errorDescription>{}</errorDescription>",
                "</UPnPError></detail></s:Fault></s:Body></s:Envelope>"
            ),
            self.code.as_u16(),
            escape_xml(&self.description)
        )
    }
}

impl From<UpstreamError> for SoapFault {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::NotFound(id) => Self::no_such_object(&id),
            other => Self::action_failed(other),
        }
    }
}

impl IntoResponse for SoapFault {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, XML_CONTENT_TYPE)],
            self.to_xml(),
        )
            .into_response()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

/// A parsed SOAP action invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapRequest {
    pub action: String,
    args: Vec<(String, String)>,
}

impl SoapRequest {
    /// Returns an argument value, if present.
    #[must_use]
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns a required argument or fault 402.
    pub fn require(&self, name: &str) -> Result<&str, SoapFault> {
        self.arg(name)
            .ok_or_else(|| SoapFault::invalid_args(format!("missing {}", name)))
    }

    /// Parses a required unsigned integer argument.
    pub fn require_u32(&self, name: &str) -> Result<u32, SoapFault> {
        let raw = self.require(name)?;
        raw.trim()
            .parse()
            .map_err(|_| SoapFault::invalid_args(format!("{}='{}' is not a number", name, raw)))
    }
}

/// Extracts the action name from a `SOAPACTION` header.
///
/// Accepts `"urn:...:ContentDirectory:1#Browse"` with or without quotes.
#[must_use]
pub fn parse_soap_action(header: &str) -> Option<&str> {
    let trimmed = header.trim().trim_matches('"');
    let (_, action) = trimmed.rsplit_once('#')?;
    (!action.is_empty()).then_some(action)
}

/// Parses a SOAP request body.
///
/// The action name comes from the `SOAPACTION` header when given and
/// otherwise from the first element inside `Body`.
pub fn parse_request(soap_action: Option<&str>, body: &str) -> Result<SoapRequest, SoapFault> {
    let header_action = soap_action.and_then(parse_soap_action);

    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut in_body = false;
    let mut body_action: Option<String> = None;
    let mut args = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let local = e.local_name();
                let name = String::from_utf8_lossy(local.as_ref()).into_owned();
                if !in_body {
                    in_body = name == "Body";
                } else if body_action.is_none() {
                    body_action = Some(name);
                } else {
                    let raw = reader
                        .read_text(e.name())
                        .map_err(SoapFault::invalid_args)?;
                    args.push((name, unescape(&raw)?.into_owned()));
                }
            }
            Ok(Event::Empty(e)) if in_body => {
                let local = e.local_name();
                let name = String::from_utf8_lossy(local.as_ref()).into_owned();
                if body_action.is_none() {
                    body_action = Some(name);
                    break;
                }
                args.push((name, String::new()));
            }
            Ok(Event::End(e)) if body_action.is_some() => {
                let local = e.local_name();
                if body_action.as_deref().map(str::as_bytes) == Some(local.as_ref()) {
                    break;
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                log::debug!("[SOAP] Malformed envelope: {}", err);
                return Err(SoapFault::invalid_action());
            }
        }
    }

    let action = header_action
        .map(String::from)
        .or(body_action)
        .ok_or_else(SoapFault::invalid_action)?;

    Ok(SoapRequest { action, args })
}

fn unescape(raw: &str) -> Result<Cow<'_, str>, SoapFault> {
    quick_xml::escape::unescape(raw).map_err(SoapFault::invalid_args)
}

// ─────────────────────────────────────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────────────────────────────────────

/// Builds a `<u:{action}Response>` envelope. Values are escaped here.
#[must_use]
pub fn response_envelope(action: &str, service_urn: &str, args: &[(&str, &str)]) -> String {
    let mut body = format!(
        r#"<?xml version="1.0" encoding="utf-8"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><u:{}Response xmlns:u="{}">"#,
        action, service_urn
    );
    for (k, v) in args {
        body.push_str(&format!("<{k}>{}</{k}>", escape_xml(v)));
    }
    body.push_str(&format!("</u:{}Response></s:Body></s:Envelope>", action));
    body
}

/// Wraps a response envelope as an HTTP 200.
pub fn ok_response(envelope: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, XML_CONTENT_TYPE)],
        envelope,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BROWSE: &str = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:Browse xmlns:u="urn:schemas-upnp-org:service:ContentDirectory:1">
      <ObjectID>0</ObjectID>
      <BrowseFlag>BrowseDirectChildren</BrowseFlag>
      <Filter>*</Filter>
      <StartingIndex>0</StartingIndex>
      <RequestedCount>10</RequestedCount>
      <SortCriteria/>
    </u:Browse>
  </s:Body>
</s:Envelope>"#;

    #[test]
    fn soap_action_header_quoted_and_unquoted() {
        let urn = "urn:schemas-upnp-org:service:ContentDirectory:1#Browse";
        assert_eq!(parse_soap_action(&format!("\"{}\"", urn)), Some("Browse"));
        assert_eq!(parse_soap_action(urn), Some("Browse"));
        assert_eq!(parse_soap_action("garbage"), None);
    }

    #[test]
    fn parses_browse_arguments() {
        let req = parse_request(None, BROWSE).unwrap();
        assert_eq!(req.action, "Browse");
        assert_eq!(req.arg("ObjectID"), Some("0"));
        assert_eq!(req.arg("BrowseFlag"), Some("BrowseDirectChildren"));
        assert_eq!(req.arg("SortCriteria"), Some(""));
        assert_eq!(req.require_u32("RequestedCount").unwrap(), 10);
    }

    #[test]
    fn header_action_takes_precedence() {
        let req = parse_request(
            Some("\"urn:schemas-upnp-org:service:ContentDirectory:1#Search\""),
            BROWSE,
        )
        .unwrap();
        assert_eq!(req.action, "Search");
    }

    #[test]
    fn escaped_argument_values_are_unescaped() {
        let body = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><u:Search xmlns:u="urn:x"><SearchCriteria>upnp:class = &quot;object.item.audioItem&quot;</SearchCriteria></u:Search></s:Body></s:Envelope>"#;
        let req = parse_request(None, body).unwrap();
        assert_eq!(
            req.arg("SearchCriteria"),
            Some(r#"upnp:class = "object.item.audioItem""#)
        );
    }

    #[test]
    fn missing_and_malformed_arguments_fault_402() {
        let req = parse_request(None, BROWSE).unwrap();
        assert_eq!(req.require("Nope").unwrap_err().code, UpnpErrorCode::InvalidArgs);
        assert_eq!(
            req.require_u32("BrowseFlag").unwrap_err().code,
            UpnpErrorCode::InvalidArgs
        );
    }

    #[test]
    fn empty_body_without_header_is_invalid_action() {
        let fault = parse_request(None, "").unwrap_err();
        assert_eq!(fault.code, UpnpErrorCode::InvalidAction);
    }

    #[test]
    fn fault_xml_carries_code_and_escaped_description() {
        let xml = SoapFault::no_such_object("a<b").to_xml();
        assert!(xml.contains("<errorCode>701</errorCode>"));
        assert!(xml.contains("No such object: a&lt;b"));
    }

    #[test]
    fn upstream_errors_become_faults() {
        let fault: SoapFault = UpstreamError::NotFound("x".into()).into();
        assert_eq!(fault.code, UpnpErrorCode::NoSuchObject);
        let fault: SoapFault = UpstreamError::Unauthorized.into();
        assert_eq!(fault.code, UpnpErrorCode::ActionFailed);
    }

    #[test]
    fn response_envelope_escapes_values() {
        let xml = response_envelope("Browse", "urn:x", &[("Result", "<DIDL-Lite/>")]);
        assert!(xml.contains("<u:BrowseResponse xmlns:u=\"urn:x\">"));
        assert!(xml.contains("<Result>&lt;DIDL-Lite/&gt;</Result>"));
    }
}
