//! DIDL-Lite serialization.
//!
//! The writer renders Browse/Search results; the reader parses DIDL-Lite
//! back into object headers and is used to check writer output.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use super::node::{ContainerNode, ItemNode, Node};
use crate::utils::{escape_xml, format_duration_ticks};

const DIDL_OPEN: &str = concat!(
    r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/""#,
    r#" xmlns:dc="http://purl.org/dc/elements/1.1/""#,
    r#" xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/""#,
    r#" xmlns:dlna="urn:schemas-dlna-org:metadata-1-0/">"#
);
const DIDL_CLOSE: &str = "</DIDL-Lite>";

/// Serializes nodes into a DIDL-Lite document.
#[must_use]
pub fn write_didl(nodes: &[Node]) -> String {
    let mut xml = String::from(DIDL_OPEN);
    for node in nodes {
        match node {
            Node::Container(c) => write_container(&mut xml, c),
            Node::Item(i) => write_item(&mut xml, i),
        }
    }
    xml.push_str(DIDL_CLOSE);
    xml
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

fn write_container(xml: &mut String, c: &ContainerNode) {
    xml.push_str(&format!(
        r#"<container id="{}" parentID="{}" restricted="{}" searchable="{}""#,
        escape_xml(&c.id),
        escape_xml(&c.parent_id),
        flag(c.restricted),
        flag(c.searchable)
    ));
    if let Some(count) = c.child_count {
        xml.push_str(&format!(r#" childCount="{}""#, count));
    }
    xml.push_str(&format!(
        "><dc:title>{}</dc:title><upnp:class>{}</upnp:class></container>",
        escape_xml(&c.title),
        escape_xml(&c.class)
    ));
}

fn write_item(xml: &mut String, i: &ItemNode) {
    let res = &i.resource;
    xml.push_str(&format!(
        r#"<item id="{}" parentID="{}" restricted="{}"><dc:title>{}</dc:title><upnp:class>{}</upnp:class>"#,
        escape_xml(&i.id),
        escape_xml(&i.parent_id),
        flag(i.restricted),
        escape_xml(&i.title),
        escape_xml(&i.class)
    ));
    xml.push_str(&format!(
        r#"<res protocolInfo="{}""#,
        escape_xml(&res.protocol_info)
    ));
    if let Some(size) = res.size {
        xml.push_str(&format!(r#" size="{}""#, size));
    }
    if let Some(ticks) = res.duration_ticks {
        xml.push_str(&format!(r#" duration="{}""#, format_duration_ticks(ticks)));
    }
    if let Some((w, h)) = res.resolution {
        xml.push_str(&format!(r#" resolution="{}x{}""#, w, h));
    }
    if let Some(bitrate) = res.bitrate {
        // DIDL bitrate is bytes per second
        xml.push_str(&format!(r#" bitrate="{}""#, bitrate / 8));
    }
    xml.push_str(&format!(">{}</res></item>", escape_xml(&res.url)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Reader
// ─────────────────────────────────────────────────────────────────────────────

/// Object header recovered from a DIDL-Lite document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DidlObject {
    pub id: String,
    pub parent_id: String,
    pub title: String,
    pub class: String,
    pub is_container: bool,
}

fn get_attr(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .and_then(|a| {
            let raw = std::str::from_utf8(&a.value).ok()?;
            quick_xml::escape::unescape(raw).ok().map(|v| v.into_owned())
        })
}

fn object_header(e: &BytesStart<'_>, is_container: bool) -> DidlObject {
    DidlObject {
        id: get_attr(e, b"id").unwrap_or_default(),
        parent_id: get_attr(e, b"parentID").unwrap_or_default(),
        is_container,
        ..Default::default()
    }
}

/// Parses the containers and items of a DIDL-Lite document.
pub fn parse_didl(xml: &str) -> Result<Vec<DidlObject>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut objects = Vec::new();
    let mut current: Option<DidlObject> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"container" => current = Some(object_header(&e, true)),
                b"item" => current = Some(object_header(&e, false)),
                b"title" | b"class" if current.is_some() => {
                    let text = reader.read_text(e.name())?;
                    let value = quick_xml::escape::unescape(&text)
                        .map(|v| v.into_owned())
                        .unwrap_or_else(|_| text.to_string());
                    if let Some(obj) = current.as_mut() {
                        if e.local_name().as_ref() == b"title" {
                            obj.title = value;
                        } else {
                            obj.class = value;
                        }
                    }
                }
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"container" => objects.push(object_header(&e, true)),
                b"item" => objects.push(object_header(&e, false)),
                _ => {}
            },
            Event::End(e) => {
                if matches!(e.local_name().as_ref(), b"container" | b"item") {
                    if let Some(obj) = current.take() {
                        objects.push(obj);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(objects)
}
