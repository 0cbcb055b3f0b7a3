//! UPnP device description and service (SCPD) documents.

use uuid::Uuid;

use crate::config::Config;
use crate::context::{ServicePaths, CONNECTION_MANAGER_PATHS, CONTENT_DIRECTORY_PATHS};
use crate::protocol_constants::{
    APP_NAME, CONNECTION_MANAGER_URN, CONTENT_DIRECTORY_URN, MANUFACTURER, MEDIA_SERVER_URN,
    MODEL_NAME, SERVICE_ID,
};
use crate::utils::escape_xml;

/// Identity of the bridge on the network. Fixed for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub uuid: String,
    pub friendly_name: String,
    pub manufacturer: String,
    pub model_name: String,
    pub model_number: String,
    pub serial_number: String,
}

impl DeviceDescriptor {
    /// Builds the descriptor, deriving unset identity fields from the host.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let host = host_name();
        let uuid = config
            .device_uuid
            .clone()
            .unwrap_or_else(|| stable_uuid(&host));
        let friendly_name = config
            .friendly_name
            .clone()
            .unwrap_or_else(|| format!("{} on {}", APP_NAME, host));
        Self {
            serial_number: uuid.chars().take(8).collect(),
            uuid,
            friendly_name,
            manufacturer: MANUFACTURER.to_string(),
            model_name: MODEL_NAME.to_string(),
            model_number: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// `uuid:<uuid>`, as used in the description and SSDP USNs.
    #[must_use]
    pub fn udn(&self) -> String {
        format!("uuid:{}", self.uuid)
    }

    /// Root device description served at `/device.xml`.
    #[must_use]
    pub fn to_xml(&self, base_url: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<root xmlns="urn:schemas-upnp-org:device-1-0" xmlns:dlna="urn:schemas-dlna-org:device-1-0">
  <specVersion>
    <major>1</major>
    <minor>0</minor>
  </specVersion>
  <URLBase>{base_url}</URLBase>
  <device>
    <deviceType>{device_type}</deviceType>
    <friendlyName>{friendly_name}</friendlyName>
    <manufacturer>{manufacturer}</manufacturer>
    <modelDescription>{app}</modelDescription>
    <modelName>{model_name}</modelName>
    <modelNumber>{model_number}</modelNumber>
    <serialNumber>{serial}</serialNumber>
    <UDN>{udn}</UDN>
    <dlna:X_DLNADOC>DMS-1.50</dlna:X_DLNADOC>
    <presentationURL>{base_url}/</presentationURL>
    <serviceList>
{cds}
{cm}
    </serviceList>
  </device>
</root>"#,
            base_url = escape_xml(base_url),
            device_type = MEDIA_SERVER_URN,
            friendly_name = escape_xml(&self.friendly_name),
            manufacturer = escape_xml(&self.manufacturer),
            app = APP_NAME,
            model_name = escape_xml(&self.model_name),
            model_number = escape_xml(&self.model_number),
            serial = escape_xml(&self.serial_number),
            udn = self.udn(),
            cds = service_entry(CONTENT_DIRECTORY_URN, "ContentDirectory", &CONTENT_DIRECTORY_PATHS),
            cm = service_entry(
                CONNECTION_MANAGER_URN,
                "ConnectionManager",
                &CONNECTION_MANAGER_PATHS
            ),
        )
    }
}

fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// UUIDv5 of the host name, so restarts keep the same identity.
#[must_use]
pub fn stable_uuid(host: &str) -> String {
    let name = format!("{}:{}", SERVICE_ID, host);
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, name.as_bytes()).to_string()
}

fn service_entry(urn: &str, id: &str, paths: &ServicePaths) -> String {
    format!(
        "      <service>
        <serviceType>{urn}</serviceType>
        <serviceId>urn:upnp-org:serviceId:{id}</serviceId>
        <SCPDURL>{scpd}</SCPDURL>
        <controlURL>{control}</controlURL>
        <eventSubURL>{event}</eventSubURL>
      </service>",
        urn = urn,
        id = id,
        scpd = paths.scpd,
        control = paths.control,
        event = paths.event,
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// SCPD
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Dir {
    In,
    Out,
}

struct Action {
    name: &'static str,
    args: &'static [(&'static str, Dir, &'static str)],
}

struct StateVar {
    name: &'static str,
    data_type: &'static str,
    events: bool,
    allowed: &'static [&'static str],
}

const fn var(name: &'static str, data_type: &'static str) -> StateVar {
    StateVar {
        name,
        data_type,
        events: false,
        allowed: &[],
    }
}

const CDS_ACTIONS: &[Action] = &[
    Action {
        name: "Browse",
        args: &[
            ("ObjectID", Dir::In, "A_ARG_TYPE_ObjectID"),
            ("BrowseFlag", Dir::In, "A_ARG_TYPE_BrowseFlag"),
            ("Filter", Dir::In, "A_ARG_TYPE_Filter"),
            ("StartingIndex", Dir::In, "A_ARG_TYPE_Index"),
            ("RequestedCount", Dir::In, "A_ARG_TYPE_Count"),
            ("SortCriteria", Dir::In, "A_ARG_TYPE_SortCriteria"),
            ("Result", Dir::Out, "A_ARG_TYPE_Result"),
            ("NumberReturned", Dir::Out, "A_ARG_TYPE_Count"),
            ("TotalMatches", Dir::Out, "A_ARG_TYPE_Count"),
            ("UpdateID", Dir::Out, "A_ARG_TYPE_UpdateID"),
        ],
    },
    Action {
        name: "Search",
        args: &[
            ("ContainerID", Dir::In, "A_ARG_TYPE_ObjectID"),
            ("SearchCriteria", Dir::In, "A_ARG_TYPE_SearchCriteria"),
            ("Filter", Dir::In, "A_ARG_TYPE_Filter"),
            ("StartingIndex", Dir::In, "A_ARG_TYPE_Index"),
            ("RequestedCount", Dir::In, "A_ARG_TYPE_Count"),
            ("SortCriteria", Dir::In, "A_ARG_TYPE_SortCriteria"),
            ("Result", Dir::Out, "A_ARG_TYPE_Result"),
            ("NumberReturned", Dir::Out, "A_ARG_TYPE_Count"),
            ("TotalMatches", Dir::Out, "A_ARG_TYPE_Count"),
            ("UpdateID", Dir::Out, "A_ARG_TYPE_UpdateID"),
        ],
    },
    Action {
        name: "GetSearchCapabilities",
        args: &[("SearchCaps", Dir::Out, "SearchCapabilities")],
    },
    Action {
        name: "GetSortCapabilities",
        args: &[("SortCaps", Dir::Out, "SortCapabilities")],
    },
    Action {
        name: "GetSystemUpdateID",
        args: &[("Id", Dir::Out, "SystemUpdateID")],
    },
];

const CDS_VARS: &[StateVar] = &[
    var("A_ARG_TYPE_ObjectID", "string"),
    var("A_ARG_TYPE_Result", "string"),
    StateVar {
        name: "A_ARG_TYPE_BrowseFlag",
        data_type: "string",
        events: false,
        allowed: &["BrowseMetadata", "BrowseDirectChildren"],
    },
    var("A_ARG_TYPE_Filter", "string"),
    var("A_ARG_TYPE_SortCriteria", "string"),
    var("A_ARG_TYPE_SearchCriteria", "string"),
    var("A_ARG_TYPE_Index", "ui4"),
    var("A_ARG_TYPE_Count", "ui4"),
    var("A_ARG_TYPE_UpdateID", "ui4"),
    var("SearchCapabilities", "string"),
    var("SortCapabilities", "string"),
    StateVar {
        name: "SystemUpdateID",
        data_type: "ui4",
        events: true,
        allowed: &[],
    },
];

const CM_ACTIONS: &[Action] = &[
    Action {
        name: "GetProtocolInfo",
        args: &[
            ("Source", Dir::Out, "SourceProtocolInfo"),
            ("Sink", Dir::Out, "SinkProtocolInfo"),
        ],
    },
    Action {
        name: "GetCurrentConnectionIDs",
        args: &[("ConnectionIDs", Dir::Out, "CurrentConnectionIDs")],
    },
    Action {
        name: "GetCurrentConnectionInfo",
        args: &[
            ("ConnectionID", Dir::In, "A_ARG_TYPE_ConnectionID"),
            ("RcsID", Dir::Out, "A_ARG_TYPE_RcsID"),
            ("AVTransportID", Dir::Out, "A_ARG_TYPE_AVTransportID"),
            ("ProtocolInfo", Dir::Out, "A_ARG_TYPE_ProtocolInfo"),
            ("PeerConnectionManager", Dir::Out, "A_ARG_TYPE_ConnectionManager"),
            ("PeerConnectionID", Dir::Out, "A_ARG_TYPE_ConnectionID"),
            ("Direction", Dir::Out, "A_ARG_TYPE_Direction"),
            ("Status", Dir::Out, "A_ARG_TYPE_ConnectionStatus"),
        ],
    },
];

const CM_VARS: &[StateVar] = &[
    StateVar {
        name: "SourceProtocolInfo",
        data_type: "string",
        events: true,
        allowed: &[],
    },
    StateVar {
        name: "SinkProtocolInfo",
        data_type: "string",
        events: true,
        allowed: &[],
    },
    StateVar {
        name: "CurrentConnectionIDs",
        data_type: "string",
        events: true,
        allowed: &[],
    },
    StateVar {
        name: "A_ARG_TYPE_ConnectionStatus",
        data_type: "string",
        events: false,
        allowed: &["OK", "ContentFormatMismatch", "InsufficientBandwidth", "UnreliableChannel", "Unknown"],
    },
    var("A_ARG_TYPE_ConnectionManager", "string"),
    StateVar {
        name: "A_ARG_TYPE_Direction",
        data_type: "string",
        events: false,
        allowed: &["Input", "Output"],
    },
    var("A_ARG_TYPE_ProtocolInfo", "string"),
    var("A_ARG_TYPE_ConnectionID", "i4"),
    var("A_ARG_TYPE_AVTransportID", "i4"),
    var("A_ARG_TYPE_RcsID", "i4"),
];

fn render_scpd(actions: &[Action], vars: &[StateVar]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
         <scpd xmlns=\"urn:schemas-upnp-org:service-1-0\">\n  \
         <specVersion><major>1</major><minor>0</minor></specVersion>\n  <actionList>\n",
    );
    for action in actions {
        xml.push_str(&format!(
            "    <action>\n      <name>{}</name>\n      <argumentList>\n",
            action.name
        ));
        for (name, dir, related) in action.args {
            let dir = match dir {
                Dir::In => "in",
                Dir::Out => "out",
            };
            xml.push_str(&format!(
                "        <argument><name>{}</name><direction>{}</direction>\
                 <relatedStateVariable>{}</relatedStateVariable></argument>\n",
                name, dir, related
            ));
        }
        xml.push_str("      </argumentList>\n    </action>\n");
    }
    xml.push_str("  </actionList>\n  <serviceStateTable>\n");
    for v in vars {
        xml.push_str(&format!(
            "    <stateVariable sendEvents=\"{}\">\n      <name>{}</name>\n      <dataType>{}</dataType>\n",
            if v.events { "yes" } else { "no" },
            v.name,
            v.data_type
        ));
        if !v.allowed.is_empty() {
            xml.push_str("      <allowedValueList>\n");
            for value in v.allowed {
                xml.push_str(&format!("        <allowedValue>{}</allowedValue>\n", value));
            }
            xml.push_str("      </allowedValueList>\n");
        }
        xml.push_str("    </stateVariable>\n");
    }
    xml.push_str("  </serviceStateTable>\n</scpd>");
    xml
}

#[must_use]
pub fn content_directory_scpd() -> String {
    render_scpd(CDS_ACTIONS, CDS_VARS)
}

#[must_use]
pub fn connection_manager_scpd() -> String {
    render_scpd(CM_ACTIONS, CM_VARS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_is_stable_per_host() {
        assert_eq!(stable_uuid("media-box"), stable_uuid("media-box"));
        assert_ne!(stable_uuid("media-box"), stable_uuid("other-box"));
        assert!(Uuid::parse_str(&stable_uuid("media-box")).is_ok());
    }

    #[test]
    fn config_overrides_identity() {
        let config = Config {
            device_uuid: Some("11111111-2222-3333-4444-555555555555".into()),
            friendly_name: Some("Living Room & Den".into()),
            ..Config::default()
        };
        let desc = DeviceDescriptor::from_config(&config);
        assert_eq!(desc.udn(), "uuid:11111111-2222-3333-4444-555555555555");
        assert_eq!(desc.serial_number, "11111111");

        let xml = desc.to_xml("http://10.0.0.5:8200");
        assert!(xml.contains("<friendlyName>Living Room &amp; Den</friendlyName>"));
        assert!(xml.contains("<UDN>uuid:11111111-2222-3333-4444-555555555555</UDN>"));
        assert!(xml.contains("<URLBase>http://10.0.0.5:8200</URLBase>"));
    }

    #[test]
    fn description_lists_both_services() {
        let xml = DeviceDescriptor::from_config(&Config::default()).to_xml("http://h:1");
        assert!(xml.contains(MEDIA_SERVER_URN));
        assert!(xml.contains("<controlURL>/ContentDirectory/control</controlURL>"));
        assert!(xml.contains("<SCPDURL>/ConnectionManager/scpd.xml</SCPDURL>"));
        assert!(xml.contains("DMS-1.50"));
    }

    #[test]
    fn scpd_documents_parse_and_list_actions() {
        for (xml, action) in [
            (content_directory_scpd(), "Search"),
            (connection_manager_scpd(), "GetCurrentConnectionInfo"),
        ] {
            let mut reader = quick_xml::Reader::from_str(&xml);
            loop {
                match reader.read_event() {
                    Ok(quick_xml::events::Event::Eof) => break,
                    Ok(_) => {}
                    Err(e) => panic!("invalid SCPD: {}", e),
                }
            }
            assert!(xml.contains(&format!("<name>{}</name>", action)));
        }
    }
}
