//! SSDP message building and parsing.

use crate::protocol_constants::{
    CONNECTION_MANAGER_URN, CONTENT_DIRECTORY_URN, MEDIA_SERVER_URN, ROOT_DEVICE_ST, SSDP_ALL_ST,
    SSDP_MULTICAST_ADDR,
};

// ─────────────────────────────────────────────────────────────────────────────
// ASCII Case-Insensitive Helpers
// ─────────────────────────────────────────────────────────────────────────────

#[inline]
fn starts_with_ignore_ascii_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len() && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Returns the trimmed value of header `name` (case-insensitive).
fn header_value<'a>(message: &'a str, name: &str) -> Option<&'a str> {
    message.lines().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim())
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Advertisements
// ─────────────────────────────────────────────────────────────────────────────

/// One NT/USN pair the device announces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub nt: String,
    pub usn: String,
}

/// The root device, its UDN, device type and both services.
#[must_use]
pub fn advertisements(uuid: &str) -> Vec<Advertisement> {
    let udn = format!("uuid:{}", uuid);
    let mut ads = vec![
        Advertisement {
            nt: ROOT_DEVICE_ST.to_string(),
            usn: format!("{}::{}", udn, ROOT_DEVICE_ST),
        },
        Advertisement {
            nt: udn.clone(),
            usn: udn.clone(),
        },
    ];
    for urn in [MEDIA_SERVER_URN, CONTENT_DIRECTORY_URN, CONNECTION_MANAGER_URN] {
        ads.push(Advertisement {
            nt: urn.to_string(),
            usn: format!("{}::{}", udn, urn),
        });
    }
    ads
}

/// Advertisements answering search target `st`.
pub fn matching<'a>(ads: &'a [Advertisement], st: &str) -> Vec<&'a Advertisement> {
    if st.eq_ignore_ascii_case(SSDP_ALL_ST) {
        return ads.iter().collect();
    }
    ads.iter().filter(|ad| ad.nt.eq_ignore_ascii_case(st)).collect()
}

#[must_use]
pub fn notify_alive(ad: &Advertisement, location: &str, max_age: u64, server: &str) -> String {
    format!(
        "NOTIFY * HTTP/1.1\r\n\
         HOST: {}\r\n\
         CACHE-CONTROL: max-age={}\r\n\
         LOCATION: {}\r\n\
         NT: {}\r\n\
         NTS: ssdp:alive\r\n\
         SERVER: {}\r\n\
         USN: {}\r\n\r\n",
        SSDP_MULTICAST_ADDR, max_age, location, ad.nt, server, ad.usn
    )
}

#[must_use]
pub fn notify_byebye(ad: &Advertisement) -> String {
    format!(
        "NOTIFY * HTTP/1.1\r\n\
         HOST: {}\r\n\
         NT: {}\r\n\
         NTS: ssdp:byebye\r\n\
         USN: {}\r\n\r\n",
        SSDP_MULTICAST_ADDR, ad.nt, ad.usn
    )
}

/// Unicast reply to an M-SEARCH. `ST` mirrors the advertisement matched.
#[must_use]
pub fn search_response(ad: &Advertisement, location: &str, max_age: u64, server: &str) -> String {
    let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT");
    format!(
        "HTTP/1.1 200 OK\r\n\
         CACHE-CONTROL: max-age={}\r\n\
         DATE: {}\r\n\
         EXT:\r\n\
         LOCATION: {}\r\n\
         SERVER: {}\r\n\
         ST: {}\r\n\
         USN: {}\r\n\
         Content-Length: 0\r\n\r\n",
        max_age, date, location, server, ad.nt, ad.usn
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// M-SEARCH
// ─────────────────────────────────────────────────────────────────────────────

/// A discovery request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub st: String,
    pub mx: Option<u64>,
}

/// Parses an `M-SEARCH` datagram; anything else yields `None`.
#[must_use]
pub fn parse_msearch(datagram: &str) -> Option<SearchRequest> {
    if !starts_with_ignore_ascii_case(datagram, "M-SEARCH") {
        return None;
    }
    let man = header_value(datagram, "MAN")?;
    if !man.trim_matches('"').eq_ignore_ascii_case("ssdp:discover") {
        return None;
    }
    let st = header_value(datagram, "ST")?;
    if st.is_empty() {
        return None;
    }
    Some(SearchRequest {
        st: st.to_string(),
        mx: header_value(datagram, "MX").and_then(|v| v.parse().ok()),
    })
}

/// Reads a header from any SSDP message (used by tests and diagnostics).
#[must_use]
pub fn get_header<'a>(message: &'a str, name: &str) -> Option<&'a str> {
    header_value(message, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const UUID: &str = "4d696e69-444c-164e-9d41-b827eb0c2e5f";

    fn msearch(st: &str) -> String {
        format!(
            "M-SEARCH * HTTP/1.1\r\nHOST: 239.255.255.250:1900\r\nMAN: \"ssdp:discover\"\r\nMX: 2\r\nST: {}\r\n\r\n",
            st
        )
    }

    #[test]
    fn advertises_root_udn_device_and_services() {
        let ads = advertisements(UUID);
        assert_eq!(ads.len(), 5);
        assert_eq!(ads[0].usn, format!("uuid:{}::upnp:rootdevice", UUID));
        assert_eq!(ads[1].nt, format!("uuid:{}", UUID));
        assert!(ads.iter().any(|a| a.nt == CONTENT_DIRECTORY_URN));
    }

    #[test]
    fn parses_msearch_case_insensitively() {
        let req = parse_msearch("m-search * HTTP/1.1\r\nman: \"ssdp:discover\"\r\nst: upnp:rootdevice\r\nmx: 3\r\n\r\n").unwrap();
        assert_eq!(req.st, "upnp:rootdevice");
        assert_eq!(req.mx, Some(3));
    }

    #[test]
    fn ignores_notify_and_missing_man() {
        assert!(parse_msearch("NOTIFY * HTTP/1.1\r\nNT: upnp:rootdevice\r\n\r\n").is_none());
        assert!(parse_msearch("M-SEARCH * HTTP/1.1\r\nST: ssdp:all\r\n\r\n").is_none());
    }

    #[test]
    fn ssdp_all_matches_every_advertisement() {
        let ads = advertisements(UUID);
        let req = parse_msearch(&msearch("ssdp:all")).unwrap();
        assert_eq!(matching(&ads, &req.st).len(), ads.len());
        assert_eq!(matching(&ads, MEDIA_SERVER_URN).len(), 1);
        assert!(matching(&ads, "urn:schemas-upnp-org:device:MediaRenderer:1").is_empty());
    }

    #[test]
    fn search_response_mirrors_target() {
        let ads = advertisements(UUID);
        let ad = matching(&ads, ROOT_DEVICE_ST)[0];
        let resp = search_response(ad, "http://10.0.0.2:8200/device.xml", 1800, "test/1.0");
        assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"));
        assert_eq!(get_header(&resp, "ST"), Some(ROOT_DEVICE_ST));
        assert_eq!(get_header(&resp, "LOCATION"), Some("http://10.0.0.2:8200/device.xml"));
        assert_eq!(get_header(&resp, "CACHE-CONTROL"), Some("max-age=1800"));
    }

    #[test]
    fn notify_messages_carry_nts() {
        let ad = &advertisements(UUID)[0];
        let alive = notify_alive(ad, "http://x/device.xml", 1800, "s");
        assert_eq!(get_header(&alive, "NTS"), Some("ssdp:alive"));
        let bye = notify_byebye(ad);
        assert_eq!(get_header(&bye, "NTS"), Some("ssdp:byebye"));
        assert!(get_header(&bye, "LOCATION").is_none());
    }
}
