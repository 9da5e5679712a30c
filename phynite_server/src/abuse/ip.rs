//! Client IP resolution behind proxies and CDNs

use http::HeaderMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Headers consulted for the client address, most trusted first
const FORWARDING_HEADERS: &[&str] = &[
    "cf-connecting-ip",
    "x-forwarded-for",
    "x-forwarded",
    "x-cluster-client-ip",
    "forwarded-for",
    "forwarded",
];

/// Address used when nothing better is known
pub const UNKNOWN_IP: &str = "0.0.0.0";

/// Resolve the client IP.
///
/// The first public address found in the forwarding headers wins. Falls
/// back to the socket peer, then to [`UNKNOWN_IP`].
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> String {
    for name in FORWARDING_HEADERS {
        let Some(value) = headers.get(*name).and_then(|v| v.to_str().ok()) else {
            continue;
        };

        if let Some(ip) = value.split(',').filter_map(parse_entry).find(is_public) {
            return ip.to_string();
        }
    }

    peer.map(|ip| ip.to_string())
        .unwrap_or_else(|| UNKNOWN_IP.to_string())
}

/// Parse one list entry: a bare address, `addr:port`, or an RFC 7239
/// element such as `for="[2001:db8::1]:4711";proto=https`
fn parse_entry(entry: &str) -> Option<IpAddr> {
    let mut candidate = entry.trim();

    if candidate.contains('=') {
        candidate = candidate
            .split(';')
            .map(str::trim)
            .find_map(|pair| {
                let (key, value) = pair.split_once('=')?;
                key.trim().eq_ignore_ascii_case("for").then_some(value.trim())
            })?;
    }

    let candidate = candidate.trim_matches('"');

    if let Ok(ip) = candidate.parse::<IpAddr>() {
        return Some(ip);
    }
    if let Ok(addr) = candidate.parse::<SocketAddr>() {
        return Some(addr.ip());
    }
    candidate
        .strip_prefix('[')
        .and_then(|rest| rest.split(']').next())
        .and_then(|inner| inner.parse::<IpAddr>().ok())
}

/// Routable address outside private, loopback, link-local and reserved ranges
pub fn is_public(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_public_v4(&v4),
            None => is_public_v6(v6),
        },
    }
}

fn is_public_v4(ip: &Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    !(ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || a == 0
        || a >= 240
        || (a == 100 && (64..128).contains(&b)))
}

fn is_public_v6(ip: &Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    !(ip.is_loopback()
        || ip.is_unspecified()
        || (first & 0xfe00) == 0xfc00
        || (first & 0xffc0) == 0xfe80)
}

/// Whether a resolved client address is local to the deployment
pub fn is_private(ip: &str) -> bool {
    ip.parse::<IpAddr>().map(|ip| !is_public(&ip)).unwrap_or(false)
}
