//! Client IP extraction
//!
//! Proxies report the original client in one of several headers; the first
//! one present wins, then the socket peer address.

use azura_core::Request;

/// Headers consulted for the client address, in priority order.
pub const IP_HEADERS: [&str; 5] = [
    "client-ip",
    "x-forwarded-for",
    "x-forwarded",
    "forwarded-for",
    "forwarded",
];

/// Best guess at the client's address. Empty when nothing identifies it.
pub fn client_ip(req: &Request) -> String {
    IP_HEADERS
        .iter()
        .find_map(|name| req.header(name))
        .map(|value| value.trim().to_string())
        .or_else(|| req.remote_addr().map(|addr| addr.ip().to_string()))
        .unwrap_or_default()
}

/// Store key for a group and client. Colons are replaced so IPv6 addresses
/// do not add key segments.
pub fn cache_key(group: &str, ip: &str) -> String {
    format!("rate_limit:{}:{}", group, ip.replace(':', "."))
}
