//! Outbound destination policy for network nodes
//!
//! Literal host validation only: a hostname that later resolves to a
//! private address passes here. The network adapter closes that gap by
//! checking resolved addresses with [`is_blocked_ip`] before connecting.

use std::net::IpAddr;
use thiserror::Error;
use url::{Host, ParseError, Url};

const LOCAL_HOSTS: &[&str] = &["localhost", "127.0.0.1", "0.0.0.0", "::1"];

/// Reason a destination was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("invalid_url")]
    InvalidUrl,
    #[error("scheme_not_allowed")]
    SchemeNotAllowed,
    #[error("missing_host")]
    MissingHost,
    #[error("local_host_blocked")]
    LocalHostBlocked,
    #[error("invalid_ipv4")]
    InvalidIpv4,
    #[error("private_ipv4_blocked")]
    PrivateIpv4Blocked,
    #[error("invalid_port")]
    InvalidPort,
}

impl PolicyViolation {
    /// Stable reason code surfaced to logs and plugin state
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyViolation::InvalidUrl => "invalid_url",
            PolicyViolation::SchemeNotAllowed => "scheme_not_allowed",
            PolicyViolation::MissingHost => "missing_host",
            PolicyViolation::LocalHostBlocked => "local_host_blocked",
            PolicyViolation::InvalidIpv4 => "invalid_ipv4",
            PolicyViolation::PrivateIpv4Blocked => "private_ipv4_blocked",
            PolicyViolation::InvalidPort => "invalid_port",
        }
    }
}

/// Validate a URL for an HTTP GET
pub fn validate_url(raw: &str) -> Result<Url, PolicyViolation> {
    let url = Url::parse(raw.trim()).map_err(|_| PolicyViolation::InvalidUrl)?;
    if url.scheme() != "https" {
        return Err(PolicyViolation::SchemeNotAllowed);
    }
    let host = url.host_str().unwrap_or_default();
    check_host(host)?;
    Ok(url)
}

/// Validate a raw TCP destination
pub fn validate_host_port(host: &str, port: i64) -> Result<(), PolicyViolation> {
    check_host(host.trim())?;
    if !(1..=65_535).contains(&port) {
        return Err(PolicyViolation::InvalidPort);
    }
    Ok(())
}

/// Host literal checks shared by HTTP and TCP
///
/// Hosts are parsed the way URL hosts are, so shorthand IPv4 forms such as
/// `127.1` or `2130706433` are checked as the address they denote.
pub fn check_host(host: &str) -> Result<(), PolicyViolation> {
    let bare = host.trim().trim_start_matches('[').trim_end_matches(']');
    if bare.is_empty() {
        return Err(PolicyViolation::MissingHost);
    }
    let parsed = if bare.contains(':') {
        Host::parse(&format!("[{}]", bare))
    } else {
        Host::parse(bare)
    };

    match parsed.map_err(host_error)? {
        Host::Domain(domain) => {
            if LOCAL_HOSTS.contains(&domain.trim_end_matches('.')) {
                return Err(PolicyViolation::LocalHostBlocked);
            }
            Ok(())
        }
        Host::Ipv4(v4) => check_ip(IpAddr::V4(v4)),
        Host::Ipv6(v6) => check_ip(v6.to_ipv4_mapped().map_or(IpAddr::V6(v6), IpAddr::V4)),
    }
}

fn check_ip(ip: IpAddr) -> Result<(), PolicyViolation> {
    if LOCAL_HOSTS.contains(&ip.to_string().as_str()) {
        return Err(PolicyViolation::LocalHostBlocked);
    }
    if is_blocked_ip(&ip) {
        return Err(PolicyViolation::PrivateIpv4Blocked);
    }
    Ok(())
}

fn host_error(error: ParseError) -> PolicyViolation {
    match error {
        ParseError::EmptyHost => PolicyViolation::MissingHost,
        ParseError::InvalidIpv4Address => PolicyViolation::InvalidIpv4,
        _ => PolicyViolation::InvalidUrl,
    }
}

fn is_private_v4(octets: [u8; 4]) -> bool {
    match octets {
        [10, ..] | [127, ..] => true,
        [172, b, ..] => (16..=31).contains(&b),
        [192, 168, ..] => true,
        [169, 254, ..] => true,
        [0, ..] => true,
        _ => false,
    }
}

/// True for loopback, private, link-local, and unspecified addresses
pub fn is_blocked_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4.octets()),
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            v6.is_loopback()
                || v6.is_unspecified()
                || (segments[0] & 0xfe00) == 0xfc00
                || (segments[0] & 0xffc0) == 0xfe80
                || v6.to_ipv4_mapped().is_some_and(|v4| is_private_v4(v4.octets()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_urls() {
        assert_eq!(
            validate_url("http://example.com").unwrap_err(),
            PolicyViolation::SchemeNotAllowed
        );
        assert_eq!(
            validate_url("https://localhost/x").unwrap_err(),
            PolicyViolation::LocalHostBlocked
        );
        assert_eq!(
            validate_url("https://127.0.0.1/x").unwrap_err(),
            PolicyViolation::LocalHostBlocked
        );
        assert_eq!(
            validate_url("https://10.0.0.5/x").unwrap_err(),
            PolicyViolation::PrivateIpv4Blocked
        );
        assert_eq!(
            validate_url("https://192.168.1.1/x").unwrap_err(),
            PolicyViolation::PrivateIpv4Blocked
        );
        assert_eq!(
            validate_url("https://172.20.1.1/x").unwrap_err(),
            PolicyViolation::PrivateIpv4Blocked
        );
        assert_eq!(validate_url("not a url").unwrap_err(), PolicyViolation::InvalidUrl);
        assert_eq!(
            validate_url("https://[::1]/x").unwrap_err(),
            PolicyViolation::LocalHostBlocked
        );
    }

    #[test]
    fn test_accepted_urls() {
        assert!(validate_url("https://example.com/x").is_ok());
        assert!(validate_url("https://172.32.0.1/x").is_ok());
        assert!(validate_url("https://8.8.8.8/").is_ok());
    }

    #[test]
    fn test_tcp_destinations() {
        assert!(validate_host_port("example.com", 443).is_ok());
        assert_eq!(
            validate_host_port("example.com", 0).unwrap_err(),
            PolicyViolation::InvalidPort
        );
        assert_eq!(
            validate_host_port("example.com", 70_000).unwrap_err(),
            PolicyViolation::InvalidPort
        );
        assert_eq!(
            validate_host_port("", 80).unwrap_err(),
            PolicyViolation::MissingHost
        );
        assert_eq!(
            validate_host_port("300.1.1.1", 80).unwrap_err(),
            PolicyViolation::InvalidIpv4
        );
        assert_eq!(
            validate_host_port("LOCALHOST", 80).unwrap_err(),
            PolicyViolation::LocalHostBlocked
        );
        assert_eq!(
            validate_host_port("127.8.8.8", 80).unwrap_err(),
            PolicyViolation::PrivateIpv4Blocked
        );
    }

    #[test]
    fn test_shorthand_ipv4_hosts() {
        assert_eq!(
            validate_host_port("127.1", 80).unwrap_err(),
            PolicyViolation::LocalHostBlocked
        );
        assert_eq!(
            validate_host_port("2130706433", 80).unwrap_err(),
            PolicyViolation::LocalHostBlocked
        );
        assert_eq!(
            validate_host_port("0x7f.0.0.1", 80).unwrap_err(),
            PolicyViolation::LocalHostBlocked
        );
        assert_eq!(
            validate_host_port("10.1", 80).unwrap_err(),
            PolicyViolation::PrivateIpv4Blocked
        );
        assert_eq!(
            validate_url("https://127.1/x").unwrap_err(),
            PolicyViolation::LocalHostBlocked
        );
        assert!(validate_host_port("8.8.8.8", 53).is_ok());
    }

    #[test]
    fn test_ipv6_literals() {
        assert_eq!(
            validate_host_port("::ffff:127.0.0.1", 80).unwrap_err(),
            PolicyViolation::LocalHostBlocked
        );
        assert_eq!(
            validate_host_port("[::ffff:10.0.0.1]", 80).unwrap_err(),
            PolicyViolation::PrivateIpv4Blocked
        );
        assert_eq!(
            validate_host_port("::1", 80).unwrap_err(),
            PolicyViolation::LocalHostBlocked
        );
        assert_eq!(
            validate_url("https://[::ffff:127.0.0.1]/x").unwrap_err(),
            PolicyViolation::LocalHostBlocked
        );
        assert_eq!(
            validate_url("https://[fe80::1]/x").unwrap_err(),
            PolicyViolation::PrivateIpv4Blocked
        );
        assert_eq!(
            validate_url("https://[fd00::1]/x").unwrap_err(),
            PolicyViolation::PrivateIpv4Blocked
        );
        assert!(validate_url("https://[2606:2800:220:1::]/x").is_ok());
        assert!(validate_host_port("2606:2800:220:1::", 443).is_ok());
    }

    #[test]
    fn test_malformed_tcp_host() {
        assert_eq!(
            validate_host_port("bad host", 80).unwrap_err(),
            PolicyViolation::InvalidUrl
        );
    }

    #[test]
    fn test_resolved_address_blocklist() {
        assert!(is_blocked_ip(&"10.1.2.3".parse().unwrap()));
        assert!(is_blocked_ip(&"fe80::1".parse().unwrap()));
        assert!(is_blocked_ip(&"::ffff:192.168.0.1".parse().unwrap()));
        assert!(!is_blocked_ip(&"93.184.216.34".parse().unwrap()));
        assert!(!is_blocked_ip(&"2606:2800:220:1::".parse().unwrap()));
    }

    #[test]
    fn test_reason_codes() {
        assert_eq!(PolicyViolation::PrivateIpv4Blocked.to_string(), "private_ipv4_blocked");
        assert_eq!(PolicyViolation::InvalidUrl.as_str(), "invalid_url");
    }
}
