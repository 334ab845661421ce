//! Which remote addresses are worth a reverse DNS lookup
//!
//! Loopback and private-network peers rarely have useful PTR records and
//! would only stall the resolver pool. The IPv4 rule is a plain prefix match
//! on the dotted form, so all of `172.` is skipped, not just 172.16/12.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

const SKIPPED_V4_PREFIXES: &[&str] = &["127.", "10.", "172.", "192.168."];

/// True when a hostname lookup should be attempted for this address
pub fn should_resolve(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => !is_skipped_ipv4(ipv4),
        IpAddr::V6(ipv6) => match ipv6.to_ipv4_mapped() {
            Some(mapped) => !is_skipped_ipv4(&mapped),
            None => !is_skipped_ipv6(ipv6),
        },
    }
}

fn is_skipped_ipv4(ip: &Ipv4Addr) -> bool {
    let dotted = ip.to_string();
    ip.is_unspecified() || SKIPPED_V4_PREFIXES.iter().any(|p| dotted.starts_with(p))
}

fn is_skipped_ipv6(ip: &Ipv6Addr) -> bool {
    ip.is_loopback()                  // ::1
        || ip.is_unspecified()        // ::
        || ip.is_unicast_link_local() // fe80::/10
        || (ip.segments()[0] & 0xfe00) == 0xfc00 // fc00::/7
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(addr: &str) -> bool {
        should_resolve(&addr.parse().unwrap())
    }

    #[test]
    fn test_public_ipv4_resolves() {
        assert!(resolve("8.8.8.8"));
        assert!(resolve("1.1.1.1"));
        assert!(resolve("192.169.0.1"));
    }

    #[test]
    fn test_private_ipv4_skipped() {
        assert!(!resolve("192.168.1.5"));
        assert!(!resolve("127.0.0.1"));
        assert!(!resolve("10.20.30.40"));
        assert!(!resolve("172.16.0.1"));
        assert!(!resolve("172.217.0.1"));
        assert!(!resolve("0.0.0.0"));
    }

    #[test]
    fn test_ipv6() {
        assert!(resolve("2001:4860:4860::8888"));
        assert!(!resolve("::1"));
        assert!(!resolve("::"));
        assert!(!resolve("fe80::1"));
        assert!(!resolve("fd12:3456::1"));
        assert!(!resolve("::ffff:192.168.1.5"));
        assert!(resolve("::ffff:8.8.8.8"));
    }
}
