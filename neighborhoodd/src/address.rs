use std::net::IpAddr;
use shared::types::Host;

/// Separates the MAC from the IPv6 part of a not-yet-resolved mobile device
pub const PLACEHOLDER_MARKER: char = '@';

/// How much an address string can be trusted to reach the host.
/// Variants are ordered worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AddressQuality {
    Empty,
    Placeholder,
    /// Single-label name that may not resolve
    Bare,
    Ip,
    /// Dotted DNS name ("nas.local"), stable across DHCP renewals
    Hostname,
}

pub fn address_quality(address: &str) -> AddressQuality {
    let address = address.trim();
    if address.is_empty() {
        AddressQuality::Empty
    } else if address.contains(PLACEHOLDER_MARKER) {
        AddressQuality::Placeholder
    } else if address.parse::<IpAddr>().is_ok()
        || address.starts_with(|c: char| c.is_ascii_digit())
    {
        AddressQuality::Ip
    } else if address.contains('.') {
        AddressQuality::Hostname
    } else {
        AddressQuality::Bare
    }
}

/// Whether `candidate` should replace `current` as a host's address.
/// Only real IPs and dotted names replace a set address; equal quality is
/// settled by string order so the result does not depend on arrival order.
pub fn is_better_address(candidate: &str, current: &str) -> bool {
    let new = address_quality(candidate);
    let old = address_quality(current);
    if old == AddressQuality::Empty {
        return new > AddressQuality::Empty;
    }
    new >= AddressQuality::Ip && (new > old || (new == old && candidate < current))
}

/// IPv4 over IPv6, then the lower address.
pub fn is_better_ip(candidate: IpAddr, current: IpAddr) -> bool {
    (candidate.is_ipv4(), std::cmp::Reverse(candidate)) > (current.is_ipv4(), std::cmp::Reverse(current))
}

/// Address to open connections to: the learned IP, else a usable name.
pub fn probe_address(host: &Host) -> Option<String> {
    if let Some(ip) = host.ip {
        return Some(ip.to_string());
    }
    match address_quality(&host.address) {
        AddressQuality::Ip | AddressQuality::Hostname | AddressQuality::Bare => {
            Some(host.address.trim().to_string())
        }
        AddressQuality::Empty | AddressQuality::Placeholder => None,
    }
}

/// Host part of a URL; IPv6 literals need brackets.
pub fn url_host(address: &str) -> String {
    match address.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => format!("[{v6}]"),
        _ => address.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_order() {
        assert_eq!(address_quality(""), AddressQuality::Empty);
        assert_eq!(address_quality("aa:bb:cc:dd:ee:ff@fe80::1"), AddressQuality::Placeholder);
        assert_eq!(address_quality("kitchen"), AddressQuality::Bare);
        assert_eq!(address_quality("192.168.178.20"), AddressQuality::Ip);
        assert_eq!(address_quality("fe80::1"), AddressQuality::Ip);
        assert_eq!(address_quality("nas.local"), AddressQuality::Hostname);
    }

    #[test]
    fn test_placeholder_never_replaces_real_address() {
        assert!(!is_better_address("aa:bb:cc:dd:ee:ff@fe80::1", "192.168.178.20"));
        assert!(!is_better_address("aa:bb:cc:dd:ee:ff@fe80::1", "iphone.local"));
        assert!(is_better_address("192.168.178.20", "aa:bb:cc:dd:ee:ff@fe80::1"));
    }

    #[test]
    fn test_better_address_is_order_independent() {
        let a = "nas.local";
        let b = "192.168.178.20";
        assert!(is_better_address(a, b));
        assert!(!is_better_address(b, a));

        let c = "192.168.178.21";
        assert_ne!(is_better_address(b, c), is_better_address(c, b));
        assert!(!is_better_address(b, b));
    }

    #[test]
    fn test_bare_name_only_fills_empty() {
        assert!(is_better_address("kitchen", ""));
        assert!(!is_better_address("kitchen", "aa:bb@fe80::1"));
    }

    #[test]
    fn test_prefers_ipv4() {
        let v4: IpAddr = "192.168.1.9".parse().unwrap();
        let v6: IpAddr = "fe80::1".parse().unwrap();
        assert!(is_better_ip(v4, v6));
        assert!(!is_better_ip(v6, v4));
        assert!(is_better_ip("192.168.1.2".parse().unwrap(), v4));
    }

    #[test]
    fn test_url_host() {
        assert_eq!(url_host("192.168.1.10"), "192.168.1.10");
        assert_eq!(url_host("fe80::1"), "[fe80::1]");
        assert_eq!(url_host("nas.local"), "nas.local");
    }
}
