use std::collections::HashSet;
use std::net::IpAddr;
use super::evidence::Evidence;
use super::naming::normalized_key;

/// Names and addresses under which this machine shows up in its own scan.
#[derive(Debug, Clone, Default)]
pub struct LocalIdentity {
    keys: HashSet<String>,
    addresses: HashSet<IpAddr>,
}

impl LocalIdentity {
    pub fn new(names: impl IntoIterator<Item = String>, addresses: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            keys: names
                .into_iter()
                .map(|n| normalized_key(&n))
                .filter(|k| !k.is_empty())
                .collect(),
            addresses: addresses.into_iter().collect(),
        }
    }

    /// Identity from the system hostname plus configured addresses
    pub fn detect(extra_addresses: &[IpAddr]) -> Self {
        let names = match hostname::get() {
            Ok(name) => vec![name.to_string_lossy().to_string()],
            Err(e) => {
                tracing::warn!("Failed to get system hostname: {}", e);
                Vec::new()
            }
        };
        Self::new(names, extra_addresses.iter().copied())
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.keys.contains(&normalized_key(name))
    }

    pub fn matches_address(&self, address: &str) -> bool {
        let address = address.trim();
        if address.eq_ignore_ascii_case("localhost") {
            return true;
        }
        address
            .parse::<IpAddr>()
            .is_ok_and(|ip| self.matches_ip(ip))
    }

    pub fn matches_ip(&self, ip: IpAddr) -> bool {
        ip.is_loopback() || self.addresses.contains(&ip)
    }

    pub fn matches(&self, evidence: &Evidence) -> bool {
        self.matches_name(&evidence.name)
            || self.matches_name(&evidence.address)
            || self.matches_address(&evidence.address)
            || evidence.ip.is_some_and(|ip| self.matches_ip(ip))
    }
}
