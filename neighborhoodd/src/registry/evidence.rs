use std::net::IpAddr;
use super::naming::is_placeholder_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceOrigin {
    Listener,
    Router,
}

/// How trustworthy a display name is; later evidence only renames a host
/// with a name of equal or higher rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NameRank {
    Placeholder,
    Router,
    Listener,
}

/// One observation of a host from either discovery source.
#[derive(Debug, Clone)]
pub struct Evidence {
    pub origin: EvidenceOrigin,
    pub name: String,
    pub address: String,
    pub ip: Option<IpAddr>,
    pub port: Option<u16>,
    /// Full mDNS service type, e.g. "_smb._tcp.local."
    pub service_type: Option<String>,
    pub is_printer: bool,
    pub is_mobile: bool,
    pub mac: Option<String>,
    /// Router lease state
    pub is_active: Option<bool>,
    pub interface_type: Option<String>,
}

impl Evidence {
    pub fn new(origin: EvidenceOrigin, name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            origin,
            name: name.into(),
            address: address.into(),
            ip: None,
            port: None,
            service_type: None,
            is_printer: false,
            is_mobile: false,
            mac: None,
            is_active: None,
            interface_type: None,
        }
    }

    pub fn name_rank(&self) -> NameRank {
        if is_placeholder_name(&self.name) {
            NameRank::Placeholder
        } else {
            match self.origin {
                EvidenceOrigin::Router => NameRank::Router,
                EvidenceOrigin::Listener => NameRank::Listener,
            }
        }
    }
}
