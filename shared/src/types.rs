use std::collections::BTreeSet;
use std::net::IpAddr;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use url::Url;
use uuid::Uuid;

/// File-share protocol a host was discovered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareProtocol {
    Smb,
    Afp,
    Sftp,
    Ftp,
}

impl ShareProtocol {
    pub const ALL: [ShareProtocol; 4] = [Self::Smb, Self::Afp, Self::Sftp, Self::Ftp];

    /// mDNS service type without the domain, e.g. "_smb._tcp"
    pub fn service_type(self) -> &'static str {
        match self {
            Self::Smb => "_smb._tcp",
            Self::Afp => "_afpovertcp._tcp",
            Self::Sftp => "_sftp-ssh._tcp",
            Self::Ftp => "_ftp._tcp",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Smb => "SMB",
            Self::Afp => "AFP",
            Self::Sftp => "SFTP",
            Self::Ftp => "FTP",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Self::Smb => 445,
            Self::Afp => 548,
            Self::Sftp => 22,
            Self::Ftp => 21,
        }
    }

    /// Higher wins when a host advertises several protocols.
    pub fn rank(self) -> u8 {
        match self {
            Self::Smb => 4,
            Self::Afp => 3,
            Self::Sftp => 2,
            Self::Ftp => 1,
        }
    }

    /// Match a full or partial mDNS type string ("_smb._tcp.local.").
    pub fn from_service_type(service_type: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| service_type.contains(p.service_type()))
    }
}

/// Coarse host category used for grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    FileServer,
    Printer,
    Mobile,
    Generic,
}

/// Fine-grained hardware/OS category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceClass {
    Mac,
    WindowsPc,
    LinuxServer,
    Nas,
    Router,
    Printer,
    Phone,
    Tablet,
    MediaBox,
    /// IoT gear without a useful identity (UUID names, robot vacuums)
    Embedded,
    #[default]
    Unknown,
}

impl DeviceClass {
    pub fn is_unknown(self) -> bool {
        self == Self::Unknown
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Mac => "Mac",
            Self::WindowsPc => "PC",
            Self::LinuxServer => "Linux",
            Self::Nas => "NAS",
            Self::Router => "Router",
            Self::Printer => "Printer",
            Self::Phone => "Phone",
            Self::Tablet => "Tablet",
            Self::MediaBox => "Media box",
            Self::Embedded => "Device",
            Self::Unknown => "",
        }
    }

    /// Whether the host can be browsed for shares.
    pub fn is_expandable(self) -> bool {
        !matches!(
            self,
            Self::Printer | Self::Router | Self::Phone | Self::Tablet | Self::MediaBox | Self::Embedded
        )
    }

    /// Classes whose admin UI lives at a conventional URL.
    pub fn has_conventional_web_ui(self) -> bool {
        matches!(self, Self::Router | Self::Printer)
    }
}

/// A share exported by a host. Filled in by the share-enumeration collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub name: String,
    pub protocol: ShareProtocol,
}

/// A discovered device on the local network.
/// This is the canonical record served by the daemon's API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    /// Opaque identity, stable while the record lives
    pub id: Uuid,

    /// Display name, e.g. "Office-NAS"
    pub name: String,

    /// Deduplication identity derived from the display name, e.g. "office-nas"
    pub key: String,

    /// Hostname or literal IP; a "MAC@IPv6" placeholder until a mobile device resolves
    pub address: String,

    /// Literal IP learned from the router or from mDNS resolution
    pub ip: Option<IpAddr>,

    pub port: Option<u16>,

    pub service_type: Option<ShareProtocol>,

    pub node_type: NodeType,

    pub device_class: DeviceClass,

    /// Every mDNS service type seen for this host
    pub advertised_service_types: BTreeSet<String>,

    pub mac_address: Option<String>,

    /// Router-reported link type ("802.11", "Ethernet")
    pub interface_type: Option<String>,

    pub is_localhost: bool,

    /// Router reports the DHCP lease as inactive
    pub is_offline: bool,

    pub discovered_web_url: Option<Url>,

    /// Ports that answered the fingerprint probe
    pub open_ports: BTreeSet<u16>,

    /// `<title>` of the host's root web page, if any
    pub http_banner: Option<String>,

    pub shares: Vec<Share>,
    pub shares_loaded: bool,
    pub shares_loading: bool,

    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Phase of the discovery lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanPhase {
    Idle,
    Scanning,
    Fingerprinting,
    WebProbing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStatus {
    pub phase: ScanPhase,

    /// Incremented on every scan start
    pub generation: u64,

    pub started_at: Option<DateTime<Utc>>,
}

impl Default for ScanStatus {
    fn default() -> Self {
        Self {
            phase: ScanPhase::Idle,
            generation: 0,
            started_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_names() {
        let names: Vec<&str> = ShareProtocol::ALL.iter().map(|p| p.display_name()).collect();
        assert_eq!(names, vec!["SMB", "AFP", "SFTP", "FTP"]);
        assert_eq!(ShareProtocol::from_service_type("_afpovertcp._tcp.local."), Some(ShareProtocol::Afp));
    }

    #[test]
    fn test_class_labels() {
        assert_eq!(DeviceClass::WindowsPc.label(), "PC");
        assert_eq!(DeviceClass::MediaBox.label(), "Media box");
        assert!(DeviceClass::Unknown.label().is_empty());
    }
}
