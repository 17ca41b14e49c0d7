use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use anyhow::{Context, Result};
use shared::protocol;
use shared::types::DeviceClass;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub fingerprint: FingerprintConfig,
    #[serde(default)]
    pub web_probe: WebProbeConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_control_url")]
    pub control_url: String,
    /// Service urn used both in the envelope and the SOAPAction header
    #[serde(default = "default_service_namespace")]
    pub service_namespace: String,
    #[serde(default = "default_router_timeout")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_service_types")]
    pub service_types: Vec<String>,
    /// Hard ceiling after which a scan stops on its own
    #[serde(default = "default_scan_ceiling")]
    pub scan_ceiling_ms: u64,
    #[serde(default = "default_resolve_timeout")]
    pub resolve_timeout_ms: u64,
    /// Restrict mDNS to one interface; all interfaces when unset
    #[serde(default)]
    pub interface: Option<String>,
    /// Extra addresses of this machine, excluded from the registry
    #[serde(default)]
    pub local_addresses: Vec<IpAddr>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FingerprintConfig {
    #[serde(default = "default_probe_ports")]
    pub probe_ports: Vec<u16>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_title_timeout")]
    pub title_timeout_ms: u64,
    /// Class implied by an open AFP port; "unknown" disables the rule
    #[serde(default = "default_afp_port_class")]
    pub afp_port_class: DeviceClass,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebProbeConfig {
    #[serde(default = "default_web_ports")]
    pub ports: Vec<u16>,
    #[serde(default = "default_tls_ports")]
    pub tls_ports: Vec<u16>,
    #[serde(default = "default_web_timeout")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_true() -> bool {
    true
}

fn default_control_url() -> String {
    "http://fritz.box:49000/upnp/control/hosts".to_string()
}

fn default_service_namespace() -> String {
    "urn:dslforum-org:service:Hosts:1".to_string()
}

fn default_router_timeout() -> u64 {
    5000
}

fn default_service_types() -> Vec<String> {
    [
        protocol::SMB_SERVICE_TYPE,
        protocol::AFP_SERVICE_TYPE,
        protocol::SFTP_SERVICE_TYPE,
        protocol::FTP_SERVICE_TYPE,
        protocol::IPP_SERVICE_TYPE,
        protocol::IPPS_SERVICE_TYPE,
        protocol::LPR_SERVICE_TYPE,
        protocol::PDL_SERVICE_TYPE,
        protocol::MOBILE_SERVICE_TYPE,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_scan_ceiling() -> u64 {
    14_000
}

fn default_resolve_timeout() -> u64 {
    10_000
}

fn default_probe_ports() -> Vec<u16> {
    vec![22, 80, 443, 445, 548, 21, 631]
}

fn default_connect_timeout() -> u64 {
    1500
}

fn default_title_timeout() -> u64 {
    2500
}

fn default_afp_port_class() -> DeviceClass {
    DeviceClass::Mac
}

fn default_web_ports() -> Vec<u16> {
    vec![
        // device admin
        80, 443, 8080, 8443, 631, 8081, 8888, 7070,
        // local development servers
        3000, 3001, 4000, 4200, 5000, 5001, 5173, 8000, 8008, 8083, 8123, 9000, 9090,
    ]
}

fn default_tls_ports() -> Vec<u16> {
    vec![443, 8443, 5001]
}

fn default_web_timeout() -> u64 {
    1500
}

fn default_listen() -> String {
    "127.0.0.1:8054".to_string()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            control_url: default_control_url(),
            service_namespace: default_service_namespace(),
            timeout_ms: default_router_timeout(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            service_types: default_service_types(),
            scan_ceiling_ms: default_scan_ceiling(),
            resolve_timeout_ms: default_resolve_timeout(),
            interface: None,
            local_addresses: Vec::new(),
        }
    }
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            probe_ports: default_probe_ports(),
            connect_timeout_ms: default_connect_timeout(),
            title_timeout_ms: default_title_timeout(),
            afp_port_class: default_afp_port_class(),
        }
    }
}

impl Default for WebProbeConfig {
    fn default() -> Self {
        Self {
            ports: default_web_ports(),
            tls_ports: default_tls_ports(),
            timeout_ms: default_web_timeout(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl RouterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl DiscoveryConfig {
    pub fn scan_ceiling(&self) -> Duration {
        Duration::from_millis(self.scan_ceiling_ms)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }
}

impl FingerprintConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn title_timeout(&self) -> Duration {
        Duration::from_millis(self.title_timeout_ms)
    }
}

impl WebProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }
}
