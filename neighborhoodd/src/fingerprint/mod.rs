//! Device classification from advertised services, names, and, as a last
//! resort, an active port and banner probe.

pub mod probe;
pub mod rules;

use std::collections::BTreeSet;
use std::time::Duration;
use anyhow::{Context, Result};
use shared::types::{DeviceClass, Host};
use crate::address::{probe_address, url_host};
use crate::config::FingerprintConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fingerprint {
    pub device_class: DeviceClass,
    pub open_ports: BTreeSet<u16>,
    pub http_banner: Option<String>,
}

impl Fingerprint {
    fn from_class(device_class: DeviceClass) -> Self {
        Self {
            device_class,
            ..Self::default()
        }
    }
}

#[derive(Clone)]
pub struct Fingerprinter {
    http: reqwest::Client,
    ports: Vec<u16>,
    connect_timeout: Duration,
    afp_port_class: DeviceClass,
}

impl Fingerprinter {
    pub fn new(config: &FingerprintConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.title_timeout())
            .build()
            .context("Failed to build banner HTTP client")?;

        Ok(Self {
            http,
            ports: config.probe_ports.clone(),
            connect_timeout: config.connect_timeout(),
            afp_port_class: config.afp_port_class,
        })
    }

    /// Run the three strategies in order, stopping at the first hit.
    pub async fn probe(&self, host: &Host) -> Fingerprint {
        if let Some(class) = rules::classify_by_services(&host.advertised_service_types)
            .or_else(|| rules::classify_by_name(&host.name, &host.address))
        {
            return Fingerprint::from_class(class);
        }

        let Some(address) = probe_address(host) else {
            tracing::debug!("No probe address for {}", host.name);
            return Fingerprint::default();
        };

        let open_ports = probe::scan_ports(&address, &self.ports, self.connect_timeout).await;
        tracing::debug!("{} open ports: {:?}", host.name, open_ports);

        let http_banner = if open_ports.contains(&80) {
            probe::fetch_title(&self.http, &format!("http://{}/", url_host(&address))).await
        } else {
            None
        };
        if let Some(banner) = &http_banner {
            tracing::debug!("{} HTTP title: {}", host.name, banner);
        }

        let device_class = rules::classify_probe(
            &host.name,
            &open_ports,
            http_banner.as_deref(),
            self.afp_port_class,
        );
        if !device_class.is_unknown() {
            tracing::debug!("{} answers like a {}", host.name, device_class.label());
        }

        Fingerprint {
            device_class,
            open_ports,
            http_banner,
        }
    }
}
