use std::collections::BTreeSet;
use std::net::IpAddr;
use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use shared::types::{DeviceClass, Host, NodeType, Share, ShareProtocol};
use url::Url;

/// Stable fields only; first_seen/last_seen move on every merge without
/// changing what a client would render.
#[derive(Serialize)]
struct HashView<'a> {
    name: &'a str,
    address: &'a str,
    ip: Option<IpAddr>,
    port: Option<u16>,
    service_type: Option<ShareProtocol>,
    node_type: NodeType,
    device_class: DeviceClass,
    advertised_service_types: &'a BTreeSet<String>,
    mac_address: Option<&'a str>,
    interface_type: Option<&'a str>,
    is_offline: bool,
    discovered_web_url: Option<&'a Url>,
    open_ports: &'a BTreeSet<u16>,
    http_banner: Option<&'a str>,
    shares: &'a [Share],
    shares_loaded: bool,
    shares_loading: bool,
}

/// SHA-256 over the host list. The list is hashed in its canonical
/// (name-sorted) order.
pub fn compute_hash(hosts: &[Host]) -> Result<String> {
    let views: Vec<HashView<'_>> = hosts
        .iter()
        .map(|h| HashView {
            name: &h.name,
            address: &h.address,
            ip: h.ip,
            port: h.port,
            service_type: h.service_type,
            node_type: h.node_type,
            device_class: h.device_class,
            advertised_service_types: &h.advertised_service_types,
            mac_address: h.mac_address.as_deref(),
            interface_type: h.interface_type.as_deref(),
            is_offline: h.is_offline,
            discovered_web_url: h.discovered_web_url.as_ref(),
            open_ports: &h.open_ports,
            http_banner: h.http_banner.as_deref(),
            shares: &h.shares,
            shares_loaded: h.shares_loaded,
            shares_loading: h.shares_loading,
        })
        .collect();

    let json = serde_json::to_string(&views).context("Failed to serialize hosts for hashing")?;
    Ok(hex::encode(Sha256::digest(json.as_bytes())))
}
