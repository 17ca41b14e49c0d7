//! Multicast DNS discovery and the mapping from browse events to host
//! evidence.

pub mod browser;

use shared::protocol::{MOBILE_SERVICE_TYPE, PRINTER_SERVICE_TYPES};
use crate::address::is_better_ip;
use crate::registry::naming::{mac_from_instance, placeholder_name};
use crate::registry::{Evidence, EvidenceOrigin};
pub use browser::{run_browser, BrowserEvent, ResolvedService};

const MOBILE_HOSTNAME_HINTS: [&str; 2] = ["iphone", "ipad"];

/// "Office NAS._smb._tcp.local." -> "Office NAS"
pub fn instance_name<'a>(fullname: &'a str, service_type: &str) -> &'a str {
    fullname
        .strip_suffix(service_type)
        .map(|s| s.trim_end_matches('.'))
        .unwrap_or(fullname)
}

fn is_mobile_type(service_type: &str) -> bool {
    service_type == MOBILE_SERVICE_TYPE
}

fn is_printer_type(service_type: &str) -> bool {
    PRINTER_SERVICE_TYPES.iter().any(|p| service_type.contains(p))
}

/// Mobile devices advertise before they resolve; give them a placeholder
/// record keyed by the MAC in the instance name.
pub fn found_evidence(service_type: &str, fullname: &str) -> Option<Evidence> {
    if !is_mobile_type(service_type) {
        return None;
    }
    let instance = instance_name(fullname, service_type);
    let mac = mac_from_instance(instance)?;

    let mut evidence = Evidence::new(EvidenceOrigin::Listener, placeholder_name(&mac), instance);
    evidence.service_type = Some(service_type.to_string());
    evidence.is_mobile = true;
    evidence.mac = Some(mac);
    Some(evidence)
}

/// Label for a resolved mobile device: its hostname stem when that says
/// iPhone or iPad, else the MAC placeholder.
fn mobile_label(hostname: &str, mac: Option<&str>, instance: &str) -> String {
    let stem = hostname.trim_end_matches('.').split('.').next().unwrap_or_default();
    let lower = stem.to_lowercase();
    if MOBILE_HOSTNAME_HINTS.iter().any(|h| lower.contains(h)) {
        return stem.to_string();
    }
    match mac {
        Some(mac) => placeholder_name(mac),
        None => instance.to_string(),
    }
}

pub fn resolved_evidence(service: &ResolvedService) -> Evidence {
    let instance = instance_name(&service.fullname, &service.service_type);
    let hostname = service.hostname.trim_end_matches('.');
    let ip = service
        .addresses
        .iter()
        .copied()
        .reduce(|best, ip| if is_better_ip(ip, best) { ip } else { best });

    let address = if hostname.is_empty() {
        ip.map(|ip| ip.to_string()).unwrap_or_default()
    } else {
        hostname.to_string()
    };

    let mobile = is_mobile_type(&service.service_type);
    let mac = mobile.then(|| mac_from_instance(instance)).flatten();
    let name = if mobile {
        mobile_label(hostname, mac.as_deref(), instance)
    } else {
        instance.to_string()
    };

    let mut evidence = Evidence::new(EvidenceOrigin::Listener, name, address);
    evidence.ip = ip;
    evidence.port = Some(service.port).filter(|p| *p != 0);
    evidence.service_type = Some(service.service_type.clone());
    evidence.is_mobile = mobile;
    evidence.mac = mac;
    evidence.is_printer = is_printer_type(&service.service_type);
    evidence
}

/// Name of the host a removal event refers to
pub fn removed_name(service_type: &str, fullname: &str) -> String {
    let instance = instance_name(fullname, service_type);
    if is_mobile_type(service_type) {
        if let Some(mac) = mac_from_instance(instance) {
            return placeholder_name(&mac);
        }
    }
    instance.to_string()
}
