use std::collections::BTreeSet;
use shared::protocol::PRINTER_SERVICE_TYPES;
use shared::types::DeviceClass;

const MOBILE_SERVICE: &str = "_apple-mobdev2._tcp";
const FILE_SHARE_SERVICES: [&str; 2] = ["_smb._tcp", "_afpovertcp._tcp"];
const REMOTE_SHELL_SERVICES: [&str; 2] = ["_sftp-ssh._tcp", "_ssh._tcp"];
const FTP_SERVICE: &str = "_ftp._tcp";

// Vendor tables are checked before the generic ones: "fritz-nas" is a router
// share, not a NAS, and a set-top box must not fall through to a PC rule.
const ROUTER_KEYWORDS: &[&str] = &[
    "fritz", "router", "gateway", "speedport", "easybox", "dsl-router",
    "technicolor", "vodafone box", "vodafone-box", "o2 box", "o2-box",
];
const NAS_KEYWORDS: &[&str] = &[
    "synology", "qnap", "buffalo", "wd my cloud", "wdmycloud", "mycloud",
    "readynas", "diskstation", "terramaster", "asustor",
];
const MEDIA_KEYWORDS: &[&str] = &[
    "vuduo", "vu+", "dreambox", "enigma2", "apple-tv", "appletv", "apple tv",
    "firetv", "fire-tv", "roku", "chromecast", "sonos", "kodi", "libreelec",
    "osmc", "mediabox", "media-box", "set-top", "settop", "magentatv",
];
const PHONE_KEYWORDS: &[&str] = &["iphone", "android", "galaxy", "pixel"];
const TABLET_KEYWORDS: &[&str] = &["ipad"];
const MAC_KEYWORDS: &[&str] = &[
    "macbook", "imac", "mac-mini", "macmini", "mac-pro", "macpro", "mac-studio", "macstudio",
];
const WINDOWS_PREFIXES: &[&str] = &["desktop-", "laptop-", "win-"];
const LINUX_KEYWORDS: &[&str] = &["ubuntu", "debian", "raspberrypi", "fedora", "archlinux", "linux"];

const PRINTER_BRANDS: &[&str] = &["brother", "epson", "canon", "kyocera", "lexmark", "xerox", "ricoh"];
const VACUUM_PREFIXES: &[&str] = &["roborock", "rockrobo", "roomba", "irobot", "ecovacs", "deebot", "dreame"];

fn has_service(types: &BTreeSet<String>, wanted: &str) -> bool {
    types.iter().any(|t| t.contains(wanted))
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn has_token(haystack: &str, token: &str) -> bool {
    haystack
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|t| t == token)
}

/// Strategy 1: the advertised service set alone.
pub fn classify_by_services(types: &BTreeSet<String>) -> Option<DeviceClass> {
    if has_service(types, MOBILE_SERVICE) {
        return Some(DeviceClass::Phone);
    }
    if PRINTER_SERVICE_TYPES.iter().any(|p| has_service(types, p)) {
        return Some(DeviceClass::Printer);
    }
    let file_share = FILE_SHARE_SERVICES.iter().any(|s| has_service(types, s));
    let remote_shell = REMOTE_SHELL_SERVICES.iter().any(|s| has_service(types, s));
    if file_share && remote_shell {
        return Some(DeviceClass::Mac);
    }
    if (remote_shell || has_service(types, FTP_SERVICE)) && !file_share {
        return Some(DeviceClass::LinuxServer);
    }
    // File sharing alone fits every desktop OS and most NAS boxes
    None
}

/// Vendor keywords shared by the name rules and the banner rules.
fn classify_by_vendor(text: &str) -> Option<DeviceClass> {
    if contains_any(text, ROUTER_KEYWORDS) {
        Some(DeviceClass::Router)
    } else if contains_any(text, NAS_KEYWORDS) || has_token(text, "nas") {
        Some(DeviceClass::Nas)
    } else if contains_any(text, MEDIA_KEYWORDS) {
        Some(DeviceClass::MediaBox)
    } else {
        None
    }
}

/// Strategy 2: display name and hostname substrings.
pub fn classify_by_name(name: &str, hostname: &str) -> Option<DeviceClass> {
    let text = format!("{} {}", name.to_lowercase(), hostname.to_lowercase());

    if let Some(class) = classify_by_vendor(&text) {
        return Some(class);
    }
    if contains_any(&text, TABLET_KEYWORDS) {
        return Some(DeviceClass::Tablet);
    }
    if contains_any(&text, PHONE_KEYWORDS) {
        return Some(DeviceClass::Phone);
    }
    if contains_any(&text, MAC_KEYWORDS) {
        return Some(DeviceClass::Mac);
    }
    let lower_name = name.to_lowercase();
    let lower_host = hostname.to_lowercase();
    if WINDOWS_PREFIXES
        .iter()
        .any(|p| lower_name.starts_with(p) || lower_host.starts_with(p))
        || text.contains("windows")
    {
        return Some(DeviceClass::WindowsPc);
    }
    if contains_any(&text, LINUX_KEYWORDS) {
        return Some(DeviceClass::LinuxServer);
    }
    if is_uuid_shaped(name) || is_uuid_shaped(hostname.split('.').next().unwrap_or_default()) {
        return Some(DeviceClass::Embedded);
    }
    None
}

/// Five dash-separated groups, the first two 8 and 4 characters long.
pub fn is_uuid_shaped(name: &str) -> bool {
    let groups: Vec<&str> = name.split('-').collect();
    groups.len() == 5 && groups[0].len() == 8 && groups[1].len() == 4
}

/// Prefix/suffix rules for names that the keyword tables leave generic.
pub fn classify_by_name_fallback(name: &str) -> Option<DeviceClass> {
    let lower = name.trim().to_lowercase();
    if is_hp_printer_name(&lower) || PRINTER_BRANDS.iter().any(|b| lower.starts_with(b)) {
        return Some(DeviceClass::Printer);
    }
    if VACUUM_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return Some(DeviceClass::Embedded);
    }
    if lower.contains("repeater") {
        return Some(DeviceClass::Router);
    }
    None
}

/// "HP LaserJet", "HP-Envy", or the DHCP default "HPE8D0A1"
fn is_hp_printer_name(lower: &str) -> bool {
    let Some(rest) = lower.strip_prefix("hp") else {
        return false;
    };
    match rest.chars().next() {
        None => true,
        Some(c) if !c.is_ascii_alphanumeric() => true,
        Some(_) => rest.len() == 6 && rest.chars().all(|c| c.is_ascii_hexdigit()),
    }
}

/// A phone whose names say iPad is a tablet. Any other class is returned as is.
pub fn refine_mobile(class: DeviceClass, text: &str) -> DeviceClass {
    if class == DeviceClass::Phone && contains_any(&text.to_lowercase(), TABLET_KEYWORDS) {
        DeviceClass::Tablet
    } else {
        class
    }
}

/// Strategies 1 and 2 plus the name fallbacks, as used when evidence is merged.
pub fn classify_evidence(types: &BTreeSet<String>, name: &str, hostname: &str) -> DeviceClass {
    if let Some(class) = classify_by_services(types) {
        return refine_mobile(class, &format!("{} {}", name, hostname));
    }
    classify_by_name(name, hostname)
        .or_else(|| classify_by_name_fallback(name))
        .unwrap_or_default()
}

/// Strategy 3: open ports and HTTP banner from an active probe.
pub fn classify_probe(
    name: &str,
    ports: &BTreeSet<u16>,
    banner: Option<&str>,
    afp_port_class: DeviceClass,
) -> DeviceClass {
    let text = format!("{} {}", name, banner.unwrap_or_default()).to_lowercase();
    if let Some(class) = classify_by_vendor(&text) {
        return class;
    }

    let has = |port: u16| ports.contains(&port);
    if has(22) && has(80) && has(445) {
        return DeviceClass::Nas;
    }
    if has(548) && !afp_port_class.is_unknown() {
        return afp_port_class;
    }
    if has(22) && has(445) {
        return DeviceClass::Mac;
    }
    if has(445) {
        return DeviceClass::WindowsPc;
    }
    if has(22) {
        return DeviceClass::LinuxServer;
    }
    if has(80) || has(443) {
        return DeviceClass::Router;
    }
    DeviceClass::Unknown
}
