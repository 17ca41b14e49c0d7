/// Domain suffixes that do not distinguish hosts on the local segment
const KNOWN_SUFFIXES: &[&str] = &[".local", ".fritz.box", ".localdomain", ".lan", ".home"];

const PLACEHOLDER_PREFIX: &str = "Apple Device (";

/// Deduplication identity for a display name: lowercased, local domain
/// suffix removed, dots and whitespace folded to dashes.
pub fn normalized_key(name: &str) -> String {
    let mut key = name.trim().trim_end_matches('.').to_lowercase();
    for suffix in KNOWN_SUFFIXES {
        if let Some(stripped) = key.strip_suffix(suffix) {
            key = stripped.to_string();
            break;
        }
    }
    key.split(|c: char| c == '.' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Display name for a mobile device known only by its advertised MAC.
pub fn placeholder_name(mac: &str) -> String {
    let octets: Vec<&str> = mac.split(':').collect();
    let suffix = octets[octets.len().saturating_sub(3)..].join(":");
    format!("{PLACEHOLDER_PREFIX}{})", suffix.to_uppercase())
}

pub fn is_placeholder_name(name: &str) -> bool {
    name.starts_with(PLACEHOLDER_PREFIX)
}

/// MAC prefix of a "aa:bb:cc:dd:ee:ff@fe80::1" mobile instance name.
pub fn mac_from_instance(instance: &str) -> Option<String> {
    let candidate = instance.split('@').next()?;
    let octets: Vec<&str> = candidate.split(':').collect();
    let valid = octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));
    valid.then(|| normalize_mac(candidate))
}

pub fn normalize_mac(mac: &str) -> String {
    mac.trim().replace('-', ":").to_uppercase()
}
