use std::collections::{BTreeSet, HashMap};
use chrono::Utc;
use shared::types::{DeviceClass, Host, NodeType, Share, ShareProtocol};
use url::Url;
use uuid::Uuid;
use crate::address::{is_better_address, is_better_ip};
use crate::fingerprint::{rules, Fingerprint};
use super::evidence::{Evidence, EvidenceOrigin, NameRank};
use super::identity::LocalIdentity;
use super::naming::{normalize_mac, normalized_key};

/// Which rule tied a piece of evidence to an existing host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    Key,
    Address,
    Mac,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Created(Uuid),
    Updated(Uuid),
    Unchanged(Uuid),
    /// Evidence describes this machine
    SelfExcluded,
    /// Evidence showed an existing record to be this machine; it is hidden
    /// from now on
    MarkedLocal(Uuid),
    /// Evidence carries no usable name
    Ignored,
}

impl MergeOutcome {
    pub fn changed(self) -> bool {
        matches!(self, Self::Created(_) | Self::Updated(_) | Self::MarkedLocal(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareLoad {
    Started,
    AlreadyLoading,
    NotExpandable,
    NotFound,
}

/// A fresh record with nothing learned yet beyond its name and address.
pub fn blank_host(name: &str, address: &str) -> Host {
    let now = Utc::now();
    Host {
        id: Uuid::new_v4(),
        name: name.to_string(),
        key: normalized_key(name),
        address: address.trim().to_string(),
        ip: None,
        port: None,
        service_type: None,
        node_type: NodeType::Generic,
        device_class: DeviceClass::Unknown,
        advertised_service_types: BTreeSet::new(),
        mac_address: None,
        interface_type: None,
        is_localhost: false,
        is_offline: false,
        discovered_web_url: None,
        open_ports: BTreeSet::new(),
        http_banner: None,
        shares: Vec::new(),
        shares_loaded: false,
        shares_loading: false,
        first_seen: now,
        last_seen: now,
    }
}

struct Entry {
    host: Host,
    name_rank: NameRank,
    mac_from_router: bool,
    printer: bool,
    mobile: bool,
    /// Names and addresses the listener reported for the host
    listener_aliases: BTreeSet<String>,
    /// Names the router reported for the host
    router_names: BTreeSet<String>,
    /// Every key the host was reported under, kept across renames
    keys: BTreeSet<String>,
}

fn joined(words: &BTreeSet<String>) -> String {
    words.iter().cloned().collect::<Vec<_>>().join(" ")
}

impl Entry {
    fn new(evidence: &Evidence) -> Self {
        Self {
            host: blank_host(&evidence.name, &evidence.address),
            name_rank: evidence.name_rank(),
            mac_from_router: false,
            printer: false,
            mobile: false,
            listener_aliases: BTreeSet::new(),
            router_names: BTreeSet::new(),
            keys: BTreeSet::new(),
        }
    }

    fn seen_by_listener(&self) -> bool {
        !self.listener_aliases.is_empty()
    }

    /// Class the evidence supports. Listener services and names decide;
    /// router names may only refine a phone to a tablet or fill a class that
    /// is still unknown.
    fn evidence_class(&self) -> DeviceClass {
        let router_text = joined(&self.router_names);
        let listener_name = if self.name_rank == NameRank::Listener {
            self.host.name.as_str()
        } else {
            ""
        };
        let listener = rules::classify_evidence(
            &self.host.advertised_service_types,
            listener_name,
            &joined(&self.listener_aliases),
        );
        if !listener.is_unknown() {
            return rules::refine_mobile(listener, &router_text);
        }
        if !self.host.device_class.is_unknown() {
            return DeviceClass::Unknown;
        }
        let router_name = self.router_names.iter().next().map(String::as_str).unwrap_or_default();
        rules::classify_evidence(&BTreeSet::new(), router_name, &router_text)
    }

    /// Recompute class and node type from the accumulated evidence. A result
    /// of `Unknown` never replaces a specific class.
    fn reclassify(&mut self) -> bool {
        let mut changed = false;
        let class = self.evidence_class();
        if !class.is_unknown() && class != self.host.device_class {
            tracing::debug!(
                "{} classified as {:?} (was {:?})",
                self.host.name,
                class,
                self.host.device_class
            );
            self.host.device_class = class;
            changed = true;
        }

        let node_type = self.node_type();
        if node_type != self.host.node_type {
            self.host.node_type = node_type;
            changed = true;
        }
        changed
    }

    fn node_type(&self) -> NodeType {
        let class = self.host.device_class;
        if self.printer || class == DeviceClass::Printer {
            NodeType::Printer
        } else if self.mobile || matches!(class, DeviceClass::Phone | DeviceClass::Tablet) {
            NodeType::Mobile
        } else if self.host.service_type.is_some() {
            NodeType::FileServer
        } else {
            NodeType::Generic
        }
    }

    /// Fold evidence into the record. Returns true when any field changed.
    fn absorb(&mut self, evidence: &Evidence) -> bool {
        let host = &mut self.host;
        let mut changed = false;

        if let Some(service_type) = &evidence.service_type {
            changed |= host.advertised_service_types.insert(service_type.clone());
        }
        if evidence.is_printer && !self.printer {
            self.printer = true;
            changed = true;
        }
        if evidence.is_mobile && !self.mobile {
            self.mobile = true;
            changed = true;
        }
        self.keys.insert(normalized_key(&evidence.name));
        match evidence.origin {
            EvidenceOrigin::Listener => {
                changed |= self.listener_aliases.insert(evidence.name.clone());
                if !evidence.address.trim().is_empty() {
                    changed |= self.listener_aliases.insert(evidence.address.trim().to_string());
                }
            }
            EvidenceOrigin::Router => {
                changed |= self.router_names.insert(evidence.name.clone());
            }
        }

        if is_better_address(&evidence.address, &host.address) {
            host.address = evidence.address.trim().to_string();
            changed = true;
        }

        if let Some(ip) = evidence.ip {
            if host.ip.map_or(true, |current| is_better_ip(ip, current)) {
                host.ip = Some(ip);
                changed = true;
            }
        }

        if let Some(protocol) = evidence.service_type.as_deref().and_then(ShareProtocol::from_service_type) {
            let port = evidence.port.unwrap_or_else(|| protocol.default_port());
            let better = match host.service_type {
                None => true,
                Some(current) => {
                    protocol.rank() > current.rank()
                        || (protocol == current && host.port.map_or(true, |p| port < p))
                }
            };
            if better {
                host.service_type = Some(protocol);
                host.port = Some(port);
                changed = true;
            }
        }

        if let Some(mac) = evidence.mac.as_deref().map(normalize_mac) {
            let adopt = match evidence.origin {
                EvidenceOrigin::Router => !self.mac_from_router,
                EvidenceOrigin::Listener => host.mac_address.is_none(),
            };
            if adopt {
                if evidence.origin == EvidenceOrigin::Router {
                    self.mac_from_router = true;
                }
                if host.mac_address.as_deref() != Some(mac.as_str()) {
                    host.mac_address = Some(mac);
                    changed = true;
                }
            }
        }

        if evidence.origin == EvidenceOrigin::Router {
            if evidence.is_active == Some(false) && !host.is_offline {
                host.is_offline = true;
                changed = true;
            }
            if host.interface_type.is_none() && evidence.interface_type.is_some() {
                host.interface_type = evidence.interface_type.clone();
                changed = true;
            }
        }

        host.last_seen = Utc::now();
        changed
    }
}

/// The canonical host list and the indices used to match new evidence.
/// Not thread-safe; owned by the registry actor.
pub struct HostTable {
    entries: Vec<Entry>,
    by_key: HashMap<String, usize>,
    by_address: HashMap<String, usize>,
    by_mac: HashMap<String, usize>,
    generation: u64,
    identity: LocalIdentity,
}

impl HostTable {
    pub fn new(identity: LocalIdentity) -> Self {
        Self {
            entries: Vec::new(),
            by_key: HashMap::new(),
            by_address: HashMap::new(),
            by_mac: HashMap::new(),
            generation: 0,
            identity,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Drop every host and start accepting evidence for `generation`.
    pub fn reset(&mut self, generation: u64) {
        self.entries.clear();
        self.reindex();
        self.generation = generation;
    }

    /// Find the existing host a piece of evidence describes, trying the
    /// normalized key, then any known address or IP, then the MAC.
    ///
    /// Two router leases never match by address: the router keeps stale
    /// leases whose IPs DHCP has since handed to other devices.
    pub fn match_candidate(&self, evidence: &Evidence) -> Option<(usize, MatchStrategy)> {
        let key = normalized_key(&evidence.name);
        if let Some(&index) = self.by_key.get(&key) {
            return Some((index, MatchStrategy::Key));
        }

        let address = evidence.address.trim().to_lowercase();
        let by_address = (!address.is_empty())
            .then(|| self.by_address.get(&address))
            .flatten()
            .or_else(|| evidence.ip.and_then(|ip| self.by_address.get(&ip.to_string())))
            .filter(|&&index| {
                evidence.origin == EvidenceOrigin::Listener || self.entries[index].seen_by_listener()
            });
        if let Some(&index) = by_address {
            return Some((index, MatchStrategy::Address));
        }

        // Also catches a mobile device still listed under its placeholder
        evidence
            .mac
            .as_deref()
            .and_then(|mac| self.by_mac.get(&normalize_mac(mac)))
            .map(|&index| (index, MatchStrategy::Mac))
    }

    pub fn merge(&mut self, evidence: &Evidence) -> MergeOutcome {
        if self.identity.matches(evidence) {
            return self.mark_local(evidence);
        }
        if normalized_key(&evidence.name).is_empty() {
            return MergeOutcome::Ignored;
        }

        let outcome = match self.match_candidate(evidence) {
            Some((index, strategy)) => {
                let mut changed = self.entries[index].absorb(evidence);
                changed |= self.maybe_rename(index, evidence);
                changed |= self.entries[index].reclassify();
                let id = self.entries[index].host.id;
                tracing::debug!("Merged {} into {} by {:?}", evidence.name, self.entries[index].host.name, strategy);
                if changed {
                    MergeOutcome::Updated(id)
                } else {
                    MergeOutcome::Unchanged(id)
                }
            }
            None => {
                let mut entry = Entry::new(evidence);
                entry.absorb(evidence);
                entry.reclassify();
                let id = entry.host.id;
                tracing::debug!(
                    "New host {} ({:?}) at {}",
                    entry.host.name,
                    entry.host.device_class,
                    entry.host.address
                );
                self.entries.push(entry);
                MergeOutcome::Created(id)
            }
        };

        if outcome.changed() {
            self.sort_and_reindex();
        }
        outcome
    }

    /// Self evidence never creates or updates a record, but a record it
    /// matches was this machine all along and is hidden.
    fn mark_local(&mut self, evidence: &Evidence) -> MergeOutcome {
        if let Some((index, _)) = self.match_candidate(evidence) {
            let host = &mut self.entries[index].host;
            if !host.is_localhost {
                tracing::info!("{} is this machine, hiding it", host.name);
                host.is_localhost = true;
                return MergeOutcome::MarkedLocal(host.id);
            }
        }
        tracing::debug!("Ignoring evidence for this machine: {}", evidence.name);
        MergeOutcome::SelfExcluded
    }

    /// Adopt the evidence name when it outranks the current one. Equal ranks
    /// settle on the smaller name so arrival order does not matter.
    fn maybe_rename(&mut self, index: usize, evidence: &Evidence) -> bool {
        let rank = evidence.name_rank();
        let entry = &self.entries[index];
        let current = &entry.host.name;
        let outranks = rank > entry.name_rank
            || (rank == entry.name_rank
                && (evidence.name.to_lowercase(), &evidence.name) < (current.to_lowercase(), current));
        if !outranks {
            return false;
        }

        let key = normalized_key(&evidence.name);
        if self.by_key.get(&key).is_some_and(|&other| other != index) {
            // Another record already owns that name
            return false;
        }

        let entry = &mut self.entries[index];
        tracing::debug!("Renaming {} to {}", entry.host.name, evidence.name);
        entry.host.name = evidence.name.clone();
        entry.host.key = key;
        entry.name_rank = rank;
        true
    }

    /// Service departure: drop the host advertised under `name`, even when
    /// the host has since been renamed.
    pub fn remove_by_name(&mut self, name: &str) -> Option<Host> {
        let key = normalized_key(name);
        let index = self
            .by_key
            .get(&key)
            .copied()
            .or_else(|| self.entries.iter().position(|e| e.keys.contains(&key)))?;
        let entry = self.entries.remove(index);
        self.reindex();
        Some(entry.host)
    }

    /// Store an active-probe result. The class is only taken while the host
    /// is still unknown.
    pub fn apply_fingerprint(&mut self, id: Uuid, fingerprint: Fingerprint) -> bool {
        let Some(entry) = self.entry_mut(id) else {
            return false;
        };
        let host = &mut entry.host;
        let mut changed = false;
        if host.device_class.is_unknown() && !fingerprint.device_class.is_unknown() {
            host.device_class = fingerprint.device_class;
            changed = true;
        }
        if !fingerprint.open_ports.is_empty() && host.open_ports != fingerprint.open_ports {
            host.open_ports = fingerprint.open_ports;
            changed = true;
        }
        if fingerprint.http_banner.is_some() && host.http_banner != fingerprint.http_banner {
            host.http_banner = fingerprint.http_banner;
            changed = true;
        }
        let node_type = entry.node_type();
        if node_type != entry.host.node_type {
            entry.host.node_type = node_type;
            changed = true;
        }
        changed
    }

    pub fn apply_web_url(&mut self, id: Uuid, url: Option<Url>) -> bool {
        match self.entry_mut(id) {
            Some(entry) if entry.host.discovered_web_url != url => {
                entry.host.discovered_web_url = url;
                true
            }
            _ => false,
        }
    }

    pub fn begin_share_load(&mut self, id: Uuid) -> ShareLoad {
        let Some(entry) = self.entry_mut(id) else {
            return ShareLoad::NotFound;
        };
        let host = &mut entry.host;
        if !host.device_class.is_expandable() {
            return ShareLoad::NotExpandable;
        }
        if host.shares_loading {
            return ShareLoad::AlreadyLoading;
        }
        host.shares_loading = true;
        ShareLoad::Started
    }

    pub fn finish_share_load(&mut self, id: Uuid, shares: Option<Vec<Share>>) -> bool {
        let Some(entry) = self.entry_mut(id) else {
            return false;
        };
        let host = &mut entry.host;
        host.shares_loading = false;
        if let Some(shares) = shares {
            host.shares = shares;
            host.shares_loaded = true;
        }
        true
    }

    /// Ordered hosts, excluding this machine
    pub fn snapshot(&self) -> Vec<Host> {
        self.entries
            .iter()
            .filter(|e| !e.host.is_localhost)
            .map(|e| e.host.clone())
            .collect()
    }

    pub fn get(&self, id: Uuid) -> Option<Host> {
        self.entries
            .iter()
            .find(|e| e.host.id == id)
            .map(|e| e.host.clone())
    }

    /// Hosts the active fingerprint probe should look at
    pub fn unclassified(&self) -> Vec<Host> {
        self.snapshot()
            .into_iter()
            .filter(|h| h.device_class.is_unknown())
            .collect()
    }

    fn entry_mut(&mut self, id: Uuid) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.host.id == id)
    }

    fn sort_and_reindex(&mut self) {
        self.entries.sort_by(|a, b| {
            (a.host.name.to_lowercase(), &a.host.name).cmp(&(b.host.name.to_lowercase(), &b.host.name))
        });
        self.reindex();
    }

    fn reindex(&mut self) {
        self.by_key.clear();
        self.by_address.clear();
        self.by_mac.clear();
        for (index, entry) in self.entries.iter().enumerate() {
            let host = &entry.host;
            self.by_key.insert(host.key.clone(), index);
            if !host.address.is_empty() {
                self.by_address.insert(host.address.to_lowercase(), index);
            }
            if let Some(ip) = host.ip {
                self.by_address.insert(ip.to_string(), index);
            }
            if let Some(mac) = &host.mac_address {
                self.by_mac.insert(mac.clone(), index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    fn table() -> HostTable {
        let mut table = HostTable::new(LocalIdentity::new(
            vec!["Stefs-MacBook".to_string()],
            vec!["192.168.178.5".parse().unwrap()],
        ));
        table.reset(1);
        table
    }

    fn listener(name: &str, address: &str, ip: &str, service_type: &str) -> Evidence {
        let mut ev = Evidence::new(EvidenceOrigin::Listener, name, address);
        ev.ip = Some(ip.parse().unwrap());
        ev.service_type = Some(service_type.to_string());
        ev.port = ShareProtocol::from_service_type(service_type).map(|p| p.default_port());
        ev
    }

    fn router(name: &str, ip: &str, mac: &str, active: bool) -> Evidence {
        let mut ev = Evidence::new(EvidenceOrigin::Router, name, ip);
        ev.ip = ip.parse().ok();
        ev.mac = Some(mac.to_string());
        ev.is_active = Some(active);
        ev.interface_type = Some("Ethernet".to_string());
        ev
    }

    fn mobile_placeholder(mac: &str) -> Evidence {
        let mut ev = Evidence::new(
            EvidenceOrigin::Listener,
            super::super::naming::placeholder_name(mac),
            format!("{mac}@fe80::1c2a:3bff:fe4d:5e6f"),
        );
        ev.service_type = Some("_apple-mobdev2._tcp.local.".to_string());
        ev.is_mobile = true;
        ev.mac = Some(mac.to_string());
        ev
    }

    /// Everything but the per-record id and timestamps
    fn comparable(host: &Host) -> Host {
        let mut host = host.clone();
        host.id = Uuid::nil();
        host.first_seen = chrono::DateTime::<Utc>::UNIX_EPOCH;
        host.last_seen = chrono::DateTime::<Utc>::UNIX_EPOCH;
        host
    }

    fn apply_all(evidence: &[Evidence]) -> Vec<Host> {
        let mut table = table();
        for ev in evidence {
            table.merge(ev);
        }
        table.snapshot().iter().map(comparable).collect()
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut table = table();
        let ev = listener("Office-NAS", "office-nas.local", "192.168.178.20", "_smb._tcp.local.");

        let first = table.merge(&ev);
        let before = table.snapshot();
        let second = table.merge(&ev);

        assert!(matches!(first, MergeOutcome::Created(_)));
        assert!(matches!(second, MergeOutcome::Unchanged(_)));
        assert_eq!(table.len(), 1);
        assert_eq!(comparable(&before[0]), comparable(&table.snapshot()[0]));
    }

    #[test]
    fn test_same_key_never_duplicates() {
        let mut table = table();
        table.merge(&listener("Office-NAS", "office-nas.local", "192.168.178.20", "_smb._tcp.local."));
        table.merge(&listener("office-nas.local.", "office-nas.local", "192.168.178.20", "_afpovertcp._tcp.local."));

        let hosts = table.snapshot();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].advertised_service_types.len(), 2);
        assert_eq!(hosts[0].service_type, Some(ShareProtocol::Smb));
        assert_eq!(hosts[0].port, Some(445));
    }

    #[test]
    fn test_router_and_listener_converge_in_any_order() {
        let r = router("DS218", "192.168.178.20", "aa:bb:cc:00:00:20", true);
        let l = listener("DiskStation", "diskstation.local", "192.168.178.20", "_smb._tcp.local.");

        let router_first = apply_all(&[r.clone(), l.clone()]);
        let listener_first = apply_all(&[l, r]);

        assert_eq!(router_first.len(), 1);
        assert_eq!(router_first, listener_first);

        let host = &router_first[0];
        assert_eq!(host.name, "DiskStation");
        assert_eq!(host.address, "diskstation.local");
        assert_eq!(host.ip, Some("192.168.178.20".parse::<IpAddr>().unwrap()));
        assert_eq!(host.mac_address.as_deref(), Some("AA:BB:CC:00:00:20"));
        assert_eq!(host.device_class, DeviceClass::Nas);
        assert_eq!(host.node_type, NodeType::FileServer);
        assert_eq!(host.interface_type.as_deref(), Some("Ethernet"));
    }

    #[test]
    fn test_mobile_placeholder_converges_with_router_entry() {
        let placeholder = mobile_placeholder("aa:bb:cc:dd:ee:ff");
        let r = router("Saschas-iPhone", "192.168.178.44", "AA:BB:CC:DD:EE:FF", false);

        let placeholder_first = apply_all(&[placeholder.clone(), r.clone()]);
        let router_first = apply_all(&[r, placeholder]);

        assert_eq!(placeholder_first, router_first);
        assert_eq!(placeholder_first.len(), 1);

        let host = &placeholder_first[0];
        assert_eq!(host.name, "Saschas-iPhone");
        assert_eq!(host.address, "192.168.178.44");
        assert_eq!(host.device_class, DeviceClass::Phone);
        assert_eq!(host.node_type, NodeType::Mobile);
        assert!(host.is_offline);
    }

    #[test]
    fn test_placeholder_address_never_replaces_real_one() {
        let mut table = table();
        table.merge(&router("Saschas-iPhone", "192.168.178.44", "AA:BB:CC:DD:EE:FF", true));
        table.merge(&mobile_placeholder("aa:bb:cc:dd:ee:ff"));

        let hosts = table.snapshot();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].address, "192.168.178.44");
    }

    #[test]
    fn test_router_mac_wins_over_listener_mac() {
        let mut table = table();
        let mut l = listener("Office-NAS", "office-nas.local", "192.168.178.20", "_smb._tcp.local.");
        l.mac = Some("11:11:11:11:11:11".to_string());
        table.merge(&l);
        table.merge(&router("Office-NAS", "192.168.178.20", "22:22:22:22:22:22", true));
        l.mac = Some("33:33:33:33:33:33".to_string());
        table.merge(&l);

        assert_eq!(table.snapshot()[0].mac_address.as_deref(), Some("22:22:22:22:22:22"));
    }

    #[test]
    fn test_class_never_downgrades() {
        let mut table = table();
        let outcome = table.merge(&listener("Printer-Office", "printer-office.local", "192.168.178.30", "_ipp._tcp.local."));
        let MergeOutcome::Created(id) = outcome else {
            panic!("expected a new host, got {outcome:?}");
        };
        table.merge(&router("printer-office", "192.168.178.30", "AA:00:00:00:00:30", true));
        table.apply_fingerprint(id, Fingerprint::default());

        let host = table.get(id).unwrap();
        assert_eq!(host.device_class, DeviceClass::Printer);
    }

    #[test]
    fn test_fingerprint_only_fills_unknown() {
        let mut table = table();
        let MergeOutcome::Created(known) = table.merge(&router("fritz.box", "192.168.178.1", "AA:00:00:00:00:01", true)) else {
            panic!("expected a new host");
        };
        let MergeOutcome::Created(unknown) = table.merge(&router("kitchen", "192.168.178.60", "AA:00:00:00:00:60", true)) else {
            panic!("expected a new host");
        };
        assert_eq!(table.unclassified().len(), 1);

        let probe = Fingerprint {
            device_class: DeviceClass::LinuxServer,
            open_ports: BTreeSet::from([22]),
            http_banner: None,
        };
        table.apply_fingerprint(known, probe.clone());
        table.apply_fingerprint(unknown, probe);

        assert_eq!(table.get(known).unwrap().device_class, DeviceClass::Router);
        assert_eq!(table.get(unknown).unwrap().device_class, DeviceClass::LinuxServer);
        assert_eq!(table.get(unknown).unwrap().open_ports, BTreeSet::from([22]));
        assert!(table.unclassified().is_empty());
    }

    #[test]
    fn test_self_evidence_is_excluded() {
        let mut table = table();
        assert_eq!(
            table.merge(&listener("Stefs-MacBook", "stefs-macbook.local", "192.168.178.5", "_smb._tcp.local.")),
            MergeOutcome::SelfExcluded
        );
        assert_eq!(
            table.merge(&listener("Loopback", "localhost", "127.0.0.1", "_smb._tcp.local.")),
            MergeOutcome::SelfExcluded
        );
        assert_eq!(
            table.merge(&router("workstation", "192.168.178.5", "AA:00:00:00:00:05", true)),
            MergeOutcome::SelfExcluded
        );
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_self_evidence_hides_matching_host() {
        let mut table = table();
        let MergeOutcome::Created(id) = table.merge(&router("workstation", "192.168.178.9", "AA:00:00:00:00:09", true)) else {
            panic!("expected a new host");
        };
        let local = listener("workstation", "workstation.local", "127.0.0.1", "_smb._tcp.local.");

        let outcome = table.merge(&local);
        assert_eq!(outcome, MergeOutcome::MarkedLocal(id));
        assert!(outcome.changed());
        assert!(table.snapshot().is_empty());
        assert!(table.unclassified().is_empty());

        let host = table.get(id).unwrap();
        assert!(host.is_localhost);
        // nothing from the local evidence is folded in
        assert!(host.advertised_service_types.is_empty());
        assert_eq!(host.address, "192.168.178.9");

        assert_eq!(table.merge(&local), MergeOutcome::SelfExcluded);
    }

    #[test]
    fn test_hosts_sorted_case_insensitively() {
        let mut table = table();
        table.merge(&router("zeta", "192.168.178.11", "AA:00:00:00:00:11", true));
        table.merge(&router("Alpha", "192.168.178.12", "AA:00:00:00:00:12", true));
        table.merge(&router("beta", "192.168.178.13", "AA:00:00:00:00:13", true));

        let names: Vec<String> = table.snapshot().into_iter().map(|h| h.name).collect();
        assert_eq!(names, vec!["Alpha", "beta", "zeta"]);
    }

    #[test]
    fn test_remove_by_name() {
        let mut table = table();
        table.merge(&listener("Office-NAS", "office-nas.local", "192.168.178.20", "_smb._tcp.local."));
        table.merge(&router("kitchen", "192.168.178.60", "AA:00:00:00:00:60", true));

        assert!(table.remove_by_name("Office-NAS").is_some());
        assert!(table.remove_by_name("Office-NAS").is_none());
        assert_eq!(table.len(), 1);
        // indices still line up after removal
        assert!(matches!(
            table.merge(&router("kitchen", "192.168.178.60", "AA:00:00:00:00:60", true)),
            MergeOutcome::Unchanged(_)
        ));
    }

    #[test]
    fn test_mobile_removal_after_rename() {
        use crate::mdns::{found_evidence, removed_name, resolved_evidence, ResolvedService};

        let service_type = "_apple-mobdev2._tcp.local.";
        let fullname = format!("aa:bb:cc:dd:ee:ff@fe80::1c2a:3bff:fe4d:5e6f.{service_type}");
        let resolved = ResolvedService {
            service_type: service_type.to_string(),
            fullname: fullname.clone(),
            hostname: "Saschas-iPhone.local.".to_string(),
            port: 62078,
            addresses: vec!["192.168.178.44".parse().unwrap()],
        };

        let mut table = table();
        table.merge(&found_evidence(service_type, &fullname).unwrap());
        table.merge(&resolved_evidence(&resolved));
        let names: Vec<String> = table.snapshot().into_iter().map(|h| h.name).collect();
        assert_eq!(names, vec!["Saschas-iPhone"]);

        let removed = table.remove_by_name(&removed_name(service_type, &fullname));
        assert_eq!(removed.map(|h| h.name).as_deref(), Some("Saschas-iPhone"));
        assert_eq!(table.len(), 0);

        // Router named it before the listener saw the placeholder
        let mut table = HostTable::new(LocalIdentity::default());
        table.reset(1);
        table.merge(&router("Saschas-iPhone", "192.168.178.44", "AA:BB:CC:DD:EE:FF", true));
        table.merge(&found_evidence(service_type, &fullname).unwrap());
        assert_eq!(table.len(), 1);
        assert!(table.remove_by_name(&removed_name(service_type, &fullname)).is_some());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_router_leases_sharing_an_ip_stay_apart() {
        let mut table = table();
        table.merge(&router("old-laptop", "192.168.178.50", "AA:00:00:00:00:01", false));
        let outcome = table.merge(&router("new-phone", "192.168.178.50", "AA:00:00:00:00:02", true));
        assert!(matches!(outcome, MergeOutcome::Created(_)));

        let hosts = table.snapshot();
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].name, "new-phone");
        assert!(!hosts[0].is_offline);
        assert_eq!(hosts[0].mac_address.as_deref(), Some("AA:00:00:00:00:02"));
        assert_eq!(hosts[1].name, "old-laptop");
        assert!(hosts[1].is_offline);
        assert_eq!(hosts[1].mac_address.as_deref(), Some("AA:00:00:00:00:01"));

        // Listener evidence at that address still joins a router record
        let joined = table.merge(&listener("new-phone", "new-phone.local", "192.168.178.50", "_smb._tcp.local."));
        assert!(matches!(joined, MergeOutcome::Updated(_)));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_router_name_never_overrides_listener_class() {
        let l = listener("DESKTOP-4F2K9QX", "desktop-4f2k9qx.local", "192.168.178.70", "_smb._tcp.local.");
        let r = router("Galaxy-Book", "192.168.178.70", "AA:00:00:00:00:70", true);

        let listener_first = apply_all(&[l.clone(), r.clone()]);
        let router_first = apply_all(&[r, l]);

        assert_eq!(listener_first, router_first);
        assert_eq!(listener_first.len(), 1);
        let host = &listener_first[0];
        assert_eq!(host.name, "DESKTOP-4F2K9QX");
        assert_eq!(host.device_class, DeviceClass::WindowsPc);
        assert_eq!(host.node_type, NodeType::FileServer);
    }

    #[test]
    fn test_router_name_refines_mobile_placeholder() {
        let placeholder = mobile_placeholder("aa:bb:cc:dd:ee:01");
        let r = router("Saschas-iPad", "192.168.178.45", "AA:BB:CC:DD:EE:01", true);

        let hosts = apply_all(&[placeholder.clone(), r.clone()]);
        assert_eq!(hosts, apply_all(&[r, placeholder]));
        assert_eq!(hosts[0].device_class, DeviceClass::Tablet);
        assert_eq!(hosts[0].node_type, NodeType::Mobile);
    }

    #[test]
    fn test_name_fallback_at_creation() {
        let mut table = table();
        table.merge(&router("HPE8D0A1", "192.168.178.50", "AA:00:00:00:00:50", true));
        table.merge(&router("roborock-vacuum-a15", "192.168.178.51", "AA:00:00:00:00:51", true));

        let hosts = table.snapshot();
        assert_eq!(hosts[0].device_class, DeviceClass::Printer);
        assert_eq!(hosts[0].node_type, NodeType::Printer);
        assert_eq!(hosts[1].device_class, DeviceClass::Embedded);
    }

    #[test]
    fn test_reset_clears_and_sets_generation() {
        let mut table = table();
        table.merge(&router("kitchen", "192.168.178.60", "AA:00:00:00:00:60", true));
        table.reset(2);
        assert_eq!(table.len(), 0);
        assert!(table.is_current(2));
        assert!(!table.is_current(1));
    }

    #[test]
    fn test_share_load_flags() {
        let mut table = table();
        let MergeOutcome::Created(nas) = table.merge(&listener("Office-NAS", "office-nas.local", "192.168.178.20", "_smb._tcp.local.")) else {
            panic!("expected a new host");
        };
        let MergeOutcome::Created(printer) = table.merge(&listener("Laser", "laser.local", "192.168.178.31", "_ipp._tcp.local.")) else {
            panic!("expected a new host");
        };

        assert_eq!(table.begin_share_load(nas), ShareLoad::Started);
        assert_eq!(table.begin_share_load(nas), ShareLoad::AlreadyLoading);
        assert_eq!(table.begin_share_load(printer), ShareLoad::NotExpandable);
        assert_eq!(table.begin_share_load(Uuid::new_v4()), ShareLoad::NotFound);

        let shares = vec![Share { name: "media".to_string(), protocol: ShareProtocol::Smb }];
        assert!(table.finish_share_load(nas, Some(shares.clone())));
        let host = table.get(nas).unwrap();
        assert!(host.shares_loaded);
        assert!(!host.shares_loading);
        assert_eq!(host.shares, shares);
    }
}
