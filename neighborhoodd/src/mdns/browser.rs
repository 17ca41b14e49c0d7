use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::Future;
use anyhow::{bail, Result};

/// A service instance resolved to a host and port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedService {
    pub service_type: String,
    pub fullname: String,
    pub hostname: String,
    pub port: u16,
    pub addresses: Vec<IpAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserEvent {
    Found { service_type: String, fullname: String },
    Resolved(ResolvedService),
    Removed { service_type: String, fullname: String },
    /// Found but never resolved within the resolve timeout
    ResolveTimedOut(String),
}

/// Resolution deadlines for found instances. An instance that misses its
/// deadline stays timed out for the rest of the browse: a late resolution
/// is dropped instead of merged.
#[derive(Debug)]
struct ResolveTracker {
    timeout: Duration,
    pending: HashMap<String, Instant>,
    timed_out: HashSet<String>,
}

impl ResolveTracker {
    fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pending: HashMap::new(),
            timed_out: HashSet::new(),
        }
    }

    fn found(&mut self, fullname: &str, now: Instant) {
        if !self.timed_out.contains(fullname) {
            self.pending
                .entry(fullname.to_string())
                .or_insert(now + self.timeout);
        }
    }

    /// Whether a resolution for `fullname` should be forwarded.
    fn resolved(&mut self, fullname: &str) -> bool {
        self.pending.remove(fullname);
        !self.timed_out.contains(fullname)
    }

    fn removed(&mut self, fullname: &str) {
        self.pending.remove(fullname);
    }

    /// Instances whose deadline passed since the last call.
    fn expire(&mut self, now: Instant) -> Vec<String> {
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(name, _)| name.clone())
            .collect();
        for fullname in &expired {
            self.pending.remove(fullname);
            self.timed_out.insert(fullname.clone());
        }
        expired
    }
}

type RecvResult = (usize, flume::Receiver<ServiceEvent>, std::result::Result<ServiceEvent, flume::RecvError>);
type RecvFuture = Pin<Box<dyn Future<Output = RecvResult> + Send>>;

/// Each future owns a clone of the receiver, avoiding borrow issues with the
/// receivers vec. flume::Receiver is Clone (multi-consumer).
fn make_recv_future(idx: usize, rx: flume::Receiver<ServiceEvent>) -> RecvFuture {
    Box::pin(async move {
        let result = rx.recv_async().await;
        (idx, rx, result)
    })
}

/// Browse every type in `service_types` until `cancel` fires, forwarding
/// events to `tx`. Resolution is driven by the daemon, which outlives any
/// single event; the tracker only enforces deadlines.
pub async fn run_browser(
    daemon: ServiceDaemon,
    service_types: Vec<String>,
    tx: mpsc::Sender<BrowserEvent>,
    resolve_timeout: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    tracing::info!("Starting mDNS browser for {} service types", service_types.len());

    let mut browsed = Vec::new();
    let mut type_futures: FuturesUnordered<RecvFuture> = FuturesUnordered::new();
    for service_type in &service_types {
        match daemon.browse(service_type) {
            Ok(receiver) => {
                type_futures.push(make_recv_future(browsed.len(), receiver));
                browsed.push(service_type.clone());
            }
            Err(e) => tracing::error!("Failed to browse {}: {}", service_type, e),
        }
    }
    if browsed.is_empty() {
        bail!("Could not browse any of {} service types", service_types.len());
    }

    let mut tracker = ResolveTracker::new(resolve_timeout);
    let mut expiry = tokio::time::interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            Some((idx, rx, result)) = type_futures.next() => {
                let event = match result {
                    Ok(ServiceEvent::ServiceFound(service_type, fullname)) => {
                        tracker.found(&fullname, Instant::now());
                        Some(BrowserEvent::Found { service_type, fullname })
                    }
                    Ok(ServiceEvent::ServiceResolved(info)) => {
                        if tracker.resolved(info.get_fullname()) {
                            let resolved = convert_service_info(&info);
                            tracing::debug!("Resolved {} at {}:{}", resolved.fullname, resolved.hostname, resolved.port);
                            Some(BrowserEvent::Resolved(resolved))
                        } else {
                            tracing::debug!("Dropping late resolution of {}", info.get_fullname());
                            None
                        }
                    }
                    Ok(ServiceEvent::ServiceRemoved(service_type, fullname)) => {
                        tracing::debug!("Service removed: {}", fullname);
                        tracker.removed(&fullname);
                        Some(BrowserEvent::Removed { service_type, fullname })
                    }
                    Ok(_) => None,
                    Err(e) => {
                        tracing::warn!("Receiver for {} disconnected: {}", browsed[idx], e);
                        continue;
                    }
                };
                type_futures.push(make_recv_future(idx, rx));

                if let Some(event) = event {
                    if tx.send(event).await.is_err() {
                        tracing::debug!("Browser event consumer gone");
                        break;
                    }
                }
            }

            _ = expiry.tick() => {
                for fullname in tracker.expire(Instant::now()) {
                    tracing::debug!("Resolution of {} timed out", fullname);
                    if tx.send(BrowserEvent::ResolveTimedOut(fullname)).await.is_err() {
                        break;
                    }
                }
            }

            _ = cancel.cancelled() => {
                tracing::info!("mDNS browser stopping");
                break;
            }
        }
    }

    for service_type in &browsed {
        if let Err(e) = daemon.stop_browse(service_type) {
            tracing::warn!("Failed to stop browsing {}: {}", service_type, e);
        }
    }

    Ok(())
}

fn convert_service_info(info: &ServiceInfo) -> ResolvedService {
    let mut addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();
    addresses.sort();

    ResolvedService {
        service_type: info.get_type().to_string(),
        fullname: info.get_fullname().to_string(),
        hostname: info.get_hostname().to_string(),
        port: info.get_port(),
        addresses,
    }
}
