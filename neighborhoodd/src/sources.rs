//! The two evidence producers that run for the duration of a scan.

use std::time::Duration;
use anyhow::Result;
use async_trait::async_trait;
use mdns_sd::ServiceDaemon;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use crate::mdns::{self, BrowserEvent};
use crate::registry::{Evidence, EvidenceOrigin, RegistryHandle};
use crate::router::{RouterClient, RouterHost};

/// Where a source delivers evidence. Bound to one scan generation, so a
/// source that outlives its scan cannot touch the next one.
#[derive(Clone)]
pub struct EvidenceSink {
    registry: RegistryHandle,
    generation: u64,
}

impl EvidenceSink {
    pub fn new(registry: RegistryHandle, generation: u64) -> Self {
        Self { registry, generation }
    }

    pub async fn merge(&self, evidence: Evidence) -> Result<()> {
        self.registry.merge(self.generation, evidence).await?;
        Ok(())
    }

    pub async fn remove(&self, name: String) -> Result<()> {
        self.registry.remove(self.generation, name).await?;
        Ok(())
    }
}

#[async_trait]
pub trait EvidenceSource: Send + Sync {
    fn label(&self) -> &'static str;

    /// Produce evidence until done or until `stop` fires.
    async fn run(&self, sink: EvidenceSink, stop: CancellationToken) -> Result<()>;
}

/// One-shot batch query of the router's host table
pub struct RouterSource {
    client: RouterClient,
}

impl RouterSource {
    pub fn new(client: RouterClient) -> Self {
        Self { client }
    }
}

pub fn router_evidence(host: RouterHost) -> Evidence {
    let mut evidence = Evidence::new(EvidenceOrigin::Router, host.name, host.address);
    evidence.ip = evidence.address.trim().parse().ok();
    evidence.mac = host.mac;
    evidence.is_active = Some(host.is_active);
    evidence.interface_type = host.interface_type;
    evidence
}

#[async_trait]
impl EvidenceSource for RouterSource {
    fn label(&self) -> &'static str {
        "router"
    }

    async fn run(&self, sink: EvidenceSink, stop: CancellationToken) -> Result<()> {
        let hosts = tokio::select! {
            result = self.client.host_entries() => match result {
                Ok(hosts) => hosts,
                Err(e) => {
                    // An absent or unsupported router is a normal LAN
                    tracing::info!("Router query returned no data: {}", e);
                    return Ok(());
                }
            },
            _ = stop.cancelled() => {
                tracing::debug!("Router query cancelled");
                return Ok(());
            }
        };

        tracing::info!("Router reported {} hosts", hosts.len());
        for host in hosts {
            if stop.is_cancelled() {
                break;
            }
            sink.merge(router_evidence(host)).await?;
        }
        Ok(())
    }
}

/// Multicast DNS browse over the configured service types
pub struct ListenerSource {
    daemon: ServiceDaemon,
    service_types: Vec<String>,
    resolve_timeout: Duration,
}

impl ListenerSource {
    pub fn new(daemon: ServiceDaemon, service_types: Vec<String>, resolve_timeout: Duration) -> Self {
        Self {
            daemon,
            service_types,
            resolve_timeout,
        }
    }
}

#[async_trait]
impl EvidenceSource for ListenerSource {
    fn label(&self) -> &'static str {
        "mdns"
    }

    async fn run(&self, sink: EvidenceSink, stop: CancellationToken) -> Result<()> {
        let (tx, mut rx) = mpsc::channel(256);
        let browser = tokio::spawn(mdns::run_browser(
            self.daemon.clone(),
            self.service_types.clone(),
            tx,
            self.resolve_timeout,
            stop.clone(),
        ));

        // Ends once the browser stops and drops its sender
        while let Some(event) = rx.recv().await {
            match event {
                BrowserEvent::Found { service_type, fullname } => {
                    tracing::debug!("Found {}", fullname);
                    if let Some(evidence) = mdns::found_evidence(&service_type, &fullname) {
                        sink.merge(evidence).await?;
                    }
                }
                BrowserEvent::Resolved(service) => {
                    sink.merge(mdns::resolved_evidence(&service)).await?;
                }
                BrowserEvent::Removed { service_type, fullname } => {
                    sink.remove(mdns::removed_name(&service_type, &fullname)).await?;
                }
                BrowserEvent::ResolveTimedOut(fullname) => {
                    tracing::debug!("Gave up resolving {}", fullname);
                }
            }
        }

        browser.await?
    }
}
