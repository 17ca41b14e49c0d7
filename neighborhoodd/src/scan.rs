//! Scan lifecycle: acquisition from all sources under a hard ceiling, then
//! the fingerprint pass and the web UI pass.

use std::sync::Arc;
use std::time::Duration;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use shared::types::{Host, ScanPhase, ScanStatus};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;
use crate::fingerprint::{Fingerprint, Fingerprinter};
use crate::registry::RegistryHandle;
use crate::sources::{EvidenceSink, EvidenceSource};
use crate::webui::WebUiProber;

/// How long stopped sources get to wind down before they are aborted
const SOURCE_GRACE: Duration = Duration::from_secs(1);

/// Active probes run after acquisition
#[async_trait]
pub trait HostProber: Send + Sync {
    async fn fingerprint(&self, host: &Host) -> Fingerprint;
    async fn web_ui(&self, host: &Host) -> Option<Url>;
}

pub struct NetworkProber {
    fingerprinter: Fingerprinter,
    web: WebUiProber,
}

impl NetworkProber {
    pub fn new(fingerprinter: Fingerprinter, web: WebUiProber) -> Self {
        Self { fingerprinter, web }
    }
}

#[async_trait]
impl HostProber for NetworkProber {
    async fn fingerprint(&self, host: &Host) -> Fingerprint {
        self.fingerprinter.probe(host).await
    }

    async fn web_ui(&self, host: &Host) -> Option<Url> {
        self.web.probe(host).await
    }
}

struct ActiveScan {
    cancel: CancellationToken,
    stop: CancellationToken,
}

struct ScanState {
    generation: u64,
    active: Option<ActiveScan>,
}

pub struct ScanController {
    registry: RegistryHandle,
    sources: Vec<Arc<dyn EvidenceSource>>,
    prober: Arc<dyn HostProber>,
    ceiling: Duration,
    status_tx: watch::Sender<ScanStatus>,
    state: Mutex<ScanState>,
}

/// Update the published phase unless a newer scan has taken over.
fn set_phase(status_tx: &watch::Sender<ScanStatus>, generation: u64, phase: ScanPhase) {
    status_tx.send_if_modified(|status| {
        if status.generation != generation || status.phase == phase {
            return false;
        }
        tracing::info!("Scan {} phase {:?}", generation, phase);
        status.phase = phase;
        true
    });
}

impl ScanController {
    pub fn new(
        registry: RegistryHandle,
        sources: Vec<Arc<dyn EvidenceSource>>,
        prober: Arc<dyn HostProber>,
        ceiling: Duration,
    ) -> Self {
        let (status_tx, _) = watch::channel(ScanStatus::default());
        Self {
            registry,
            sources,
            prober,
            ceiling,
            status_tx,
            state: Mutex::new(ScanState {
                generation: 0,
                active: None,
            }),
        }
    }

    pub fn status(&self) -> ScanStatus {
        self.status_tx.borrow().clone()
    }

    /// Abandon any running scan, clear the registry and start acquiring.
    pub async fn start(&self) -> Result<ScanStatus> {
        let mut state = self.state.lock().await;
        if let Some(previous) = state.active.take() {
            previous.cancel.cancel();
        }

        state.generation += 1;
        let generation = state.generation;
        self.registry
            .reset(generation)
            .await
            .context("Failed to reset registry")?;

        let cancel = CancellationToken::new();
        let stop = cancel.child_token();
        let status = ScanStatus {
            phase: ScanPhase::Scanning,
            generation,
            started_at: Some(Utc::now()),
        };
        self.status_tx.send_replace(status.clone());
        tracing::info!("Scan {} started with {} sources", generation, self.sources.len());

        tokio::spawn(run_scan(
            self.registry.clone(),
            self.sources.clone(),
            self.prober.clone(),
            self.ceiling,
            generation,
            cancel.clone(),
            stop.clone(),
            self.status_tx.clone(),
        ));

        state.active = Some(ActiveScan { cancel, stop });
        Ok(status)
    }

    /// End acquisition now; the probe passes follow.
    pub async fn stop(&self) -> ScanStatus {
        let state = self.state.lock().await;
        if let Some(active) = &state.active {
            active.stop.cancel();
        }
        self.status()
    }

    /// Cancel everything, passes included.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if let Some(active) = state.active.take() {
            active.cancel.cancel();
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_scan(
    registry: RegistryHandle,
    sources: Vec<Arc<dyn EvidenceSource>>,
    prober: Arc<dyn HostProber>,
    ceiling: Duration,
    generation: u64,
    cancel: CancellationToken,
    stop: CancellationToken,
    status_tx: watch::Sender<ScanStatus>,
) {
    let mut running = JoinSet::new();
    for source in sources {
        let sink = EvidenceSink::new(registry.clone(), generation);
        let stop = stop.clone();
        running.spawn(async move {
            if let Err(e) = source.run(sink, stop).await {
                tracing::warn!("{} source failed: {:#}", source.label(), e);
            }
        });
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::info!("Scan {} cancelled", generation);
            return;
        }
        _ = stop.cancelled() => {
            tracing::info!("Scan {} stopped", generation);
        }
        _ = tokio::time::sleep(ceiling) => {
            tracing::info!("Scan {} reached its {:?} ceiling", generation, ceiling);
        }
        _ = async { while running.join_next().await.is_some() {} } => {
            tracing::info!("Scan {}: all sources finished", generation);
        }
    }
    stop.cancel();

    if tokio::time::timeout(SOURCE_GRACE, async { while running.join_next().await.is_some() {} })
        .await
        .is_err()
    {
        tracing::debug!("Aborting {} sources that ignored stop", running.len());
        running.abort_all();
    }

    tokio::select! {
        _ = cancel.cancelled() => {
            tracing::info!("Probe passes of scan {} cancelled", generation);
        }
        _ = probe_passes(&registry, prober.as_ref(), generation, &status_tx) => {
            set_phase(&status_tx, generation, ScanPhase::Idle);
        }
    }
}

async fn probe_passes(
    registry: &RegistryHandle,
    prober: &dyn HostProber,
    generation: u64,
    status_tx: &watch::Sender<ScanStatus>,
) {
    set_phase(status_tx, generation, ScanPhase::Fingerprinting);
    match registry.unclassified().await {
        Ok(hosts) => {
            tracing::info!("Fingerprinting {} unclassified hosts", hosts.len());
            join_all(hosts.iter().map(|host| async move {
                let fingerprint = prober.fingerprint(host).await;
                if let Err(e) = registry.apply_fingerprint(generation, host.id, fingerprint).await {
                    tracing::error!("Failed to store fingerprint of {}: {}", host.name, e);
                }
            }))
            .await;
        }
        Err(e) => tracing::error!("Failed to list unclassified hosts: {}", e),
    }

    set_phase(status_tx, generation, ScanPhase::WebProbing);
    match registry.snapshot().await {
        Ok(hosts) => {
            tracing::info!("Probing {} hosts for a web UI", hosts.len());
            join_all(hosts.iter().map(|host| async move {
                let url = prober.web_ui(host).await;
                if let Err(e) = registry.apply_web_url(generation, host.id, url).await {
                    tracing::error!("Failed to store web UI of {}: {}", host.name, e);
                }
            }))
            .await;
        }
        Err(e) => tracing::error!("Failed to list hosts: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use shared::types::DeviceClass;
    use crate::registry::{Evidence, EvidenceOrigin, HostTable, LocalIdentity};

    /// Never produces anything and ignores the stop token
    struct DeadSource;

    #[async_trait]
    impl EvidenceSource for DeadSource {
        fn label(&self) -> &'static str {
            "dead"
        }

        async fn run(&self, _sink: EvidenceSink, _stop: CancellationToken) -> Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    /// Reports one host on its first run only, then idles until stopped
    struct OneShotSource {
        used: AtomicBool,
    }

    #[async_trait]
    impl EvidenceSource for OneShotSource {
        fn label(&self) -> &'static str {
            "one-shot"
        }

        async fn run(&self, sink: EvidenceSink, stop: CancellationToken) -> Result<()> {
            if !self.used.swap(true, Ordering::SeqCst) {
                let mut ev = Evidence::new(EvidenceOrigin::Router, "kitchen", "192.168.178.60");
                ev.ip = Some("192.168.178.60".parse().unwrap());
                sink.merge(ev).await?;
            }
            stop.cancelled().await;
            Ok(())
        }
    }

    struct StubProber;

    #[async_trait]
    impl HostProber for StubProber {
        async fn fingerprint(&self, _host: &Host) -> Fingerprint {
            Fingerprint {
                device_class: DeviceClass::LinuxServer,
                open_ports: BTreeSet::from([22]),
                http_banner: None,
            }
        }

        async fn web_ui(&self, host: &Host) -> Option<Url> {
            Url::parse(&format!("http://{}/", host.address)).ok()
        }
    }

    fn controller(sources: Vec<Arc<dyn EvidenceSource>>, ceiling: Duration) -> (ScanController, RegistryHandle) {
        let (hash_tx, _) = watch::channel(String::new());
        let registry = RegistryHandle::spawn(HostTable::new(LocalIdentity::default()), hash_tx);
        let controller = ScanController::new(registry.clone(), sources, Arc::new(StubProber), ceiling);
        (controller, registry)
    }

    async fn wait_idle(controller: &ScanController, generation: u64) {
        let mut status_rx = controller.status_tx.subscribe();
        tokio::time::timeout(
            Duration::from_secs(5),
            status_rx.wait_for(|s| s.generation == generation && s.phase == ScanPhase::Idle),
        )
        .await
        .expect("scan did not finish in time")
        .unwrap();
    }

    #[tokio::test]
    async fn test_ceiling_ends_scan_with_silent_sources() {
        let (controller, registry) = controller(
            vec![Arc::new(DeadSource), Arc::new(DeadSource)],
            Duration::from_millis(200),
        );

        let status = controller.start().await.unwrap();
        assert_eq!(status.phase, ScanPhase::Scanning);
        assert_eq!(status.generation, 1);

        wait_idle(&controller, 1).await;
        assert!(registry.snapshot().await.unwrap().is_empty());
        registry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_runs_enrichment_passes() {
        let source = Arc::new(OneShotSource { used: AtomicBool::new(false) });
        let (controller, registry) = controller(vec![source], Duration::from_secs(60));

        controller.start().await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while registry.snapshot().await.unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        controller.stop().await;
        wait_idle(&controller, 1).await;

        let hosts = registry.snapshot().await.unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].device_class, DeviceClass::LinuxServer);
        assert_eq!(hosts[0].open_ports, BTreeSet::from([22]));
        assert_eq!(
            hosts[0].discovered_web_url.as_ref().map(Url::as_str),
            Some("http://192.168.178.60/")
        );
        registry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_clears_registry_and_bumps_generation() {
        let source = Arc::new(OneShotSource { used: AtomicBool::new(false) });
        let (controller, registry) = controller(vec![source], Duration::from_millis(300));

        controller.start().await.unwrap();
        wait_idle(&controller, 1).await;
        assert_eq!(registry.snapshot().await.unwrap().len(), 1);

        let status = controller.start().await.unwrap();
        assert_eq!(status.generation, 2);
        assert!(registry.snapshot().await.unwrap().is_empty());

        wait_idle(&controller, 2).await;
        assert!(registry.snapshot().await.unwrap().is_empty());
        registry.shutdown().await.unwrap();
    }
}
