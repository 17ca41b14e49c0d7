mod address;
mod api;
mod config;
mod fingerprint;
mod mdns;
mod registry;
mod router;
mod scan;
mod shares;
mod sources;
mod webui;

use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use mdns_sd::ServiceDaemon;
use anyhow::{Context, Result};
use crate::config::Config;
use crate::fingerprint::Fingerprinter;
use crate::registry::{HostTable, LocalIdentity, RegistryHandle};
use crate::router::RouterClient;
use crate::scan::{NetworkProber, ScanController};
use crate::shares::UnconfiguredShares;
use crate::sources::{EvidenceSource, ListenerSource, RouterSource};
use crate::webui::WebUiProber;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("neighborhoodd=info"))
        )
        .init();

    tracing::info!("Starting neighborhoodd");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/neighborhoodd/neighborhoodd.toml".to_string());

    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    // Registry thread; this machine never shows up in its own list
    let identity = LocalIdentity::detect(&config.discovery.local_addresses);
    let (hash_tx, hash_rx) = watch::channel(String::new());
    let registry = RegistryHandle::spawn(HostTable::new(identity), hash_tx);

    let mdns_daemon = ServiceDaemon::new()
        .context("Failed to create mDNS daemon")?;
    if let Some(interface) = &config.discovery.interface {
        mdns_daemon
            .disable_interface(mdns_sd::IfKind::All)
            .context("Failed to disable default interfaces")?;
        mdns_daemon
            .enable_interface(interface.as_str())
            .with_context(|| format!("Failed to enable interface {}", interface))?;
    }

    let mut sources: Vec<Arc<dyn EvidenceSource>> = vec![Arc::new(ListenerSource::new(
        mdns_daemon.clone(),
        config.discovery.service_types.clone(),
        config.discovery.resolve_timeout(),
    ))];
    if config.router.enabled {
        let client = RouterClient::new(&config.router)
            .context("Failed to build router client")?;
        let probe = client.clone();
        let control_url = config.router.control_url.clone();
        tokio::spawn(async move {
            if probe.is_available().await {
                tracing::info!("Router at {} is reachable", control_url);
            } else {
                tracing::warn!("Router at {} did not answer, scans will rely on mDNS", control_url);
            }
        });
        sources.push(Arc::new(RouterSource::new(client)));
    }

    let prober = NetworkProber::new(
        Fingerprinter::new(&config.fingerprint)?,
        WebUiProber::new(&config.web_probe)?,
    );
    let scan = Arc::new(ScanController::new(
        registry.clone(),
        sources,
        Arc::new(prober),
        config.discovery.scan_ceiling(),
    ));

    let app = api::routes::router(api::routes::AppState {
        registry: registry.clone(),
        scan: scan.clone(),
        hash_rx,
        shares: Arc::new(UnconfiguredShares),
    });

    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    let cancel = CancellationToken::new();
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    cancel.cancel();
    scan.shutdown().await;
    let _ = server_handle.await;

    if let Err(e) = registry.shutdown().await {
        tracing::error!("Failed to shutdown registry: {}", e);
    }

    if let Err(e) = mdns_daemon.shutdown() {
        tracing::error!("Failed to shutdown mDNS daemon: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
