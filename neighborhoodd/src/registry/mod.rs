//! The host registry: one owner thread holding the merged host list, fed by
//! both discovery sources through a command channel.

pub mod evidence;
pub mod hash;
pub mod identity;
pub mod naming;
pub mod table;

use std::thread;
use anyhow::Result;
use shared::types::{Host, Share};
use tokio::sync::{mpsc, oneshot, watch};
use url::Url;
use uuid::Uuid;
use crate::fingerprint::Fingerprint;
pub use evidence::{Evidence, EvidenceOrigin};
pub use identity::LocalIdentity;
pub use table::{HostTable, MergeOutcome, ShareLoad};

/// Commands sent to the registry thread. Mutations carry the scan
/// generation they belong to and are dropped when it is no longer current.
pub enum RegistryCommand {
    Reset(u64, oneshot::Sender<()>),
    Merge {
        generation: u64,
        evidence: Evidence,
        reply: oneshot::Sender<Option<MergeOutcome>>,
    },
    Remove {
        generation: u64,
        name: String,
        reply: oneshot::Sender<bool>,
    },
    ApplyFingerprint {
        generation: u64,
        id: Uuid,
        fingerprint: Fingerprint,
    },
    ApplyWebUrl {
        generation: u64,
        id: Uuid,
        url: Option<Url>,
    },
    Snapshot(oneshot::Sender<Vec<Host>>),
    Get(Uuid, oneshot::Sender<Option<Host>>),
    Unclassified(oneshot::Sender<Vec<Host>>),
    BeginShareLoad(Uuid, oneshot::Sender<ShareLoad>),
    FinishShareLoad(Uuid, Option<Vec<Share>>),
    Shutdown,
}

/// Handle to the registry thread
#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<RegistryCommand>,
}

fn publish_hash(table: &HostTable, hash_tx: &watch::Sender<String>) {
    match hash::compute_hash(&table.snapshot()) {
        Ok(new_hash) => {
            hash_tx.send_if_modified(|current| {
                if *current == new_hash {
                    false
                } else {
                    *current = new_hash;
                    true
                }
            });
        }
        Err(e) => tracing::error!("Failed to hash host list: {}", e),
    }
}

fn stale(table: &HostTable, generation: u64, what: &str) -> bool {
    if table.is_current(generation) {
        return false;
    }
    tracing::debug!(
        "Dropping {} from scan {} (current scan is {})",
        what,
        generation,
        table.generation()
    );
    true
}

impl RegistryHandle {
    /// Spawn the registry thread around `table`. The hash of every changed
    /// host list is published on `hash_tx`.
    pub fn spawn(mut table: HostTable, hash_tx: watch::Sender<String>) -> Self {
        let (tx, mut rx) = mpsc::channel::<RegistryCommand>(256);
        publish_hash(&table, &hash_tx);

        thread::spawn(move || {
            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    RegistryCommand::Reset(generation, reply) => {
                        tracing::debug!("Reset for scan {}, dropping {} hosts", generation, table.len());
                        table.reset(generation);
                        publish_hash(&table, &hash_tx);
                        let _ = reply.send(());
                    }
                    RegistryCommand::Merge { generation, evidence, reply } => {
                        let outcome = if stale(&table, generation, "evidence") {
                            None
                        } else {
                            let outcome = table.merge(&evidence);
                            if outcome.changed() {
                                publish_hash(&table, &hash_tx);
                            }
                            Some(outcome)
                        };
                        let _ = reply.send(outcome);
                    }
                    RegistryCommand::Remove { generation, name, reply } => {
                        let removed = !stale(&table, generation, "removal")
                            && table.remove_by_name(&name).is_some();
                        if removed {
                            tracing::info!("Host {} went away", name);
                            publish_hash(&table, &hash_tx);
                        }
                        let _ = reply.send(removed);
                    }
                    RegistryCommand::ApplyFingerprint { generation, id, fingerprint } => {
                        if !stale(&table, generation, "fingerprint")
                            && table.apply_fingerprint(id, fingerprint)
                        {
                            publish_hash(&table, &hash_tx);
                        }
                    }
                    RegistryCommand::ApplyWebUrl { generation, id, url } => {
                        if !stale(&table, generation, "web UI result")
                            && table.apply_web_url(id, url)
                        {
                            publish_hash(&table, &hash_tx);
                        }
                    }
                    RegistryCommand::Snapshot(reply) => {
                        let _ = reply.send(table.snapshot());
                    }
                    RegistryCommand::Get(id, reply) => {
                        let _ = reply.send(table.get(id));
                    }
                    RegistryCommand::Unclassified(reply) => {
                        let _ = reply.send(table.unclassified());
                    }
                    RegistryCommand::BeginShareLoad(id, reply) => {
                        let result = table.begin_share_load(id);
                        if result == ShareLoad::Started {
                            publish_hash(&table, &hash_tx);
                        }
                        let _ = reply.send(result);
                    }
                    RegistryCommand::FinishShareLoad(id, shares) => {
                        if table.finish_share_load(id, shares) {
                            publish_hash(&table, &hash_tx);
                        }
                    }
                    RegistryCommand::Shutdown => {
                        tracing::info!("Registry thread shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    /// Clear the host list and start accepting evidence for `generation`.
    pub async fn reset(&self, generation: u64) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::Reset(generation, reply)).await?;
        Ok(rx.await?)
    }

    /// Merge one observation. `None` means the scan it belongs to is over.
    pub async fn merge(&self, generation: u64, evidence: Evidence) -> Result<Option<MergeOutcome>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::Merge { generation, evidence, reply }).await?;
        Ok(rx.await?)
    }

    pub async fn remove(&self, generation: u64, name: String) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::Remove { generation, name, reply }).await?;
        Ok(rx.await?)
    }

    pub async fn apply_fingerprint(&self, generation: u64, id: Uuid, fingerprint: Fingerprint) -> Result<()> {
        self.tx.send(RegistryCommand::ApplyFingerprint { generation, id, fingerprint }).await?;
        Ok(())
    }

    pub async fn apply_web_url(&self, generation: u64, id: Uuid, url: Option<Url>) -> Result<()> {
        self.tx.send(RegistryCommand::ApplyWebUrl { generation, id, url }).await?;
        Ok(())
    }

    /// Current host list in display order, excluding this machine
    pub async fn snapshot(&self) -> Result<Vec<Host>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::Snapshot(reply)).await?;
        Ok(rx.await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Host>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::Get(id, reply)).await?;
        Ok(rx.await?)
    }

    pub async fn unclassified(&self) -> Result<Vec<Host>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::Unclassified(reply)).await?;
        Ok(rx.await?)
    }

    pub async fn begin_share_load(&self, id: Uuid) -> Result<ShareLoad> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::BeginShareLoad(id, reply)).await?;
        Ok(rx.await?)
    }

    pub async fn finish_share_load(&self, id: Uuid, shares: Option<Vec<Share>>) -> Result<()> {
        self.tx.send(RegistryCommand::FinishShareLoad(id, shares)).await?;
        Ok(())
    }

    /// Shutdown the registry thread
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(RegistryCommand::Shutdown).await?;
        Ok(())
    }
}
