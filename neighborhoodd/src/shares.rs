use std::sync::Arc;
use anyhow::Result;
use async_trait::async_trait;
use shared::types::{Host, Share, ShareProtocol};
use uuid::Uuid;
use crate::registry::{RegistryHandle, ShareLoad};

/// Lists the shares a file server exposes. Listing happens outside the
/// registry thread; the registry only records the outcome.
#[async_trait]
pub trait ShareEnumerator: Send + Sync {
    async fn list_shares(&self, host: &Host) -> Result<Vec<Share>>;
}

/// Used when no enumeration backend is configured
pub struct UnconfiguredShares;

#[async_trait]
impl ShareEnumerator for UnconfiguredShares {
    async fn list_shares(&self, host: &Host) -> Result<Vec<Share>> {
        tracing::debug!("No share backend configured, {} has no shares", host.name);
        Ok(Vec::new())
    }
}

/// Mark the host as loading and enumerate its shares in the background.
pub async fn fetch_shares(
    registry: &RegistryHandle,
    enumerator: Arc<dyn ShareEnumerator>,
    id: Uuid,
) -> Result<ShareLoad> {
    let outcome = registry.begin_share_load(id).await?;
    if outcome != ShareLoad::Started {
        return Ok(outcome);
    }
    let Some(host) = registry.get(id).await? else {
        return Ok(ShareLoad::NotFound);
    };

    let registry = registry.clone();
    tokio::spawn(async move {
        let shares = match enumerator.list_shares(&host).await {
            Ok(shares) => {
                let protocol = host.service_type.map_or("no file protocol", ShareProtocol::display_name);
                tracing::info!("{} exposes {} shares over {}", host.name, shares.len(), protocol);
                Some(shares)
            }
            Err(e) => {
                tracing::warn!("Failed to list shares of {}: {}", host.name, e);
                None
            }
        };
        if let Err(e) = registry.finish_share_load(id, shares).await {
            tracing::error!("Failed to store shares of {}: {}", host.name, e);
        }
    });

    Ok(ShareLoad::Started)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::watch;
    use crate::registry::{Evidence, EvidenceOrigin, HostTable, LocalIdentity, MergeOutcome};

    struct FixedShares;

    #[async_trait]
    impl ShareEnumerator for FixedShares {
        async fn list_shares(&self, _host: &Host) -> Result<Vec<Share>> {
            Ok(vec![Share { name: "media".to_string(), protocol: ShareProtocol::Smb }])
        }
    }

    #[tokio::test]
    async fn test_fetch_shares_stores_result() {
        let (hash_tx, _) = watch::channel(String::new());
        let registry = RegistryHandle::spawn(HostTable::new(LocalIdentity::default()), hash_tx);
        registry.reset(1).await.unwrap();

        let mut ev = Evidence::new(EvidenceOrigin::Listener, "Office-NAS", "office-nas.local");
        ev.service_type = Some("_smb._tcp.local.".to_string());
        let Some(MergeOutcome::Created(id)) = registry.merge(1, ev).await.unwrap() else {
            panic!("expected a new host");
        };

        let outcome = fetch_shares(&registry, Arc::new(FixedShares), id).await.unwrap();
        assert_eq!(outcome, ShareLoad::Started);

        let mut host = registry.get(id).await.unwrap().unwrap();
        for _ in 0..50 {
            if host.shares_loaded {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            host = registry.get(id).await.unwrap().unwrap();
        }
        assert!(host.shares_loaded);
        assert!(!host.shares_loading);
        assert_eq!(host.shares.len(), 1);

        assert_eq!(
            fetch_shares(&registry, Arc::new(UnconfiguredShares), Uuid::new_v4()).await.unwrap(),
            ShareLoad::NotFound
        );
        registry.shutdown().await.unwrap();
    }
}
