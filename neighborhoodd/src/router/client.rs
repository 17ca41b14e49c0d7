use std::collections::HashSet;
use futures::future::join_all;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use thiserror::Error;
use crate::config::RouterConfig;
use super::soap;

const GET_HOST_COUNT: &str = "GetHostNumberOfEntries";
const GET_HOST_ENTRY: &str = "GetGenericHostEntry";

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("router request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("router answered {action} with HTTP {status}")]
    Status { action: &'static str, status: StatusCode },

    #[error("response to {action} has no <{tag}>")]
    MissingTag { action: &'static str, tag: &'static str },

    #[error("<{tag}> is not a number: {value:?}")]
    InvalidNumber { tag: &'static str, value: String },
}

/// One row of the router's DHCP host table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterHost {
    pub name: String,
    /// IPv4 address, empty when the lease has none
    pub address: String,
    pub is_active: bool,
    pub mac: Option<String>,
    pub interface_type: Option<String>,
}

/// Client for the router's TR-064 `Hosts` service.
#[derive(Clone)]
pub struct RouterClient {
    http: reqwest::Client,
    control_url: String,
    namespace: String,
}

impl RouterClient {
    pub fn new(config: &RouterConfig) -> Result<Self, RouterError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self::with_client(
            http,
            config.control_url.clone(),
            config.service_namespace.clone(),
        ))
    }

    pub fn with_client(http: reqwest::Client, control_url: String, namespace: String) -> Self {
        Self {
            http,
            control_url,
            namespace,
        }
    }

    /// The router counts as reachable when it answers the count query.
    pub async fn is_available(&self) -> bool {
        self.host_count().await.is_ok()
    }

    /// Number of entries in the DHCP table
    pub async fn host_count(&self) -> Result<u32, RouterError> {
        let xml = self.call(GET_HOST_COUNT, "").await?;
        let tag = "NewHostNumberOfEntries";
        let value = soap::extract_tag(&xml, tag).ok_or(RouterError::MissingTag {
            action: GET_HOST_COUNT,
            tag,
        })?;
        value.trim().parse().map_err(|_| RouterError::InvalidNumber {
            tag,
            value: value.to_string(),
        })
    }

    /// Fetch a single entry. Entries without a host name yield `None`.
    pub async fn host_entry(&self, index: u32) -> Result<Option<RouterHost>, RouterError> {
        let params = format!("<NewIndex>{index}</NewIndex>");
        let xml = self.call(GET_HOST_ENTRY, &params).await?;

        let name = match soap::extract_tag(&xml, "NewHostName") {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => return Ok(None),
        };
        let optional = |tag: &str| {
            soap::extract_tag(&xml, tag)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Ok(Some(RouterHost {
            name,
            address: optional("NewIPAddress").unwrap_or_default(),
            is_active: soap::extract_tag(&xml, "NewActive").map(str::trim) == Some("1"),
            mac: optional("NewMACAddress"),
            interface_type: optional("NewInterfaceType"),
        }))
    }

    /// All named entries, deduplicated by name (first index wins) and sorted
    /// case-insensitively. Individual fetch failures are dropped.
    pub async fn host_entries(&self) -> Result<Vec<RouterHost>, RouterError> {
        let count = self.host_count().await?;
        tracing::info!("Fetching {} router host entries", count);

        let fetched = join_all((0..count).map(|index| self.host_entry(index))).await;

        let mut seen = HashSet::new();
        let mut hosts: Vec<RouterHost> = fetched
            .into_iter()
            .enumerate()
            .filter_map(|(index, result)| match result {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("Router entry {} unavailable: {}", index, e);
                    None
                }
            })
            .filter(|host| seen.insert(host.name.to_lowercase()))
            .collect();

        hosts.sort_by_key(|host| host.name.to_lowercase());
        Ok(hosts)
    }

    async fn call(&self, action: &'static str, params: &str) -> Result<String, RouterError> {
        let response = self
            .http
            .post(&self.control_url)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", soap::soap_action(&self.namespace, action))
            .body(soap::envelope(&self.namespace, action, params))
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(RouterError::Status { action, status });
        }
        Ok(response.text().await?)
    }
}
