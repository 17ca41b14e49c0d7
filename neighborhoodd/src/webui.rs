use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use shared::types::Host;
use url::Url;
use crate::address::{probe_address, url_host};
use crate::config::WebProbeConfig;

/// Finds a host's administrative web interface.
#[derive(Clone)]
pub struct WebUiProber {
    http: reqwest::Client,
    ports: Vec<u16>,
    tls_ports: Vec<u16>,
}

impl WebUiProber {
    pub fn new(config: &WebProbeConfig) -> Result<Self> {
        // LAN devices ship self-signed certificates; this client is used for
        // nothing but HEAD probes.
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.timeout())
            .build()
            .context("Failed to build web probe HTTP client")?;

        Ok(Self {
            http,
            ports: config.ports.clone(),
            tls_ports: config.tls_ports.clone(),
        })
    }

    fn candidate_url(&self, host: &str, port: u16) -> Option<Url> {
        let scheme = if self.tls_ports.contains(&port) { "https" } else { "http" };
        let default_port = match scheme {
            "https" => 443,
            _ => 80,
        };
        let url = if port == default_port {
            format!("{scheme}://{}/", url_host(host))
        } else {
            format!("{scheme}://{}:{port}/", url_host(host))
        };
        Url::parse(&url).ok()
    }

    /// A 2xx or 3xx answer to HEAD counts as a web interface.
    async fn answers(&self, url: &Url) -> bool {
        match self.http.head(url.clone()).send().await {
            Ok(response) => {
                let status = response.status();
                status.is_success() || status.is_redirection()
            }
            Err(e) => {
                tracing::trace!("No web UI at {}: {}", url, e);
                false
            }
        }
    }

    /// The first URL that answers, or `None` when nothing does.
    pub async fn probe(&self, host: &Host) -> Option<Url> {
        let address = probe_address(host)?;

        if host.device_class.has_conventional_web_ui() {
            if let Ok(url) = Url::parse(&format!("http://{}/", url_host(&address))) {
                if self.answers(&url).await {
                    return Some(url);
                }
            }
        }

        let mut probes: FuturesUnordered<_> = self
            .ports
            .iter()
            .filter_map(|&port| self.candidate_url(&address, port))
            .map(|url| async move {
                let ok = self.answers(&url).await;
                ok.then_some(url)
            })
            .collect();

        // Dropping `probes` cancels whatever is still in flight
        while let Some(result) = probes.next().await {
            if let Some(url) = result {
                tracing::debug!("{} web UI at {}", host.name, url);
                return Some(url);
            }
        }
        None
    }
}
