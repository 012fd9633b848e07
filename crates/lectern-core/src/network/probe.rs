use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::NetworkCapabilities;

/// Default endpoint answering `204 No Content` when internet access works.
pub const DEFAULT_PROBE_URL: &str = "http://connectivitycheck.gstatic.com/generate_204";

/// Probe request timeout in seconds.
/// Short enough that a dead network is noticed within one probe interval.
const PROBE_TIMEOUT_SECS: u64 = 5;

/// Source of connectivity observations.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn probe(&self) -> NetworkCapabilities;
}

/// Validates connectivity with an HTTP request to a known endpoint.
///
/// Any HTTP response means the network has internet capability; only the
/// expected status counts as validated (captive portals answer with
/// something else).
#[derive(Clone)]
pub struct HttpProbe {
    client: Client,
    url: String,
    expected_status: u16,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            expected_status: 204,
        })
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn probe(&self) -> NetworkCapabilities {
        match self.client.get(&self.url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                debug!(url = %self.url, status = status, "Connectivity probe answered");
                NetworkCapabilities {
                    has_internet: true,
                    validated: status == self.expected_status,
                }
            }
            Err(e) => {
                debug!(url = %self.url, error = %e, "Connectivity probe failed");
                NetworkCapabilities::NONE
            }
        }
    }
}
