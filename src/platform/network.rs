//! Network state as seen by the background run

use crate::config::NetworkSettings;
use crate::error::FetchError;
use crate::fetch::HttpClient;
use async_trait::async_trait;
use std::time::Duration;

/// Timeout of a single reachability probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Trait for querying connectivity
#[async_trait]
pub trait NetworkMonitor: Send + Sync {
    async fn is_internet_available(&self) -> bool;

    async fn is_unmetered(&self) -> bool;
}

/// Probes a URL for reachability; meteredness comes from the settings
pub struct ProbeNetworkMonitor {
    client: HttpClient,
    probe_url: String,
    metered: bool,
}

impl ProbeNetworkMonitor {
    pub fn new(settings: &NetworkSettings) -> Result<Self, FetchError> {
        let client = HttpClient::with_config(PROBE_TIMEOUT, concat!("apkup/", env!("CARGO_PKG_VERSION")))?
            .with_max_retries(0);
        Ok(Self {
            client,
            probe_url: settings.probe_url.clone(),
            metered: settings.metered,
        })
    }
}

#[async_trait]
impl NetworkMonitor for ProbeNetworkMonitor {
    async fn is_internet_available(&self) -> bool {
        match self.client.get(&self.probe_url).await {
            Ok(_) => true,
            // Any HTTP answer proves the network works
            Err(FetchError::NotFound { .. }) | Err(FetchError::Status { .. }) => true,
            Err(e) => {
                tracing::debug!(url = %self.probe_url, "connectivity probe failed: {}", e);
                false
            }
        }
    }

    async fn is_unmetered(&self) -> bool {
        !self.metered
    }
}
