use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use checker_core::UNKNOWN_LABEL;
use engine_logging::{engine_debug, engine_trace};
use serde::Deserialize;
use thiserror::Error;

use crate::EngineError;

pub const LOCAL_NETWORK_LABEL: &str = "Local network";
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("http error: {0}")]
    Http(String),
    #[error("lookup rejected: {0}")]
    Rejected(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// External host-to-location service.
#[async_trait::async_trait]
pub trait GeoLookup: Send + Sync {
    async fn lookup(&self, host: &str) -> Result<String, GeoError>;
}

/// [`GeoLookup`] against the ip-api.com JSON endpoint.
#[derive(Debug, Clone)]
pub struct IpApiLookup {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    region_name: Option<String>,
    #[serde(default)]
    city: Option<String>,
}

impl IpApiLookup {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|err| EngineError::HttpClient(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl GeoLookup for IpApiLookup {
    async fn lookup(&self, host: &str) -> Result<String, GeoError> {
        let url = format!(
            "{}/json/{}?fields=status,message,country,regionName,city",
            self.base_url, host
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| GeoError::Http(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(GeoError::Http(status.to_string()));
        }
        let body = response
            .text()
            .await
            .map_err(|err| GeoError::Http(err.to_string()))?;
        let parsed: IpApiResponse = serde_json::from_str(&body)
            .map_err(|err| GeoError::InvalidResponse(err.to_string()))?;
        if parsed.status != "success" {
            return Err(GeoError::Rejected(
                parsed.message.unwrap_or_else(|| parsed.status.clone()),
            ));
        }
        format_location(parsed)
    }
}

fn format_location(response: IpApiResponse) -> Result<String, GeoError> {
    let non_empty = |value: Option<String>| value.filter(|text| !text.trim().is_empty());
    let country = non_empty(response.country);
    let city = non_empty(response.city);
    let region = non_empty(response.region_name).filter(|region| Some(region) != city.as_ref());

    let parts: Vec<String> = [country, region, city].into_iter().flatten().collect();
    if parts.is_empty() {
        return Err(GeoError::InvalidResponse("no location fields".to_string()));
    }
    Ok(parts.join(", "))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GeoStats {
    pub hits: usize,
    pub lookups: usize,
}

/// Host-to-location resolver with a process-lifetime cache.
///
/// Failed lookups are cached as [`UNKNOWN_LABEL`] so a dead resolver is not
/// asked again for the same host. Two workers missing the same host at once
/// may both perform the lookup.
pub struct GeoLocator {
    lookup: Arc<dyn GeoLookup>,
    cache: Mutex<HashMap<String, String>>,
    hits: AtomicUsize,
    lookups: AtomicUsize,
}

impl GeoLocator {
    pub fn new(lookup: Arc<dyn GeoLookup>) -> Self {
        Self {
            lookup,
            cache: Mutex::new(HashMap::new()),
            hits: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
        }
    }

    pub async fn locate(&self, host: &str) -> String {
        let host = host.trim().to_ascii_lowercase();
        if is_local_host(&host) {
            return LOCAL_NETWORK_LABEL.to_string();
        }
        if let Some(label) = self.cached(&host) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            engine_trace!("geo cache hit {} -> {}", host, label);
            return label;
        }

        self.lookups.fetch_add(1, Ordering::Relaxed);
        let label = match self.lookup.lookup(&host).await {
            Ok(label) => label,
            Err(err) => {
                engine_debug!("geo lookup for {} failed: {}", host, err);
                UNKNOWN_LABEL.to_string()
            }
        };
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(host, label.clone());
        label
    }

    pub fn cached(&self, host: &str) -> Option<String> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(host)
            .cloned()
    }

    pub fn stats(&self) -> GeoStats {
        GeoStats {
            hits: self.hits.load(Ordering::Relaxed),
            lookups: self.lookups.load(Ordering::Relaxed),
        }
    }
}

/// Loopback, private and link-local addresses never leave the LAN.
pub fn is_local_host(host: &str) -> bool {
    if host == "localhost" {
        return true;
    }
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    match bare.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => ip.is_private() || ip.is_loopback() || ip.is_link_local(),
        Ok(IpAddr::V6(ip)) => {
            let first = ip.segments()[0];
            ip.is_loopback() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
        Err(_) => false,
    }
}
