use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::EngineError;

pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_PER_URL_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_GEO_ENDPOINT: &str = "http://ip-api.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckerConfig {
    pub concurrency: usize,
    pub per_url_timeout: Duration,
    pub per_channel_timeout: Option<Duration>,
    pub geo_lookup_enabled: bool,
    /// Give a candidate that timed out one more attempt before moving on.
    pub retry_on_timeout: bool,
    /// Stop probing a host once it has failed repeatedly within a run.
    pub skip_same_host_failures: bool,
    pub ffprobe_path: String,
    pub geo_endpoint: String,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            per_url_timeout: DEFAULT_PER_URL_TIMEOUT,
            per_channel_timeout: None,
            geo_lookup_enabled: true,
            retry_on_timeout: false,
            skip_same_host_failures: false,
            ffprobe_path: "ffprobe".to_string(),
            geo_endpoint: DEFAULT_GEO_ENDPOINT.to_string(),
        }
    }
}

impl CheckerConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        validate_limits(self.concurrency, self.per_url_timeout)?;
        if self.per_channel_timeout.is_some_and(|limit| limit.is_zero()) {
            return Err(EngineError::InvalidTimeout("per-channel"));
        }
        Ok(())
    }

    /// Load and validate a RON settings file.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let config = CheckerSettings::load(path)?.into_config();
        config.validate()?;
        Ok(config)
    }
}

pub(crate) fn validate_limits(
    concurrency: usize,
    per_url_timeout: Duration,
) -> Result<(), EngineError> {
    if concurrency == 0 {
        return Err(EngineError::InvalidConcurrency(concurrency));
    }
    if per_url_timeout.is_zero() {
        return Err(EngineError::InvalidTimeout("per-url"));
    }
    Ok(())
}

/// On-disk form of [`CheckerConfig`]. Durations are in milliseconds and any
/// missing field takes its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerSettings {
    pub concurrency: usize,
    pub per_url_timeout_ms: u64,
    pub per_channel_timeout_ms: Option<u64>,
    pub geo_lookup_enabled: bool,
    pub retry_on_timeout: bool,
    pub skip_same_host_failures: bool,
    pub ffprobe_path: String,
    pub geo_endpoint: String,
}

impl Default for CheckerSettings {
    fn default() -> Self {
        CheckerConfig::default().into()
    }
}

impl CheckerSettings {
    pub fn from_ron_str(text: &str) -> Result<Self, EngineError> {
        ron::from_str(text).map_err(|err| EngineError::SettingsParse(err.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let text = fs::read_to_string(path).map_err(|source| EngineError::SettingsRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron_str(&text)
    }

    pub fn to_ron_string(&self) -> Result<String, EngineError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::new())
            .map_err(|err| EngineError::SettingsParse(err.to_string()))
    }

    pub fn into_config(self) -> CheckerConfig {
        CheckerConfig {
            concurrency: self.concurrency,
            per_url_timeout: Duration::from_millis(self.per_url_timeout_ms),
            per_channel_timeout: self.per_channel_timeout_ms.map(Duration::from_millis),
            geo_lookup_enabled: self.geo_lookup_enabled,
            retry_on_timeout: self.retry_on_timeout,
            skip_same_host_failures: self.skip_same_host_failures,
            ffprobe_path: self.ffprobe_path,
            geo_endpoint: self.geo_endpoint,
        }
    }
}

impl From<CheckerConfig> for CheckerSettings {
    fn from(config: CheckerConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            per_url_timeout_ms: config.per_url_timeout.as_millis() as u64,
            per_channel_timeout_ms: config
                .per_channel_timeout
                .map(|limit| limit.as_millis() as u64),
            geo_lookup_enabled: config.geo_lookup_enabled,
            retry_on_timeout: config.retry_on_timeout,
            skip_same_host_failures: config.skip_same_host_failures,
            ffprobe_path: config.ffprobe_path,
            geo_endpoint: config.geo_endpoint,
        }
    }
}
