use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use checker_core::{Channel, CheckEpoch, FailureKind, UNKNOWN_LABEL};
use engine_logging::engine_debug;

use crate::{
    FallbackOutcome, GeoLocator, Probe, ProbeError, ResultAggregator, Resolved,
};

pub const DEFAULT_HOST_FAILURE_LIMIT: usize = 3;

/// Counts failed attempts per host within one run.
#[derive(Debug)]
pub struct HostFailureTracker {
    limit: usize,
    failures: Mutex<HashMap<String, usize>>,
}

impl Default for HostFailureTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HOST_FAILURE_LIMIT)
    }
}

impl HostFailureTracker {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn should_skip(&self, host: &str) -> bool {
        self.failures(host) >= self.limit
    }

    pub fn record_failure(&self, host: &str) {
        *self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(host.to_string())
            .or_insert(0) += 1;
    }

    pub fn failures(&self, host: &str) -> usize {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(host)
            .copied()
            .unwrap_or(0)
    }
}

/// Walks a channel's candidates in order until one of them plays.
#[derive(Clone)]
pub struct FallbackResolver {
    probe: Probe,
    per_url_timeout: Duration,
    geo: Option<Arc<GeoLocator>>,
    host_failures: Option<Arc<HostFailureTracker>>,
}

impl FallbackResolver {
    pub fn new(probe: Probe, per_url_timeout: Duration) -> Self {
        Self {
            probe,
            per_url_timeout,
            geo: None,
            host_failures: None,
        }
    }

    pub fn with_geo(mut self, geo: Option<Arc<GeoLocator>>) -> Self {
        self.geo = geo;
        self
    }

    pub fn with_host_failures(mut self, tracker: Option<Arc<HostFailureTracker>>) -> Self {
        self.host_failures = tracker;
        self
    }

    /// Resolve `channel` under `epoch`. The epoch is checked against the
    /// aggregator before every attempt; once stale the walk stops with
    /// [`Resolved::Cancelled`].
    pub async fn resolve(
        &self,
        channel: &Channel,
        epoch: CheckEpoch,
        aggregator: &ResultAggregator,
    ) -> FallbackOutcome {
        let mut attempts = 0;
        let mut last_error = None;

        for (index, url) in channel.urls.iter().enumerate() {
            if !aggregator.is_current(epoch) {
                engine_debug!("channel {} cancelled after {} attempts", channel.id, attempts);
                return FallbackOutcome {
                    resolved: Resolved::Cancelled,
                    attempts,
                };
            }
            attempts += 1;
            let host = channel.host_at(index);

            if let (Some(tracker), Some(host)) = (&self.host_failures, host.as_deref()) {
                if tracker.should_skip(host) {
                    engine_debug!("channel {} skips {}: host keeps failing", channel.id, url);
                    last_error = Some(ProbeError::new(
                        FailureKind::Connection,
                        format!("skipped, {} failed {} times", host, tracker.failures(host)),
                    ));
                    continue;
                }
            }

            match self.probe.probe(url, self.per_url_timeout).await {
                Ok(probe) => {
                    let geo_label = self.locate(host.as_deref()).await;
                    return FallbackOutcome {
                        resolved: Resolved::Valid {
                            active_index: index,
                            probe,
                            geo_label,
                        },
                        attempts,
                    };
                }
                Err(err) => {
                    engine_debug!("channel {} candidate {} failed: {}", channel.id, index, err);
                    if let (Some(tracker), Some(host)) = (&self.host_failures, host.as_deref()) {
                        tracker.record_failure(host);
                    }
                    last_error = Some(err);
                }
            }
        }

        FallbackOutcome {
            resolved: Resolved::Invalid {
                last_error: last_error.unwrap_or_else(|| {
                    ProbeError::new(FailureKind::MalformedUrl, "no candidate urls")
                }),
            },
            attempts,
        }
    }

    async fn locate(&self, host: Option<&str>) -> Option<String> {
        let geo = self.geo.as_ref()?;
        Some(match host {
            Some(host) => geo.locate(host).await,
            None => UNKNOWN_LABEL.to_string(),
        })
    }
}
