use std::sync::Arc;
use std::time::{Duration, Instant};

use checker_core::FailureKind;
use engine_logging::engine_debug;
use url::Url;

use crate::{ProbeError, ProbeResult, ProbeSuccess, StreamOpener};

const TIMEOUT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// One bounded attempt to validate a single URL.
#[derive(Clone)]
pub struct Probe {
    opener: Arc<dyn StreamOpener>,
    retry_on_timeout: bool,
}

impl Probe {
    pub fn new(opener: Arc<dyn StreamOpener>) -> Self {
        Self {
            opener,
            retry_on_timeout: false,
        }
    }

    pub fn with_retry_on_timeout(mut self, retry: bool) -> Self {
        self.retry_on_timeout = retry;
        self
    }

    /// Open `url` and decode one frame within `timeout`.
    ///
    /// Malformed URLs are rejected before the opener is touched. The opener's
    /// future is dropped when the budget runs out, which releases the stream.
    pub async fn probe(&self, url: &str, timeout: Duration) -> ProbeResult {
        let parsed = parse_candidate(url)?;
        if timeout.is_zero() {
            return Err(ProbeError::new(FailureKind::Timeout, "zero time budget"));
        }

        match self.attempt(&parsed, timeout).await {
            Err(err) if err.kind == FailureKind::Timeout && self.retry_on_timeout => {
                engine_debug!("{} timed out, retrying once", parsed);
                tokio::time::sleep(TIMEOUT_RETRY_DELAY).await;
                self.attempt(&parsed, timeout).await
            }
            result => result,
        }
    }

    async fn attempt(&self, url: &Url, timeout: Duration) -> ProbeResult {
        let started = Instant::now();
        match tokio::time::timeout(timeout, self.opener.first_frame(url)).await {
            Ok(Ok(frame)) => Ok(ProbeSuccess {
                resolution: frame.resolution,
                latency: started.elapsed(),
            }),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(ProbeError::new(
                FailureKind::Timeout,
                format!("no frame within {} ms", timeout.as_millis()),
            )),
        }
    }
}

pub(crate) fn parse_candidate(raw: &str) -> Result<Url, ProbeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ProbeError::new(FailureKind::MalformedUrl, "empty url"));
    }
    let parsed = Url::parse(trimmed)
        .map_err(|err| ProbeError::new(FailureKind::MalformedUrl, format!("{trimmed}: {err}")))?;
    if parsed.cannot_be_a_base() {
        return Err(ProbeError::new(
            FailureKind::MalformedUrl,
            format!("{trimmed}: not a stream address"),
        ));
    }
    Ok(parsed)
}
