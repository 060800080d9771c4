use std::fmt;
use std::time::Duration;

use checker_core::{
    BatchSummary, CancelReport, ChannelOutcome, FailureKind, ProgressEvent, Resolution,
};

/// What the stream opener saw on the first decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub resolution: Resolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSuccess {
    pub resolution: Resolution,
    pub latency: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeError {
    pub kind: FailureKind,
    pub message: String,
}

impl ProbeError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

pub type ProbeResult = Result<ProbeSuccess, ProbeError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Valid {
        active_index: usize,
        probe: ProbeSuccess,
        geo_label: Option<String>,
    },
    Invalid {
        last_error: ProbeError,
    },
    Cancelled,
}

/// Result of walking one channel's candidate list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackOutcome {
    pub resolved: Resolved,
    pub attempts: usize,
}

impl FallbackOutcome {
    pub fn active_index(&self) -> Option<usize> {
        match &self.resolved {
            Resolved::Valid { active_index, .. } => Some(*active_index),
            _ => None,
        }
    }

    pub fn into_channel_outcome(self) -> ChannelOutcome {
        match self.resolved {
            Resolved::Valid {
                active_index,
                probe,
                geo_label,
            } => ChannelOutcome::Valid {
                active_index,
                resolution: probe.resolution,
                response_time: probe.latency,
                geo_label,
            },
            Resolved::Invalid { last_error } => ChannelOutcome::Invalid {
                kind: last_error.kind,
            },
            Resolved::Cancelled => ChannelOutcome::Cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Progress(ProgressEvent),
    BatchFinished(BatchSummary),
    Cancelled(CancelReport),
}
