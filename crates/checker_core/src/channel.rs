use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

pub type ChannelId = u64;

/// Display text for any attribute that has not been measured.
pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelStatus {
    #[default]
    Pending,
    Checking,
    Valid,
    Invalid,
}

impl ChannelStatus {
    pub fn is_final(self) -> bool {
        matches!(self, ChannelStatus::Valid | ChannelStatus::Invalid)
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelStatus::Pending => write!(f, "pending"),
            ChannelStatus::Checking => write!(f, "checking"),
            ChannelStatus::Valid => write!(f, "valid"),
            ChannelStatus::Invalid => write!(f, "invalid"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resolution {
    Known { width: u32, height: u32 },
    #[default]
    Unknown,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Resolution::Known { width, height }
    }

    /// Pixel count, zero when unknown.
    pub fn pixels(self) -> u64 {
        match self {
            Resolution::Known { width, height } => u64::from(width) * u64::from(height),
            Resolution::Unknown => 0,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Known { width, height } => write!(f, "{width}x{height}"),
            Resolution::Unknown => write!(f, "{UNKNOWN_LABEL}"),
        }
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
        let width = w.trim().parse::<u32>().map_err(|e| e.to_string())?;
        let height = h.trim().parse::<u32>().map_err(|e| e.to_string())?;
        Ok(Resolution::Known { width, height })
    }
}

/// Why a candidate URL (and, for the last candidate, its channel) failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Connection,
    Timeout,
    Decode,
    MalformedUrl,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Connection => write!(f, "connection error"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Decode => write!(f, "decode error"),
            FailureKind::MalformedUrl => write!(f, "malformed url"),
        }
    }
}

/// The measured part of a channel. Only the aggregator writes it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelCheck {
    pub status: ChannelStatus,
    pub active_url_index: Option<usize>,
    pub resolution: Resolution,
    pub response_time: Option<Duration>,
    pub geo_label: Option<String>,
    pub last_checked: Option<SystemTime>,
    pub last_error: Option<FailureKind>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub group_title: String,
    pub urls: Vec<String>,
    check: ChannelCheck,
}

impl Channel {
    pub fn new(
        id: ChannelId,
        name: impl Into<String>,
        group_title: impl Into<String>,
        urls: Vec<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            group_title: group_title.into(),
            urls,
            check: ChannelCheck::default(),
        }
    }

    pub fn check(&self) -> &ChannelCheck {
        &self.check
    }

    pub fn status(&self) -> ChannelStatus {
        self.check.status
    }

    pub fn active_url_index(&self) -> Option<usize> {
        match self.check.status {
            ChannelStatus::Valid => self.check.active_url_index,
            _ => None,
        }
    }

    pub fn active_url(&self) -> Option<&str> {
        self.active_url_index()
            .and_then(|index| self.urls.get(index))
            .map(String::as_str)
    }

    pub fn resolution(&self) -> Resolution {
        self.check.resolution
    }

    pub fn response_time(&self) -> Option<Duration> {
        self.check.response_time
    }

    pub fn geo_label(&self) -> &str {
        self.check.geo_label.as_deref().unwrap_or(UNKNOWN_LABEL)
    }

    pub fn last_error(&self) -> Option<FailureKind> {
        self.check.last_error
    }

    /// Host part of the candidate at `index`, if it parses as a URL with a host.
    pub fn host_at(&self, index: usize) -> Option<String> {
        let raw = self.urls.get(index)?;
        url::Url::parse(raw)
            .ok()
            .and_then(|parsed| parsed.host_str().map(ToOwned::to_owned))
    }

    pub(crate) fn check_mut(&mut self) -> &mut ChannelCheck {
        &mut self.check
    }

    /// Take over identity and candidates from a freshly imported record.
    pub(crate) fn refresh_from(&mut self, incoming: Channel) {
        self.name = incoming.name;
        self.group_title = incoming.group_title;
        self.urls = incoming.urls;
    }
}
