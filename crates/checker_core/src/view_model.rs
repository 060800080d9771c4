use crate::{Channel, ChannelId, ChannelStatus, CheckEpoch, FailureKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusCounts {
    pub pending: usize,
    pub checking: usize,
    pub valid: usize,
    pub invalid: usize,
}

impl StatusCounts {
    pub(crate) fn record(&mut self, status: ChannelStatus) {
        match status {
            ChannelStatus::Pending => self.pending += 1,
            ChannelStatus::Checking => self.checking += 1,
            ChannelStatus::Valid => self.valid += 1,
            ChannelStatus::Invalid => self.invalid += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CheckViewModel {
    pub epoch: CheckEpoch,
    pub running: bool,
    pub completed: usize,
    pub total: usize,
    pub counts: StatusCounts,
    pub rows: Vec<ChannelRowView>,
    pub dirty: bool,
}

/// Display-ready copy of one channel row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRowView {
    pub channel_id: ChannelId,
    pub name: String,
    pub group_title: String,
    /// Active URL when valid, otherwise the first candidate.
    pub url: String,
    pub candidate_count: usize,
    pub status: ChannelStatus,
    pub resolution: String,
    pub response_time_ms: Option<u64>,
    pub geo_label: String,
    pub last_error: Option<FailureKind>,
}

impl ChannelRowView {
    pub(crate) fn from_channel(channel: &Channel) -> Self {
        let url = channel
            .active_url()
            .or_else(|| channel.urls.first().map(String::as_str))
            .unwrap_or_default()
            .to_string();
        Self {
            channel_id: channel.id,
            name: channel.name.clone(),
            group_title: channel.group_title.clone(),
            url,
            candidate_count: channel.urls.len(),
            status: channel.status(),
            resolution: channel.resolution().to_string(),
            response_time_ms: channel
                .response_time()
                .map(|elapsed| elapsed.as_millis() as u64),
            geo_label: channel.geo_label().to_string(),
            last_error: channel.last_error(),
        }
    }
}
