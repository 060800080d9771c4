use std::time::Duration;

use crate::{Channel, ChannelStatus, Resolution};

/// Result filter over checked channels. Unset criteria match everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelFilter {
    pub min_resolution: Option<Resolution>,
    pub max_response_time: Option<Duration>,
    pub status: Option<ChannelStatus>,
}

impl ChannelFilter {
    pub fn matches(&self, channel: &Channel) -> bool {
        if let Some(min) = self.min_resolution {
            if channel.resolution().pixels() < min.pixels() {
                return false;
            }
        }
        if let Some(max) = self.max_response_time.filter(|max| !max.is_zero()) {
            // Unmeasured channels never pass a latency bound.
            match channel.response_time() {
                Some(elapsed) if elapsed <= max => {}
                _ => return false,
            }
        }
        if let Some(status) = self.status {
            if channel.status() != status {
                return false;
            }
        }
        true
    }

    pub fn apply<'a, I>(&self, channels: I) -> Vec<&'a Channel>
    where
        I: IntoIterator<Item = &'a Channel>,
    {
        channels
            .into_iter()
            .filter(|channel| self.matches(channel))
            .collect()
    }
}
