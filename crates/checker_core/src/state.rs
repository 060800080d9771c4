use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, SystemTime};

use crate::view_model::{ChannelRowView, CheckViewModel, StatusCounts};
use crate::{Channel, ChannelId, ChannelStatus, FailureKind, Resolution};

/// Run generation. Bumped when a batch starts and when it is cancelled.
pub type CheckEpoch = u64;

/// What a worker hands back for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutcome {
    Valid {
        active_index: usize,
        resolution: Resolution,
        response_time: Duration,
        geo_label: Option<String>,
    },
    Invalid {
        kind: FailureKind,
    },
    /// The run was cancelled before this channel finished. Never applied.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub epoch: CheckEpoch,
    pub channel_id: ChannelId,
    pub new_status: ChannelStatus,
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub epoch: CheckEpoch,
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelReport {
    pub cancelled_epoch: Option<CheckEpoch>,
    pub new_epoch: CheckEpoch,
    pub reverted: Vec<ChannelId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ActiveBatch {
    epoch: CheckEpoch,
    /// Each member as it was before submission, candidates included.
    pre_run: BTreeMap<ChannelId, Channel>,
    finished: BTreeSet<ChannelId>,
}

impl ActiveBatch {
    fn total(&self) -> usize {
        self.pre_run.len()
    }
}

/// Channel table plus run bookkeeping. Every mutation of channel check state
/// goes through this type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CheckState {
    channels: BTreeMap<ChannelId, Channel>,
    epoch: CheckEpoch,
    batch: Option<ActiveBatch>,
    dirty: bool,
}

impl CheckState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> CheckEpoch {
        self.epoch
    }

    pub fn is_current(&self, epoch: CheckEpoch) -> bool {
        self.epoch == epoch
    }

    pub fn is_running(&self) -> bool {
        self.batch.is_some()
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(&id)
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    pub fn progress(&self) -> (usize, usize) {
        self.batch
            .as_ref()
            .map(|batch| (batch.finished.len(), batch.total()))
            .unwrap_or((0, 0))
    }

    /// Register the submitted channels, reset them to `Pending` and open a new
    /// epoch for the run.
    pub fn begin_batch(&mut self, submitted: Vec<Channel>) -> CheckEpoch {
        self.epoch += 1;
        let mut pre_run = BTreeMap::new();
        for incoming in submitted {
            let id = incoming.id;
            let channel = match self.channels.entry(id) {
                Entry::Occupied(entry) => {
                    let existing = entry.into_mut();
                    pre_run.insert(id, existing.clone());
                    existing.refresh_from(incoming);
                    existing
                }
                Entry::Vacant(entry) => {
                    pre_run.insert(id, incoming.clone());
                    entry.insert(incoming)
                }
            };
            let check = channel.check_mut();
            check.status = ChannelStatus::Pending;
            check.active_url_index = None;
        }
        self.batch = Some(ActiveBatch {
            epoch: self.epoch,
            pre_run,
            finished: BTreeSet::new(),
        });
        self.dirty = true;
        self.epoch
    }

    pub fn mark_checking(&mut self, id: ChannelId, epoch: CheckEpoch) -> Option<ProgressEvent> {
        if !self.is_current(epoch) {
            return None;
        }
        let batch = self.batch.as_ref()?;
        if !batch.pre_run.contains_key(&id) || batch.finished.contains(&id) {
            return None;
        }
        let (completed, total) = (batch.finished.len(), batch.total());
        let channel = self.channels.get_mut(&id)?;
        if channel.status() != ChannelStatus::Pending {
            return None;
        }
        channel.check_mut().status = ChannelStatus::Checking;
        self.dirty = true;
        Some(ProgressEvent {
            epoch,
            channel_id: id,
            new_status: ChannelStatus::Checking,
            completed,
            total,
        })
    }

    /// Merge a worker outcome for a channel in `Checking`. Outcomes from a
    /// stale epoch, for channels outside the batch or not yet marked, arriving
    /// twice, or naming a candidate the channel does not have are discarded
    /// and return `None`.
    pub fn apply(
        &mut self,
        id: ChannelId,
        epoch: CheckEpoch,
        outcome: ChannelOutcome,
        now: SystemTime,
    ) -> Option<ProgressEvent> {
        if !self.is_current(epoch) {
            return None;
        }
        let batch = self.batch.as_mut()?;
        if !batch.pre_run.contains_key(&id) || batch.finished.contains(&id) {
            return None;
        }
        let channel = self.channels.get_mut(&id)?;
        if channel.status() != ChannelStatus::Checking {
            return None;
        }
        if let ChannelOutcome::Valid { active_index, .. } = &outcome {
            if *active_index >= channel.urls.len() {
                return None;
            }
        }
        let check = channel.check_mut();
        match outcome {
            ChannelOutcome::Valid {
                active_index,
                resolution,
                response_time,
                geo_label,
            } => {
                check.status = ChannelStatus::Valid;
                check.active_url_index = Some(active_index);
                check.resolution = resolution;
                check.response_time = Some(response_time);
                check.geo_label = geo_label;
                check.last_error = None;
            }
            ChannelOutcome::Invalid { kind } => {
                check.status = ChannelStatus::Invalid;
                check.active_url_index = None;
                check.resolution = Resolution::Unknown;
                check.response_time = None;
                check.geo_label = None;
                check.last_error = Some(kind);
            }
            ChannelOutcome::Cancelled => return None,
        }
        check.last_checked = Some(now);
        let new_status = check.status;
        batch.finished.insert(id);
        self.dirty = true;
        Some(ProgressEvent {
            epoch,
            channel_id: id,
            new_status,
            completed: batch.finished.len(),
            total: batch.total(),
        })
    }

    /// Close the batch for `epoch` once every member has a final status.
    pub fn finish_batch(&mut self, epoch: CheckEpoch) -> Option<BatchSummary> {
        let batch = self.batch.as_ref()?;
        if batch.epoch != epoch || batch.finished.len() < batch.total() {
            return None;
        }
        let batch = self.batch.take()?;
        let mut summary = BatchSummary {
            epoch,
            total: batch.total(),
            valid: 0,
            invalid: 0,
        };
        for id in batch.pre_run.keys() {
            match self.channels.get(id).map(Channel::status) {
                Some(ChannelStatus::Valid) => summary.valid += 1,
                Some(ChannelStatus::Invalid) => summary.invalid += 1,
                _ => {}
            }
        }
        self.dirty = true;
        Some(summary)
    }

    /// Bump the epoch and put every unfinished batch member back the way it
    /// was before the run, candidate list and check state together.
    pub fn cancel(&mut self) -> CancelReport {
        self.epoch += 1;
        let mut report = CancelReport {
            cancelled_epoch: None,
            new_epoch: self.epoch,
            reverted: Vec::new(),
        };
        if let Some(batch) = self.batch.take() {
            report.cancelled_epoch = Some(batch.epoch);
            for (id, pre_run) in batch.pre_run {
                if batch.finished.contains(&id) {
                    continue;
                }
                if let Some(channel) = self.channels.get_mut(&id) {
                    *channel = pre_run;
                    report.reverted.push(id);
                }
            }
            self.dirty = true;
        }
        report
    }

    pub fn view(&self) -> CheckViewModel {
        let (completed, total) = self.progress();
        let mut counts = StatusCounts::default();
        let rows = self
            .channels
            .values()
            .map(|channel| {
                counts.record(channel.status());
                ChannelRowView::from_channel(channel)
            })
            .collect();
        CheckViewModel {
            epoch: self.epoch,
            running: self.is_running(),
            completed,
            total,
            counts,
            rows,
            dirty: self.dirty,
        }
    }

    /// Returns whether anything changed since the last call, and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}
