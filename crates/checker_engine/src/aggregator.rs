use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use checker_core::{
    BatchSummary, CancelReport, Channel, ChannelId, ChannelOutcome, CheckEpoch, CheckState,
    CheckViewModel,
};
use engine_logging::{engine_debug, engine_info};

use crate::{EngineError, EngineEvent};

pub type Clock = Arc<dyn Fn() -> SystemTime + Send + Sync>;

/// Single writer of channel check state.
///
/// Workers hand outcomes in; subscribers get events out over unbounded
/// channels, so a slow reader never holds up a worker. The current epoch is
/// mirrored in an atomic for the cheap checkpoint in [`Self::is_current`].
pub struct ResultAggregator {
    state: Mutex<CheckState>,
    epoch: AtomicU64,
    subscribers: Mutex<Vec<mpsc::Sender<EngineEvent>>>,
    clock: Clock,
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemTime::now))
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            state: Mutex::new(CheckState::new()),
            epoch: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
            clock,
        }
    }

    pub fn subscribe(&self) -> mpsc::Receiver<EngineEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn current_epoch(&self) -> CheckEpoch {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn is_current(&self, epoch: CheckEpoch) -> bool {
        self.current_epoch() == epoch
    }

    pub fn is_running(&self) -> bool {
        self.lock_state().is_running()
    }

    /// Open a new epoch for `channels`, unless a batch is already active.
    pub fn begin_batch(&self, channels: Vec<Channel>) -> Result<CheckEpoch, EngineError> {
        let mut state = self.lock_state();
        if state.is_running() {
            return Err(EngineError::BatchInProgress {
                epoch: state.epoch(),
            });
        }
        let count = channels.len();
        let epoch = state.begin_batch(channels);
        self.epoch.store(epoch, Ordering::Release);
        engine_info!("batch {} started with {} channels", epoch, count);
        Ok(epoch)
    }

    pub fn mark_checking(&self, id: ChannelId, epoch: CheckEpoch) -> bool {
        let mut state = self.lock_state();
        match state.mark_checking(id, epoch) {
            Some(event) => {
                self.emit(EngineEvent::Progress(event));
                true
            }
            None => false,
        }
    }

    /// Merge one worker outcome. Returns whether it was applied.
    pub fn apply(&self, id: ChannelId, epoch: CheckEpoch, outcome: ChannelOutcome) -> bool {
        let mut state = self.lock_state();
        match state.apply(id, epoch, outcome, (self.clock)()) {
            Some(event) => {
                engine_debug!(
                    "channel {} -> {} ({}/{})",
                    id,
                    event.new_status,
                    event.completed,
                    event.total
                );
                self.emit(EngineEvent::Progress(event));
                true
            }
            None => {
                engine_debug!("discarded outcome for channel {} from epoch {}", id, epoch);
                false
            }
        }
    }

    pub fn finish_batch(&self, epoch: CheckEpoch) -> Option<BatchSummary> {
        let mut state = self.lock_state();
        let summary = state.finish_batch(epoch)?;
        engine_info!(
            "batch {} finished: {} valid, {} invalid of {}",
            summary.epoch,
            summary.valid,
            summary.invalid,
            summary.total
        );
        self.emit(EngineEvent::BatchFinished(summary.clone()));
        Some(summary)
    }

    pub fn cancel(&self) -> CancelReport {
        let mut state = self.lock_state();
        let report = state.cancel();
        self.epoch.store(report.new_epoch, Ordering::Release);
        engine_info!(
            "cancelled batch {:?}, {} channels reverted",
            report.cancelled_epoch,
            report.reverted.len()
        );
        self.emit(EngineEvent::Cancelled(report.clone()));
        report
    }

    pub fn channel(&self, id: ChannelId) -> Option<Channel> {
        self.lock_state().channel(id).cloned()
    }

    pub fn snapshot(&self) -> Vec<Channel> {
        self.lock_state().channels().cloned().collect()
    }

    /// View model plus whether anything changed since the previous call.
    pub fn view(&self) -> (CheckViewModel, bool) {
        let mut state = self.lock_state();
        let view = state.view();
        (view, state.consume_dirty())
    }

    fn lock_state(&self) -> MutexGuard<'_, CheckState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Called with the state lock held so events leave in mutation order.
    fn emit(&self, event: EngineEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
