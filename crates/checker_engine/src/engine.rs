use std::collections::{BTreeSet, VecDeque};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use checker_core::{CancelReport, Channel, ChannelId, CheckEpoch, CheckViewModel};
use engine_logging::{engine_info, engine_warn};
use tokio::sync::watch;

use crate::config::validate_limits;
use crate::geo::DEFAULT_LOOKUP_TIMEOUT;
use crate::scheduler::{run_batch, BatchPlan, RunState};
use crate::{
    CheckerConfig, EngineError, EngineEvent, FallbackResolver, FfprobeOpener, GeoLocator,
    HostFailureTracker, IpApiLookup, Probe, ResultAggregator, StreamOpener,
};

enum EngineCommand {
    RunBatch(BatchPlan),
}

/// Synchronous handle to the checking engine.
///
/// The tokio runtime lives on a dedicated engine thread and is torn down when
/// the handle is dropped, so callers never block on network work.
pub struct CheckEngine {
    cmd_tx: mpsc::Sender<EngineCommand>,
    aggregator: Arc<ResultAggregator>,
    control: watch::Sender<RunState>,
    probe: Probe,
    geo: Option<Arc<GeoLocator>>,
    config: CheckerConfig,
}

impl CheckEngine {
    /// Engine probing through `ffprobe` and locating hosts through ip-api.
    pub fn new(config: CheckerConfig) -> Result<Self, EngineError> {
        let opener = Arc::new(FfprobeOpener::new(config.ffprobe_path.clone()));
        let geo = if config.geo_lookup_enabled {
            let lookup = IpApiLookup::new(config.geo_endpoint.clone(), DEFAULT_LOOKUP_TIMEOUT)?;
            Some(Arc::new(GeoLocator::new(Arc::new(lookup))))
        } else {
            None
        };
        Self::with_collaborators(config, opener, geo)
    }

    pub fn with_collaborators(
        config: CheckerConfig,
        opener: Arc<dyn StreamOpener>,
        geo: Option<Arc<GeoLocator>>,
    ) -> Result<Self, EngineError> {
        Self::with_aggregator(config, opener, geo, Arc::new(ResultAggregator::new()))
    }

    /// Engine over caller-supplied collaborators. A locator passed while
    /// `geo_lookup_enabled` is off is dropped.
    pub fn with_aggregator(
        config: CheckerConfig,
        opener: Arc<dyn StreamOpener>,
        geo: Option<Arc<GeoLocator>>,
        aggregator: Arc<ResultAggregator>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let geo = geo.filter(|_| config.geo_lookup_enabled);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("checker-worker")
            .build()
            .map_err(EngineError::Runtime)?;
        let (cmd_tx, cmd_rx) = mpsc::channel::<EngineCommand>();
        let (control, control_rx) = watch::channel(RunState::Running);

        let spawn_aggregator = aggregator.clone();
        thread::Builder::new()
            .name("checker-engine".to_string())
            .spawn(move || {
                while let Ok(command) = cmd_rx.recv() {
                    match command {
                        EngineCommand::RunBatch(plan) => {
                            runtime.spawn(run_batch(
                                plan,
                                spawn_aggregator.clone(),
                                control_rx.clone(),
                            ));
                        }
                    }
                }
                runtime.shutdown_background();
            })
            .map_err(EngineError::Runtime)?;

        let probe = Probe::new(opener).with_retry_on_timeout(config.retry_on_timeout);
        Ok(Self {
            cmd_tx,
            aggregator,
            control,
            probe,
            geo,
            config,
        })
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    /// Run a batch with the configured concurrency and per-URL timeout.
    pub fn run_configured(
        &self,
        channels: Vec<Channel>,
    ) -> Result<mpsc::Receiver<EngineEvent>, EngineError> {
        self.run_batch(channels, self.config.concurrency, self.config.per_url_timeout)
    }

    /// Submit `channels` for checking and return a new event subscription,
    /// opened just before the batch starts. The subscription stays open and
    /// also carries events of later batches; compare epochs to tell them
    /// apart. Misconfiguration and malformed submissions are rejected here,
    /// before anything is scheduled.
    pub fn run_batch(
        &self,
        channels: Vec<Channel>,
        concurrency: usize,
        per_url_timeout: Duration,
    ) -> Result<mpsc::Receiver<EngineEvent>, EngineError> {
        validate_limits(concurrency, per_url_timeout)?;
        validate_channels(&channels)?;

        let events = self.aggregator.subscribe();
        let epoch = self.aggregator.begin_batch(channels.clone())?;
        self.control.send_replace(RunState::Running);

        let resolver = FallbackResolver::new(self.probe.clone(), per_url_timeout)
            .with_geo(self.geo.clone())
            .with_host_failures(
                self.config
                    .skip_same_host_failures
                    .then(|| Arc::new(HostFailureTracker::default())),
            );
        let plan = BatchPlan {
            epoch,
            queue: VecDeque::from(channels),
            concurrency,
            per_channel_timeout: self.config.per_channel_timeout,
            resolver,
        };
        if self.cmd_tx.send(EngineCommand::RunBatch(plan)).is_err() {
            engine_warn!("engine thread gone, reverting batch {}", epoch);
            self.aggregator.cancel();
            return Err(EngineError::EngineStopped);
        }
        engine_info!(
            "batch {} queued: concurrency={} per_url_timeout={}ms",
            epoch,
            concurrency,
            per_url_timeout.as_millis()
        );
        Ok(events)
    }

    /// Invalidate the running batch. Returns immediately; in-flight probes
    /// finish on their own and their results are dropped.
    pub fn cancel_all(&self) -> CancelReport {
        let report = self.aggregator.cancel();
        // Wake a paused dispatcher so it can notice the stale epoch.
        self.control.send_modify(|_| {});
        report
    }

    pub fn pause(&self) {
        self.control.send_replace(RunState::Paused);
    }

    pub fn resume(&self) {
        self.control.send_replace(RunState::Running);
    }

    pub fn is_paused(&self) -> bool {
        *self.control.borrow() == RunState::Paused
    }

    pub fn is_running(&self) -> bool {
        self.aggregator.is_running()
    }

    pub fn current_epoch(&self) -> CheckEpoch {
        self.aggregator.current_epoch()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<EngineEvent> {
        self.aggregator.subscribe()
    }

    pub fn snapshot(&self) -> Vec<Channel> {
        self.aggregator.snapshot()
    }

    pub fn channel(&self, id: ChannelId) -> Option<Channel> {
        self.aggregator.channel(id)
    }

    pub fn view(&self) -> (CheckViewModel, bool) {
        self.aggregator.view()
    }

    pub fn geo_locator(&self) -> Option<&Arc<GeoLocator>> {
        self.geo.as_ref()
    }
}

fn validate_channels(channels: &[Channel]) -> Result<(), EngineError> {
    let mut seen = BTreeSet::new();
    for channel in channels {
        if channel.urls.is_empty() {
            return Err(EngineError::EmptyCandidates {
                channel_id: channel.id,
            });
        }
        if !seen.insert(channel.id) {
            return Err(EngineError::DuplicateChannel {
                channel_id: channel.id,
            });
        }
    }
    Ok(())
}
