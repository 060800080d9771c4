use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use checker_core::{Channel, ChannelOutcome, CheckEpoch, FailureKind};
use engine_logging::{engine_debug, engine_error, engine_info, engine_warn};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use crate::{FallbackResolver, ResultAggregator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Running,
    Paused,
}

/// Everything one batch run needs.
pub(crate) struct BatchPlan {
    pub epoch: CheckEpoch,
    pub queue: VecDeque<Channel>,
    pub concurrency: usize,
    pub per_channel_timeout: Option<Duration>,
    pub resolver: FallbackResolver,
}

/// Dispatch loop for one batch: pulls channels in submission order, keeps at
/// most `concurrency` checks in flight and stops dequeuing when the epoch
/// goes stale.
pub(crate) async fn run_batch(
    plan: BatchPlan,
    aggregator: Arc<ResultAggregator>,
    mut control: watch::Receiver<RunState>,
) {
    let BatchPlan {
        epoch,
        mut queue,
        concurrency,
        per_channel_timeout,
        resolver,
    } = plan;
    let resolver = Arc::new(resolver);
    let permits = Arc::new(Semaphore::new(concurrency));
    let mut workers = JoinSet::new();

    while let Some(channel) = queue.pop_front() {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        if !wait_while_paused(&mut control, &aggregator, epoch).await {
            engine_info!(
                "batch {} stopped dequeuing, {} channels left unstarted",
                epoch,
                queue.len() + 1
            );
            break;
        }
        if !aggregator.mark_checking(channel.id, epoch) {
            continue;
        }

        let resolver = resolver.clone();
        let aggregator = aggregator.clone();
        workers.spawn(async move {
            let _permit = permit;
            check_channel(channel, epoch, &resolver, &aggregator, per_channel_timeout).await;
        });
    }

    while let Some(joined) = workers.join_next().await {
        if let Err(err) = joined {
            engine_error!("channel check task failed in batch {}: {}", epoch, err);
        }
    }

    aggregator.finish_batch(epoch);
}

/// Blocks while paused. Returns `false` once `epoch` is no longer current.
async fn wait_while_paused(
    control: &mut watch::Receiver<RunState>,
    aggregator: &ResultAggregator,
    epoch: CheckEpoch,
) -> bool {
    loop {
        if !aggregator.is_current(epoch) {
            return false;
        }
        if *control.borrow_and_update() == RunState::Running {
            return true;
        }
        engine_debug!("batch {} paused", epoch);
        if control.changed().await.is_err() {
            return false;
        }
    }
}

async fn check_channel(
    channel: Channel,
    epoch: CheckEpoch,
    resolver: &FallbackResolver,
    aggregator: &ResultAggregator,
    per_channel_timeout: Option<Duration>,
) {
    let resolving = resolver.resolve(&channel, epoch, aggregator);
    let outcome = match per_channel_timeout {
        Some(limit) => match tokio::time::timeout(limit, resolving).await {
            Ok(outcome) => {
                engine_debug!("channel {} used {} attempts", channel.id, outcome.attempts);
                outcome.into_channel_outcome()
            }
            Err(_) => {
                engine_warn!(
                    "channel {} exceeded its {} ms budget",
                    channel.id,
                    limit.as_millis()
                );
                ChannelOutcome::Invalid {
                    kind: FailureKind::Timeout,
                }
            }
        },
        None => {
            let outcome = resolving.await;
            engine_debug!("channel {} used {} attempts", channel.id, outcome.attempts);
            outcome.into_channel_outcome()
        }
    };
    aggregator.apply(channel.id, epoch, outcome);
}
