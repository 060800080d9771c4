use std::sync::Once;
use std::time::{Duration, SystemTime};

use checker_core::{
    Channel, ChannelOutcome, ChannelStatus, CheckState, FailureKind, ProgressEvent, Resolution,
};
use pretty_assertions::assert_eq;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

fn channel(id: u64, urls: &[&str]) -> Channel {
    Channel::new(
        id,
        format!("channel-{id}"),
        "News",
        urls.iter().map(|url| url.to_string()).collect(),
    )
}

fn valid(active_index: usize) -> ChannelOutcome {
    ChannelOutcome::Valid {
        active_index,
        resolution: Resolution::new(1920, 1080),
        response_time: Duration::from_millis(300),
        geo_label: Some("Local network".to_string()),
    }
}

#[test]
fn begin_batch_opens_epoch_and_resets_to_pending() {
    init_logging();
    let mut state = CheckState::new();
    let epoch = state.begin_batch(vec![channel(1, &["http://a"]), channel(2, &["http://b"])]);

    assert_eq!(epoch, 1);
    assert!(state.is_running());
    assert_eq!(state.progress(), (0, 2));
    assert!(state
        .channels()
        .all(|channel| channel.status() == ChannelStatus::Pending));
    assert!(state.consume_dirty());
    assert!(!state.consume_dirty());
}

#[test]
fn apply_moves_through_checking_to_valid() {
    init_logging();
    let mut state = CheckState::new();
    let epoch = state.begin_batch(vec![channel(1, &["http://bad", "http://good"])]);
    let now = SystemTime::now();

    let checking = state.mark_checking(1, epoch).expect("checking event");
    assert_eq!(
        checking,
        ProgressEvent {
            epoch,
            channel_id: 1,
            new_status: ChannelStatus::Checking,
            completed: 0,
            total: 1,
        }
    );

    let done = state.apply(1, epoch, valid(1), now).expect("applied");
    assert_eq!(done.new_status, ChannelStatus::Valid);
    assert_eq!((done.completed, done.total), (1, 1));

    let stored = state.channel(1).unwrap();
    assert_eq!(stored.active_url_index(), Some(1));
    assert_eq!(stored.active_url(), Some("http://good"));
    assert_eq!(stored.resolution(), Resolution::new(1920, 1080));
    assert_eq!(stored.response_time(), Some(Duration::from_millis(300)));
    assert_eq!(stored.check().last_checked, Some(now));

    let summary = state.finish_batch(epoch).expect("batch complete");
    assert_eq!((summary.total, summary.valid, summary.invalid), (1, 1, 0));
    assert!(!state.is_running());
}

#[test]
fn invalid_outcome_keeps_last_error_kind() {
    init_logging();
    let mut state = CheckState::new();
    let epoch = state.begin_batch(vec![channel(4, &["http://bad"])]);
    state.mark_checking(4, epoch);
    state.apply(
        4,
        epoch,
        ChannelOutcome::Invalid {
            kind: FailureKind::Decode,
        },
        SystemTime::now(),
    );

    let stored = state.channel(4).unwrap();
    assert_eq!(stored.status(), ChannelStatus::Invalid);
    assert_eq!(stored.last_error(), Some(FailureKind::Decode));
    assert_eq!(stored.active_url_index(), None);
    assert_eq!(stored.geo_label(), "Unknown");
}

#[test]
fn stale_epoch_outcomes_are_discarded() {
    init_logging();
    let mut state = CheckState::new();
    let epoch = state.begin_batch(vec![channel(1, &["http://a"])]);
    state.mark_checking(1, epoch);

    let report = state.cancel();
    assert_eq!(report.cancelled_epoch, Some(epoch));
    assert_eq!(report.new_epoch, epoch + 1);
    assert_eq!(report.reverted, vec![1]);

    assert!(state.apply(1, epoch, valid(0), SystemTime::now()).is_none());
    assert!(state.mark_checking(1, epoch).is_none());
    assert_eq!(state.channel(1).unwrap().status(), ChannelStatus::Pending);
    assert!(!state.is_running());
}

#[test]
fn cancel_restores_pre_run_status_but_keeps_finished_results() {
    init_logging();
    let mut state = CheckState::new();
    let first = state.begin_batch(vec![channel(1, &["http://a"]), channel(2, &["http://b"])]);
    state.mark_checking(1, first);
    state.mark_checking(2, first);
    state.apply(1, first, valid(0), SystemTime::now());
    state.apply(
        2,
        first,
        ChannelOutcome::Invalid {
            kind: FailureKind::Timeout,
        },
        SystemTime::now(),
    );
    state.finish_batch(first).expect("first batch done");

    // Second cycle: channel 1 finishes, channel 2 is still in flight when cancelled.
    let second = state.begin_batch(vec![channel(1, &["http://a"]), channel(2, &["http://b"])]);
    state.mark_checking(1, second);
    state.mark_checking(2, second);
    state.apply(
        1,
        second,
        ChannelOutcome::Invalid {
            kind: FailureKind::Connection,
        },
        SystemTime::now(),
    );
    let report = state.cancel();

    assert_eq!(report.reverted, vec![2]);
    assert_eq!(state.channel(1).unwrap().status(), ChannelStatus::Invalid);
    let reverted = state.channel(2).unwrap();
    assert_eq!(reverted.status(), ChannelStatus::Invalid);
    assert_eq!(reverted.last_error(), Some(FailureKind::Timeout));
}

#[test]
fn duplicate_and_foreign_outcomes_are_ignored() {
    init_logging();
    let mut state = CheckState::new();
    let epoch = state.begin_batch(vec![channel(1, &["http://a"])]);
    state.mark_checking(1, epoch);

    assert!(state.apply(1, epoch, valid(0), SystemTime::now()).is_some());
    assert!(state
        .apply(
            1,
            epoch,
            ChannelOutcome::Invalid {
                kind: FailureKind::Decode
            },
            SystemTime::now()
        )
        .is_none());
    assert!(state.apply(99, epoch, valid(0), SystemTime::now()).is_none());
    assert_eq!(state.channel(1).unwrap().status(), ChannelStatus::Valid);
}

#[test]
fn cancelled_outcome_is_never_applied() {
    init_logging();
    let mut state = CheckState::new();
    let epoch = state.begin_batch(vec![channel(1, &["http://a"])]);
    state.mark_checking(1, epoch);

    assert!(state
        .apply(1, epoch, ChannelOutcome::Cancelled, SystemTime::now())
        .is_none());
    assert_eq!(state.progress(), (0, 1));
    assert!(state.finish_batch(epoch).is_none());
}

#[test]
fn view_counts_statuses_and_formats_rows() {
    init_logging();
    let mut state = CheckState::new();
    let epoch = state.begin_batch(vec![
        channel(1, &["http://a/1", "http://a/2"]),
        channel(2, &["http://b"]),
        channel(3, &["http://c"]),
    ]);
    state.mark_checking(1, epoch);
    state.apply(1, epoch, valid(1), SystemTime::now());
    state.mark_checking(2, epoch);

    let view = state.view();
    assert!(view.running);
    assert_eq!((view.completed, view.total), (1, 3));
    assert_eq!(
        (view.counts.valid, view.counts.checking, view.counts.pending),
        (1, 1, 1)
    );

    let row = &view.rows[0];
    assert_eq!(row.url, "http://a/2");
    assert_eq!(row.candidate_count, 2);
    assert_eq!(row.resolution, "1920x1080");
    assert_eq!(row.response_time_ms, Some(300));
    assert_eq!(row.geo_label, "Local network");
    assert_eq!(view.rows[2].resolution, "Unknown");
}

#[test]
fn outcome_for_unmarked_channel_is_ignored() {
    init_logging();
    let mut state = CheckState::new();
    let epoch = state.begin_batch(vec![channel(1, &["http://a"])]);

    assert!(state.apply(1, epoch, valid(0), SystemTime::now()).is_none());
    assert_eq!(state.channel(1).unwrap().status(), ChannelStatus::Pending);
    assert_eq!(state.progress(), (0, 1));
}

#[test]
fn outcome_naming_a_missing_candidate_is_ignored() {
    init_logging();
    let mut state = CheckState::new();
    let epoch = state.begin_batch(vec![channel(1, &["http://a", "http://b"])]);
    state.mark_checking(1, epoch);

    assert!(state.apply(1, epoch, valid(2), SystemTime::now()).is_none());
    assert_eq!(state.channel(1).unwrap().status(), ChannelStatus::Checking);
    assert!(state.apply(1, epoch, valid(1), SystemTime::now()).is_some());
}

#[test]
fn cancel_restores_the_candidate_list_with_the_active_index() {
    init_logging();
    let mut state = CheckState::new();
    let first = state.begin_batch(vec![channel(1, &["http://a", "http://b", "http://c"])]);
    state.mark_checking(1, first);
    state.apply(1, first, valid(2), SystemTime::now());
    state.finish_batch(first).expect("first batch done");

    let second = state.begin_batch(vec![channel(1, &["http://only"])]);
    assert_eq!(state.channel(1).unwrap().urls, vec!["http://only".to_string()]);
    state.mark_checking(1, second);
    let report = state.cancel();

    assert_eq!(report.reverted, vec![1]);
    let restored = state.channel(1).unwrap();
    assert_eq!(restored.status(), ChannelStatus::Valid);
    assert_eq!(restored.urls.len(), 3);
    assert_eq!(restored.active_url_index(), Some(2));
    assert_eq!(restored.active_url(), Some("http://c"));
}

#[test]
fn cancel_of_a_first_run_leaves_new_channels_pending() {
    init_logging();
    let mut state = CheckState::new();
    let epoch = state.begin_batch(vec![channel(5, &["http://a", "http://b"])]);
    state.mark_checking(5, epoch);
    state.cancel();

    let restored = state.channel(5).unwrap();
    assert_eq!(restored.status(), ChannelStatus::Pending);
    assert_eq!(restored.urls.len(), 2);
    assert_eq!(restored.active_url_index(), None);
}
