//! Checker core: channel model, aggregator state and view-model helpers.
mod channel;
mod export;
mod filter;
mod state;
mod view_model;

pub use channel::{
    Channel, ChannelCheck, ChannelId, ChannelStatus, FailureKind, Resolution, UNKNOWN_LABEL,
};
pub use export::ExportUrls;
pub use filter::ChannelFilter;
pub use state::{
    BatchSummary, CancelReport, ChannelOutcome, CheckEpoch, CheckState, ProgressEvent,
};
pub use view_model::{ChannelRowView, CheckViewModel, StatusCounts};
