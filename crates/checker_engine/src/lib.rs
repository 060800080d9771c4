//! Checker engine: stream probing, fallback resolution and batch scheduling.
mod aggregator;
mod config;
mod engine;
mod error;
mod fallback;
mod geo;
mod opener;
mod probe;
mod scheduler;
mod types;

pub use aggregator::{Clock, ResultAggregator};
pub use config::{
    CheckerConfig, CheckerSettings, DEFAULT_CONCURRENCY, DEFAULT_GEO_ENDPOINT,
    DEFAULT_PER_URL_TIMEOUT,
};
pub use engine::CheckEngine;
pub use error::EngineError;
pub use fallback::{FallbackResolver, HostFailureTracker, DEFAULT_HOST_FAILURE_LIMIT};
pub use geo::{
    is_local_host, GeoError, GeoLocator, GeoLookup, GeoStats, IpApiLookup, DEFAULT_LOOKUP_TIMEOUT,
    LOCAL_NETWORK_LABEL,
};
pub use opener::{FfprobeOpener, StreamOpener};
pub use probe::Probe;
pub use scheduler::RunState;
pub use types::{
    EngineEvent, FallbackOutcome, FrameInfo, ProbeError, ProbeResult, ProbeSuccess, Resolved,
};
