//! Lifecycle tracking of microfauna seen by two asynchronous detectors.
//!
//! Large organisms come from a neural detector with re-identification and are
//! kept by [`mot::BigEntityManager`]. Small ones are picked from frame differences,
//! filtered by [`mot::RegionFilter`] and tracked by [`mot::SmallEntityTracker`].
//! [`pipeline::Pipeline`] runs both on worker threads and merges their results in
//! frame order.
pub mod config;
pub mod mot;
pub mod pipeline;
pub mod utils;
mod logging;

pub use config::{ConfigError, TrackingConfig};
pub use logging::init_tracing;
