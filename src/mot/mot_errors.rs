use thiserror::Error;

/// Per-cycle failures of the trackers and their collaborators.
///
/// None of these abort a run: the caller logs the error and continues with the
/// state it had before the failing cycle.
#[derive(Debug, Clone, Error)]
pub enum TrackerError {
    #[error("bad size: {0}")]
    BadSize(String),
    #[error("detector failure: {0}")]
    Detector(String),
    #[error("render failure: {0}")]
    Render(String),
    #[error("record sink failure: {0}")]
    Sink(String),
}
