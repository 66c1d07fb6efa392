use thiserror::Error;

use crate::config::ConfigError;

/// Failures that end a pipeline run
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("can't spawn {worker} thread: {source}")]
    Spawn {
        worker: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} queue closed unexpectedly")]
    ChannelClosed(&'static str),
    #[error("{0} worker panicked")]
    WorkerPanicked(String),
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
}
