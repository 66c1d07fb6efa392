//! Export contents of `pipeline` folder
mod stream;
mod board;
mod small_stage;
mod synchronizer;
mod runner;
pub mod collaborators;
pub mod pipeline_errors;

pub use self::{
    stream::*,
    board::{CompletionBoard, DoneGuard, Worker},
    small_stage::SmallDetectionStage,
    synchronizer::{StreamSynchronizer, SyncStep},
    runner::{Pipeline, RunReport},
    collaborators::{BigDetector, LargeDetections, MotionDetector, MotionObservation, RecordSink, RenderSink},
    pipeline_errors::PipelineError,
};
