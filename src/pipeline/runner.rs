use std::collections::BTreeMap;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam::channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{error, info, info_span, warn, Span};
use uuid::Uuid;

use crate::config::{SyncConfig, TrackingConfig};
use crate::pipeline::collaborators::{BigDetector, LargeDetections, MotionDetector, RecordSink, RenderSink};
use crate::pipeline::{
    BigStreamItem, CompletionBoard, InputFrame, PipelineError, RenderPayload, SmallDetectionStage, SmallInput,
    SmallStreamItem, StreamSynchronizer, SyncStep, Worker,
};

/// Summary of a finished run. Sinks are handed back to the caller.
pub struct RunReport<R, V> {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Frames accepted from the input iterator
    pub frames_in: u64,
    /// Synchronizer iterations that produced a render payload
    pub cycles: u64,
    /// Genuine entities per label
    pub counts: BTreeMap<String, usize>,
    /// Workers the watchdog had to stop. Empty on a clean run
    pub forced_workers: Vec<Worker>,
    pub record_sink: R,
    pub render_sink: V,
}

/// Threaded detection pipeline:
///
/// input -> big-detect -> small-detect -> synchronizer -> render
///
/// The synchronizer consumes both the big-detect and the small-detect outputs.
pub struct Pipeline {
    config: TrackingConfig,
}

impl Pipeline {
    /// Creates new pipeline from a validated configuration
    ///
    /// Basic usage:
    ///
    /// ```
    /// use fauna_rs::pipeline::Pipeline;
    /// use fauna_rs::TrackingConfig;
    /// let pipeline = Pipeline::new(TrackingConfig::default()).unwrap();
    /// assert_eq!(pipeline.get_config().sync.small_stream_stride, 2);
    /// ```
    pub fn new(config: TrackingConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Pipeline { config })
    }
    pub fn get_config(&self) -> &TrackingConfig {
        &self.config
    }
    /// Feeds `frames` through the pipeline and blocks until every worker is done
    /// or the watchdog gave up on them.
    pub fn run<I, B, M, R, V>(
        &self,
        frames: I,
        big_detector: B,
        motion_detector: M,
        record_sink: R,
        render_sink: V,
    ) -> Result<RunReport<R, V>, PipelineError>
    where
        I: IntoIterator<Item = InputFrame>,
        B: BigDetector + 'static,
        M: MotionDetector + 'static,
        R: RecordSink + 'static,
        V: RenderSink + 'static,
    {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id);
        let _entered = span.enter();
        let started_at = Utc::now();
        let board = CompletionBoard::new();
        let backoff = Duration::from_millis(self.config.sync.idle_backoff_ms);
        let stride = self.config.sync.small_stream_stride;

        let (input_tx, input_rx) = unbounded::<InputFrame>();
        let (small_in_tx, small_in_rx) = unbounded::<SmallInput>();
        let (big_tx, big_rx) = unbounded::<BigStreamItem>();
        let (small_tx, small_rx) = unbounded::<SmallStreamItem>();
        let (render_tx, render_rx) = unbounded::<RenderPayload>();

        let backlog = {
            let queues = (
                input_rx.clone(),
                small_in_rx.clone(),
                big_rx.clone(),
                small_rx.clone(),
                render_rx.clone(),
            );
            move || {
                [queues.0.len(), queues.1.len(), queues.2.len(), queues.3.len(), queues.4.len()]
                    .into_iter()
                    .max()
                    .unwrap_or(0)
            }
        };

        let stage = SmallDetectionStage::new(&self.config);
        let synchronizer = StreamSynchronizer::new(big_rx, small_rx, &self.config, record_sink);

        let big_handle = spawn_worker(Worker::BigDetect, &span, &board, move |board| {
            big_detect_loop(board, input_rx, big_tx, small_in_tx, big_detector, stride, backoff)
        })?;
        let small_handle = spawn_worker(Worker::SmallDetect, &span, &board, move |board| {
            small_detect_loop(board, small_in_rx, small_tx, motion_detector, stage, backoff)
        })?;
        let sync_handle = spawn_worker(Worker::Synchronizer, &span, &board, move |board| {
            synchronizer_loop(board, synchronizer, render_tx, backoff)
        })?;
        let render_handle = spawn_worker(Worker::Render, &span, &board, move |board| {
            render_loop(board, render_rx, render_sink, backoff)
        })?;

        let mut frames_in = 0;
        for frame in frames {
            if board.is_forced() {
                break;
            }
            if input_tx.send(frame).is_err() {
                warn!("large entity detector stopped accepting frames");
                break;
            }
            frames_in += 1;
        }
        drop(input_tx);
        board.mark_done(Worker::Input);

        let pending = backlog();
        drop(backlog);
        let deadline = watchdog_deadline(pending, &self.config.sync);
        info!(frames_in, backlog = pending, deadline_ms = deadline.as_millis() as u64, "input exhausted");
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let watchdog = spawn_watchdog(&span, &board, stop_rx, deadline)?;

        let big = join(big_handle, Worker::BigDetect);
        let small = join(small_handle, Worker::SmallDetect);
        let synced = join(sync_handle, Worker::Synchronizer);
        let rendered = join(render_handle, Worker::Render);
        // The watchdog may already be gone
        let _ = stop_tx.send(());
        let forced_workers = watchdog
            .join()
            .map_err(|_| PipelineError::WorkerPanicked("watchdog".to_string()))?;

        // A panic closes queues, so upstream workers report ChannelClosed too
        first_panic([big.as_ref().err(), small.as_ref().err(), synced.as_ref().err(), rendered.as_ref().err()])?;
        let big_frames = big?;
        let small_frames = small?;
        let (record_sink, counts, cycles) = synced?;
        let render_sink = rendered?;
        let finished_at = Utc::now();
        info!(
            big_frames,
            small_frames,
            cycles,
            forced = forced_workers.len(),
            elapsed_ms = (finished_at - started_at).num_milliseconds(),
            "run finished"
        );
        Ok(RunReport {
            run_id,
            started_at,
            finished_at,
            frames_in,
            cycles,
            counts,
            forced_workers,
            record_sink,
            render_sink,
        })
    }
}

/// `max(backlog / drain_rate, min_grace)`
fn watchdog_deadline(backlog: usize, sync: &SyncConfig) -> Duration {
    let grace = Duration::from_millis(sync.watchdog_min_grace_ms);
    if sync.watchdog_drain_rate.is_nan() || sync.watchdog_drain_rate <= 0.0 {
        return grace;
    }
    let drain = Duration::try_from_secs_f32(backlog as f32 / sync.watchdog_drain_rate).unwrap_or(Duration::MAX);
    drain.max(grace)
}

fn spawn_worker<T, F>(
    worker: Worker,
    span: &Span,
    board: &CompletionBoard,
    job: F,
) -> Result<JoinHandle<Result<T, PipelineError>>, PipelineError>
where
    T: Send + 'static,
    F: FnOnce(&CompletionBoard) -> Result<T, PipelineError> + Send + 'static,
{
    let span = span.clone();
    let thread_board = board.clone();
    let spawned = thread::Builder::new().name(worker.name().to_string()).spawn(move || {
        let _entered = span.enter();
        let _done = thread_board.guard(worker);
        info!(%worker, "worker started");
        let result = job(&thread_board);
        match &result {
            Ok(_) => info!(%worker, forced = thread_board.is_forced(), "worker stopped"),
            Err(err) => error!(%worker, error = %err, "worker failed"),
        }
        result
    });
    spawned.map_err(|source| {
        // Already running workers would otherwise wait on input forever
        board.force_stop();
        PipelineError::Spawn {
            worker: worker.name(),
            source,
        }
    })
}

fn spawn_watchdog(
    span: &Span,
    board: &CompletionBoard,
    stop_rx: Receiver<()>,
    deadline: Duration,
) -> Result<JoinHandle<Vec<Worker>>, PipelineError> {
    let span = span.clone();
    let thread_board = board.clone();
    let spawned = thread::Builder::new().name("watchdog".to_string()).spawn(move || {
        let _entered = span.enter();
        match stop_rx.recv_timeout(deadline) {
            Err(RecvTimeoutError::Timeout) => {
                if thread_board.all_done() {
                    return vec![];
                }
                let unfinished = thread_board.force_stop();
                error!(?unfinished, deadline_ms = deadline.as_millis() as u64, "pipeline stalled, forcing workers to stop");
                unfinished
            }
            _ => vec![],
        }
    });
    spawned.map_err(|source| {
        board.force_stop();
        PipelineError::Spawn {
            worker: "watchdog",
            source,
        }
    })
}

fn join<T>(handle: JoinHandle<Result<T, PipelineError>>, worker: Worker) -> Result<T, PipelineError> {
    handle
        .join()
        .map_err(|_| PipelineError::WorkerPanicked(worker.name().to_string()))?
}

fn first_panic(errors: [Option<&PipelineError>; 4]) -> Result<(), PipelineError> {
    match errors.into_iter().flatten().find(|err| matches!(err, PipelineError::WorkerPanicked(_))) {
        Some(PipelineError::WorkerPanicked(worker)) => Err(PipelineError::WorkerPanicked(worker.clone())),
        _ => Ok(()),
    }
}

/// Next queued item. None once `upstream` has finished and the queue is drained,
/// or when the run was force-stopped.
fn next_item<T>(board: &CompletionBoard, rx: &Receiver<T>, upstream: Worker, backoff: Duration) -> Option<T> {
    loop {
        if board.is_forced() {
            return None;
        }
        // Read before polling: the flag is set only after the last push
        let upstream_done = board.is_done(upstream);
        match rx.try_recv() {
            Ok(item) => return Some(item),
            Err(TryRecvError::Disconnected) => return None,
            Err(TryRecvError::Empty) if upstream_done => return rx.try_recv().ok(),
            Err(TryRecvError::Empty) => thread::sleep(backoff),
        }
    }
}

/// Ok(false) when the receiving worker is gone because the run was force-stopped
fn forward<T>(board: &CompletionBoard, tx: &Sender<T>, item: T, queue: &'static str) -> Result<bool, PipelineError> {
    match tx.send(item) {
        Ok(()) => Ok(true),
        Err(_) if board.is_forced() => Ok(false),
        Err(_) => Err(PipelineError::ChannelClosed(queue)),
    }
}

fn big_detect_loop<B: BigDetector>(
    board: &CompletionBoard,
    input_rx: Receiver<InputFrame>,
    big_tx: Sender<BigStreamItem>,
    small_tx: Sender<SmallInput>,
    mut detector: B,
    stride: u64,
    backoff: Duration,
) -> Result<u64, PipelineError> {
    let mut processed = 0;
    while let Some(input) = next_item(board, &input_rx, Worker::Input, backoff) {
        let detections = detector.detect(input.frame_index, &input.frame).unwrap_or_else(|err| {
            warn!(frame_index = input.frame_index, error = %err, "large entity detection failed");
            LargeDetections::default()
        });
        if input.frame_index % stride == 0 {
            let small_input = SmallInput {
                frame_index: input.frame_index,
                frame: input.frame.clone(),
                boxes: detections.boxes.clone(),
                blurry: input.blurry,
                blur_text: input.blur_text.clone(),
            };
            if !forward(board, &small_tx, small_input, "small detector input")? {
                break;
            }
        }
        let item = BigStreamItem {
            frame_index: input.frame_index,
            frame: input.frame,
            boxes: detections.boxes,
            annotations: detections.annotations,
            blurry: input.blurry,
            blur_text: input.blur_text,
        };
        if !forward(board, &big_tx, item, "large entity stream")? {
            break;
        }
        processed += 1;
    }
    Ok(processed)
}

fn small_detect_loop<M: MotionDetector>(
    board: &CompletionBoard,
    input_rx: Receiver<SmallInput>,
    small_tx: Sender<SmallStreamItem>,
    mut detector: M,
    mut stage: SmallDetectionStage,
    backoff: Duration,
) -> Result<u64, PipelineError> {
    let mut processed = 0;
    while let Some(input) = next_item(board, &input_rx, Worker::BigDetect, backoff) {
        let observation = detector
            .detect(input.frame_index, &input.frame, input.blurry)
            .unwrap_or_else(|err| {
                warn!(frame_index = input.frame_index, error = %err, "motion detection failed");
                Default::default()
            });
        let item = stage.process(input, observation);
        if !forward(board, &small_tx, item, "small entity stream")? {
            break;
        }
        processed += 1;
    }
    Ok(processed)
}

fn synchronizer_loop<R: RecordSink>(
    board: &CompletionBoard,
    mut synchronizer: StreamSynchronizer<R>,
    render_tx: Sender<RenderPayload>,
    backoff: Duration,
) -> Result<(R, BTreeMap<String, usize>, u64), PipelineError> {
    let mut cycles = 0;
    while !board.is_forced() {
        let big_done = board.is_done(Worker::BigDetect);
        let small_done = board.is_done(Worker::SmallDetect);
        match synchronizer.step(big_done, small_done) {
            SyncStep::Cycle(event) => {
                cycles += 1;
                if !forward(board, &render_tx, event.payload, "render")? {
                    break;
                }
            }
            SyncStep::Idle => thread::sleep(backoff),
            SyncStep::Finished => break,
        }
    }
    let (sink, counts) = synchronizer.into_parts();
    Ok((sink, counts, cycles))
}

fn render_loop<V: RenderSink>(
    board: &CompletionBoard,
    render_rx: Receiver<RenderPayload>,
    mut sink: V,
    backoff: Duration,
) -> Result<V, PipelineError> {
    while let Some(payload) = next_item(board, &render_rx, Worker::Synchronizer, backoff) {
        let frame_index = payload.big_frame_index.max(payload.small_frame_index);
        if let Err(err) = sink.render(payload) {
            warn!(?frame_index, error = %err, "render failed");
        }
    }
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watchdog_deadline() {
        let sync = SyncConfig::default();
        // 10 items/s: 30 queued items need 3 s, below the 5 s grace
        assert_eq!(watchdog_deadline(30, &sync), Duration::from_secs(5));
        assert_eq!(watchdog_deadline(120, &sync), Duration::from_secs(12));
        let broken = SyncConfig {
            watchdog_drain_rate: f32::NAN,
            ..SyncConfig::default()
        };
        assert_eq!(watchdog_deadline(10_000, &broken), Duration::from_secs(5));
    }

    #[test]
    fn test_next_item_drains_before_stopping() {
        let board = CompletionBoard::new();
        let (tx, rx) = unbounded();
        tx.send(1).unwrap();
        tx.send(2).unwrap();
        board.mark_done(Worker::Input);
        let backoff = Duration::from_millis(1);
        assert_eq!(next_item(&board, &rx, Worker::Input, backoff), Some(1));
        assert_eq!(next_item(&board, &rx, Worker::Input, backoff), Some(2));
        assert_eq!(next_item(&board, &rx, Worker::Input, backoff), None);
    }

    #[test]
    fn test_forward_after_force_stop() {
        let board = CompletionBoard::new();
        let (tx, rx) = unbounded::<u8>();
        drop(rx);
        assert!(matches!(forward(&board, &tx, 1, "test"), Err(PipelineError::ChannelClosed("test"))));
        board.force_stop();
        assert!(matches!(forward(&board, &tx, 1, "test"), Ok(false)));
    }

    #[test]
    fn test_panic_reported_before_closed_queue() {
        let closed = PipelineError::ChannelClosed("small detector input");
        let panicked = PipelineError::WorkerPanicked("small-detect".to_string());
        let err = first_panic([Some(&closed), Some(&panicked), None, None]).unwrap_err();
        assert!(matches!(err, PipelineError::WorkerPanicked(ref worker) if worker == "small-detect"));
        assert!(first_panic([Some(&closed), None, None, None]).is_ok());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = TrackingConfig::default();
        config.sync.small_stream_stride = 0;
        assert!(matches!(Pipeline::new(config), Err(PipelineError::Config(_))));
    }
}
