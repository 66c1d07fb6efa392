use std::collections::{BTreeMap, VecDeque};

use crossbeam::channel::Receiver;
use tracing::{trace, warn};

use crate::config::TrackingConfig;
use crate::mot::{BigEntityManager, Census, FinishedEntity};
use crate::pipeline::collaborators::RecordSink;
use crate::pipeline::{BigStreamItem, Frame, RenderPayload, SmallStreamItem, SynchronizedCycleEvent};

/// Outcome of a single synchronizer iteration
#[derive(Debug)]
pub enum SyncStep {
    /// At least one stream advanced
    Cycle(SynchronizedCycleEvent),
    /// Nothing could be consumed yet
    Idle,
    /// Both streams are exhausted
    Finished,
}

/// Merges the large-entity and small-entity result streams in frame-index order
/// and owns the large-entity lifecycle.
///
/// The lower frame index is always consumed first; equal indices are consumed
/// together, in which case the small stream's translation is applied to the large
/// records.
pub struct StreamSynchronizer<R: RecordSink> {
    big_rx: Receiver<BigStreamItem>,
    small_rx: Receiver<SmallStreamItem>,
    big_pending: VecDeque<BigStreamItem>,
    small_pending: VecDeque<SmallStreamItem>,
    manager: BigEntityManager,
    census: Census,
    sink: R,
    strict_ordering: bool,
    last_big: Option<u64>,
    last_small: Option<u64>,
}

impl<R: RecordSink> StreamSynchronizer<R> {
    pub fn new(
        big_rx: Receiver<BigStreamItem>,
        small_rx: Receiver<SmallStreamItem>,
        config: &TrackingConfig,
        sink: R,
    ) -> Self {
        StreamSynchronizer {
            big_rx,
            small_rx,
            big_pending: VecDeque::new(),
            small_pending: VecDeque::new(),
            manager: BigEntityManager::new(&config.big),
            census: Census::new(&config.big, &config.small, &config.presence),
            sink,
            strict_ordering: config.sync.strict_ordering,
            last_big: None,
            last_small: None,
        }
    }
    /// Runs one iteration.
    ///
    /// `big_done` and `small_done` must be read before the call: a producer's flag
    /// is only set once everything it produced is already in its queue.
    pub fn step(&mut self, big_done: bool, small_done: bool) -> SyncStep {
        self.poll();
        let big_head = self.big_pending.front().map(|item| item.frame_index);
        let small_head = self.small_pending.front().map(|item| item.frame_index);
        let (take_big, take_small) = match (big_head, small_head) {
            (Some(big), Some(small)) => (big <= small, small <= big),
            // A lone item may still be overtaken by the other stream
            (Some(_), None) => (small_done || !self.strict_ordering, false),
            (None, Some(_)) => (false, big_done || !self.strict_ordering),
            (None, None) => {
                if big_done && small_done {
                    self.poll();
                    if self.big_pending.is_empty() && self.small_pending.is_empty() {
                        return SyncStep::Finished;
                    }
                }
                return SyncStep::Idle;
            }
        };
        if !take_big && !take_small {
            return SyncStep::Idle;
        }
        let big = if take_big { self.big_pending.pop_front() } else { None };
        let small = if take_small { self.small_pending.pop_front() } else { None };
        match self.consume(big, small) {
            Some(event) => SyncStep::Cycle(event),
            None => SyncStep::Idle,
        }
    }
    pub fn get_manager(&self) -> &BigEntityManager {
        &self.manager
    }
    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.census.snapshot()
    }
    pub fn get_last_indices(&self) -> (Option<u64>, Option<u64>) {
        (self.last_big, self.last_small)
    }
    /// Gives back the record sink together with the final counts
    pub fn into_parts(self) -> (R, BTreeMap<String, usize>) {
        let counts = self.census.snapshot();
        (self.sink, counts)
    }
    fn poll(&mut self) {
        self.big_pending.extend(self.big_rx.try_iter());
        self.small_pending.extend(self.small_rx.try_iter());
    }
    fn consume(&mut self, big: Option<BigStreamItem>, small: Option<SmallStreamItem>) -> Option<SynchronizedCycleEvent> {
        let translation = small.as_ref().and_then(|item| item.translation);
        let mut view: Option<(Frame, bool, String)> = None;
        let mut entities = Vec::new();

        if let Some(item) = big {
            if let Err(err) = self.manager.update(
                item.frame_index,
                &item.frame,
                &item.boxes,
                &item.annotations,
                item.blurry,
                translation,
            ) {
                warn!(frame_index = item.frame_index, error = %err, "large entity update skipped");
            }
            for record in self.manager.clear() {
                let finished = self.census.admit_large(record);
                self.forward(finished);
            }
            self.last_big = Some(item.frame_index);
            view = Some((item.frame, item.blurry, item.blur_text));
        }
        entities.extend(self.manager.display_tracks());

        if let Some(item) = small {
            for record in item.expired {
                let finished = self.census.admit_small(record);
                self.forward(finished);
            }
            entities.extend(item.displayable);
            self.last_small = Some(item.frame_index);
            view = Some((item.frame, item.blurry, item.blur_text));
        }

        let (frame, blurry, blur_text) = view?;
        trace!(big = ?self.last_big, small = ?self.last_small, "streams advanced");
        Some(SynchronizedCycleEvent {
            big_frame_index: self.last_big,
            small_frame_index: self.last_small,
            translation,
            payload: RenderPayload {
                frame,
                blurry,
                blur_text,
                big_frame_index: self.last_big,
                small_frame_index: self.last_small,
                entities,
                counts: self.census.snapshot(),
            },
        })
    }
    fn forward(&mut self, finished: FinishedEntity) {
        let track_id = finished.track_id();
        if let Err(err) = self.sink.accept(finished) {
            warn!(track_id, error = %err, "record sink rejected entity");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackingConfig;
    use crate::mot::{
        Annotation, CandidatePoint, Entity, EntityKind, FinishedEntity, SmallEntityRecord, TrackedBox, TrackerError,
    };
    use crate::utils::{Point, Rect, Translation};
    use crossbeam::channel::{unbounded, Sender};
    use image::RgbImage;
    use std::sync::Arc;

    type Synchronizer = StreamSynchronizer<Vec<FinishedEntity>>;

    fn frame() -> Frame {
        Arc::new(RgbImage::new(64, 64))
    }

    fn big_item(frame_index: u64, boxes: Vec<TrackedBox>, annotations: Vec<Annotation>) -> BigStreamItem {
        BigStreamItem {
            frame_index,
            frame: frame(),
            boxes,
            annotations,
            blurry: false,
            blur_text: format!("big {}", frame_index),
        }
    }

    fn small_item(frame_index: u64, translation: Option<Translation>, expired: Vec<SmallEntityRecord>) -> SmallStreamItem {
        SmallStreamItem {
            frame_index,
            frame: frame(),
            expired,
            translation,
            displayable: vec![],
            blurry: false,
            blur_text: format!("small {}", frame_index),
        }
    }

    fn setup(config: &TrackingConfig) -> (Sender<BigStreamItem>, Sender<SmallStreamItem>, Synchronizer) {
        let (big_tx, big_rx) = unbounded();
        let (small_tx, small_rx) = unbounded();
        let sync = StreamSynchronizer::new(big_rx, small_rx, config, Vec::new());
        (big_tx, small_tx, sync)
    }

    #[test]
    fn test_merge_order() {
        let (big_tx, small_tx, mut sync) = setup(&TrackingConfig::default());
        for idx in [1, 3, 5] {
            big_tx.send(big_item(idx, vec![], vec![])).unwrap();
        }
        for idx in [2, 3, 4] {
            small_tx.send(small_item(idx, None, vec![])).unwrap();
        }
        let mut order = vec![];
        loop {
            match sync.step(true, true) {
                SyncStep::Cycle(event) => order.push((event.big_frame_index, event.small_frame_index, event.payload.blur_text)),
                SyncStep::Idle => continue,
                SyncStep::Finished => break,
            }
        }
        let correct = vec![
            (Some(1), None, "big 1".to_string()),
            (Some(1), Some(2), "small 2".to_string()),
            (Some(3), Some(3), "small 3".to_string()),
            (Some(3), Some(4), "small 4".to_string()),
            (Some(5), Some(4), "big 5".to_string()),
        ];
        assert_eq!(order, correct);
    }

    #[test]
    fn test_lone_item_waits_for_other_stream() {
        let (big_tx, _small_tx, mut sync) = setup(&TrackingConfig::default());
        big_tx.send(big_item(7, vec![], vec![])).unwrap();
        assert!(matches!(sync.step(false, false), SyncStep::Idle));
        assert!(matches!(sync.step(true, false), SyncStep::Idle));
        assert!(matches!(sync.step(true, true), SyncStep::Cycle(_)));
        assert!(matches!(sync.step(true, true), SyncStep::Finished));
    }

    #[test]
    fn test_lone_item_relaxed_ordering() {
        let mut config = TrackingConfig::default();
        config.sync.strict_ordering = false;
        let (_big_tx, small_tx, mut sync) = setup(&config);
        small_tx.send(small_item(2, None, vec![])).unwrap();
        match sync.step(false, false) {
            SyncStep::Cycle(event) => assert_eq!(event.small_frame_index, Some(2)),
            other => panic!("unexpected step: {:?}", other),
        }
    }

    #[test]
    fn test_no_finish_while_producers_run() {
        let (_big_tx, _small_tx, mut sync) = setup(&TrackingConfig::default());
        assert!(matches!(sync.step(true, false), SyncStep::Idle));
        assert!(matches!(sync.step(false, true), SyncStep::Idle));
        assert!(matches!(sync.step(true, true), SyncStep::Finished));
    }

    #[test]
    fn test_tie_applies_small_translation() {
        let (big_tx, small_tx, mut sync) = setup(&TrackingConfig::default());
        let rect = Rect::new(10.0, 10.0, 20.0, 20.0);
        big_tx.send(big_item(0, vec![TrackedBox::new(rect, 4)], vec![Annotation::new(0, 1)])).unwrap();
        small_tx.send(small_item(0, None, vec![])).unwrap();
        assert!(matches!(sync.step(true, true), SyncStep::Cycle(_)));

        // Track 4 is gone on frame 2 and only drifts with the camera
        big_tx.send(big_item(2, vec![], vec![])).unwrap();
        small_tx.send(small_item(2, Some(Translation::new(5.0, -2.0)), vec![])).unwrap();
        match sync.step(true, true) {
            SyncStep::Cycle(event) => {
                assert_eq!(event.translation, Some(Translation::new(5.0, -2.0)));
                assert!(event.payload.entities.is_empty());
            }
            other => panic!("unexpected step: {:?}", other),
        }
        let record = sync.get_manager().get(4).unwrap();
        assert_eq!(record.get_center_history(), vec![Point::new(20.0, 13.0); 2]);
        assert_eq!(record.get_detection_sequence(), &[1, 0]);
    }

    #[test]
    fn test_expired_records_reach_sink() {
        let mut config = TrackingConfig::default();
        config.big.survival = 2;
        let (big_tx, small_tx, mut sync) = setup(&config);
        let rect = Rect::new(10.0, 10.0, 20.0, 20.0);
        big_tx.send(big_item(0, vec![TrackedBox::new(rect, 9)], vec![Annotation::new(1, 1)])).unwrap();
        big_tx.send(big_item(1, vec![], vec![])).unwrap();
        let expired = SmallEntityRecord::new(3, &CandidatePoint::new(5.0, 5.0, 2.0), 0, 100, 15);
        small_tx.send(small_item(2, None, vec![expired])).unwrap();
        while !matches!(sync.step(true, true), SyncStep::Finished) {}

        let (sink, counts) = sync.into_parts();
        assert_eq!(sink.len(), 2);
        assert_eq!(sink[0].kind(), EntityKind::Large);
        assert_eq!(sink[0].track_id(), 9);
        assert_eq!(sink[0].label, "Mo");
        assert!(!sink[0].genuine);
        assert_eq!(sink[1].kind(), EntityKind::Small);
        assert_eq!(counts["Mo"], 0);
    }

    struct RejectingSink {
        attempts: usize,
    }

    impl RecordSink for RejectingSink {
        fn accept(&mut self, _entity: FinishedEntity) -> Result<(), TrackerError> {
            self.attempts += 1;
            Err(TrackerError::Sink("report store offline".to_string()))
        }
    }

    #[test]
    fn test_sink_failure_does_not_stop_merging() {
        let (big_tx, big_rx) = unbounded();
        let (small_tx, small_rx) = unbounded();
        let mut sync = StreamSynchronizer::new(big_rx, small_rx, &TrackingConfig::default(), RejectingSink { attempts: 0 });
        let expired = SmallEntityRecord::new(1, &CandidatePoint::new(5.0, 5.0, 2.0), 0, 100, 15);
        small_tx.send(small_item(0, None, vec![expired])).unwrap();
        big_tx.send(big_item(1, vec![], vec![])).unwrap();
        assert!(matches!(sync.step(true, true), SyncStep::Cycle(_)));
        assert!(matches!(sync.step(true, true), SyncStep::Cycle(_)));
        assert!(matches!(sync.step(true, true), SyncStep::Finished));
        let (sink, _) = sync.into_parts();
        assert_eq!(sink.attempts, 1);
    }
}
