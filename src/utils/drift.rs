use crate::utils::{Point, Translation};

/// Point history kept in camera-origin coordinates.
///
/// Every stored point is relative to the accumulated camera drift at the moment
/// it was pushed, so compensating the whole history for a new translation only
/// moves the origin. Reading a point adds the current origin back.
///
/// Offsets and origin are kept in f64: the origin grows with every camera move
/// and f32 would lose sub-pixel precision on long runs.
#[derive(Debug, Clone, Default)]
pub struct DriftTrack {
    points: Vec<Offset>,
    origin: Offset,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Offset {
    x: f64,
    y: f64,
}

/// Length and origin of a [`DriftTrack`] at the moment it was frozen
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrozenTrack {
    len: usize,
    origin: Offset,
}

impl FrozenTrack {
    pub fn len(&self) -> usize {
        self.len
    }
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl DriftTrack {
    pub fn new() -> Self {
        DriftTrack::default()
    }
    pub fn with_point(point: Point) -> Self {
        let mut track = DriftTrack::new();
        track.push(point);
        track
    }
    pub fn len(&self) -> usize {
        self.points.len()
    }
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
    /// Stores a point given in current frame coordinates
    pub fn push(&mut self, point: Point) {
        self.points.push(Offset {
            x: point.x as f64 - self.origin.x,
            y: point.y as f64 - self.origin.y,
        });
    }
    /// Moves every stored point by `translation`
    pub fn shift(&mut self, translation: Translation) {
        self.origin.x += translation.dx as f64;
        self.origin.y += translation.dy as f64;
    }
    pub fn get(&self, idx: usize) -> Option<Point> {
        self.points.get(idx).map(|p| self.resolve(p, self.origin))
    }
    pub fn last(&self) -> Option<Point> {
        self.points.last().map(|p| self.resolve(p, self.origin))
    }
    pub fn to_vec(&self) -> Vec<Point> {
        self.points.iter().map(|p| self.resolve(p, self.origin)).collect()
    }
    pub fn truncate(&mut self, len: usize) {
        self.points.truncate(len);
    }
    pub fn freeze(&self) -> FrozenTrack {
        FrozenTrack {
            len: self.points.len(),
            origin: self.origin,
        }
    }
    /// Materializes the history as it looked when `frozen` was taken
    pub fn thaw(&self, frozen: &FrozenTrack) -> Vec<Point> {
        let len = usize::min(frozen.len, self.points.len());
        self.points[..len]
            .iter()
            .map(|p| self.resolve(p, frozen.origin))
            .collect()
    }
    fn resolve(&self, p: &Offset, origin: Offset) -> Point {
        Point::new((p.x + origin.x) as f32, (p.y + origin.y) as f32)
    }
}
