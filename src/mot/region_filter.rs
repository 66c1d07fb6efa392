use std::collections::{HashMap, HashSet};

use crate::config::{NoiseZone, RegionConfig};
use crate::mot::{CandidatePoint, TrackedBox};
use crate::utils::{euclidean_distance, Point, Rect, Translation};

/// Short-lived shadow of a large-entity box used only for filtering points
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBoxRegion {
    track_id: u64,
    rect: Rect,
    survival: i64,
}

impl BoundingBoxRegion {
    pub fn new(track_id: u64, rect: Rect, survival: i64) -> Self {
        BoundingBoxRegion { track_id, rect, survival }
    }
    pub fn update_location(&mut self, rect: Rect) {
        self.survival -= 1;
        self.rect = rect;
    }
    pub fn update_translation(&mut self, translation: Translation) {
        self.survival -= 1;
        self.rect = self.rect.shifted(translation);
    }
    pub fn inside(&self, x: f32, y: f32, offset: f32) -> bool {
        self.rect.contains_with_offset(x, y, offset)
    }
    /// Timer lapsed or the box left the screen through the top/left border
    pub fn out_of_screen(&self) -> bool {
        self.survival <= 0 || self.rect.right <= 0.0 || self.rect.bottom <= 0.0
    }
    pub fn get_track_id(&self) -> u64 {
        self.track_id
    }
    pub fn get_rect(&self) -> Rect {
        self.rect
    }
    pub fn get_survival(&self) -> i64 {
        self.survival
    }
}

/// Discards small-entity points that belong to large organisms, screen edges or dust
pub struct RegionFilter {
    survival: i64,
    offset: f32,
    edge: f32,
    width: f32,
    height: f32,
    noise_zones: Vec<NoiseZone>,
    regions: HashMap<u64, BoundingBoxRegion>,
}

impl Default for RegionFilter {
    fn default() -> Self {
        RegionFilter::new(&RegionConfig::default())
    }
}

impl RegionFilter {
    pub fn new(config: &RegionConfig) -> Self {
        RegionFilter {
            survival: config.survival,
            offset: config.offset,
            edge: config.edge,
            width: config.frame_width,
            height: config.frame_height,
            noise_zones: config.noise_zones.clone(),
            regions: HashMap::new(),
        }
    }
    pub fn set_frame_size(&mut self, width: f32, height: f32) {
        self.width = width;
        self.height = height;
    }
    pub fn get_frame_size(&self) -> (f32, f32) {
        (self.width, self.height)
    }
    /// Moves regions of tracked boxes to their new place and shifts the rest with the camera
    pub fn update_regions(&mut self, boxes: &[TrackedBox], translation: Option<Translation>) {
        let mut seen: HashSet<u64> = HashSet::with_capacity(boxes.len());
        for tracked in boxes {
            if !seen.insert(tracked.track_id) {
                continue;
            }
            match self.regions.get_mut(&tracked.track_id) {
                Some(region) => region.update_location(tracked.rect),
                None => {
                    self.regions.insert(
                        tracked.track_id,
                        BoundingBoxRegion::new(tracked.track_id, tracked.rect, self.survival),
                    );
                }
            }
        }
        let shift = Translation::or_zero(translation);
        for (track_id, region) in self.regions.iter_mut() {
            if !seen.contains(track_id) {
                region.update_translation(shift);
            }
        }
    }
    /// Points that are not covered by any region, edge band or noise zone
    pub fn filter(&self, points: &[CandidatePoint]) -> Vec<CandidatePoint> {
        points
            .iter()
            .filter(|point| !self.is_covered(point))
            .copied()
            .collect()
    }
    /// Drops regions whose timer lapsed or that moved off screen
    pub fn clear(&mut self) {
        self.regions.retain(|_, region| !region.out_of_screen());
    }
    pub fn get(&self, track_id: u64) -> Option<&BoundingBoxRegion> {
        self.regions.get(&track_id)
    }
    pub fn len(&self) -> usize {
        self.regions.len()
    }
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
    fn is_covered(&self, point: &CandidatePoint) -> bool {
        self.near_the_edge(point.x)
            || self.regions.values().any(|region| region.inside(point.x, point.y, self.offset))
            || self.in_noise_zone(point.position())
    }
    // Only left/right borders are cut
    fn near_the_edge(&self, x: f32) -> bool {
        x <= self.edge || x >= self.width - self.edge
    }
    fn in_noise_zone(&self, position: Point) -> bool {
        self.noise_zones
            .iter()
            .any(|zone| euclidean_distance(&position, &Point::new(zone.x, zone.y)) <= zone.radius)
    }
}
