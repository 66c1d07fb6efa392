use serde::{Deserialize, Serialize};

/// Axis-aligned box given by its corners (x1, y1) - (x2, y2)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn new(_left: f32, _top: f32, _right: f32, _bottom: f32) -> Self {
        Rect {
            left: _left,
            top: _top,
            right: _right,
            bottom: _bottom,
        }
    }
    pub fn width(&self) -> f32 {
        self.right - self.left
    }
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }
    pub fn center(&self) -> Point {
        Point::new(
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }
    /// Whether (x, y) lies inside the box grown by `offset` pixels on every side
    pub fn contains_with_offset(&self, x: f32, y: f32, offset: f32) -> bool {
        self.left - offset <= x
            && x <= self.right + offset
            && self.top - offset <= y
            && y <= self.bottom + offset
    }
    pub fn shifted(&self, translation: Translation) -> Rect {
        Rect::new(
            self.left + translation.dx,
            self.top + translation.dy,
            self.right + translation.dx,
            self.bottom + translation.dy,
        )
    }
    pub fn is_finite(&self) -> bool {
        self.left.is_finite() && self.top.is_finite() && self.right.is_finite() && self.bottom.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(_x: f32, _y: f32) -> Self {
        Point { x: _x, y: _y }
    }
    pub fn shifted(&self, translation: Translation) -> Point {
        Point::new(self.x + translation.dx, self.y + translation.dy)
    }
}

/// Global camera motion between two consecutive frames
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Translation {
    pub dx: f32,
    pub dy: f32,
}

impl Translation {
    pub fn new(_dx: f32, _dy: f32) -> Self {
        Translation { dx: _dx, dy: _dy }
    }
    /// Missing motion estimate means "camera did not move"
    pub fn or_zero(translation: Option<Translation>) -> Translation {
        translation.unwrap_or_default()
    }
}

pub fn euclidean_distance(p1: &Point, p2: &Point) -> f32 {
    let x_squared = (p1.x - p2.x).powi(2);
    let y_squared = (p1.y - p2.y).powi(2);
    f32::sqrt(x_squared + y_squared)
}
