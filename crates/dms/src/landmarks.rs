//! 68-point facial landmarks (iBUG 300-W layout)

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Number of points in a complete landmark set
pub const LANDMARK_COUNT: usize = 68;

const JAW: Range<usize> = 0..17;
const NOSE: Range<usize> = 27..36;
const LEFT_EYE: Range<usize> = 36..42;
const RIGHT_EYE: Range<usize> = 42..48;
const NOSE_TIP: usize = 30;

/// 2D image point (pixels)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Point) -> f32 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }

    /// Midpoint between two points
    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// Landmarks detected for one face in one frame.
///
/// Accessors return `None` when the detector produced fewer points than
/// the region needs, so callers can fall back instead of panicking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Landmarks {
    points: Vec<Point>,
}

impl Landmarks {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Whether all 68 points are present
    pub fn is_complete(&self) -> bool {
        self.points.len() >= LANDMARK_COUNT
    }

    /// Jaw outline, 17 points from the left ear to the right ear
    pub fn jaw_outline(&self) -> Option<&[Point]> {
        self.points.get(JAW)
    }

    /// Nose bridge and base, 9 points
    pub fn nose(&self) -> Option<&[Point]> {
        self.points.get(NOSE)
    }

    pub fn nose_tip(&self) -> Option<Point> {
        self.points.get(NOSE_TIP).copied()
    }

    /// Left eye, 6 points: corners at 0 and 3, vertical pairs (1,5) and (2,4)
    pub fn left_eye(&self) -> Option<&[Point]> {
        self.points.get(LEFT_EYE)
    }

    /// Right eye, same ordering as `left_eye`
    pub fn right_eye(&self) -> Option<&[Point]> {
        self.points.get(RIGHT_EYE)
    }
}

/// Centroid of a point set
pub(crate) fn centroid(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    let (sx, sy) = points
        .iter()
        .fold((0.0f32, 0.0f32), |(sx, sy), p| (sx + p.x, sy + p.y));
    let n = points.len() as f32;
    Some(Point::new(sx / n, sy / n))
}
