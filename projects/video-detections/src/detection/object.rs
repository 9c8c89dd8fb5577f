use serde::{Deserialize, Serialize};

/// A 2D point in pixel coordinates.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// One object found by a detector.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DetectedObject {
    pub center: Point,
    pub width: f32,
    pub height: f32,
    /// Confidence in [0, 1].
    pub score: f32,
    pub label: String,
}

impl DetectedObject {
    pub fn new(center: Point, width: f32, height: f32, score: f32, label: impl Into<String>) -> Self {
        Self {
            center,
            width: width.abs(),
            height: height.abs(),
            score: score.clamp(0.0, 1.0),
            label: label.into(),
        }
    }

    /// Build from the top-left and bottom-right corners of a box.
    pub fn from_corners(
        xmin: f32,
        ymin: f32,
        xmax: f32,
        ymax: f32,
        score: f32,
        label: impl Into<String>,
    ) -> Self {
        let center = Point::new((xmin + xmax) / 2.0, (ymin + ymax) / 2.0);
        Self::new(center, xmax - xmin, ymax - ymin, score, label)
    }

    /// Box corners clockwise from the top-left:
    /// `[top_left, top_right, bottom_right, bottom_left]`.
    pub fn bounding_box(&self) -> [Point; 4] {
        let half_w = self.width / 2.0;
        let half_h = self.height / 2.0;
        let left = self.center.x - half_w;
        let right = self.center.x + half_w;
        let top = self.center.y - half_h;
        let bottom = self.center.y + half_h;
        [
            Point::new(left, top),
            Point::new(right, top),
            Point::new(right, bottom),
            Point::new(left, bottom),
        ]
    }

    /// Case-insensitive label comparison.
    pub fn is_labeled(&self, class_name: &str) -> bool {
        self.label.eq_ignore_ascii_case(class_name)
    }

    pub fn is_scored_at_least(&self, score: f32) -> bool {
        self.score >= score
    }
}

/// Detections for one frame of a sequence, indexed by logical frame.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct FrameDetections {
    pub frame_index: usize,
    pub objects: Vec<DetectedObject>,
}

impl FrameDetections {
    pub fn new(frame_index: usize, objects: Vec<DetectedObject>) -> Self {
        Self {
            frame_index,
            objects,
        }
    }
}
