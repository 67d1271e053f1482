//! Landmark detection results.
//!
//! A detector reports points in image pixel space. Only the mouth outline
//! matters to the animation, reduced to its bounding box.

use serde::{Deserialize, Serialize};

use crate::geometry::Point2D;

/// Number of points in the standard 68-point facial landmark layout.
pub const LANDMARK_68_COUNT: usize = 68;

/// Index range of the mouth outline within the 68-point layout.
pub const LANDMARK_68_MOUTH: std::ops::Range<usize> = 48..68;

/// Mouth geometry found by a landmark detector, in image pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Center of the mouth bounding box.
    pub center: Point2D,

    /// Bounding box width (never zero).
    pub width: f64,

    /// Bounding box height (never zero).
    pub height: f64,

    /// The mouth outline points.
    pub points: Vec<Point2D>,
}

impl DetectionResult {
    /// Reduce a mouth point set to its bounding box.
    ///
    /// Returns `None` for an empty set. A zero extent collapses to 1 px.
    pub fn from_mouth_points(points: Vec<Point2D>) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }

        let width = max_x - min_x;
        let height = max_y - min_y;
        Some(Self {
            center: Point2D::new((min_x + max_x) / 2.0, (min_y + max_y) / 2.0),
            width: if width > 0.0 { width } else { 1.0 },
            height: if height > 0.0 { height } else { 1.0 },
            points,
        })
    }

    /// Build from a full landmark set.
    ///
    /// A 68-point set contributes only its mouth outline; any other layout
    /// is taken to be mouth points already.
    pub fn from_landmarks(landmarks: &[Point2D]) -> Option<Self> {
        let mouth = if landmarks.len() >= LANDMARK_68_COUNT {
            landmarks[LANDMARK_68_MOUTH].to_vec()
        } else {
            landmarks.to_vec()
        };
        Self::from_mouth_points(mouth)
    }

    /// Top-left corner of the bounding box.
    pub fn min_corner(&self) -> Point2D {
        Point2D::new(
            self.center.x - self.width / 2.0,
            self.center.y - self.height / 2.0,
        )
    }
}
