//! Anchor regions for the mouth and both eyes.
//!
//! Coordinates are normalized: `(0.0, 0.0)` is the top-left and
//! `(1.0, 1.0)` the bottom-right of the rendering surface.

use serde::{Deserialize, Serialize};

use crate::geometry::{Ellipse, Size};

/// Selections smaller than this many surface pixels on either axis are rejected.
pub const MIN_SELECTION_PX: f64 = 10.0;

const FRACTION_EPSILON: f64 = 1e-9;

/// Which facial feature a region anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    Mouth,
    LeftEye,
    RightEye,
}

impl RegionKind {
    pub const ALL: [RegionKind; 3] = [RegionKind::Mouth, RegionKind::LeftEye, RegionKind::RightEye];

    pub fn label(&self) -> &'static str {
        match self {
            RegionKind::Mouth => "mouth",
            RegionKind::LeftEye => "left eye",
            RegionKind::RightEye => "right eye",
        }
    }

    pub fn is_eye(&self) -> bool {
        !matches!(self, RegionKind::Mouth)
    }
}

/// Why a region was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SelectionError {
    #[error("selection is {width:.0}x{height:.0} px, minimum is {min:.0}x{min:.0} px")]
    TooSmall { width: f64, height: f64, min: f64 },

    #[error("region {field} = {value} is outside the surface")]
    OutOfBounds { field: &'static str, value: f64 },

    #[error("region must have positive width and height")]
    Degenerate,

    #[error("surface has no area")]
    EmptySurface,
}

/// A rectangle in surface pixels, as produced by a drag gesture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelRect {
    /// Rectangle spanned by two drag corners in any order.
    pub fn from_corners(ax: f64, ay: f64, bx: f64, by: f64) -> Self {
        Self {
            x: ax.min(bx),
            y: ay.min(by),
            width: (ax - bx).abs(),
            height: (ay - by).abs(),
        }
    }
}

/// A confirmed anchor rectangle in fractions of the surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl AnchorRegion {
    /// Build a region from fractional coordinates, validating ranges.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Result<Self, SelectionError> {
        let region = Self {
            x,
            y,
            width,
            height,
        };
        region.validate()?;
        Ok(region)
    }

    /// Normalize a pixel selection against the surface it was drawn on.
    ///
    /// The rectangle is clipped to the surface first; anything under
    /// [`MIN_SELECTION_PX`] on either axis is rejected.
    pub fn from_pixel_rect(rect: PixelRect, surface: Size) -> Result<Self, SelectionError> {
        if surface.is_empty() {
            return Err(SelectionError::EmptySurface);
        }
        let sw = surface.width as f64;
        let sh = surface.height as f64;

        let x0 = rect.x.clamp(0.0, sw);
        let y0 = rect.y.clamp(0.0, sh);
        let x1 = (rect.x + rect.width).clamp(0.0, sw);
        let y1 = (rect.y + rect.height).clamp(0.0, sh);
        let width = x1 - x0;
        let height = y1 - y0;

        if width < MIN_SELECTION_PX || height < MIN_SELECTION_PX {
            return Err(SelectionError::TooSmall {
                width,
                height,
                min: MIN_SELECTION_PX,
            });
        }

        Self::new(x0 / sw, y0 / sh, width / sw, height / sh)
    }

    /// Check fractional ranges and positive extent.
    pub fn validate(&self) -> Result<(), SelectionError> {
        for (field, value) in [
            ("x", self.x),
            ("y", self.y),
            ("width", self.width),
            ("height", self.height),
        ] {
            if !value.is_finite() || !(-FRACTION_EPSILON..=1.0 + FRACTION_EPSILON).contains(&value)
            {
                return Err(SelectionError::OutOfBounds { field, value });
            }
        }
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(SelectionError::Degenerate);
        }
        if self.x + self.width > 1.0 + FRACTION_EPSILON {
            return Err(SelectionError::OutOfBounds {
                field: "x + width",
                value: self.x + self.width,
            });
        }
        if self.y + self.height > 1.0 + FRACTION_EPSILON {
            return Err(SelectionError::OutOfBounds {
                field: "y + height",
                value: self.y + self.height,
            });
        }
        Ok(())
    }

    /// The region in pixels of the given surface.
    pub fn to_pixel_rect(&self, surface: Size) -> PixelRect {
        let sw = surface.width as f64;
        let sh = surface.height as f64;
        PixelRect {
            x: self.x * sw,
            y: self.y * sh,
            width: self.width * sw,
            height: self.height * sh,
        }
    }

    /// The ellipse inscribed in this region on the given surface.
    pub fn inscribed_ellipse(&self, surface: Size) -> Ellipse {
        let r = self.to_pixel_rect(surface);
        Ellipse::inscribed(r.x, r.y, r.width, r.height)
    }
}

/// The three per-session anchors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AnchorSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mouth: Option<AnchorRegion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_eye: Option<AnchorRegion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_eye: Option<AnchorRegion>,
}

impl AnchorSet {
    pub fn get(&self, kind: RegionKind) -> Option<&AnchorRegion> {
        match kind {
            RegionKind::Mouth => self.mouth.as_ref(),
            RegionKind::LeftEye => self.left_eye.as_ref(),
            RegionKind::RightEye => self.right_eye.as_ref(),
        }
    }

    fn slot(&mut self, kind: RegionKind) -> &mut Option<AnchorRegion> {
        match kind {
            RegionKind::Mouth => &mut self.mouth,
            RegionKind::LeftEye => &mut self.left_eye,
            RegionKind::RightEye => &mut self.right_eye,
        }
    }

    /// Store a validated region, replacing any previous one for `kind`.
    ///
    /// On error the existing region is left untouched.
    pub fn confirm(&mut self, kind: RegionKind, region: AnchorRegion) -> Result<(), SelectionError> {
        region.validate()?;
        *self.slot(kind) = Some(region);
        Ok(())
    }

    pub fn clear(&mut self, kind: RegionKind) {
        *self.slot(kind) = None;
    }

    pub fn clear_all(&mut self) {
        *self = Self::default();
    }

    /// Both eye regions are present.
    pub fn eyes_present(&self) -> bool {
        self.left_eye.is_some() && self.right_eye.is_some()
    }

    /// All three regions are present.
    pub fn is_complete(&self) -> bool {
        self.mouth.is_some() && self.eyes_present()
    }

    /// Validate every present region.
    pub fn validate(&self) -> Result<(), (RegionKind, SelectionError)> {
        for kind in RegionKind::ALL {
            if let Some(region) = self.get(kind) {
                region.validate().map_err(|e| (kind, e))?;
            }
        }
        Ok(())
    }
}

/// Position in the guided mouth → left eye → right eye selection flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionStep {
    Region(RegionKind),
    Complete,
}

impl SelectionStep {
    /// The step a user resumes at given what is already selected.
    pub fn resume(anchors: &AnchorSet) -> Self {
        RegionKind::ALL
            .into_iter()
            .find(|kind| anchors.get(*kind).is_none())
            .map(SelectionStep::Region)
            .unwrap_or(SelectionStep::Complete)
    }

    /// The step after this one.
    pub fn next(self) -> Self {
        match self {
            SelectionStep::Region(RegionKind::Mouth) => SelectionStep::Region(RegionKind::LeftEye),
            SelectionStep::Region(RegionKind::LeftEye) => {
                SelectionStep::Region(RegionKind::RightEye)
            }
            SelectionStep::Region(RegionKind::RightEye) | SelectionStep::Complete => {
                SelectionStep::Complete
            }
        }
    }

    pub fn kind(&self) -> Option<RegionKind> {
        match self {
            SelectionStep::Region(kind) => Some(*kind),
            SelectionStep::Complete => None,
        }
    }
}

impl Default for SelectionStep {
    fn default() -> Self {
        SelectionStep::Region(RegionKind::Mouth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_new_rejects_out_of_range() {
        assert!(AnchorRegion::new(0.4, 0.6, 0.2, 0.1).is_ok());
        assert!(matches!(
            AnchorRegion::new(0.9, 0.1, 0.2, 0.1),
            Err(SelectionError::OutOfBounds { .. })
        ));
        assert_eq!(
            AnchorRegion::new(0.1, 0.1, 0.0, 0.1),
            Err(SelectionError::Degenerate)
        );
        assert!(AnchorRegion::new(f64::NAN, 0.1, 0.1, 0.1).is_err());
    }

    #[test]
    fn test_pixel_selection_below_minimum_is_rejected() {
        let surface = Size::new(800, 600);
        let rect = PixelRect::from_corners(100.0, 100.0, 109.0, 140.0);
        assert!(matches!(
            AnchorRegion::from_pixel_rect(rect, surface),
            Err(SelectionError::TooSmall { .. })
        ));
    }

    #[test]
    fn test_pixel_selection_normalizes_corner_order() {
        let surface = Size::new(800, 600);
        let rect = PixelRect::from_corners(480.0, 420.0, 320.0, 360.0);
        let region = AnchorRegion::from_pixel_rect(rect, surface).unwrap();
        assert!((region.x - 0.4).abs() < 1e-9);
        assert!((region.y - 0.6).abs() < 1e-9);
        assert!((region.width - 0.2).abs() < 1e-9);
        assert!((region.height - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_pixel_selection_is_clipped_to_surface() {
        let surface = Size::new(100, 100);
        let rect = PixelRect::from_corners(-20.0, 80.0, 40.0, 130.0);
        let region = AnchorRegion::from_pixel_rect(rect, surface).unwrap();
        assert_eq!(region.x, 0.0);
        assert!((region.y + region.height - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_confirm_rejection_keeps_previous_region() {
        let mut anchors = AnchorSet::default();
        let good = AnchorRegion::new(0.1, 0.1, 0.2, 0.2).unwrap();
        anchors.confirm(RegionKind::LeftEye, good).unwrap();

        let bad = AnchorRegion {
            x: 0.5,
            y: 0.5,
            width: -0.1,
            height: 0.1,
        };
        assert!(anchors.confirm(RegionKind::LeftEye, bad).is_err());
        assert_eq!(anchors.left_eye, Some(good));
    }

    #[test]
    fn test_anchor_set_presence_predicates() {
        let mut anchors = AnchorSet::default();
        let r = AnchorRegion::new(0.1, 0.1, 0.1, 0.1).unwrap();
        anchors.confirm(RegionKind::LeftEye, r).unwrap();
        assert!(!anchors.eyes_present());
        anchors.confirm(RegionKind::RightEye, r).unwrap();
        assert!(anchors.eyes_present());
        assert!(!anchors.is_complete());
        anchors.confirm(RegionKind::Mouth, r).unwrap();
        assert!(anchors.is_complete());
        anchors.clear_all();
        assert_eq!(anchors, AnchorSet::default());
    }

    #[test]
    fn test_selection_step_flow() {
        let mut anchors = AnchorSet::default();
        assert_eq!(
            SelectionStep::resume(&anchors),
            SelectionStep::Region(RegionKind::Mouth)
        );
        anchors.mouth = Some(AnchorRegion::new(0.4, 0.6, 0.2, 0.1).unwrap());
        assert_eq!(
            SelectionStep::resume(&anchors),
            SelectionStep::Region(RegionKind::LeftEye)
        );
        let step = SelectionStep::Region(RegionKind::LeftEye).next();
        assert_eq!(step, SelectionStep::Region(RegionKind::RightEye));
        assert_eq!(step.next(), SelectionStep::Complete);
        assert_eq!(SelectionStep::Complete.kind(), None);
    }

    proptest! {
        #[test]
        fn fractional_coverage_survives_resize(
            x in 0.0f64..0.8,
            y in 0.0f64..0.8,
            w in 0.05f64..0.2,
            h in 0.05f64..0.2,
            sw in 64u32..4096,
            sh in 64u32..4096,
        ) {
            let region = AnchorRegion::new(x, y, w, h).unwrap();
            let surface = Size::new(sw, sh);
            let e = region.inscribed_ellipse(surface);
            let back_x = (e.cx - e.rx) / sw as f64;
            let back_y = (e.cy - e.ry) / sh as f64;
            let back_w = 2.0 * e.rx / sw as f64;
            let back_h = 2.0 * e.ry / sh as f64;
            prop_assert!((back_x - x).abs() < 1e-9);
            prop_assert!((back_y - y).abs() < 1e-9);
            prop_assert!((back_w - w).abs() < 1e-9);
            prop_assert!((back_h - h).abs() < 1e-9);
        }
    }
}
