//! Anchor resolution: where the mouth and eyes are on the current surface.
//!
//! Resolution runs once per draw and is never cached, so a surface resize
//! is picked up on the next frame. The priority chain is:
//!
//! ```text
//! manual selection ──► detected landmarks ──► fixed heuristic ──► none
//!        (all)              (mouth only)          (mouth only)     (eyes)
//! ```

use talkpic_face_model::{
    AnchorRegion, AnchorSet, DetectionResult, Ellipse, FitTransform, RegionKind, Size,
};

/// Mouth heuristic: vertical center as a fraction of the fitted image height.
const HEURISTIC_MOUTH_CENTER_Y: f64 = 0.75;
/// Mouth heuristic: width as a fraction of the fitted image width.
const HEURISTIC_MOUTH_WIDTH: f64 = 0.15;
/// Mouth heuristic: height as a fraction of the fitted image height.
const HEURISTIC_MOUTH_HEIGHT: f64 = 0.08;

/// Where a region's geometry comes from, chosen before any pixel math.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnchorSource<'a> {
    Manual(&'a AnchorRegion),
    Detected(&'a DetectionResult),
    Heuristic,
    None,
}

/// Tag of the source a resolved anchor came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorOrigin {
    Manual,
    Detected,
    Heuristic,
}

/// An on-surface ellipse for one region. Derived per draw, never stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedAnchor {
    pub kind: RegionKind,
    pub origin: AnchorOrigin,
    pub ellipse: Ellipse,
}

impl ResolvedAnchor {
    pub fn is_manual(&self) -> bool {
        self.origin == AnchorOrigin::Manual
    }
}

/// Apply the priority policy without touching geometry.
///
/// A manual selection always wins. Detection and the heuristic only ever
/// apply to the mouth; an eye without a manual selection has no source.
pub fn select_source<'a>(
    kind: RegionKind,
    manual: Option<&'a AnchorRegion>,
    detection: Option<&'a DetectionResult>,
) -> AnchorSource<'a> {
    if let Some(region) = manual {
        return AnchorSource::Manual(region);
    }
    if kind.is_eye() {
        return AnchorSource::None;
    }
    match detection {
        Some(det) => AnchorSource::Detected(det),
        None => AnchorSource::Heuristic,
    }
}

/// Resolve one region into surface pixels.
///
/// `size_multiplier` scales the radii of the mouth only. Returns `None` for
/// an eye without a manual selection, or when the surface (or, for
/// automatic sources, the image) has no area.
pub fn resolve(
    kind: RegionKind,
    manual: Option<&AnchorRegion>,
    detection: Option<&DetectionResult>,
    surface: Size,
    image: Size,
    size_multiplier: f64,
) -> Option<ResolvedAnchor> {
    if surface.is_empty() {
        return None;
    }
    let mouth_scale = if kind == RegionKind::Mouth {
        size_multiplier
    } else {
        1.0
    };

    let (origin, ellipse) = match select_source(kind, manual, detection) {
        AnchorSource::Manual(region) => (
            AnchorOrigin::Manual,
            region.inscribed_ellipse(surface).scaled(mouth_scale),
        ),
        AnchorSource::Detected(det) => {
            if image.is_empty() {
                return None;
            }
            let fit = FitTransform::compute(image, surface);
            let center = fit.image_to_surface(image, det.center);
            let ellipse = Ellipse::new(
                center.x,
                center.y,
                det.width * fit.scale_x(image) / 2.0,
                det.height * fit.scale_y(image) / 2.0,
            );
            (AnchorOrigin::Detected, ellipse.scaled(mouth_scale))
        }
        AnchorSource::Heuristic => {
            if image.is_empty() {
                return None;
            }
            (
                AnchorOrigin::Heuristic,
                heuristic_mouth(&FitTransform::compute(image, surface)).scaled(mouth_scale),
            )
        }
        AnchorSource::None => return None,
    };

    Some(ResolvedAnchor {
        kind,
        origin,
        ellipse,
    })
}

/// The unscaled fallback mouth ellipse for a fitted image.
pub fn heuristic_mouth(fit: &FitTransform) -> Ellipse {
    Ellipse::new(
        fit.offset_x + fit.draw_width / 2.0,
        fit.offset_y + fit.draw_height * HEURISTIC_MOUTH_CENTER_Y,
        fit.draw_width * HEURISTIC_MOUTH_WIDTH / 2.0,
        fit.draw_height * HEURISTIC_MOUTH_HEIGHT / 2.0,
    )
}

/// All three resolved regions for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResolvedAnchors {
    pub mouth: Option<ResolvedAnchor>,
    pub left_eye: Option<ResolvedAnchor>,
    pub right_eye: Option<ResolvedAnchor>,
}

impl ResolvedAnchors {
    /// Both eyes, only when both resolved.
    pub fn eyes(&self) -> Option<(ResolvedAnchor, ResolvedAnchor)> {
        Some((self.left_eye?, self.right_eye?))
    }
}

/// Resolve every region of a session for the current surface.
pub fn resolve_all(
    anchors: &AnchorSet,
    detection: Option<&DetectionResult>,
    surface: Size,
    image: Size,
    size_multiplier: f64,
) -> ResolvedAnchors {
    let one = |kind| {
        resolve(
            kind,
            anchors.get(kind),
            detection,
            surface,
            image,
            size_multiplier,
        )
    };
    ResolvedAnchors {
        mouth: one(RegionKind::Mouth),
        left_eye: one(RegionKind::LeftEye),
        right_eye: one(RegionKind::RightEye),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use talkpic_face_model::Point2D;

    fn detection_at(x: f64, y: f64, w: f64, h: f64) -> DetectionResult {
        DetectionResult::from_mouth_points(vec![
            Point2D::new(x - w / 2.0, y - h / 2.0),
            Point2D::new(x + w / 2.0, y + h / 2.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_manual_beats_detection() {
        let manual = AnchorRegion::new(0.1, 0.1, 0.2, 0.1).unwrap();
        let det = detection_at(700.0, 500.0, 100.0, 40.0);
        let source = select_source(RegionKind::Mouth, Some(&manual), Some(&det));
        assert_eq!(source, AnchorSource::Manual(&manual));

        let resolved = resolve(
            RegionKind::Mouth,
            Some(&manual),
            Some(&det),
            Size::new(800, 600),
            Size::new(800, 600),
            1.0,
        )
        .unwrap();
        assert_eq!(resolved.origin, AnchorOrigin::Manual);
        assert!((resolved.ellipse.cx - 160.0).abs() < 1e-9);
        assert!((resolved.ellipse.cy - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_eyes_never_fall_back() {
        let det = detection_at(400.0, 300.0, 50.0, 20.0);
        assert_eq!(
            select_source(RegionKind::LeftEye, None, Some(&det)),
            AnchorSource::None
        );
        assert!(resolve(
            RegionKind::RightEye,
            None,
            None,
            Size::new(800, 600),
            Size::new(800, 600),
            1.0
        )
        .is_none());
    }

    #[test]
    fn test_detection_maps_through_fit() {
        // 400x300 image on an 800x800 surface: scale 2, letterboxed by 100 px.
        let det = detection_at(200.0, 225.0, 40.0, 10.0);
        let resolved = resolve(
            RegionKind::Mouth,
            None,
            Some(&det),
            Size::new(800, 800),
            Size::new(400, 300),
            1.5,
        )
        .unwrap();
        assert_eq!(resolved.origin, AnchorOrigin::Detected);
        assert!((resolved.ellipse.cx - 400.0).abs() < 1e-9);
        assert!((resolved.ellipse.cy - 550.0).abs() < 1e-9);
        assert!((resolved.ellipse.rx - 60.0).abs() < 1e-9);
        assert!((resolved.ellipse.ry - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_heuristic_mouth_position() {
        let resolved = resolve(
            RegionKind::Mouth,
            None,
            None,
            Size::new(800, 800),
            Size::new(400, 800),
            1.0,
        )
        .unwrap();
        // Pillarboxed: drawn 400x800 at x offset 200.
        assert_eq!(resolved.origin, AnchorOrigin::Heuristic);
        assert!((resolved.ellipse.cx - 400.0).abs() < 1e-9);
        assert!((resolved.ellipse.cy - 600.0).abs() < 1e-9);
        assert!((resolved.ellipse.rx - 30.0).abs() < 1e-9);
        assert!((resolved.ellipse.ry - 32.0).abs() < 1e-9);
    }

    #[test]
    fn test_size_multiplier_applies_to_mouth_only() {
        let region = AnchorRegion::new(0.2, 0.2, 0.2, 0.2).unwrap();
        let surface = Size::new(100, 100);
        let mouth = resolve(RegionKind::Mouth, Some(&region), None, surface, surface, 2.0).unwrap();
        let eye = resolve(RegionKind::LeftEye, Some(&region), None, surface, surface, 2.0).unwrap();
        assert!((mouth.ellipse.rx - 20.0).abs() < 1e-9);
        assert!((eye.ellipse.rx - 10.0).abs() < 1e-9);
        assert_eq!(mouth.ellipse.cx, eye.ellipse.cx);
    }

    #[test]
    fn test_resolve_all_requires_both_eyes() {
        let mut anchors = AnchorSet::default();
        anchors
            .confirm(RegionKind::LeftEye, AnchorRegion::new(0.3, 0.3, 0.1, 0.05).unwrap())
            .unwrap();
        let surface = Size::new(200, 200);
        let resolved = resolve_all(&anchors, None, surface, surface, 1.0);
        assert!(resolved.left_eye.is_some());
        assert!(resolved.eyes().is_none());
        assert_eq!(resolved.mouth.map(|m| m.origin), Some(AnchorOrigin::Heuristic));
    }

    #[test]
    fn test_empty_image_resolves_no_automatic_mouth() {
        assert!(resolve(
            RegionKind::Mouth,
            None,
            None,
            Size::new(100, 100),
            Size::new(0, 0),
            1.0
        )
        .is_none());
    }
}
