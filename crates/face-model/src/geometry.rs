//! Surface geometry: sizes, the letterbox fit transform, and ellipses.
//!
//! All values are in surface pixels unless stated otherwise.

use serde::{Deserialize, Serialize};

/// Pixel dimensions of an image or rendering surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width divided by height (0 for an empty size).
    pub fn aspect(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.width as f64 / self.height as f64
    }
}

/// A 2D point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Placement of an image inside a surface: scaled to fill the dominant axis,
/// centered on the other, never cropped or stretched.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FitTransform {
    pub offset_x: f64,
    pub offset_y: f64,
    pub draw_width: f64,
    pub draw_height: f64,
}

impl FitTransform {
    /// Compute the fit of `image` into `surface`.
    ///
    /// Returns an all-zero transform when either size is empty.
    pub fn compute(image: Size, surface: Size) -> Self {
        if image.is_empty() || surface.is_empty() {
            return Self::default();
        }

        let surface_w = surface.width as f64;
        let surface_h = surface.height as f64;
        let image_aspect = image.aspect();

        if image_aspect > surface.aspect() {
            let draw_height = surface_w / image_aspect;
            Self {
                offset_x: 0.0,
                offset_y: (surface_h - draw_height) / 2.0,
                draw_width: surface_w,
                draw_height,
            }
        } else {
            let draw_width = surface_h * image_aspect;
            Self {
                offset_x: (surface_w - draw_width) / 2.0,
                offset_y: 0.0,
                draw_width,
                draw_height: surface_h,
            }
        }
    }

    /// Horizontal image-to-surface scale.
    pub fn scale_x(&self, image: Size) -> f64 {
        if image.width == 0 {
            return 0.0;
        }
        self.draw_width / image.width as f64
    }

    /// Vertical image-to-surface scale.
    pub fn scale_y(&self, image: Size) -> f64 {
        if image.height == 0 {
            return 0.0;
        }
        self.draw_height / image.height as f64
    }

    /// Map a point from image pixels into surface pixels.
    pub fn image_to_surface(&self, image: Size, p: Point2D) -> Point2D {
        Point2D::new(
            self.offset_x + p.x * self.scale_x(image),
            self.offset_y + p.y * self.scale_y(image),
        )
    }

    /// Whether a surface point lies inside the drawn image area.
    pub fn covers(&self, x: f64, y: f64) -> bool {
        x >= self.offset_x
            && y >= self.offset_y
            && x < self.offset_x + self.draw_width
            && y < self.offset_y + self.draw_height
    }
}

/// An axis-aligned ellipse.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ellipse {
    pub cx: f64,
    pub cy: f64,
    pub rx: f64,
    pub ry: f64,
}

impl Ellipse {
    pub fn new(cx: f64, cy: f64, rx: f64, ry: f64) -> Self {
        Self { cx, cy, rx, ry }
    }

    /// The ellipse inscribed in a rectangle.
    pub fn inscribed(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            cx: x + width / 2.0,
            cy: y + height / 2.0,
            rx: width / 2.0,
            ry: height / 2.0,
        }
    }

    /// Same center, radii multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            rx: self.rx * factor,
            ry: self.ry * factor,
            ..*self
        }
    }

    /// Whether the point lies inside or on the ellipse.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        if self.rx <= 0.0 || self.ry <= 0.0 {
            return false;
        }
        let dx = (x - self.cx) / self.rx;
        let dy = (y - self.cy) / self.ry;
        dx * dx + dy * dy <= 1.0
    }

    /// Integer pixel bounds `(x0, y0, x1, y1)` (exclusive end) clipped to `surface`.
    pub fn pixel_bounds(&self, surface: Size) -> (u32, u32, u32, u32) {
        let clip = |v: f64, max: u32| v.clamp(0.0, max as f64) as u32;
        (
            clip((self.cx - self.rx).floor(), surface.width),
            clip((self.cy - self.ry).floor(), surface.height),
            clip((self.cx + self.rx).ceil(), surface.width),
            clip((self.cy + self.ry).ceil(), surface.height),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_wide_image_letterboxes_vertically() {
        let fit = FitTransform::compute(Size::new(1600, 900), Size::new(800, 800));
        assert_eq!(fit.offset_x, 0.0);
        assert!((fit.draw_width - 800.0).abs() < 1e-9);
        assert!((fit.draw_height - 450.0).abs() < 1e-9);
        assert!((fit.offset_y - 175.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_tall_image_pillarboxes() {
        let fit = FitTransform::compute(Size::new(300, 600), Size::new(800, 600));
        assert_eq!(fit.offset_y, 0.0);
        assert!((fit.draw_width - 300.0).abs() < 1e-9);
        assert!((fit.offset_x - 250.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_matching_aspect_is_identity() {
        let fit = FitTransform::compute(Size::new(800, 600), Size::new(800, 600));
        assert_eq!(
            fit,
            FitTransform {
                offset_x: 0.0,
                offset_y: 0.0,
                draw_width: 800.0,
                draw_height: 600.0
            }
        );
    }

    #[test]
    fn test_fit_empty_image() {
        let fit = FitTransform::compute(Size::new(0, 10), Size::new(100, 100));
        assert_eq!(fit, FitTransform::default());
    }

    #[test]
    fn test_image_to_surface_maps_through_scale() {
        let image = Size::new(400, 300);
        let fit = FitTransform::compute(image, Size::new(800, 800));
        let p = fit.image_to_surface(image, Point2D::new(200.0, 150.0));
        assert!((p.x - 400.0).abs() < 1e-9);
        assert!((p.y - 400.0).abs() < 1e-9);
    }

    #[test]
    fn test_ellipse_contains() {
        let e = Ellipse::inscribed(0.0, 0.0, 20.0, 10.0);
        assert!(e.contains(10.0, 5.0));
        assert!(e.contains(0.0, 5.0));
        assert!(!e.contains(1.0, 1.0));
        assert!(!Ellipse::new(0.0, 0.0, 0.0, 1.0).contains(0.0, 0.0));
    }

    #[test]
    fn test_pixel_bounds_clip_to_surface() {
        let e = Ellipse::new(5.0, 5.0, 10.0, 3.0);
        assert_eq!(e.pixel_bounds(Size::new(12, 12)), (0, 2, 12, 8));
    }
}
