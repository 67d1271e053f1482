//! Frame compositor: draws one animated frame onto a surface.
//!
//! Drawing is strictly ordered: base image (fitted, over a cleared
//! surface), then the mouth, then the eyes. Each deformation is a vertical
//! scale about its anchor's center, confined to the anchor ellipse, and
//! always samples the undeformed fitted image.

use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_ellipse_mut, draw_hollow_ellipse_mut};
use talkpic_animation_core::ResolvedAnchors;
use talkpic_face_model::{Ellipse, FitTransform, Size};

/// Vertical stretch of a manual mouth at full opening (`1 + opening * 0.6`).
pub const MOUTH_STRETCH: f64 = 0.6;

/// Vertical squash of a fully closed eye (`1 - closure * 0.95`).
pub const EYE_SQUASH: f64 = 0.95;

/// The procedural mouth is not drawn at or below this opening.
pub const PROCEDURAL_MOUTH_MIN_OPENING: f64 = 0.05;

const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);
const MOUTH_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);
const MOUTH_HIGHLIGHT: Rgba<u8> = Rgba([0xff, 0x6b, 0x6b, 255]);

/// Procedural mouth shape, by opening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouthShape {
    Closed,
    SlightlyOpen,
    Open,
    WideOpen,
}

impl MouthShape {
    pub fn for_opening(opening: f64) -> Self {
        if opening < 0.2 {
            Self::Closed
        } else if opening < 0.4 {
            Self::SlightlyOpen
        } else if opening < 0.7 {
            Self::Open
        } else {
            Self::WideOpen
        }
    }
}

/// The base image drawn onto a cleared surface of one size.
struct FittedLayer {
    surface: Size,
    fit: FitTransform,
    pixels: RgbaImage,
}

/// Renders frames for one loaded image.
///
/// The fitted base layer is rebuilt whenever the surface size changes.
/// Anchors are supplied per call, already resolved for the same surface.
pub struct FrameCompositor {
    image: Arc<RgbaImage>,
    layer: Option<FittedLayer>,
}

impl FrameCompositor {
    pub fn new(image: Arc<RgbaImage>) -> Self {
        Self { image, layer: None }
    }

    pub fn image_size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }

    /// Fit transform of the image on `surface`.
    pub fn fit(&self, surface: Size) -> FitTransform {
        FitTransform::compute(self.image_size(), surface)
    }

    /// Render into a fresh surface of the given size.
    pub fn render_frame(
        &mut self,
        surface: Size,
        opening: f64,
        closure: f64,
        anchors: &ResolvedAnchors,
    ) -> RgbaImage {
        let mut target = RgbaImage::new(surface.width, surface.height);
        self.render(opening, closure, anchors, &mut target);
        target
    }

    /// Render one frame into `target`; its dimensions are the surface size.
    pub fn render(
        &mut self,
        opening: f64,
        closure: f64,
        anchors: &ResolvedAnchors,
        target: &mut RgbaImage,
    ) {
        let surface = Size::new(target.width(), target.height());
        if surface.is_empty() {
            return;
        }
        let opening = opening.clamp(0.0, 1.0);
        let closure = closure.clamp(0.0, 1.0);

        let layer = self.layer_for(surface);
        target.copy_from_slice(layer.pixels.as_raw());

        if let Some(mouth) = &anchors.mouth {
            if mouth.is_manual() {
                let scale = 1.0 + opening * MOUTH_STRETCH;
                deform_vertically(target, layer, &mouth.ellipse, scale);
            } else if opening > PROCEDURAL_MOUTH_MIN_OPENING {
                draw_procedural_mouth(target, &mouth.ellipse, opening);
            }
        }

        if let Some((left, right)) = anchors.eyes() {
            let scale = 1.0 - closure * EYE_SQUASH;
            deform_vertically(target, layer, &left.ellipse, scale);
            deform_vertically(target, layer, &right.ellipse, scale);
        }
    }

    fn layer_for(&mut self, surface: Size) -> &FittedLayer {
        if self
            .layer
            .as_ref()
            .map_or(false, |layer| layer.surface != surface)
        {
            self.layer = None;
        }
        self.layer.get_or_insert_with(|| {
            tracing::debug!(
                width = surface.width,
                height = surface.height,
                "Building fitted base layer"
            );
            build_layer(&self.image, surface)
        })
    }
}

fn build_layer(image: &RgbaImage, surface: Size) -> FittedLayer {
    let image_size = Size::new(image.width(), image.height());
    let fit = FitTransform::compute(image_size, surface);
    let mut pixels = RgbaImage::from_pixel(surface.width, surface.height, BACKGROUND);

    let draw_w = fit.draw_width.round() as u32;
    let draw_h = fit.draw_height.round() as u32;
    if draw_w > 0 && draw_h > 0 && !image_size.is_empty() {
        let scaled;
        let drawn = if (draw_w, draw_h) == image.dimensions() {
            image
        } else {
            scaled = imageops::resize(image, draw_w, draw_h, FilterType::Triangle);
            &scaled
        };
        imageops::replace(
            &mut pixels,
            drawn,
            fit.offset_x.round() as i64,
            fit.offset_y.round() as i64,
        );
    }

    FittedLayer {
        surface,
        fit,
        pixels,
    }
}

/// Redraw the base layer inside `ellipse`, scaled vertically by `scale`
/// about the ellipse center. Pixels whose source falls outside the drawn
/// image keep their current value.
fn deform_vertically(target: &mut RgbaImage, layer: &FittedLayer, ellipse: &Ellipse, scale: f64) {
    if scale <= 0.0 {
        return;
    }
    let identity = (scale - 1.0).abs() < f64::EPSILON;
    let (x0, y0, x1, y1) = ellipse.pixel_bounds(layer.surface);

    for y in y0..y1 {
        let py = y as f64 + 0.5;
        let sy = ellipse.cy + (py - ellipse.cy) / scale;
        for x in x0..x1 {
            let px = x as f64 + 0.5;
            if !ellipse.contains(px, py) || !layer.fit.covers(px, sy) {
                continue;
            }
            let pixel = if identity {
                *layer.pixels.get_pixel(x, y)
            } else {
                sample_column(&layer.pixels, x, sy - 0.5)
            };
            target.put_pixel(x, y, pixel);
        }
    }
}

/// Linear interpolation between the two rows around `fy` in column `x`.
fn sample_column(pixels: &RgbaImage, x: u32, fy: f64) -> Rgba<u8> {
    let max_y = pixels.height().saturating_sub(1);
    let fy = fy.clamp(0.0, max_y as f64);
    let y0 = fy.floor() as u32;
    let y1 = (y0 + 1).min(max_y);
    let t = fy - y0 as f64;
    let a = pixels.get_pixel(x, y0);
    let b = pixels.get_pixel(x, y1);
    Rgba(std::array::from_fn(|i| {
        (a[i] as f64 * (1.0 - t) + b[i] as f64 * t).round() as u8
    }))
}

/// Stylized mouth drawn over the base image, sized from the anchor's full
/// width and height.
fn draw_procedural_mouth(target: &mut RgbaImage, mouth: &Ellipse, opening: f64) {
    let (x, y) = (mouth.cx, mouth.cy);
    let w = mouth.rx * 2.0;
    let h = mouth.ry * 2.0;

    match MouthShape::for_opening(opening) {
        MouthShape::Closed => {
            stroke_ellipse(target, x, y, w * 0.8, h * 0.2, MOUTH_COLOR);
        }
        MouthShape::SlightlyOpen => {
            fill_ellipse(target, x, y, w * 0.7, h * 0.4 * opening, MOUTH_COLOR);
        }
        MouthShape::Open => {
            fill_ellipse(target, x, y, w * 0.8, h * 0.6 * opening, MOUTH_COLOR);
        }
        MouthShape::WideOpen => {
            fill_ellipse(target, x, y, w * 0.9, h * 0.9 * opening, MOUTH_COLOR);
            fill_ellipse(
                target,
                x,
                y + h * 0.2 * opening,
                w * 0.5,
                h * 0.3 * opening,
                MOUTH_HIGHLIGHT,
            );
        }
    }
}

fn fill_ellipse(target: &mut RgbaImage, cx: f64, cy: f64, rx: f64, ry: f64, color: Rgba<u8>) {
    let (rx, ry) = (rx.round() as i32, ry.round() as i32);
    if rx < 1 || ry < 1 {
        return;
    }
    draw_filled_ellipse_mut(target, (cx.round() as i32, cy.round() as i32), rx, ry, color);
}

/// Two-pixel outline.
fn stroke_ellipse(target: &mut RgbaImage, cx: f64, cy: f64, rx: f64, ry: f64, color: Rgba<u8>) {
    let center = (cx.round() as i32, cy.round() as i32);
    let (rx, ry) = (rx.round() as i32, ry.round() as i32);
    if rx < 1 || ry < 1 {
        return;
    }
    draw_hollow_ellipse_mut(target, center, rx, ry, color);
    if rx > 1 && ry > 1 {
        draw_hollow_ellipse_mut(target, center, rx - 1, ry - 1, color);
    }
}
