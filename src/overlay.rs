//! Overlay layer drawn on top of the camera feed.
//!
//! Each `render` call clears the layer and redraws it from the detection
//! alone, so nothing accumulates across frames and two identical calls
//! leave identical pixels.
//!
//! The layer is kept two ways: a display list (`OverlayScene`) that the
//! presenter can print or forward, and an RGBA raster sized to the camera
//! frame. Text lives only in the display list; the raster carries shapes.

use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use std::path::Path;

use crate::detect::{BoundingBox, Detection};
use crate::frame::FrameSize;

pub const ACCENT_POSITIVE: Rgba<u8> = Rgba([0x00, 0xff, 0x00, 0xff]);
pub const ACCENT_WARNING: Rgba<u8> = Rgba([0xff, 0xcc, 0x00, 0xff]);
pub const LABEL_BACKGROUND: Rgba<u8> = Rgba([0x00, 0x00, 0x00, 178]);
pub const TEXT_COLOR: Rgba<u8> = Rgba([0xff, 0xff, 0xff, 0xff]);

const BOX_LINE_WIDTH: f64 = 4.0;
const LABEL_HEIGHT: f64 = 60.0;
const LABEL_MIN_WIDTH: f64 = 200.0;
/// Confidence at which the percentage turns from warning to positive.
const CONFIDENT_AT: f64 = 85.0;
const SEARCHING_TEXT: &str = "Scanning for KTM...";

#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    StrokeRect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        line_width: f64,
        color: Rgba<u8>,
    },
    FillRect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        color: Rgba<u8>,
    },
    Text {
        text: String,
        x: f64,
        y: f64,
        color: Rgba<u8>,
    },
}

/// Ordered draw commands for one render.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OverlayScene {
    pub shapes: Vec<Shape>,
}

impl OverlayScene {
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Text items in draw order.
    pub fn texts(&self) -> impl Iterator<Item = (&str, Rgba<u8>)> {
        self.shapes.iter().filter_map(|shape| match shape {
            Shape::Text { text, color, .. } => Some((text.as_str(), *color)),
            _ => None,
        })
    }

    /// Build the draw commands for a detection.
    pub fn for_detection(detection: &Detection) -> Self {
        let Some(bbox) = detection.bbox else {
            return Self::default();
        };
        let mut shapes = vec![
            Shape::StrokeRect {
                x: bbox.x1,
                y: bbox.y1,
                width: bbox.width(),
                height: bbox.height(),
                line_width: BOX_LINE_WIDTH,
                color: ACCENT_POSITIVE,
            },
            Shape::FillRect {
                x: bbox.x1,
                y: bbox.y1 - LABEL_HEIGHT,
                width: bbox.width().max(LABEL_MIN_WIDTH),
                height: LABEL_HEIGHT,
                color: LABEL_BACKGROUND,
            },
        ];
        shapes.extend(label_text(&bbox, detection));
        Self { shapes }
    }
}

fn label_text(bbox: &BoundingBox, detection: &Detection) -> Vec<Shape> {
    let text = |text: String, dx: f64, dy: f64, color: Rgba<u8>| Shape::Text {
        text,
        x: bbox.x1 + dx,
        y: bbox.y1 - dy,
        color,
    };

    let fields = detection.fields.as_ref();
    let Some(nim) = fields.and_then(|f| f.nim()) else {
        return vec![text(SEARCHING_TEXT.to_string(), 10.0, 25.0, TEXT_COLOR)];
    };
    let name = fields.and_then(|f| f.name()).unwrap_or("?");
    let accent = if detection.confidence >= CONFIDENT_AT {
        ACCENT_POSITIVE
    } else {
        ACCENT_WARNING
    };
    vec![
        text(format!("NIM: {nim}"), 10.0, 35.0, TEXT_COLOR),
        text(format!("Name: {name}"), 10.0, 15.0, TEXT_COLOR),
        text(format!("{}%", detection.confidence), 160.0, 35.0, accent),
    ]
}

/// Transparent layer aligned to the camera frame.
pub struct OverlayRenderer {
    scene: OverlayScene,
    image: RgbaImage,
}

impl OverlayRenderer {
    pub fn new(size: FrameSize) -> Self {
        Self {
            scene: OverlayScene::default(),
            image: RgbaImage::new(size.width, size.height),
        }
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.image.width(), self.image.height())
    }

    /// Match the layer to the negotiated frame size. Clears on change.
    pub fn resize(&mut self, size: FrameSize) {
        if self.size() != size {
            self.image = RgbaImage::new(size.width, size.height);
            self.scene = OverlayScene::default();
        }
    }

    pub fn scene(&self) -> &OverlayScene {
        &self.scene
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn clear(&mut self) {
        self.scene = OverlayScene::default();
        self.image.pixels_mut().for_each(|p| *p = Rgba([0, 0, 0, 0]));
    }

    pub fn render(&mut self, detection: &Detection) {
        self.clear();
        let scene = OverlayScene::for_detection(detection);
        for shape in &scene.shapes {
            rasterize(&mut self.image, shape);
        }
        self.scene = scene;
    }

    /// Write the raster as PNG.
    pub fn save_png(&self, path: &Path) -> Result<()> {
        self.image
            .save_with_format(path, image::ImageFormat::Png)
            .with_context(|| format!("write overlay to {}", path.display()))
    }
}

fn rasterize(image: &mut RgbaImage, shape: &Shape) {
    match shape {
        Shape::FillRect {
            x,
            y,
            width,
            height,
            color,
        } => fill(image, *x, *y, x + width, y + height, *color),
        Shape::StrokeRect {
            x,
            y,
            width,
            height,
            line_width,
            color,
        } => {
            // Stroke is centred on the outline; draw four non-overlapping bands.
            let half = line_width / 2.0;
            let (left, top) = (x - half, y - half);
            let (right, bottom) = (x + width + half, y + height + half);
            fill(image, left, top, right, y + half, *color);
            fill(image, left, y + height - half, right, bottom, *color);
            fill(image, left, y + half, x + half, y + height - half, *color);
            fill(image, x + width - half, y + half, right, y + height - half, *color);
        }
        Shape::Text { .. } => {}
    }
}

/// Fill pixels whose centres fall inside `[x0, x1) x [y0, y1)`, clipped.
fn fill(image: &mut RgbaImage, x0: f64, y0: f64, x1: f64, y1: f64, color: Rgba<u8>) {
    let Some((cols, rows)) = pixel_span(x0, x1, image.width()).zip(pixel_span(y0, y1, image.height()))
    else {
        return;
    };
    for py in rows.0..rows.1 {
        for px in cols.0..cols.1 {
            let pixel = image.get_pixel_mut(px, py);
            *pixel = blend(*pixel, color);
        }
    }
}

fn pixel_span(start: f64, end: f64, limit: u32) -> Option<(u32, u32)> {
    if !(start.is_finite() && end.is_finite()) || end <= start {
        return None;
    }
    let first = (start - 0.5).ceil().max(0.0);
    let last = (end - 0.5).ceil().min(limit as f64);
    (first < last).then_some((first as u32, last as u32))
}

/// Source-over compositing.
fn blend(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let sa = src[3] as f64 / 255.0;
    let da = dst[3] as f64 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let channel = |i: usize| {
        let c = (src[i] as f64 * sa + dst[i] as f64 * da * (1.0 - sa)) / out_a;
        c.round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        channel(0),
        channel(1),
        channel(2),
        (out_a * 255.0).round() as u8,
    ])
}
