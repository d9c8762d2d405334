//! Occupancy overlay.
//!
//! Draws spot outlines colored by state, spot ids at polygon centroids,
//! optional detection boxes with captions, and a `FREE n/m` summary in the
//! top-left corner. Rendering works on a copy and is deterministic.
//!
//! DejaVu Sans is compiled in, so text never depends on the host. A font
//! file from settings replaces it.

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detect::Detection;
use crate::error::{PipelineError, Result};
use crate::occupancy::OccupancyMap;
use crate::spots::Spot;

pub const OCCUPIED_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const FREE_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
pub const DETECTION_COLOR: Rgb<u8> = Rgb([0, 200, 255]);
pub const SUMMARY_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

pub const SUMMARY_ORIGIN: (i32, i32) = (15, 12);
const SUMMARY_SCALE: f32 = 32.0;
const SPOT_LABEL_SCALE: f32 = 20.0;
const CAPTION_SCALE: f32 = 16.0;

const BUNDLED_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

/// The compiled-in DejaVu Sans.
pub fn bundled_font() -> Result<FontArc> {
    FontArc::try_from_slice(BUNDLED_FONT)
        .map_err(|e| PipelineError::config(format!("invalid bundled font: {e}")))
}

/// Load a TrueType/OpenType font file.
pub fn load_font(path: &Path) -> Result<FontArc> {
    let bytes = std::fs::read(path).map_err(|e| {
        PipelineError::config(format!("failed to read font {}: {}", path.display(), e))
    })?;
    FontArc::try_from_vec(bytes)
        .map_err(|e| PipelineError::config(format!("invalid font {}: {}", path.display(), e)))
}

pub struct OverlayRenderer {
    font: FontArc,
}

impl OverlayRenderer {
    pub fn new(font: FontArc) -> Self {
        Self { font }
    }

    pub fn bundled() -> Result<Self> {
        Ok(Self::new(bundled_font()?))
    }

    /// Use `font_path` when given, otherwise the bundled font. An explicit
    /// path that fails to load is a config error.
    pub fn from_font_path(font_path: Option<&Path>) -> Result<Self> {
        match font_path {
            Some(path) => {
                log::info!("overlay font: {}", path.display());
                Ok(Self::new(load_font(path)?))
            }
            None => Self::bundled(),
        }
    }

    /// Render the overlay onto a copy of `frame`.
    ///
    /// `detections` is optional so callers can hide boxes while still
    /// showing occupancy. The summary counts spots in `spots`; entries
    /// missing from `occupancy` count as free.
    pub fn render(
        &self,
        frame: &RgbImage,
        spots: &[Spot],
        occupancy: &OccupancyMap,
        detections: Option<&[Detection]>,
    ) -> RgbImage {
        let mut img = frame.clone();
        // keeps box corners representable however far off-frame a box is
        let max_x = img.width() as f32 + 1.0;
        let max_y = img.height() as f32 + 1.0;

        for spot in spots {
            let color = if occupancy.is_occupied(&spot.id) {
                OCCUPIED_COLOR
            } else {
                FREE_COLOR
            };
            draw_polygon_outline(&mut img, spot, color);
            if let Some(c) = spot.centroid() {
                self.text(&mut img, color, (c.x, c.y), SPOT_LABEL_SCALE, &spot.id);
            }
        }

        for det in detections.unwrap_or_default() {
            let x1 = det.x1.clamp(-1.0, max_x) as i32;
            let y1 = det.y1.clamp(-1.0, max_y) as i32;
            let x2 = det.x2.clamp(-1.0, max_x) as i32;
            let y2 = det.y2.clamp(-1.0, max_y) as i32;
            let w = x2.saturating_sub(x1).max(1) as u32;
            let h = y2.saturating_sub(y1).max(1) as u32;
            draw_hollow_rect_mut(&mut img, Rect::at(x1, y1).of_size(w, h), DETECTION_COLOR);
            if w > 2 && h > 2 {
                draw_hollow_rect_mut(
                    &mut img,
                    Rect::at(x1.saturating_add(1), y1.saturating_add(1)).of_size(w - 2, h - 2),
                    DETECTION_COLOR,
                );
            }
            let caption_y = y1.saturating_sub(5 + CAPTION_SCALE as i32).max(0);
            self.text(&mut img, DETECTION_COLOR, (x1.max(0), caption_y), CAPTION_SCALE, &det.caption());
        }

        let summary = occupancy.summary(spots);
        self.text(
            &mut img,
            SUMMARY_COLOR,
            SUMMARY_ORIGIN,
            SUMMARY_SCALE,
            &format!("FREE {summary}"),
        );
        img
    }

    fn text(&self, img: &mut RgbImage, color: Rgb<u8>, (x, y): (i32, i32), scale: f32, text: &str) {
        draw_text_mut(img, color, x, y, PxScale::from(scale), &self.font, text);
    }
}

/// Closed outline, two pixels wide.
fn draw_polygon_outline(img: &mut RgbImage, spot: &Spot, color: Rgb<u8>) {
    let pts = &spot.polygon;
    if pts.len() < 2 {
        return;
    }
    for (i, a) in pts.iter().enumerate() {
        let b = pts[(i + 1) % pts.len()];
        for (dx, dy) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)] {
            draw_line_segment_mut(
                img,
                (a.x as f32 + dx, a.y as f32 + dy),
                (b.x as f32 + dx, b.y as f32 + dy),
                color,
            );
        }
    }
}
