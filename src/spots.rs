//! Parking spot geometry.
//!
//! Spots are pixel polygons authored against an optional reference
//! resolution. Before any containment test the polygons are rescaled to the
//! resolution of the frame being analysed with [`scale_spots`].
//!
//! Scaled coordinates use [`f64::round`], i.e. round-half-away-from-zero.
//! A point at `x = 10` scaled by `1.25` lands on `12.5` and becomes `13`.

use std::path::Path;

use serde::Deserialize;

use crate::error::{PipelineError, Result};

/// Integer pixel coordinate of a polygon vertex.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

/// A designated parking area.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spot {
    pub id: String,
    pub polygon: Vec<Point>,
}

impl Spot {
    pub fn new(id: impl Into<String>, polygon: impl IntoIterator<Item = (i32, i32)>) -> Self {
        Self {
            id: id.into(),
            polygon: polygon.into_iter().map(Point::from).collect(),
        }
    }

    /// Polygons with fewer than three vertices never contain a point.
    pub fn is_valid(&self) -> bool {
        self.polygon.len() >= 3
    }

    /// Arithmetic mean of the vertices, truncated toward zero.
    pub fn centroid(&self) -> Option<Point> {
        if self.polygon.is_empty() {
            return None;
        }
        let n = self.polygon.len() as f64;
        let (sx, sy) = self
            .polygon
            .iter()
            .fold((0f64, 0f64), |(sx, sy), p| (sx + p.x as f64, sy + p.y as f64));
        Some(Point::new((sx / n) as i32, (sy / n) as i32))
    }
}

/// Spots plus the resolution their polygons were authored against.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpotsConfig {
    /// `(width, height)`; `None` means polygons are already in frame pixels.
    pub image_size: Option<(i32, i32)>,
    pub spots: Vec<Spot>,
}

#[derive(Debug, Deserialize)]
struct SpotsFile {
    image_size: Option<[f64; 2]>,
    #[serde(default)]
    spots: Vec<SpotRecord>,
}

#[derive(Debug, Deserialize)]
struct SpotRecord {
    id: serde_json::Value,
    polygon: Vec<[f64; 2]>,
}

impl SpotsConfig {
    /// Parse a spot document.
    ///
    /// ```json
    /// {"image_size": [1280, 720], "spots": [{"id": "A1", "polygon": [[0,0],[50,0],[50,50]]}]}
    /// ```
    pub fn from_json(raw: &str) -> Result<Self> {
        let file: SpotsFile = serde_json::from_str(raw)
            .map_err(|e| PipelineError::config(format!("invalid spots document: {e}")))?;

        let image_size = file.image_size.map(|[w, h]| (w as i32, h as i32));
        let spots = file
            .spots
            .into_iter()
            .map(|record| {
                let id = match record.id {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Number(n) => n.to_string(),
                    other => {
                        return Err(PipelineError::config(format!(
                            "spot id must be a string or number, got {other}"
                        )))
                    }
                };
                let polygon = record
                    .polygon
                    .into_iter()
                    .map(|[x, y]| Point::new(x as i32, y as i32))
                    .collect();
                Ok(Spot { id, polygon })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { image_size, spots })
    }
}

/// Read and parse a spot document from disk.
pub fn load_spots(path: impl AsRef<Path>) -> Result<SpotsConfig> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| {
        PipelineError::config(format!("failed to read spots file {}: {}", path.display(), e))
    })?;
    let cfg = SpotsConfig::from_json(&raw).map_err(|e| match e {
        PipelineError::Config(msg) => {
            PipelineError::config(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })?;
    log::debug!(
        "loaded {} spots from {} (reference size {:?})",
        cfg.spots.len(),
        path.display(),
        cfg.image_size
    );
    Ok(cfg)
}

/// Rescale spot polygons to `target` `(width, height)`.
///
/// Returns a fresh copy of the spots; the configuration is never touched.
/// Without a reference size, with a non-positive reference dimension, or when
/// the reference already matches the target, the copy is unchanged.
pub fn scale_spots(cfg: &SpotsConfig, target: (u32, u32)) -> Vec<Spot> {
    let Some((w0, h0)) = cfg.image_size else {
        return cfg.spots.clone();
    };
    let (w1, h1) = target;
    if w0 <= 0 || h0 <= 0 || (w0 as i64 == w1 as i64 && h0 as i64 == h1 as i64) {
        return cfg.spots.clone();
    }

    let sx = w1 as f64 / w0 as f64;
    let sy = h1 as f64 / h0 as f64;

    cfg.spots
        .iter()
        .map(|spot| Spot {
            id: spot.id.clone(),
            polygon: spot
                .polygon
                .iter()
                .map(|p| {
                    Point::new(
                        (p.x as f64 * sx).round() as i32,
                        (p.y as f64 * sy).round() as i32,
                    )
                })
                .collect(),
        })
        .collect()
}

/// Even-odd ray casting toward +x.
///
/// Horizontal edges are kept finite by a `1e-9` term in the intersection
/// denominator. Points exactly on a vertex have no stable classification.
pub fn point_in_polygon(point: (f64, f64), polygon: &[Point]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let (x, y) = point;
    let mut inside = false;

    let mut prev = polygon[n - 1];
    for &cur in polygon {
        let (x0, y0) = (prev.x as f64, prev.y as f64);
        let (x1, y1) = (cur.x as f64, cur.y as f64);
        if (y1 > y) != (y0 > y) && x < (x0 - x1) * (y - y1) / (y0 - y1 + 1e-9) + x1 {
            inside = !inside;
        }
        prev = cur;
    }
    inside
}
