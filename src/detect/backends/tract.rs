#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::VehicleDetector;
use crate::detect::result::{Detection, VehicleClass};

const DEFAULT_NMS_THRESHOLD: f32 = 0.4;

/// Tract-based backend for YOLO-family ONNX models.
///
/// Frames are stretched to the square model input (no letterbox) and boxes
/// are mapped back to frame pixels. Two output layouts are decoded:
/// - `[1, 4 + C, N]`: anchor-free heads, class scores only
/// - `[1, N, 5 + C]`: anchor heads, objectness at index 4
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    nms_threshold: f32,
    class_names: Option<Vec<String>>,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        if input_size == 0 {
            return Err(anyhow!("model input size must be positive"));
        }
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            nms_threshold: DEFAULT_NMS_THRESHOLD,
            class_names: None,
        })
    }

    /// Override the default IoU threshold used for suppression.
    pub fn with_nms_threshold(mut self, threshold: f32) -> Self {
        self.nms_threshold = threshold;
        self
    }

    /// Use a newline-separated class list instead of the built-in COCO ids.
    pub fn with_class_names_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read class names from {}", path.display()))?;
        self.class_names = Some(parse_class_names(&raw));
        Ok(self)
    }

    fn build_input(&self, image: &RgbImage) -> Tensor {
        let side = self.input_size;
        let resized = image::imageops::resize(image, side, side, FilterType::Triangle);
        let side = side as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        input.into_tensor()
    }

    fn label_for(&self, class_id: usize) -> Option<VehicleClass> {
        match &self.class_names {
            Some(names) => names
                .get(class_id)
                .and_then(|name| VehicleClass::from_label(name)),
            None => coco_vehicle_class(class_id),
        }
    }
}

impl VehicleDetector for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, image: &RgbImage, conf_threshold: f32) -> Result<Vec<Detection>> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }
        let input = self.build_input(image);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;

        let raw = decode_yolo(&view, conf_threshold, |id| self.label_for(id))?;

        let sx = width as f32 / self.input_size as f32;
        let sy = height as f32 / self.input_size as f32;
        let max_x = (width - 1) as f32;
        let max_y = (height - 1) as f32;
        let scaled = raw
            .into_iter()
            .map(|d| {
                Detection::new(
                    ((d.x1 * sx).clamp(0.0, max_x), (d.y1 * sy).clamp(0.0, max_y)),
                    ((d.x2 * sx).clamp(0.0, max_x), (d.y2 * sy).clamp(0.0, max_y)),
                    d.confidence,
                    d.class,
                )
            })
            .collect();

        Ok(non_max_suppression(scaled, self.nms_threshold))
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = RgbImage::new(self.input_size, self.input_size);
        self.detect(&blank, 1.0).map(|_| ())
    }
}

/// Decode raw head output into boxes in model-input pixels.
fn decode_yolo(
    view: &tract_ndarray::ArrayViewD<'_, f32>,
    conf_threshold: f32,
    label_for: impl Fn(usize) -> Option<VehicleClass>,
) -> Result<Vec<Detection>> {
    let shape = view.shape();
    if shape.len() != 3 || shape[0] != 1 {
        return Err(anyhow!("unexpected detector output shape {:?}", shape));
    }
    // Channel-first heads have far fewer attributes than candidates.
    let channel_first = shape[1] < shape[2];
    let (candidates, attrs) = if channel_first {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    let scores_from = if channel_first { 4 } else { 5 };
    if attrs <= scores_from {
        return Err(anyhow!("detector output has no class scores: {:?}", shape));
    }

    let at = |i: usize, a: usize| -> f32 {
        if channel_first {
            view[[0, a, i]]
        } else {
            view[[0, i, a]]
        }
    };

    let mut out = Vec::new();
    for i in 0..candidates {
        let objectness = if channel_first { 1.0 } else { at(i, 4) };
        let (class_id, score) = (scores_from..attrs)
            .map(|a| (a - scores_from, at(i, a)))
            .fold((0, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });
        let confidence = score * objectness;
        if !confidence.is_finite() || confidence < conf_threshold {
            continue;
        }
        let Some(class) = label_for(class_id) else {
            continue;
        };
        let (cx, cy, w, h) = (at(i, 0), at(i, 1), at(i, 2), at(i, 3));
        out.push(Detection::new(
            (cx - w / 2.0, cy - h / 2.0),
            (cx + w / 2.0, cy + h / 2.0),
            confidence,
            class,
        ));
    }
    Ok(out)
}

/// Greedy class-agnostic suppression, highest confidence first.
fn non_max_suppression(mut boxes: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

fn coco_vehicle_class(class_id: usize) -> Option<VehicleClass> {
    match class_id {
        2 => Some(VehicleClass::Car),
        3 => Some(VehicleClass::Motorcycle),
        5 => Some(VehicleClass::Bus),
        7 => Some(VehicleClass::Truck),
        _ => None,
    }
}

fn parse_class_names(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
