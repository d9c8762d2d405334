//! Detection → occupancy → overlay.
//!
//! [`analyze_frame`] is the per-frame flow shared by both modes. Image mode
//! ([`analyze_image`]) is a single pass with spots scaled to the image;
//! video mode ([`VideoPipeline`]) adds sampling, output frame rate and the
//! writer.

mod video;

use image::RgbImage;

use crate::detect::{centers_from_detections, Detection, VehicleDetector};
use crate::error::{PipelineError, Result};
use crate::frame::Frame;
use crate::occupancy::{OccupancyMap, OccupancySummary};
use crate::overlay::OverlayRenderer;
use crate::spots::{scale_spots, Spot, SpotsConfig};

pub use video::{
    output_fps, PipelineOptions, PipelineState, StopReason, VideoPipeline, VideoReport,
    DEFAULT_INPUT_FPS,
};

/// Outcome of one pass over a frame.
#[derive(Debug)]
pub struct FrameAnalysis {
    pub detections: Vec<Detection>,
    pub occupancy: OccupancyMap,
    pub summary: OccupancySummary,
    pub annotated: RgbImage,
}

/// Run the detector, decide occupancy for `spots` and render the overlay.
///
/// `spots` must already be in the image's resolution.
pub fn analyze_frame(
    detector: &mut dyn VehicleDetector,
    renderer: &OverlayRenderer,
    image: &RgbImage,
    spots: &[Spot],
    conf_threshold: f32,
    draw_detections: bool,
) -> Result<FrameAnalysis> {
    let detections = detector
        .detect(image, conf_threshold)
        .map_err(PipelineError::Detection)?;
    let centers = centers_from_detections(&detections);
    let occupancy = OccupancyMap::compute(spots, &centers);
    let annotated = renderer.render(
        image,
        spots,
        &occupancy,
        draw_detections.then_some(detections.as_slice()),
    );
    let summary = occupancy.summary(spots);
    Ok(FrameAnalysis {
        detections,
        occupancy,
        summary,
        annotated,
    })
}

/// Single still image. Spots are scaled to the image and boxes are drawn.
pub fn analyze_image(
    detector: &mut dyn VehicleDetector,
    renderer: &OverlayRenderer,
    spots_cfg: &SpotsConfig,
    frame: &Frame,
    conf_threshold: f32,
) -> Result<FrameAnalysis> {
    let spots = scale_spots(spots_cfg, frame.size());
    let analysis = analyze_frame(detector, renderer, frame.image(), &spots, conf_threshold, true)?;
    log::info!(
        "image {}x{}: {} detections, free {}",
        frame.width(),
        frame.height(),
        analysis.detections.len(),
        analysis.summary
    );
    Ok(analysis)
}
