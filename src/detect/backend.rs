use anyhow::Result;
use image::RgbImage;

use super::result::Detection;

/// Detector backend trait.
///
/// Implementations own their model state and are handed to the pipeline
/// explicitly for each run; the core holds no global detector.
///
/// Returned detections must already be:
/// - restricted to [`VehicleClass`](super::VehicleClass) labels
/// - at or above `conf_threshold`
/// - de-duplicated (non-maximum suppression)
/// - in pixel coordinates of `image`
pub trait VehicleDetector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame. The image is borrowed for the call only.
    fn detect(&mut self, image: &RgbImage, conf_threshold: f32) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
