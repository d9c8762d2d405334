use anyhow::Result;
use image::RgbImage;

use crate::detect::backend::VehicleDetector;
use crate::detect::result::Detection;

/// Stub backend for testing and dry runs. Reports the same boxes on every
/// frame, minus those under the confidence threshold.
#[derive(Clone, Debug, Default)]
pub struct StubBackend {
    detections: Vec<Detection>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detections(detections: Vec<Detection>) -> Self {
        Self { detections }
    }
}

impl VehicleDetector for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _image: &RgbImage, conf_threshold: f32) -> Result<Vec<Detection>> {
        Ok(self
            .detections
            .iter()
            .filter(|d| d.confidence >= conf_threshold)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::VehicleClass;

    #[test]
    fn stub_backend_applies_threshold() {
        let mut backend = StubBackend::with_detections(vec![
            Detection::new((0.0, 0.0), (10.0, 10.0), 0.9, VehicleClass::Car),
            Detection::new((20.0, 0.0), (30.0, 10.0), 0.2, VehicleClass::Truck),
        ]);
        let image = RgbImage::new(4, 4);

        let r1 = backend.detect(&image, 0.25).unwrap();
        assert_eq!(r1.len(), 1);
        assert_eq!(r1[0].class, VehicleClass::Car);

        let r2 = backend.detect(&image, 0.0).unwrap();
        assert_eq!(r2.len(), 2);

        assert!(StubBackend::new().detect(&image, 0.0).unwrap().is_empty());
    }
}
