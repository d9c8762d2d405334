//! Frame container.
//!
//! A `Frame` is an owned RGB raster produced by a source, consumed by one
//! pipeline step, and dropped. It is never retained across frames.

use image::RgbImage;

pub struct Frame {
    image: RgbImage,
    /// Zero-based position in the source stream.
    pub index: u64,
}

impl Frame {
    pub fn new(image: RgbImage, index: u64) -> Self {
        Self { image, index }
    }

    /// Build a frame from packed RGB24 bytes. `None` when the length does
    /// not match `width * height * 3`.
    pub fn from_rgb(width: u32, height: u32, pixels: Vec<u8>, index: u64) -> Option<Self> {
        RgbImage::from_raw(width, height, pixels).map(|image| Self { image, index })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}
