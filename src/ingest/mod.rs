//! Frame sources.
//!
//! This module provides the inputs the pipeline reads from:
//! - still images (`load_image`)
//! - local video files (feature: video-ffmpeg)
//! - synthetic `stub://` clips (testing, dry runs)
//!
//! Sources hand out owned [`Frame`]s one at a time. End of stream is
//! `Ok(None)`; any other failure is an error and ends the run.

pub mod file;
#[cfg(feature = "video-ffmpeg")]
pub(crate) mod file_ffmpeg;

use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::frame::Frame;

pub use file::{VideoFileOpener, VideoSource};

/// Stream properties known once a source is open.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SourceInfo {
    /// Reported frame rate; `None` when the container has none.
    pub fps: Option<f64>,
    pub width: u32,
    pub height: u32,
}

/// Sequential frame reader.
pub trait FrameSource {
    fn info(&self) -> SourceInfo;

    /// Next frame, or `Ok(None)` once the source is exhausted.
    fn read_frame(&mut self) -> Result<Option<Frame>>;

    /// Release decoder and file handles. Further reads return `Ok(None)`.
    fn release(&mut self) {}
}

/// Opens a [`FrameSource`] for an input location.
pub trait SourceOpener {
    fn open(&self, input: &str) -> Result<Box<dyn FrameSource>>;
}

/// Decode a still image into a frame.
pub fn load_image(path: impl AsRef<Path>) -> Result<Frame> {
    let path = path.as_ref();
    let image = image::open(path)
        .map_err(|e| PipelineError::unreadable(path.display().to_string(), e))?;
    Ok(Frame::new(image.to_rgb8(), 0))
}
