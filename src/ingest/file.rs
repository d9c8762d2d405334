//! Local video source.
//!
//! `VideoSource` reads frames from a local video file (FFmpeg, feature
//! `video-ffmpeg`) or from a synthetic `stub://` clip. Stub clips take
//! optional query parameters, all defaulted:
//!
//! `stub://lot?frames=100&fps=25&width=640&height=480`
//!
//! `fps=0` simulates a container that reports no frame rate.

use image::{Rgb, RgbImage};

#[cfg(feature = "video-ffmpeg")]
use super::file_ffmpeg::FfmpegVideoSource;
use super::{FrameSource, SourceInfo, SourceOpener};
use crate::error::{PipelineError, Result};
use crate::frame::Frame;

/// Local video frame source.
pub struct VideoSource {
    backend: VideoBackend,
}

enum VideoBackend {
    Synthetic(SyntheticClip),
    #[cfg(feature = "video-ffmpeg")]
    Ffmpeg(FfmpegVideoSource),
}

impl VideoSource {
    pub fn open(input: &str) -> Result<Self> {
        if !is_local_file_path(input) {
            return Err(PipelineError::unreadable(
                input,
                "only local paths are supported (no URL schemes)",
            ));
        }
        if let Some(location) = input.strip_prefix("stub://") {
            let clip = SyntheticClip::parse(location).map_err(|e| PipelineError::unreadable(input, e))?;
            log::info!(
                "VideoSource: opened {} (synthetic, {} frames)",
                input,
                clip.frames
            );
            return Ok(Self {
                backend: VideoBackend::Synthetic(clip),
            });
        }
        #[cfg(feature = "video-ffmpeg")]
        {
            Ok(Self {
                backend: VideoBackend::Ffmpeg(FfmpegVideoSource::open(input)?),
            })
        }
        #[cfg(not(feature = "video-ffmpeg"))]
        {
            Err(PipelineError::unreadable(
                input,
                "video decoding requires the video-ffmpeg feature",
            ))
        }
    }
}

impl FrameSource for VideoSource {
    fn info(&self) -> SourceInfo {
        match &self.backend {
            VideoBackend::Synthetic(clip) => clip.info(),
            #[cfg(feature = "video-ffmpeg")]
            VideoBackend::Ffmpeg(source) => source.info(),
        }
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            VideoBackend::Synthetic(clip) => Ok(clip.next_frame()),
            #[cfg(feature = "video-ffmpeg")]
            VideoBackend::Ffmpeg(source) => source.read_frame(),
        }
    }

    fn release(&mut self) {
        match &mut self.backend {
            VideoBackend::Synthetic(clip) => clip.released = true,
            #[cfg(feature = "video-ffmpeg")]
            VideoBackend::Ffmpeg(source) => source.release(),
        }
    }
}

/// Opens [`VideoSource`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct VideoFileOpener;

impl SourceOpener for VideoFileOpener {
    fn open(&self, input: &str) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(VideoSource::open(input)?))
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

struct SyntheticClip {
    frames: u64,
    fps: f64,
    width: u32,
    height: u32,
    next_index: u64,
    released: bool,
}

impl SyntheticClip {
    fn parse(location: &str) -> std::result::Result<Self, String> {
        let mut clip = Self {
            frames: 100,
            fps: 25.0,
            width: 640,
            height: 480,
            next_index: 0,
            released: false,
        };
        let Some((_, query)) = location.split_once('?') else {
            return Ok(clip);
        };
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("malformed stub parameter '{pair}'"))?;
            match key {
                "frames" => clip.frames = parse_param(key, value)?,
                "fps" => clip.fps = parse_param(key, value)?,
                "width" => clip.width = parse_param(key, value)?,
                "height" => clip.height = parse_param(key, value)?,
                other => return Err(format!("unknown stub parameter '{other}'")),
            }
        }
        if clip.width == 0 || clip.height == 0 {
            return Err("stub clip dimensions must be positive".to_string());
        }
        Ok(clip)
    }

    fn info(&self) -> SourceInfo {
        SourceInfo {
            fps: (self.fps > 0.0).then_some(self.fps),
            width: self.width,
            height: self.height,
        }
    }

    fn next_frame(&mut self) -> Option<Frame> {
        if self.released || self.next_index >= self.frames {
            return None;
        }
        let index = self.next_index;
        self.next_index += 1;
        let shade = (index % 256) as u8;
        let image = RgbImage::from_fn(self.width, self.height, |x, y| {
            Rgb([shade, (x % 256) as u8, (y % 256) as u8])
        });
        Some(Frame::new(image, index))
    }
}

fn parse_param<T: std::str::FromStr>(key: &str, value: &str) -> std::result::Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("invalid value for {key}: '{value}'"))
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}
