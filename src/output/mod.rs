//! Annotated video output.
//!
//! Opening a writer walks an ordered candidate list. For `.mp4` paths the
//! MPEG-4 Part 2 (`mp4v`) and H.264 (`avc1`) encoders are tried first; any
//! path then falls back to Motion JPEG in an AVI container, which FFmpeg
//! always ships. The fallback keeps the requested file name. If nothing
//! opens, the run fails with `WriterUnavailable`.

#[cfg(feature = "video-ffmpeg")]
pub(crate) mod file_ffmpeg;

use std::fmt;
use std::path::Path;

use image::RgbImage;

use crate::error::{PipelineError, Result};

/// One codec/container combination to attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodecChoice {
    /// FourCC used in logs and reports.
    pub fourcc: &'static str,
    /// Encoder name as known to FFmpeg.
    pub encoder: &'static str,
    /// Forced container; `None` lets the muxer follow the file extension.
    pub container: Option<&'static str>,
}

impl fmt::Display for CodecChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.container {
            Some(container) => write!(f, "{} ({}/{})", self.fourcc, self.encoder, container),
            None => write!(f, "{} ({})", self.fourcc, self.encoder),
        }
    }
}

pub const MP4_CANDIDATES: &[CodecChoice] = &[
    CodecChoice {
        fourcc: "mp4v",
        encoder: "mpeg4",
        container: None,
    },
    CodecChoice {
        fourcc: "avc1",
        encoder: "libx264",
        container: None,
    },
];

pub const FALLBACK_CODEC: CodecChoice = CodecChoice {
    fourcc: "MJPG",
    encoder: "mjpeg",
    container: Some("avi"),
};

/// Ordered candidates for `path`.
pub fn codec_candidates(path: &Path) -> Vec<CodecChoice> {
    let is_mp4 = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mp4"));
    let mut candidates = Vec::with_capacity(MP4_CANDIDATES.len() + 1);
    if is_mp4 {
        candidates.extend_from_slice(MP4_CANDIDATES);
    }
    candidates.push(FALLBACK_CODEC);
    candidates
}

/// Sequential frame writer.
pub trait FrameSink {
    fn write(&mut self, frame: &RgbImage) -> Result<()>;

    /// Flush and close the output. Called exactly once per opened sink.
    fn finish(&mut self) -> Result<()>;
}

/// Opens a [`FrameSink`] for a single codec choice.
pub trait SinkOpener {
    fn open(
        &self,
        path: &Path,
        codec: &CodecChoice,
        fps: f64,
        size: (u32, u32),
    ) -> anyhow::Result<Box<dyn FrameSink>>;
}

/// Try each candidate for `path` in order; the first that opens wins.
pub fn open_writer(
    opener: &dyn SinkOpener,
    path: &Path,
    fps: f64,
    size: (u32, u32),
) -> Result<(Box<dyn FrameSink>, CodecChoice)> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let candidates = codec_candidates(path);
    for codec in &candidates {
        match opener.open(path, codec, fps, size) {
            Ok(sink) => {
                log::info!(
                    "writer opened: {} with {} at {:.2} fps, {}x{}",
                    path.display(),
                    codec,
                    fps,
                    size.0,
                    size.1
                );
                return Ok((sink, *codec));
            }
            Err(e) => log::warn!("writer {} rejected for {}: {:#}", codec, path.display(), e),
        }
    }

    Err(PipelineError::WriterUnavailable {
        path: path.to_path_buf(),
        tried: candidates
            .iter()
            .map(|c| c.fourcc)
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// Opens FFmpeg-encoded video files (feature: video-ffmpeg).
#[derive(Clone, Copy, Debug, Default)]
pub struct VideoFileWriter;

impl SinkOpener for VideoFileWriter {
    #[cfg(feature = "video-ffmpeg")]
    fn open(
        &self,
        path: &Path,
        codec: &CodecChoice,
        fps: f64,
        size: (u32, u32),
    ) -> anyhow::Result<Box<dyn FrameSink>> {
        Ok(Box::new(file_ffmpeg::FfmpegSink::open(path, codec, fps, size)?))
    }

    #[cfg(not(feature = "video-ffmpeg"))]
    fn open(
        &self,
        _path: &Path,
        _codec: &CodecChoice,
        _fps: f64,
        _size: (u32, u32),
    ) -> anyhow::Result<Box<dyn FrameSink>> {
        Err(anyhow::anyhow!(
            "video encoding requires the video-ffmpeg feature"
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    struct NullSink;

    impl FrameSink for NullSink {
        fn write(&mut self, _frame: &RgbImage) -> Result<()> {
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            Ok(())
        }
    }

    /// Accepts only the listed encoders and records every attempt.
    struct Picky {
        accepts: Vec<&'static str>,
        attempts: RefCell<Vec<&'static str>>,
    }

    impl SinkOpener for Picky {
        fn open(
            &self,
            _path: &Path,
            codec: &CodecChoice,
            _fps: f64,
            _size: (u32, u32),
        ) -> anyhow::Result<Box<dyn FrameSink>> {
            self.attempts.borrow_mut().push(codec.fourcc);
            if self.accepts.contains(&codec.encoder) {
                Ok(Box::new(NullSink))
            } else {
                Err(anyhow::anyhow!("no {}", codec.encoder))
            }
        }
    }

    fn picky(accepts: &[&'static str]) -> Picky {
        Picky {
            accepts: accepts.to_vec(),
            attempts: RefCell::new(Vec::new()),
        }
    }

    #[test]
    fn mp4_prefers_mp4_codecs() {
        let candidates = codec_candidates(Path::new("out/demo.MP4"));
        let fourccs: Vec<_> = candidates.iter().map(|c| c.fourcc).collect();
        assert_eq!(fourccs, vec!["mp4v", "avc1", "MJPG"]);
        assert_eq!(codec_candidates(Path::new("demo.avi")), vec![FALLBACK_CODEC]);
    }

    #[test]
    fn first_working_codec_wins() {
        let dir = tempfile::tempdir().unwrap();
        let opener = picky(&["mpeg4", "libx264", "mjpeg"]);
        let (_, codec) = open_writer(&opener, &dir.path().join("a.mp4"), 5.0, (8, 8)).unwrap();
        assert_eq!(codec.fourcc, "mp4v");
        assert_eq!(*opener.attempts.borrow(), vec!["mp4v"]);
    }

    #[test]
    fn falls_back_after_preferred_codecs_fail() {
        let dir = tempfile::tempdir().unwrap();
        let opener = picky(&["mjpeg"]);
        let (_, codec) = open_writer(&opener, &dir.path().join("nested/a.mp4"), 5.0, (8, 8)).unwrap();
        assert_eq!(codec, FALLBACK_CODEC);
        assert_eq!(*opener.attempts.borrow(), vec!["mp4v", "avc1", "MJPG"]);
        assert!(dir.path().join("nested").is_dir());
    }

    #[test]
    fn nothing_opens_is_writer_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_writer(&picky(&[]), &dir.path().join("a.mp4"), 5.0, (8, 8))
            .err()
            .unwrap();
        match err {
            PipelineError::WriterUnavailable { tried, .. } => assert_eq!(tried, "mp4v, avc1, MJPG"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
