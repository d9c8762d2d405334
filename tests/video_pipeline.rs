use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use image::RgbImage;

use parking_occupancy::{
    CodecChoice, Detection, Frame, FrameSink, FrameSource, OverlayRenderer, PipelineError,
    PipelineOptions, PipelineState, SinkOpener, SourceInfo, SourceOpener, Spot, SpotsConfig,
    StopReason, StubBackend, VehicleClass, VehicleDetector, VideoFileOpener, VideoPipeline,
};

#[derive(Default)]
struct Counters {
    opened: Cell<u32>,
    read: Cell<u64>,
    released: Cell<bool>,
    written: Cell<u64>,
    finished: Cell<bool>,
    attempts: RefCell<Vec<&'static str>>,
}

struct MemorySource {
    frames: u64,
    info: SourceInfo,
    counters: Rc<Counters>,
}

impl FrameSource for MemorySource {
    fn info(&self) -> SourceInfo {
        self.info
    }

    fn read_frame(&mut self) -> parking_occupancy::Result<Option<Frame>> {
        let index = self.counters.read.get();
        if self.counters.released.get() || index >= self.frames {
            return Ok(None);
        }
        self.counters.read.set(index + 1);
        Ok(Some(Frame::new(
            RgbImage::new(self.info.width, self.info.height),
            index,
        )))
    }

    fn release(&mut self) {
        self.counters.released.set(true);
    }
}

struct MemoryOpener {
    frames: u64,
    fps: Option<f64>,
    counters: Rc<Counters>,
}

impl SourceOpener for MemoryOpener {
    fn open(&self, input: &str) -> parking_occupancy::Result<Box<dyn FrameSource>> {
        if input == "missing.mp4" {
            return Err(PipelineError::unreadable(input, "no such file"));
        }
        self.counters.opened.set(self.counters.opened.get() + 1);
        Ok(Box::new(MemorySource {
            frames: self.frames,
            info: SourceInfo {
                fps: self.fps,
                width: 200,
                height: 100,
            },
            counters: Rc::clone(&self.counters),
        }))
    }
}

struct MemorySink {
    size: (u32, u32),
    fail_after: Option<u64>,
    counters: Rc<Counters>,
}

impl FrameSink for MemorySink {
    fn write(&mut self, frame: &RgbImage) -> parking_occupancy::Result<()> {
        assert_eq!(frame.dimensions(), self.size);
        let written = self.counters.written.get();
        if self.fail_after == Some(written) {
            return Err(PipelineError::Write("disk full".to_string()));
        }
        self.counters.written.set(written + 1);
        Ok(())
    }

    fn finish(&mut self) -> parking_occupancy::Result<()> {
        assert!(!self.counters.finished.get(), "sink finished twice");
        self.counters.finished.set(true);
        Ok(())
    }
}

struct MemoryWriter {
    accepts: &'static [&'static str],
    fail_after: Option<u64>,
    fps: Cell<f64>,
    counters: Rc<Counters>,
}

impl SinkOpener for MemoryWriter {
    fn open(
        &self,
        _path: &Path,
        codec: &CodecChoice,
        fps: f64,
        size: (u32, u32),
    ) -> anyhow::Result<Box<dyn FrameSink>> {
        self.counters.attempts.borrow_mut().push(codec.fourcc);
        if !self.accepts.contains(&codec.encoder) {
            anyhow::bail!("encoder {} missing", codec.encoder);
        }
        self.fps.set(fps);
        Ok(Box::new(MemorySink {
            size,
            fail_after: self.fail_after,
            counters: Rc::clone(&self.counters),
        }))
    }
}

struct Harness {
    counters: Rc<Counters>,
    sources: MemoryOpener,
    sinks: MemoryWriter,
    dir: tempfile::TempDir,
}

fn harness(frames: u64, fps: Option<f64>) -> Harness {
    let counters = Rc::new(Counters::default());
    Harness {
        sources: MemoryOpener {
            frames,
            fps,
            counters: Rc::clone(&counters),
        },
        sinks: MemoryWriter {
            accepts: &["mpeg4", "libx264", "mjpeg"],
            fail_after: None,
            fps: Cell::new(0.0),
            counters: Rc::clone(&counters),
        },
        counters,
        dir: tempfile::tempdir().expect("tempdir"),
    }
}

/// Authored at 100x50; frames are 200x100.
fn lot() -> SpotsConfig {
    SpotsConfig {
        image_size: Some((100, 50)),
        spots: vec![
            Spot::new("A1", [(0, 0), (25, 0), (25, 25), (0, 25)]),
            Spot::new("A2", [(50, 0), (75, 0), (75, 25), (50, 25)]),
        ],
    }
}

fn options(stride: u32, cap: u32) -> PipelineOptions {
    PipelineOptions {
        sample_stride: stride,
        max_written_frames: cap,
        ..PipelineOptions::default()
    }
}

#[test]
fn samples_every_nth_frame_until_end_of_stream() {
    let h = harness(100, Some(25.0));
    let mut detector = StubBackend::new();
    let renderer = OverlayRenderer::bundled().unwrap();
    let mut pipeline = VideoPipeline::new(&mut detector, &renderer, options(5, 0));
    assert_eq!(pipeline.state(), PipelineState::Idle);

    let report = pipeline
        .run(&h.sources, "lot.mp4", &h.sinks, &h.dir.path().join("out.mp4"), &lot())
        .expect("run");

    assert_eq!(pipeline.state(), PipelineState::Closed);
    assert_eq!(report.stop, StopReason::EndOfStream);
    assert_eq!(report.frames_read, 100);
    assert_eq!(report.frames_written, 20);
    assert_eq!(report.output_fps, 5.0);
    assert_eq!(h.sinks.fps.get(), 5.0);
    assert_eq!(report.codec.fourcc, "mp4v");
    assert_eq!(h.counters.written.get(), 20);
    assert!(h.counters.released.get());
    assert!(h.counters.finished.get());
}

#[test]
fn frame_cap_stops_early_and_releases() {
    let h = harness(1000, Some(30.0));
    let mut detector = StubBackend::new();
    let renderer = OverlayRenderer::bundled().unwrap();
    let report = VideoPipeline::new(&mut detector, &renderer, options(5, 10))
        .run(&h.sources, "lot.mp4", &h.sinks, &h.dir.path().join("out.mp4"), &lot())
        .expect("run");

    assert_eq!(report.stop, StopReason::FrameCap);
    assert_eq!(report.frames_written, 10);
    // frames 0, 5, ..., 45
    assert_eq!(report.frames_read, 46);
    assert_eq!(report.output_fps, 6.0);
    assert!(h.counters.released.get());
    assert!(h.counters.finished.get());
}

#[test]
fn frame_cap_without_sampling() {
    let h = harness(100, Some(25.0));
    let mut detector = StubBackend::new();
    let renderer = OverlayRenderer::bundled().unwrap();
    let report = VideoPipeline::new(&mut detector, &renderer, options(1, 10))
        .run(&h.sources, "lot.mp4", &h.sinks, &h.dir.path().join("out.mp4"), &lot())
        .expect("run");

    assert_eq!(report.stop, StopReason::FrameCap);
    assert_eq!(report.frames_written, 10);
    assert_eq!(report.frames_read, 10);
    assert_eq!(report.output_fps, 25.0);
    assert!(h.counters.released.get());
    assert!(h.counters.finished.get());
}

#[test]
fn missing_frame_rate_falls_back_to_default() {
    let h = harness(10, None);
    let mut detector = StubBackend::new();
    let renderer = OverlayRenderer::bundled().unwrap();
    let report = VideoPipeline::new(&mut detector, &renderer, options(5, 0))
        .run(&h.sources, "lot.mp4", &h.sinks, &h.dir.path().join("out.mp4"), &lot())
        .expect("run");

    assert_eq!(report.input_fps, 25.0);
    assert_eq!(report.output_fps, 5.0);
    assert_eq!(report.frames_written, 2);
}

#[test]
fn slow_source_never_drops_below_one_fps() {
    let h = harness(10, Some(2.0));
    let mut detector = StubBackend::new();
    let renderer = OverlayRenderer::bundled().unwrap();
    let report = VideoPipeline::new(&mut detector, &renderer, options(5, 0))
        .run(&h.sources, "lot.mp4", &h.sinks, &h.dir.path().join("out.mp4"), &lot())
        .expect("run");
    assert_eq!(report.output_fps, 1.0);
}

#[test]
fn occupancy_reflects_last_written_frame() {
    let h = harness(3, Some(25.0));
    // center (25, 25) lies in A1 once scaled to 200x100
    let mut detector = StubBackend::with_detections(vec![Detection::new(
        (10.0, 10.0),
        (40.0, 40.0),
        0.9,
        VehicleClass::Car,
    )]);
    let renderer = OverlayRenderer::bundled().unwrap();
    let report = VideoPipeline::new(&mut detector, &renderer, options(1, 0))
        .run(&h.sources, "lot.mp4", &h.sinks, &h.dir.path().join("out.mp4"), &lot())
        .expect("run");

    assert_eq!(report.spots[0].polygon[2].x, 50);
    assert_eq!(report.occupancy.get("A1"), Some(true));
    assert_eq!(report.occupancy.get("A2"), Some(false));
    assert_eq!(report.summary.to_string(), "1/2");
}

#[test]
fn progress_hook_sees_every_written_frame() {
    let h = harness(12, Some(25.0));
    let mut detector = StubBackend::new();
    let renderer = OverlayRenderer::bundled().unwrap();
    let seen = RefCell::new(Vec::new());
    VideoPipeline::new(&mut detector, &renderer, options(4, 0))
        .on_frame_written(|written, summary| seen.borrow_mut().push((written, summary.free)))
        .run(&h.sources, "lot.mp4", &h.sinks, &h.dir.path().join("out.mp4"), &lot())
        .expect("run");
    assert_eq!(seen.into_inner(), vec![(1, 2), (2, 2), (3, 2)]);
}

#[test]
fn stop_flag_interrupts_cleanly() {
    let h = harness(50, Some(25.0));
    let mut detector = StubBackend::new();
    let renderer = OverlayRenderer::bundled().unwrap();
    let stop = Arc::new(AtomicBool::new(true));
    let mut pipeline =
        VideoPipeline::new(&mut detector, &renderer, options(1, 0)).with_stop_flag(stop);
    let report = pipeline
        .run(&h.sources, "lot.mp4", &h.sinks, &h.dir.path().join("out.mp4"), &lot())
        .expect("run");

    assert_eq!(pipeline.state(), PipelineState::Closed);
    assert_eq!(report.stop, StopReason::Interrupted);
    assert_eq!(report.frames_read, 0);
    assert_eq!(report.frames_written, 0);
    assert_eq!(report.summary.to_string(), "2/2");
    assert!(h.counters.released.get());
    assert!(h.counters.finished.get());
}

#[test]
fn unreadable_source_fails_before_writer() {
    let h = harness(10, Some(25.0));
    let mut detector = StubBackend::new();
    let renderer = OverlayRenderer::bundled().unwrap();
    let mut pipeline = VideoPipeline::new(&mut detector, &renderer, options(5, 0));
    let err = pipeline
        .run(&h.sources, "missing.mp4", &h.sinks, &h.dir.path().join("out.mp4"), &lot())
        .err()
        .expect("should fail");

    assert!(matches!(err, PipelineError::SourceUnreadable { .. }));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert!(h.counters.attempts.borrow().is_empty());
}

#[test]
fn no_usable_codec_releases_source() {
    let mut h = harness(10, Some(25.0));
    h.sinks.accepts = &[];
    let mut detector = StubBackend::new();
    let renderer = OverlayRenderer::bundled().unwrap();
    let mut pipeline = VideoPipeline::new(&mut detector, &renderer, options(5, 0));
    let err = pipeline
        .run(&h.sources, "lot.mp4", &h.sinks, &h.dir.path().join("out.mp4"), &lot())
        .err()
        .expect("should fail");

    assert!(matches!(err, PipelineError::WriterUnavailable { .. }));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert_eq!(*h.counters.attempts.borrow(), vec!["mp4v", "avc1", "MJPG"]);
    assert!(h.counters.released.get());
    assert_eq!(h.counters.read.get(), 0);
}

#[test]
fn mjpeg_fallback_is_used_when_mp4_codecs_are_missing() {
    let mut h = harness(5, Some(25.0));
    h.sinks.accepts = &["mjpeg"];
    let mut detector = StubBackend::new();
    let renderer = OverlayRenderer::bundled().unwrap();
    let report = VideoPipeline::new(&mut detector, &renderer, options(1, 0))
        .run(&h.sources, "lot.mp4", &h.sinks, &h.dir.path().join("out.mp4"), &lot())
        .expect("run");
    assert_eq!(report.codec.fourcc, "MJPG");
    assert_eq!(report.frames_written, 5);
}

#[test]
fn detector_failure_closes_everything() {
    struct Flaky {
        calls: u32,
    }
    impl VehicleDetector for Flaky {
        fn name(&self) -> &'static str {
            "flaky"
        }
        fn detect(&mut self, _: &RgbImage, _: f32) -> anyhow::Result<Vec<Detection>> {
            self.calls += 1;
            if self.calls > 2 {
                anyhow::bail!("inference crashed");
            }
            Ok(Vec::new())
        }
    }

    let h = harness(20, Some(25.0));
    let mut detector = Flaky { calls: 0 };
    let renderer = OverlayRenderer::bundled().unwrap();
    let mut pipeline = VideoPipeline::new(&mut detector, &renderer, options(1, 0));
    let err = pipeline
        .run(&h.sources, "lot.mp4", &h.sinks, &h.dir.path().join("out.mp4"), &lot())
        .err()
        .expect("should fail");

    assert!(matches!(err, PipelineError::Detection(_)));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert_eq!(h.counters.written.get(), 2);
    assert!(h.counters.released.get());
    assert!(h.counters.finished.get());
}

#[test]
fn write_failure_mid_stream_is_reported() {
    let mut h = harness(20, Some(25.0));
    h.sinks.fail_after = Some(3);
    let mut detector = StubBackend::new();
    let renderer = OverlayRenderer::bundled().unwrap();
    let mut pipeline = VideoPipeline::new(&mut detector, &renderer, options(1, 0));
    let err = pipeline
        .run(&h.sources, "lot.mp4", &h.sinks, &h.dir.path().join("out.mp4"), &lot())
        .err()
        .expect("should fail");

    assert!(matches!(err, PipelineError::Write(_)));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert!(h.counters.released.get());
    assert!(h.counters.finished.get());
}

#[test]
fn pipeline_can_run_again_after_failure() {
    let h = harness(10, Some(25.0));
    let mut detector = StubBackend::new();
    let renderer = OverlayRenderer::bundled().unwrap();
    let mut pipeline = VideoPipeline::new(&mut detector, &renderer, options(5, 0));
    let out = h.dir.path().join("out.mp4");

    assert!(pipeline.run(&h.sources, "missing.mp4", &h.sinks, &out, &lot()).is_err());
    assert_eq!(pipeline.state(), PipelineState::Failed);
    let report = pipeline
        .run(&h.sources, "lot.mp4", &h.sinks, &out, &lot())
        .expect("run");
    assert_eq!(pipeline.state(), PipelineState::Closed);
    assert_eq!(report.frames_written, 2);
    assert_eq!(h.counters.opened.get(), 1);
}

#[test]
fn synthetic_clip_runs_through_file_opener() {
    let h = harness(0, None);
    let mut detector = StubBackend::new();
    let renderer = OverlayRenderer::bundled().unwrap();
    let report = VideoPipeline::new(&mut detector, &renderer, options(3, 0))
        .run(
            &VideoFileOpener,
            "stub://lot?frames=9&fps=12&width=200&height=100",
            &h.sinks,
            &h.dir.path().join("clips/out.avi"),
            &lot(),
        )
        .expect("run");

    assert_eq!(report.frames_read, 9);
    assert_eq!(report.frames_written, 3);
    assert_eq!(report.output_fps, 4.0);
    assert_eq!(report.codec.fourcc, "MJPG");
    assert!(h.dir.path().join("clips").is_dir());
}
