use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::analyze_frame;
use crate::detect::VehicleDetector;
use crate::error::Result;
use crate::ingest::{FrameSource, SourceOpener};
use crate::occupancy::{OccupancyMap, OccupancySummary};
use crate::output::{open_writer, CodecChoice, FrameSink, SinkOpener};
use crate::overlay::OverlayRenderer;
use crate::spots::{scale_spots, Spot, SpotsConfig};

/// Used when the source reports no usable frame rate.
pub const DEFAULT_INPUT_FPS: f64 = 25.0;

/// `max(1, input_fps / max(1, stride))`.
pub fn output_fps(input_fps: f64, sample_stride: u32) -> f64 {
    (input_fps / sample_stride.max(1) as f64).max(1.0)
}

#[derive(Clone, Debug)]
pub struct PipelineOptions {
    /// Process every Nth frame; 0 is treated as 1.
    pub sample_stride: u32,
    /// Stop once this many frames are written; 0 means no cap.
    pub max_written_frames: u32,
    pub conf_threshold: f32,
    pub draw_detections: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            sample_stride: 1,
            max_written_frames: 0,
            conf_threshold: 0.25,
            draw_detections: true,
        }
    }
}

/// Lifecycle of one video run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Opened,
    Streaming,
    Closed,
    Failed,
}

/// Why streaming stopped on a successful run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    FrameCap,
    Interrupted,
}

#[derive(Clone, Debug)]
pub struct VideoReport {
    pub output: PathBuf,
    pub codec: CodecChoice,
    pub width: u32,
    pub height: u32,
    pub input_fps: f64,
    pub output_fps: f64,
    pub frames_read: u64,
    pub frames_written: u64,
    pub stop: StopReason,
    /// Scaled spots the run was evaluated against.
    pub spots: Vec<Spot>,
    /// Occupancy of the last written frame, all free if none was written.
    pub occupancy: OccupancyMap,
    pub summary: OccupancySummary,
}

/// Source and sink of one run. Both are released when this is closed or
/// dropped, whichever comes first.
struct Resources {
    source: Option<Box<dyn FrameSource>>,
    sink: Option<Box<dyn FrameSink>>,
}

impl Resources {
    fn close(&mut self) -> Result<()> {
        if let Some(mut source) = self.source.take() {
            source.release();
        }
        match self.sink.take() {
            Some(mut sink) => sink.finish(),
            None => Ok(()),
        }
    }
}

impl Drop for Resources {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("failed to close video output: {}", e);
        }
    }
}

struct Progress {
    frames_read: u64,
    frames_written: u64,
    latest: OccupancyMap,
}

/// Video mode: sample frames, analyse them, write the annotated stream.
///
/// One pipeline drives one video at a time and owns no detector; the caller
/// lends one per run.
pub struct VideoPipeline<'a> {
    detector: &'a mut dyn VehicleDetector,
    renderer: &'a OverlayRenderer,
    options: PipelineOptions,
    stop_flag: Option<Arc<AtomicBool>>,
    on_written: Option<Box<dyn FnMut(u64, &OccupancySummary) + 'a>>,
    state: PipelineState,
}

impl<'a> VideoPipeline<'a> {
    pub fn new(
        detector: &'a mut dyn VehicleDetector,
        renderer: &'a OverlayRenderer,
        options: PipelineOptions,
    ) -> Self {
        Self {
            detector,
            renderer,
            options,
            stop_flag: None,
            on_written: None,
            state: PipelineState::Idle,
        }
    }

    /// Stop cleanly before the next read once `flag` is set.
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = Some(flag);
        self
    }

    /// Called after each written frame with the running write count.
    pub fn on_frame_written(mut self, hook: impl FnMut(u64, &OccupancySummary) + 'a) -> Self {
        self.on_written = Some(Box::new(hook));
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn run(
        &mut self,
        sources: &dyn SourceOpener,
        input: &str,
        sinks: &dyn SinkOpener,
        output: &Path,
        spots_cfg: &SpotsConfig,
    ) -> Result<VideoReport> {
        self.state = PipelineState::Idle;
        let result = self.run_inner(sources, input, sinks, output, spots_cfg);
        self.state = match &result {
            Ok(_) => PipelineState::Closed,
            Err(e) => {
                log::error!("video run on {} failed: {}", input, e);
                PipelineState::Failed
            }
        };
        result
    }

    fn run_inner(
        &mut self,
        sources: &dyn SourceOpener,
        input: &str,
        sinks: &dyn SinkOpener,
        output: &Path,
        spots_cfg: &SpotsConfig,
    ) -> Result<VideoReport> {
        let source = sources.open(input)?;
        self.state = PipelineState::Opened;

        let info = source.info();
        let mut resources = Resources {
            source: Some(source),
            sink: None,
        };
        let input_fps = info
            .fps
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .unwrap_or(DEFAULT_INPUT_FPS);
        let stride = self.options.sample_stride.max(1);
        let out_fps = output_fps(input_fps, stride);
        let size = (info.width, info.height);
        log::info!(
            "video {}: {}x{} at {:.2} fps, every {} frame(s) -> {:.2} fps",
            input,
            size.0,
            size.1,
            input_fps,
            stride,
            out_fps
        );

        let spots = scale_spots(spots_cfg, size);
        let (sink, codec) = open_writer(sinks, output, out_fps, size)?;
        resources.sink = Some(sink);
        self.state = PipelineState::Streaming;

        let mut progress = Progress {
            frames_read: 0,
            frames_written: 0,
            latest: OccupancyMap::all_free(&spots),
        };
        let stop = self.stream(&mut resources, &spots, stride, &mut progress)?;
        resources.close()?;

        let summary = progress.latest.summary(&spots);
        log::info!(
            "video {}: stopped ({:?}) after {} read / {} written, last free {}",
            input,
            stop,
            progress.frames_read,
            progress.frames_written,
            summary
        );

        Ok(VideoReport {
            output: output.to_path_buf(),
            codec,
            width: size.0,
            height: size.1,
            input_fps,
            output_fps: out_fps,
            frames_read: progress.frames_read,
            frames_written: progress.frames_written,
            stop,
            spots,
            occupancy: progress.latest,
            summary,
        })
    }

    fn stream(
        &mut self,
        resources: &mut Resources,
        spots: &[Spot],
        stride: u32,
        progress: &mut Progress,
    ) -> Result<StopReason> {
        let (Some(source), Some(sink)) = (resources.source.as_mut(), resources.sink.as_mut())
        else {
            return Ok(StopReason::EndOfStream);
        };
        let cap = u64::from(self.options.max_written_frames);
        let mut index: u64 = 0;

        loop {
            if self
                .stop_flag
                .as_ref()
                .is_some_and(|flag| flag.load(Ordering::SeqCst))
            {
                return Ok(StopReason::Interrupted);
            }

            let Some(frame) = source.read_frame()? else {
                return Ok(StopReason::EndOfStream);
            };
            progress.frames_read += 1;

            let sampled = index % u64::from(stride) == 0;
            index += 1;
            if !sampled {
                continue;
            }

            let analysis = analyze_frame(
                &mut *self.detector,
                self.renderer,
                frame.image(),
                spots,
                self.options.conf_threshold,
                self.options.draw_detections,
            )?;
            sink.write(&analysis.annotated)?;
            progress.frames_written += 1;
            log::debug!(
                "frame {}: {} detections, free {}",
                frame.index,
                analysis.detections.len(),
                analysis.summary
            );
            if let Some(hook) = self.on_written.as_mut() {
                hook(progress.frames_written, &analysis.summary);
            }
            progress.latest = analysis.occupancy;

            if cap != 0 && progress.frames_written >= cap {
                return Ok(StopReason::FrameCap);
            }
        }
    }
}
