//! occupancy_video - annotate a video with spot occupancy
//!
//! Samples every Nth frame, detects vehicles, and writes the annotated
//! frames to a new video. Ctrl-C stops after the current frame and still
//! finalizes the output.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Parser;

use parking_occupancy::{
    load_spots, ui, BackendRegistry, OverlayRenderer, PipelineOptions, Settings, VideoFileOpener,
    VideoFileWriter, VideoPipeline,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input video path, or stub://lot?frames=N for a synthetic clip.
    #[arg(long, value_name = "PATH")]
    video: String,
    /// Annotated output video.
    #[arg(long, value_name = "PATH", default_value = "out.mp4")]
    out: PathBuf,
    /// Process every Nth frame (defaults to settings).
    #[arg(long)]
    every: Option<u32>,
    /// Stop after this many written frames, 0 for no cap (defaults to settings).
    #[arg(long)]
    max_frames: Option<u32>,
    /// Do not draw vehicle boxes.
    #[arg(long)]
    no_dets: bool,
    /// Spot configuration; overrides settings.
    #[arg(long, value_name = "PATH")]
    spots: Option<PathBuf>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !std::io::stdout().is_terminal());

    let settings = Settings::load()?;
    let spots_path = args.spots.unwrap_or_else(|| settings.spots_path.clone());
    let options = PipelineOptions {
        sample_stride: args.every.unwrap_or(settings.video.every).max(1),
        max_written_frames: args.max_frames.unwrap_or(settings.video.max_frames),
        conf_threshold: settings.detector.conf_threshold,
        draw_detections: !args.no_dets,
    };

    let spots_cfg = {
        let _stage = ui.stage("Load spots");
        load_spots(&spots_path)?
    };
    let registry = {
        let _stage = ui.stage("Load detector");
        BackendRegistry::from_settings(&settings.detector)?
    };
    log::info!("detector backends: {:?}", registry.list());
    let renderer = OverlayRenderer::from_font_path(settings.font_path.as_deref())?;

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        handler_stop.store(true, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {e}"))?;

    let backend = registry.default_backend()?;
    let mut detector = backend
        .lock()
        .map_err(|_| anyhow!("detector lock poisoned"))?;
    detector.warm_up()?;
    let progress = ui.frames(options.max_written_frames);
    let report = {
        let _stage = ui.stage("Process video");
        let mut pipeline = VideoPipeline::new(&mut *detector, &renderer, options)
            .with_stop_flag(stop)
            .on_frame_written(|written, summary| progress.update(written, summary));
        pipeline.run(
            &VideoFileOpener,
            &args.video,
            &VideoFileWriter,
            &args.out,
            &spots_cfg,
        )?
    };
    drop(progress);

    log::info!(
        "{} frames read, {} written with {} ({:?})",
        report.frames_read,
        report.frames_written,
        report.codec,
        report.stop
    );
    println!(
        "Saved: {} | last FREE {}",
        report.output.display(),
        report.summary
    );
    Ok(())
}
