//! extract_frame - save one video frame as an image
//!
//! Useful for drawing spot polygons against the camera's own resolution.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use parking_occupancy::{FrameSource, VideoSource};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input video path.
    #[arg(long, value_name = "PATH")]
    video: String,
    /// Zero-based frame index.
    #[arg(long, default_value_t = 0)]
    frame: u64,
    /// Output image.
    #[arg(long, value_name = "PATH", default_value = "frame.png")]
    out: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut source = VideoSource::open(&args.video)?;
    let info = source.info();
    log::info!("{}: {}x{}", args.video, info.width, info.height);

    let mut seen = 0u64;
    let frame = loop {
        match source.read_frame()? {
            Some(frame) if seen == args.frame => break frame,
            Some(_) => seen += 1,
            None => {
                source.release();
                return Err(anyhow!(
                    "{} has only {} frames, cannot extract frame {}",
                    args.video,
                    seen,
                    args.frame
                ));
            }
        }
    };
    source.release();

    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    frame
        .image()
        .save(&args.out)
        .with_context(|| format!("save {}", args.out.display()))?;
    println!(
        "Saved: {} ({}x{}, frame {})",
        args.out.display(),
        frame.width(),
        frame.height(),
        args.frame
    );
    Ok(())
}
