//! occupancy_image - annotate one still image with spot occupancy
//!
//! Loads the spot configuration and detector from settings, scales the spots
//! to the image, and saves an annotated copy.

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use parking_occupancy::{
    analyze_image, load_image, load_spots, ui, BackendRegistry, OverlayRenderer, Settings,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input image (JPEG or PNG).
    #[arg(long, value_name = "PATH")]
    image: PathBuf,
    /// Annotated output image.
    #[arg(long, value_name = "PATH", default_value = "out.png")]
    out: PathBuf,
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

    let spots_cfg = {
        let _stage = ui.stage("Load spots");
        load_spots(&spots_path)?
    };
    let registry = {
        let _stage = ui.stage("Load detector");
        BackendRegistry::from_settings(&settings.detector)?
    };
    let renderer = OverlayRenderer::from_font_path(settings.font_path.as_deref())?;
    let frame = load_image(&args.image)?;

    let analysis = {
        let _stage = ui.stage("Detect vehicles");
        let backend = registry.default_backend()?;
        let mut detector = backend
            .lock()
            .map_err(|_| anyhow!("detector lock poisoned"))?;
        detector.warm_up()?;
        analyze_image(
            &mut *detector,
            &renderer,
            &spots_cfg,
            &frame,
            settings.detector.conf_threshold,
        )?
    };

    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    analysis
        .annotated
        .save(&args.out)
        .with_context(|| format!("save {}", args.out.display()))?;

    println!("Saved: {} | FREE {}", args.out.display(), analysis.summary);
    Ok(())
}
