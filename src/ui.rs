use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::occupancy::OccupancySummary;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

/// Stage and progress reporting on stderr for the command-line tools.
#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool, disable_pretty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty, disable_pretty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Written-frame counter for a video run. `cap` of 0 means unbounded.
    pub fn frames(&self, cap: u32) -> FrameProgress {
        if !self.use_pretty() {
            return FrameProgress { bar: None };
        }
        let bar = if cap == 0 {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::new(u64::from(cap))
        };
        bar.set_draw_target(ProgressDrawTarget::stderr());
        let template = if cap == 0 {
            "{spinner} {pos} frames written {msg}"
        } else {
            "{bar:30} {pos}/{len} frames {msg}"
        };
        let style = ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        FrameProgress { bar: Some(bar) }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

pub struct FrameProgress {
    bar: Option<ProgressBar>,
}

impl FrameProgress {
    pub fn update(&self, written: u64, summary: &OccupancySummary) {
        if let Some(bar) = &self.bar {
            bar.set_position(written);
            bar.set_message(format!("FREE {summary}"));
        }
    }
}

impl Drop for FrameProgress {
    fn drop(&mut self) {
        if let Some(bar) = &self.bar {
            bar.finish();
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
