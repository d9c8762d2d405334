use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_SPOTS_PATH: &str = "data/spots.json";
const DEFAULT_BACKEND: &str = "tract";
const DEFAULT_MODEL_PATH: &str = "data/models/yolov8n.onnx";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CONF_THRESHOLD: f32 = 0.25;
const DEFAULT_NMS_THRESHOLD: f32 = 0.4;
const DEFAULT_VIDEO_EVERY: u32 = 5;
const DEFAULT_VIDEO_MAX_FRAMES: u32 = 180;

#[derive(Debug, Deserialize, Default)]
struct SettingsFile {
    spots_path: Option<PathBuf>,
    detector: Option<DetectorConfigFile>,
    video: Option<VideoConfigFile>,
    overlay: Option<OverlayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    class_names_path: Option<PathBuf>,
    input_size: Option<u32>,
    conf_threshold: Option<f32>,
    nms_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct VideoConfigFile {
    every: Option<u32>,
    max_frames: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    font_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub spots_path: PathBuf,
    pub detector: DetectorSettings,
    pub video: VideoSettings,
    pub font_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: PathBuf,
    pub class_names_path: Option<PathBuf>,
    pub input_size: u32,
    pub conf_threshold: f32,
    pub nms_threshold: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            class_names_path: None,
            input_size: DEFAULT_INPUT_SIZE,
            conf_threshold: DEFAULT_CONF_THRESHOLD,
            nms_threshold: DEFAULT_NMS_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VideoSettings {
    /// Process every Nth frame (>= 1).
    pub every: u32,
    /// Stop after this many written frames; 0 means no cap.
    pub max_frames: u32,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            every: DEFAULT_VIDEO_EVERY,
            max_frames: DEFAULT_VIDEO_MAX_FRAMES,
        }
    }
}

impl Settings {
    /// Defaults, then the file named by `PARKING_CONFIG`, then environment.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PARKING_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SettingsFile) -> Self {
        let detector_file = file.detector.unwrap_or_default();
        let defaults = DetectorSettings::default();
        let detector = DetectorSettings {
            backend: detector_file.backend.unwrap_or(defaults.backend),
            model_path: detector_file.model_path.unwrap_or(defaults.model_path),
            class_names_path: detector_file.class_names_path,
            input_size: detector_file.input_size.unwrap_or(defaults.input_size),
            conf_threshold: detector_file
                .conf_threshold
                .unwrap_or(defaults.conf_threshold),
            nms_threshold: detector_file.nms_threshold.unwrap_or(defaults.nms_threshold),
        };
        let video = VideoSettings {
            every: file
                .video
                .as_ref()
                .and_then(|video| video.every)
                .unwrap_or(DEFAULT_VIDEO_EVERY),
            max_frames: file
                .video
                .as_ref()
                .and_then(|video| video.max_frames)
                .unwrap_or(DEFAULT_VIDEO_MAX_FRAMES),
        };
        Self {
            spots_path: file
                .spots_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SPOTS_PATH)),
            detector,
            video,
            font_path: file.overlay.and_then(|overlay| overlay.font_path),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = env_nonempty("PARKING_SPOTS_PATH") {
            self.spots_path = PathBuf::from(path);
        }
        if let Some(backend) = env_nonempty("DETECTOR_BACKEND") {
            self.detector.backend = backend;
        }
        if let Some(path) = env_nonempty("MODEL_PATH") {
            self.detector.model_path = PathBuf::from(path);
        }
        if let Some(path) = env_nonempty("COCO_NAMES") {
            self.detector.class_names_path = Some(PathBuf::from(path));
        }
        if let Some(size) = env_nonempty("DETECTOR_INPUT_SIZE") {
            self.detector.input_size = size
                .parse()
                .map_err(|_| anyhow!("DETECTOR_INPUT_SIZE must be a positive integer"))?;
        }
        if let Some(conf) = env_nonempty("CONF_THRES") {
            self.detector.conf_threshold = conf
                .parse()
                .map_err(|_| anyhow!("CONF_THRES must be a number in [0, 1]"))?;
        }
        if let Some(nms) = env_nonempty("NMS_THRES") {
            self.detector.nms_threshold = nms
                .parse()
                .map_err(|_| anyhow!("NMS_THRES must be a number in [0, 1]"))?;
        }
        if let Some(every) = env_nonempty("VIDEO_EVERY") {
            let every: i64 = every
                .parse()
                .map_err(|_| anyhow!("VIDEO_EVERY must be an integer"))?;
            self.video.every = every.clamp(1, u32::MAX as i64) as u32;
        }
        if let Some(max_frames) = env_nonempty("VIDEO_MAX_FRAMES") {
            let max_frames: i64 = max_frames
                .parse()
                .map_err(|_| anyhow!("VIDEO_MAX_FRAMES must be an integer"))?;
            self.video.max_frames = max_frames.clamp(0, u32::MAX as i64) as u32;
        }
        if let Some(path) = env_nonempty("PARKING_FONT_PATH") {
            self.font_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.detector.backend = self.detector.backend.trim().to_lowercase();
        self.video.every = self.video.every.max(1);

        if !(0.0..=1.0).contains(&self.detector.conf_threshold) {
            return Err(anyhow!("confidence threshold must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.detector.nms_threshold) {
            return Err(anyhow!("nms threshold must be within [0, 1]"));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("detector input size must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<SettingsFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
