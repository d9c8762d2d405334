//! Parking spot occupancy
//!
//! Decides, for a set of hand-drawn parking spot polygons, which spots hold
//! a vehicle in a still image or a video, and renders an annotated copy.
//!
//! # Flow
//!
//! ```text
//! image / video ─▶ ingest ─▶ detect ─▶ occupancy ─▶ overlay ─▶ output
//!                              ▲            ▲
//!                          backends       spots
//! ```
//!
//! A spot is occupied when the center of at least one vehicle box falls
//! inside its polygon (even-odd ray casting).
//!
//! # Module Structure
//!
//! - `spots`: spot geometry, loading, resolution scaling, point-in-polygon
//! - `occupancy`: per-spot occupied/free decisions and the free count
//! - `detect`: vehicle detector trait, backends, registry
//! - `frame`: owned RGB frames handed between stages
//! - `ingest`: still images, video files, synthetic clips
//! - `overlay`: spot outlines, vehicle boxes, free-count banner
//! - `output`: video writer with codec fallback
//! - `pipeline`: image mode and the video state machine
//! - `config`: settings from file and environment
//! - `ui`: stage and progress reporting for the command-line tools

pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod occupancy;
pub mod output;
pub mod overlay;
pub mod pipeline;
pub mod spots;
pub mod ui;

pub use config::{DetectorSettings, Settings, VideoSettings};
pub use detect::{BackendRegistry, Detection, StubBackend, VehicleCenter, VehicleClass, VehicleDetector};
pub use error::{PipelineError, Result};
pub use frame::Frame;
pub use ingest::{load_image, FrameSource, SourceInfo, SourceOpener, VideoFileOpener, VideoSource};
pub use occupancy::{spot_occupied, OccupancyMap, OccupancySummary};
pub use output::{open_writer, CodecChoice, FrameSink, SinkOpener, VideoFileWriter};
pub use overlay::OverlayRenderer;
pub use pipeline::{
    analyze_frame, analyze_image, FrameAnalysis, PipelineOptions, PipelineState, StopReason,
    VideoPipeline, VideoReport,
};
pub use spots::{load_spots, point_in_polygon, scale_spots, Point, Spot, SpotsConfig};
