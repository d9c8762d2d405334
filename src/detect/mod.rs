//! Vehicle detection boundary.
//!
//! Backends turn a raster into vehicle boxes. Everything downstream only
//! sees [`Detection`] values and the [`VehicleCenter`] points derived from
//! them; confidence thresholding, label filtering and NMS stay inside the
//! backend.

mod backend;
mod backends;
mod registry;
mod result;

pub use backend::VehicleDetector;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use registry::BackendRegistry;
pub use result::{centers_from_detections, Detection, VehicleCenter, VehicleClass};
