use std::fmt;

/// Vehicle classes the occupancy core accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VehicleClass {
    Car,
    Motorcycle,
    Bus,
    Truck,
}

impl VehicleClass {
    /// Canonicalise a detector label. `motorbike` maps to `Motorcycle`;
    /// anything that is not a vehicle yields `None` and must be dropped.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "car" => Some(Self::Car),
            "motorcycle" | "motorbike" => Some(Self::Motorcycle),
            "bus" => Some(Self::Bus),
            "truck" => Some(Self::Truck),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Car => "car",
            Self::Motorcycle => "motorcycle",
            Self::Bus => "bus",
            Self::Truck => "truck",
        }
    }
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axis-aligned vehicle box in frame pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class: VehicleClass,
}

impl Detection {
    /// Corners are reordered so that `x1 <= x2` and `y1 <= y2`.
    pub fn new(
        (xa, ya): (f32, f32),
        (xb, yb): (f32, f32),
        confidence: f32,
        class: VehicleClass,
    ) -> Self {
        Self {
            x1: xa.min(xb),
            y1: ya.min(yb),
            x2: xa.max(xb),
            y2: ya.max(yb),
            confidence: confidence.clamp(0.0, 1.0),
            class,
        }
    }

    pub fn center(&self) -> VehicleCenter {
        VehicleCenter::new((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn iou(&self, other: &Detection) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Overlay caption, e.g. `car 0.87`.
    pub fn caption(&self) -> String {
        format!("{} {:.2}", self.class, self.confidence)
    }
}

/// Midpoint of a detection box. Only ever derived from a [`Detection`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VehicleCenter {
    pub x: f32,
    pub y: f32,
}

impl VehicleCenter {
    pub(crate) const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// One center per detection, in input order.
pub fn centers_from_detections(detections: &[Detection]) -> Vec<VehicleCenter> {
    detections.iter().map(Detection::center).collect()
}
