//! Occupancy decision.
//!
//! A spot is occupied when at least one vehicle center falls inside its
//! polygon. There is no overlap ratio and no pairing of detections to spots:
//! a vehicle whose center lands just outside the spot it covers counts as
//! not parked there.

use std::collections::BTreeMap;
use std::fmt;

use crate::detect::VehicleCenter;
use crate::spots::{point_in_polygon, Spot};

pub fn spot_occupied(spot: &Spot, centers: &[VehicleCenter]) -> bool {
    spot.is_valid()
        && centers
            .iter()
            .any(|c| point_in_polygon((c.x as f64, c.y as f64), &spot.polygon))
}

/// Per-frame occupancy keyed by spot id.
///
/// Built fresh for every frame; nothing is carried over. When two spots
/// share an id the later one in the list decides the entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OccupancyMap {
    states: BTreeMap<String, bool>,
}

impl OccupancyMap {
    pub fn compute(spots: &[Spot], centers: &[VehicleCenter]) -> Self {
        Self {
            states: spots
                .iter()
                .map(|spot| (spot.id.clone(), spot_occupied(spot, centers)))
                .collect(),
        }
    }

    /// Every spot free. Used before any frame has been analysed.
    pub fn all_free(spots: &[Spot]) -> Self {
        Self {
            states: spots.iter().map(|spot| (spot.id.clone(), false)).collect(),
        }
    }

    /// `None` when the id was not part of the computation.
    pub fn get(&self, spot_id: &str) -> Option<bool> {
        self.states.get(spot_id).copied()
    }

    /// Absent entries read as free.
    pub fn is_occupied(&self, spot_id: &str) -> bool {
        self.get(spot_id).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.states.iter().map(|(id, occ)| (id.as_str(), *occ))
    }

    /// Free/total over `spots`, the list the map is being reported against.
    pub fn summary(&self, spots: &[Spot]) -> OccupancySummary {
        OccupancySummary {
            free: spots.iter().filter(|s| !self.is_occupied(&s.id)).count(),
            total: spots.len(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OccupancySummary {
    pub free: usize,
    pub total: usize,
}

impl fmt::Display for OccupancySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.free, self.total)
    }
}
