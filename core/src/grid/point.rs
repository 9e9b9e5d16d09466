use crate::geometry::Vector3;
use serde::{Deserialize, Serialize};

/// Channel topology of a grid point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridPointKind {
    #[default]
    Unknown,
    Voxel,
    VoxelDrift,
    XStrip,
    YStrip,
    XYAnger,
    XYZAnger,
    XYZIndependentAnger,
    GuardRing,
}

/// A single discretized (possibly sub-) hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub x_grid: i32,
    pub y_grid: i32,
    pub z_grid: i32,
    pub kind: GridPointKind,
    /// Detector-local position. Voxel kinds only carry a meaningful depth.
    pub position: Vector3,
    /// keV
    pub energy: f64,
    /// s
    pub time: f64,
    pub hits: u32,
    pub weight: f64,
    pub flags: String,
    pub is_above_trigger_threshold: bool,
    pub is_read_out: bool,
}

impl GridPoint {
    pub fn new(x_grid: i32, y_grid: i32, z_grid: i32, kind: GridPointKind) -> Self {
        Self {
            x_grid,
            y_grid,
            z_grid,
            kind,
            position: Vector3::default(),
            energy: 0.0,
            time: 0.0,
            hits: 1,
            weight: 1.0,
            flags: String::new(),
            is_above_trigger_threshold: false,
            is_read_out: false,
        }
    }

    pub fn with_signal(mut self, position: Vector3, energy: f64, time: f64) -> Self {
        self.position = position;
        self.energy = energy;
        self.time = time;
        self
    }

    /// True when both points occupy the same readout channel.
    pub fn same_channel(&self, other: &GridPoint) -> bool {
        if self.kind != other.kind {
            return false;
        }
        match self.kind {
            GridPointKind::Voxel | GridPointKind::VoxelDrift | GridPointKind::XYZIndependentAnger => {
                self.x_grid == other.x_grid
                    && self.y_grid == other.y_grid
                    && self.z_grid == other.z_grid
            }
            GridPointKind::XStrip => self.x_grid == other.x_grid,
            GridPointKind::YStrip => self.y_grid == other.y_grid,
            GridPointKind::GuardRing | GridPointKind::XYAnger | GridPointKind::XYZAnger => true,
            GridPointKind::Unknown => false,
        }
    }

    /// Chebyshev distance in the x/y channel plane.
    pub fn channel_distance(&self, other: &GridPoint) -> i32 {
        (self.x_grid - other.x_grid)
            .abs()
            .max((self.y_grid - other.y_grid).abs())
    }

    /// Folds `other` into this point. Returns false, leaving `self` unchanged,
    /// when the two points are not on the same channel.
    pub fn merge(&mut self, other: &GridPoint) -> bool {
        if !self.same_channel(other) {
            return false;
        }

        let (mine, theirs) = (self.energy, other.energy);
        let total = mine + theirs;
        let weighted = |a: f64, b: f64| {
            if total > 0.0 {
                (mine * a + theirs * b) / total
            } else {
                0.5 * (a + b)
            }
        };

        match self.kind {
            GridPointKind::Voxel | GridPointKind::VoxelDrift => {
                let z = weighted(self.position.z, other.position.z);
                self.position = Vector3::new(0.0, 0.0, z);
            }
            GridPointKind::XStrip | GridPointKind::YStrip => {
                self.position.z = weighted(self.position.z, other.position.z);
            }
            GridPointKind::XYAnger | GridPointKind::XYZAnger | GridPointKind::XYZIndependentAnger => {
                let mut merged = Vector3::new(
                    weighted(self.position.x, other.position.x),
                    weighted(self.position.y, other.position.y),
                    weighted(self.position.z, other.position.z),
                );
                if self.kind == GridPointKind::XYAnger {
                    merged.z = 0.0;
                }
                self.position = merged;
            }
            // the guard ring is a single channel with a fixed position
            GridPointKind::GuardRing | GridPointKind::Unknown => {}
        }

        self.energy = total;
        self.time = self.time.min(other.time);
        let hits = self.hits + other.hits;
        self.weight = (self.weight * self.hits as f64 + other.weight * other.hits as f64) / hits as f64;
        self.hits = hits;
        self.flags.push_str(&other.flags);
        self.is_above_trigger_threshold |= other.is_above_trigger_threshold;
        self.is_read_out |= other.is_read_out;
        true
    }
}
