use crate::detector::response::{Response, Signal};
use crate::detector::strip::{Structure, GUARD_RING_MIN_OFFSET};
use crate::geometry::Vector3;
use crate::grid::{GridPoint, GridPointKind};
use crate::prelude::{EngineError, EngineResult};
use log::{debug, error};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct VoxelGeometry {
    width: Vector3,
    voxel: Vector3,
    blocks: [i32; 3],
}

/// Calorimeter made of blocks, each segmented into voxels along all three
/// axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voxel3D {
    pub structure: Structure,
    pub voxels_x: u32,
    pub voxels_y: u32,
    pub voxels_z: u32,
    #[serde(default)]
    pub offset_x: f64,
    #[serde(default)]
    pub offset_y: f64,
    #[serde(default)]
    pub offset_z: f64,
    #[serde(skip)]
    derived: VoxelGeometry,
}

impl Voxel3D {
    pub fn new(structure: Structure, voxels: [u32; 3]) -> Self {
        Self {
            structure,
            voxels_x: voxels[0],
            voxels_y: voxels[1],
            voxels_z: voxels[2],
            offset_x: 0.0,
            offset_y: 0.0,
            offset_z: 0.0,
            derived: VoxelGeometry::default(),
        }
    }

    pub fn with_guard_ring(mut self, offsets: Vector3) -> Self {
        self.offset_x = offsets.x;
        self.offset_y = offsets.y;
        self.offset_z = offsets.z;
        self
    }

    fn offsets(&self) -> Vector3 {
        Vector3::new(self.offset_x, self.offset_y, self.offset_z)
    }

    fn voxels(&self) -> [i32; 3] {
        [self.voxels_x as i32, self.voxels_y as i32, self.voxels_z as i32]
    }

    pub fn validate(&mut self, detector: &str) -> EngineResult<()> {
        let invalid = |msg: &str| Err(EngineError::InvalidConfig(format!("detector {}: {}", detector, msg)));
        let s = &self.structure;
        if s.size.x <= 0.0 || s.size.y <= 0.0 || s.size.z <= 0.0 {
            return invalid("the sensitive volume needs a positive size");
        }
        if self.voxels_x == 0 || self.voxels_y == 0 || self.voxels_z == 0 {
            return invalid("you need at least one voxel along every axis");
        }
        let off = self.offsets();
        if off.x < 0.0 || off.y < 0.0 || off.z < 0.0 {
            return invalid("all offsets have to be positive");
        }
        let width = s.size * 2.0;
        if 2.0 * off.x >= width.x || 2.0 * off.y >= width.y || 2.0 * off.z >= width.z {
            return invalid("the guard ring covers the whole block");
        }
        let dimension = s.dimension();
        let blocks = [
            Structure::count_along(dimension.x, s.offset.x, s.size.x, s.pitch.x),
            Structure::count_along(dimension.y, s.offset.y, s.size.y, s.pitch.y),
            Structure::count_along(dimension.z, s.offset.z, s.size.z, s.pitch.z),
        ];
        if blocks.iter().any(|b| *b <= 0) {
            return invalid("you need at least one block along every axis");
        }
        self.derived = VoxelGeometry {
            width,
            voxel: Vector3::new(
                (width.x - 2.0 * off.x) / self.voxels_x as f64,
                (width.y - 2.0 * off.y) / self.voxels_y as f64,
                (width.z - 2.0 * off.z) / self.voxels_z as f64,
            ),
            blocks,
        };
        Ok(())
    }

    pub fn has_guard_ring(&self) -> bool {
        let off = self.offsets();
        off.x > GUARD_RING_MIN_OFFSET || off.y > GUARD_RING_MIN_OFFSET || off.z > GUARD_RING_MIN_OFFSET
    }

    pub fn voxel_size(&self) -> Vector3 {
        self.derived.voxel
    }

    pub(crate) fn default_guard_ring_position(&self) -> Vector3 {
        Vector3::new(
            0.5 * (-self.derived.width.x + self.offset_x),
            0.5 * (-self.derived.width.y + self.offset_y),
            0.0,
        )
    }

    pub(crate) fn grid(&self, detector: &str, pos: Vector3, energy: f64, time: f64, has_guard_ring: bool) -> Vec<GridPoint> {
        let (block, local) = self.structure.to_wafer(pos);
        for (axis, (b, max)) in ["x", "y", "z"].iter().zip(block.iter().zip(self.derived.blocks)) {
            if *b < 0 || *b >= max {
                error!(
                    "detector {}: invalid {}-block number {} (max {}) for position {}",
                    detector,
                    axis,
                    b,
                    max - 1,
                    pos
                );
                return Vec::new();
            }
        }

        let half = self.derived.width * 0.5;
        let off = self.offsets();
        let beyond = |limit: Vector3| local.x.abs() > limit.x || local.y.abs() > limit.y || local.z.abs() > limit.z;
        if beyond(half) {
            error!("hit outside detector {}: {} <-> {}", detector, local, half);
            return Vec::new();
        }
        let n = self.voxels();
        if beyond(half - off) {
            debug!("hit in guard ring of {}: {}", detector, local);
            if !has_guard_ring {
                return Vec::new();
            }
            let point = GridPoint::new(block[0] * n[0], block[1] * n[1], block[2] * n[2], GridPointKind::GuardRing);
            return vec![point.with_signal(Vector3::default(), energy, time)];
        }

        let index = |p: f64, half: f64, off: f64, size: f64| ((p + half - off) / size).floor() as i32;
        let voxel = [
            index(local.x, half.x, off.x, self.derived.voxel.x),
            index(local.y, half.y, off.y, self.derived.voxel.y),
            index(local.z, half.z, off.z, self.derived.voxel.z),
        ];
        for (axis, (v, max)) in ["x", "y", "z"].iter().zip(voxel.iter().zip(n)) {
            if *v < 0 || *v >= max {
                error!("detector {}: invalid {}-voxel number {} for position {}", detector, axis, v, local);
                return Vec::new();
            }
        }
        let point = GridPoint::new(
            voxel[0] + block[0] * n[0],
            voxel[1] + block[1] * n[1],
            voxel[2] + block[2] * n[2],
            GridPointKind::Voxel,
        );
        vec![point.with_signal(Vector3::default(), energy, time)]
    }

    /// Failure, resolution, overflow, time and calibration. Failures and
    /// overflows are flagged on the point.
    pub(crate) fn noise<R: Rng + ?Sized>(&self, response: &Response, signal: &Signal, rng: &mut R) -> Signal {
        let mut out = signal.clone();
        if !response.noise_active {
            return out;
        }
        if response.fails(rng) {
            out.energy = 0.0;
            out.flags.push_str(" FAILURE");
            return out;
        }
        out.energy = response.energy_resolution.sample(out.energy, &Default::default(), rng);
        let (energy, overflowed) = response.apply_overflow(out.energy, rng);
        out.energy = energy;
        if overflowed {
            out.flags.push_str(" OVERFLOW");
        }
        out.time = response.time_resolution.sample(out.time, out.energy, rng);
        out.energy = response.calibrate(out.energy);
        out
    }

    pub(crate) fn position_in_detector(&self, point: &GridPoint) -> Vector3 {
        let n = self.voxels();
        let grid = [point.x_grid, point.y_grid, point.z_grid];
        let block = [
            grid[0].div_euclid(n[0]),
            grid[1].div_euclid(n[1]),
            grid[2].div_euclid(n[2]),
        ];
        let centre = |i: usize, half: f64, off: f64, size: f64| {
            -half + off + ((grid[i] - block[i] * n[i]) as f64 + 0.5) * size
        };
        let half = self.derived.width * 0.5;
        let off = self.offsets();
        let local = Vector3::new(
            centre(0, half.x, off.x, self.derived.voxel.x),
            centre(1, half.y, off.y, self.derived.voxel.y),
            centre(2, half.z, off.z, self.derived.voxel.z),
        );
        self.structure.from_wafer(block, local)
    }
}
