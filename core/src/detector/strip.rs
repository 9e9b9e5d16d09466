use crate::geometry::Vector3;
use crate::grid::{GridPoint, GridPointKind};
use crate::prelude::{EngineError, EngineResult};
use log::{debug, error};
use serde::{Deserialize, Serialize};

/// Guard ring offsets below this width (1 nm) are treated as absent.
pub(crate) const GUARD_RING_MIN_OFFSET: f64 = 1e-6;

/// Box structure of a segmented detector volume.
///
/// `size` is the half size of one sensitive wafer or block, `dimension` the
/// half size of the enclosing detector volume (equal to `size` for a single
/// wafer). `offset` positions the first wafer relative to the lower corner of
/// the detector volume and `pitch` is the gap between neighbouring wafers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Structure {
    pub dimension: Option<Vector3>,
    pub size: Vector3,
    pub offset: Vector3,
    pub pitch: Vector3,
}

impl Structure {
    pub fn single(size: Vector3) -> Self {
        Self {
            size,
            ..Default::default()
        }
    }

    pub fn dimension(&self) -> Vector3 {
        self.dimension.unwrap_or(self.size)
    }

    pub(crate) fn wafer_period(&self) -> Vector3 {
        Vector3::new(
            2.0 * self.size.x + self.pitch.x,
            2.0 * self.size.y + self.pitch.y,
            2.0 * self.size.z + self.pitch.z,
        )
    }

    pub(crate) fn count_along(dimension: f64, offset: f64, size: f64, pitch: f64) -> i32 {
        let period = 2.0 * size + pitch;
        if period <= 0.0 {
            return 0;
        }
        (((2.0 * dimension - offset + pitch) / period) + 1e-9).floor().max(1.0) as i32
    }

    /// Moves a detector-local position into the frame of the wafer centre,
    /// returning the wafer indices alongside.
    pub(crate) fn to_wafer(&self, pos: Vector3) -> ([i32; 3], Vector3) {
        let shifted = pos + self.dimension() - self.offset;
        let period = self.wafer_period();
        let index = |p: f64, period: f64| if period > 0.0 { (p / period).floor() as i32 } else { 0 };
        let wafer = [
            index(shifted.x, period.x),
            index(shifted.y, period.y),
            index(shifted.z, period.z),
        ];
        let local = Vector3::new(
            shifted.x - wafer[0] as f64 * period.x,
            shifted.y - wafer[1] as f64 * period.y,
            shifted.z - wafer[2] as f64 * period.z,
        ) - self.size;
        (wafer, local)
    }

    /// Like `to_wafer`, but only x and y are segmented. Strip wafers are
    /// stacked in the plane and the depth is kept as given.
    pub(crate) fn to_planar_wafer(&self, pos: Vector3) -> ([i32; 2], Vector3) {
        let (wafer, local) = self.to_wafer(pos);
        ([wafer[0], wafer[1]], Vector3::new(local.x, local.y, pos.z))
    }

    pub(crate) fn from_planar_wafer(&self, wafer: [i32; 2], local: Vector3) -> Vector3 {
        let pos = self.from_wafer([wafer[0], wafer[1], 0], local);
        Vector3::new(pos.x, pos.y, local.z)
    }

    pub(crate) fn from_wafer(&self, wafer: [i32; 3], local: Vector3) -> Vector3 {
        let period = self.wafer_period();
        local
            + self.size
            + Vector3::new(
                wafer[0] as f64 * period.x,
                wafer[1] as f64 * period.y,
                wafer[2] as f64 * period.z,
            )
            + self.offset
            - self.dimension()
    }
}

/// Where a position falls relative to the sensitive area of its wafer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Footprint {
    Sensitive,
    GuardRing,
    Outside,
}

/// A position resolved onto one wafer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct WaferHit {
    pub wafer_x: i32,
    pub wafer_y: i32,
    pub local: Vector3,
    pub footprint: Footprint,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct StripGeometry {
    width_x: f64,
    width_y: f64,
    pitch_x: f64,
    pitch_y: f64,
    wafers_x: i32,
    wafers_y: i32,
}

/// Double-sided strip wafer layout shared by all strip and drift detectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StripLayout {
    pub structure: Structure,
    pub strips_x: u32,
    pub strips_y: u32,
    /// Width of the insensitive border (guard ring) along x.
    #[serde(default)]
    pub offset_x: f64,
    #[serde(default)]
    pub offset_y: f64,
    #[serde(skip)]
    derived: StripGeometry,
}

impl StripLayout {
    pub fn new(structure: Structure, strips_x: u32, strips_y: u32) -> Self {
        Self {
            structure,
            strips_x,
            strips_y,
            offset_x: 0.0,
            offset_y: 0.0,
            derived: StripGeometry::default(),
        }
    }

    pub fn with_guard_ring(mut self, offset_x: f64, offset_y: f64) -> Self {
        self.offset_x = offset_x;
        self.offset_y = offset_y;
        self
    }

    pub fn validate(&mut self, detector: &str) -> EngineResult<()> {
        let invalid = |msg: &str| Err(EngineError::InvalidConfig(format!("detector {}: {}", detector, msg)));
        let s = &self.structure;
        if s.size.x <= 0.0 || s.size.y <= 0.0 || s.size.z <= 0.0 {
            return invalid("the sensitive volume needs a positive size");
        }
        if self.offset_x < 0.0 || self.offset_y < 0.0 {
            return invalid("all offsets have to be positive");
        }
        if self.strips_x == 0 || self.strips_y == 0 {
            return invalid("you need to have strips in x and y direction");
        }

        let width_x = 2.0 * s.size.x;
        let width_y = 2.0 * s.size.y;
        if 2.0 * self.offset_x >= width_x || 2.0 * self.offset_y >= width_y {
            return invalid("the guard ring covers the whole wafer");
        }
        let dimension = s.dimension();
        let derived = StripGeometry {
            width_x,
            width_y,
            pitch_x: (width_x - 2.0 * self.offset_x) / self.strips_x as f64,
            pitch_y: (width_y - 2.0 * self.offset_y) / self.strips_y as f64,
            wafers_x: Structure::count_along(dimension.x, s.offset.x, s.size.x, s.pitch.x),
            wafers_y: Structure::count_along(dimension.y, s.offset.y, s.size.y, s.pitch.y),
        };
        if derived.wafers_x <= 0 || derived.wafers_y <= 0 {
            return invalid("you need to have at least one wafer in x and y direction");
        }
        debug!(
            "detector {}: pitch ({:.5}, {:.5}), wafers ({}, {})",
            detector, derived.pitch_x, derived.pitch_y, derived.wafers_x, derived.wafers_y
        );
        self.derived = derived;
        Ok(())
    }

    pub fn has_guard_ring(&self) -> bool {
        self.offset_x > GUARD_RING_MIN_OFFSET || self.offset_y > GUARD_RING_MIN_OFFSET
    }

    pub fn pitch(&self) -> (f64, f64) {
        (self.derived.pitch_x, self.derived.pitch_y)
    }

    pub fn wafers(&self) -> (i32, i32) {
        (self.derived.wafers_x, self.derived.wafers_y)
    }

    pub(crate) fn half_thickness(&self) -> f64 {
        self.structure.size.z
    }

    /// A position inside the guard ring closest to the lower corner.
    pub(crate) fn default_guard_ring_position(&self) -> Vector3 {
        Vector3::new(
            0.5 * (-self.derived.width_x + self.offset_x),
            0.5 * (-self.derived.width_y + self.offset_y),
            0.0,
        )
    }

    pub(crate) fn footprint(&self, local: Vector3) -> Footprint {
        let (hx, hy) = (self.derived.width_x / 2.0, self.derived.width_y / 2.0);
        if local.x.abs() > hx - self.offset_x || local.y.abs() > hy - self.offset_y {
            if local.x.abs() > hx || local.y.abs() > hy {
                Footprint::Outside
            } else {
                Footprint::GuardRing
            }
        } else {
            Footprint::Sensitive
        }
    }

    /// Resolves a detector-local position onto its wafer. Positions beyond
    /// the last wafer are logged and yield `None`.
    pub(crate) fn locate(&self, detector: &str, pos: Vector3) -> Option<WaferHit> {
        let (wafer, local) = self.structure.to_planar_wafer(pos);
        if wafer[0] < 0 || wafer[0] >= self.derived.wafers_x {
            error!(
                "detector {}: invalid x-wafer number {} (max {}) for position {}",
                detector,
                wafer[0],
                self.derived.wafers_x - 1,
                pos
            );
            return None;
        }
        if wafer[1] < 0 || wafer[1] >= self.derived.wafers_y {
            error!(
                "detector {}: invalid y-wafer number {} (max {}) for position {}",
                detector,
                wafer[1],
                self.derived.wafers_y - 1,
                pos
            );
            return None;
        }
        Some(WaferHit {
            wafer_x: wafer[0],
            wafer_y: wafer[1],
            local,
            footprint: self.footprint(local),
        })
    }

    /// Strip indices within the wafer for a wafer-local position, without a
    /// range check.
    pub(crate) fn strip_index(&self, local: Vector3) -> (i32, i32) {
        let index = |p: f64, half_width: f64, offset: f64, pitch: f64, n: u32| {
            if n == 1 || pitch == 0.0 {
                0
            } else {
                ((p + half_width - offset) / pitch).floor() as i32
            }
        };
        (
            index(local.x, self.derived.width_x / 2.0, self.offset_x, self.derived.pitch_x, self.strips_x),
            index(local.y, self.derived.width_y / 2.0, self.offset_y, self.derived.pitch_y, self.strips_y),
        )
    }

    /// Global channel for a sensitive wafer hit, or `None` (logged) when the
    /// strip index falls outside the wafer.
    pub(crate) fn channel(&self, detector: &str, hit: &WaferHit, local: Vector3) -> Option<(i32, i32)> {
        let (xs, ys) = self.strip_index(local);
        if xs < 0 || xs >= self.strips_x as i32 {
            error!("detector {}: invalid x-strip number {} for position {}", detector, xs, local);
            return None;
        }
        if ys < 0 || ys >= self.strips_y as i32 {
            error!("detector {}: invalid y-strip number {} for position {}", detector, ys, local);
            return None;
        }
        Some((
            xs + hit.wafer_x * self.strips_x as i32,
            ys + hit.wafer_y * self.strips_y as i32,
        ))
    }

    /// Classifies a position for the non-diffusing path: one voxel point on a
    /// sensitive channel, a guard ring point, or nothing.
    pub(crate) fn discretize(&self, detector: &str, pos: Vector3, has_guard_ring: bool) -> Option<(GridPoint, Vector3)> {
        let hit = self.locate(detector, pos)?;
        match hit.footprint {
            Footprint::Outside => {
                error!(
                    "hit outside detector {}: {} <-> ({}, {})",
                    detector,
                    hit.local,
                    self.derived.width_x / 2.0,
                    self.derived.width_y / 2.0
                );
                None
            }
            Footprint::GuardRing => {
                debug!("hit in guard ring of {}: {}", detector, hit.local);
                if has_guard_ring {
                    Some((GridPoint::new(0, 0, 0, GridPointKind::GuardRing), hit.local))
                } else {
                    None
                }
            }
            Footprint::Sensitive => {
                let (x, y) = self.channel(detector, &hit, hit.local)?;
                Some((GridPoint::new(x, y, 0, GridPointKind::Voxel), hit.local))
            }
        }
    }

    /// Centre of a strip channel in detector coordinates, keeping the depth
    /// carried by the point.
    pub(crate) fn position_in_detector(&self, point: &GridPoint) -> Vector3 {
        let wafer_x = point.x_grid.div_euclid(self.strips_x.max(1) as i32);
        let wafer_y = point.y_grid.div_euclid(self.strips_y.max(1) as i32);
        let strip_x = point.x_grid - wafer_x * self.strips_x as i32;
        let strip_y = point.y_grid - wafer_y * self.strips_y as i32;
        let local = Vector3::new(
            -self.derived.width_x / 2.0 + self.offset_x + (strip_x as f64 + 0.5) * self.derived.pitch_x,
            -self.derived.width_y / 2.0 + self.offset_y + (strip_y as f64 + 0.5) * self.derived.pitch_y,
            point.position.z,
        );
        self.structure.from_planar_wafer([wafer_x, wafer_y], local)
    }
}
