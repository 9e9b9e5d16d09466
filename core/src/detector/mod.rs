//! Detector descriptions: how a deposit is discretized onto readout
//! channels and how the electronics respond to it.

pub mod drift_chamber;
pub mod guard_ring;
pub mod resolution;
pub mod response;
pub mod strip;
pub mod strip3d;
pub mod voxel;

pub use drift_chamber::{DriftChamber, LightFace};
pub use guard_ring::GuardRing;
pub use resolution::{EnergyResolution, ResolutionScale, TimeResolution};
pub use response::{DepthScale, Response, Signal};
pub use strip::{Structure, StripLayout};
pub use strip3d::{DepthCorrection, Strip3D};
pub use voxel::Voxel3D;

use crate::geometry::Vector3;
use crate::grid::{GridPoint, GridPointKind};
use crate::prelude::{EngineError, EngineResult, Validate};
use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Detector class, used by triggers to address all detectors of a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorType {
    #[serde(rename = "strip_2d")]
    Strip2D,
    #[serde(rename = "strip_3d")]
    Strip3D,
    #[serde(rename = "strip_3d_directional")]
    Strip3DDirectional,
    #[serde(rename = "voxel_3d")]
    Voxel3D,
    DriftChamber,
    GuardRing,
}

impl fmt::Display for DetectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DetectorType::Strip2D => "Strip2D",
            DetectorType::Strip3D => "Strip3D",
            DetectorType::Strip3DDirectional => "Strip3DDirectional",
            DetectorType::Voxel3D => "Voxel3D",
            DetectorType::DriftChamber => "DriftChamber",
            DetectorType::GuardRing => "GuardRing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DetectorKind {
    #[serde(rename = "strip_2d")]
    Strip2D(StripLayout),
    #[serde(rename = "strip_3d")]
    Strip3D(Strip3D),
    #[serde(rename = "voxel_3d")]
    Voxel3D(Voxel3D),
    DriftChamber(DriftChamber),
    GuardRing(GuardRing),
}

impl DetectorKind {
    fn guard_ring_offsets(&self) -> bool {
        match self {
            DetectorKind::Strip2D(layout) => layout.has_guard_ring(),
            DetectorKind::Strip3D(strip) => strip.layout.has_guard_ring(),
            DetectorKind::DriftChamber(chamber) => chamber.strip.layout.has_guard_ring(),
            DetectorKind::Voxel3D(voxel) => voxel.has_guard_ring(),
            DetectorKind::GuardRing(_) => false,
        }
    }

    fn default_guard_ring_position(&self) -> Vector3 {
        match self {
            DetectorKind::Strip2D(layout) => layout.default_guard_ring_position(),
            DetectorKind::Strip3D(strip) => strip.layout.default_guard_ring_position(),
            DetectorKind::DriftChamber(chamber) => chamber.strip.layout.default_guard_ring_position(),
            DetectorKind::Voxel3D(voxel) => voxel.default_guard_ring_position(),
            DetectorKind::GuardRing(ring) => ring.position(),
        }
    }
}

/// A named detector: its geometry kind, its electronics response and an
/// optional guard ring with a response of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detector {
    pub name: String,
    #[serde(default)]
    pub response: Response,
    pub kind: DetectorKind,
    #[serde(default)]
    pub guard_ring: Option<Box<Detector>>,
    /// Channels which are read out but never contribute to a trigger.
    #[serde(default)]
    pub blocked_trigger_channels: Vec<[i32; 3]>,
}

impl Detector {
    pub fn new(name: impl Into<String>, kind: DetectorKind) -> Self {
        Self {
            name: name.into(),
            response: Response::default(),
            kind,
            guard_ring: None,
            blocked_trigger_channels: Vec::new(),
        }
    }

    pub fn with_response(mut self, response: Response) -> Self {
        self.response = response;
        self
    }

    /// Attaches a guard ring with its own response. Its name is fixed at
    /// validation.
    pub fn with_guard_ring(mut self, response: Response, ring: GuardRing) -> Self {
        let name = guard_ring_name(&self.name);
        self.guard_ring = Some(Box::new(Detector::new(name, DetectorKind::GuardRing(ring)).with_response(response)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn detector_type(&self) -> DetectorType {
        match &self.kind {
            DetectorKind::Strip2D(_) => DetectorType::Strip2D,
            DetectorKind::Strip3D(strip) if strip.is_directional() => DetectorType::Strip3DDirectional,
            DetectorKind::Strip3D(_) => DetectorType::Strip3D,
            DetectorKind::Voxel3D(_) => DetectorType::Voxel3D,
            DetectorKind::DriftChamber(_) => DetectorType::DriftChamber,
            DetectorKind::GuardRing(_) => DetectorType::GuardRing,
        }
    }

    pub fn has_guard_ring(&self) -> bool {
        self.guard_ring.is_some()
    }

    pub fn guard_ring(&self) -> Option<&Detector> {
        self.guard_ring.as_deref()
    }

    /// The detector whose response applies to `point`: guard ring points of
    /// a detector with a guard ring belong to the ring.
    pub fn for_point(&self, point: &GridPoint) -> &Detector {
        match (&self.guard_ring, point.kind) {
            (Some(ring), GridPointKind::GuardRing) => ring.as_ref(),
            _ => self,
        }
    }

    fn guard_ring_position(&self) -> Vector3 {
        match self.guard_ring.as_deref().map(|d| &d.kind) {
            Some(DetectorKind::GuardRing(ring)) => ring.position(),
            _ => self.kind.default_guard_ring_position(),
        }
    }

    /// Discretizes a deposit at a detector-local position.
    pub fn grid<R: Rng + ?Sized>(&self, pos: Vector3, energy: f64, time: f64, rng: &mut R) -> Vec<GridPoint> {
        let name = self.name.as_str();
        let mut points = match &self.kind {
            DetectorKind::Strip2D(layout) => layout
                .discretize(name, pos, self.has_guard_ring())
                .map(|(point, _)| point.with_signal(Vector3::default(), energy, time))
                .into_iter()
                .collect(),
            DetectorKind::Strip3D(strip) => strip.grid(name, pos, energy, time, rng),
            DetectorKind::DriftChamber(chamber) => chamber.grid(name, pos, energy, time, rng),
            DetectorKind::Voxel3D(voxel) => voxel.grid(name, pos, energy, time, self.has_guard_ring()),
            DetectorKind::GuardRing(ring) => return ring.grid(energy, time),
        };
        let ring_position = self.guard_ring_position();
        for point in points.iter_mut().filter(|p| p.kind == GridPointKind::GuardRing) {
            point.position = ring_position;
        }
        points
    }

    /// Applies the detector response to one measured signal and returns the
    /// noised signal.
    pub fn noise<R: Rng + ?Sized>(&self, signal: &Signal, rng: &mut R) -> Signal {
        match &self.kind {
            DetectorKind::Strip2D(_) => self.response.noise_with_threshold(signal, &DepthScale::UNIT, rng),
            DetectorKind::Strip3D(strip) => strip.noise(&self.response, signal, rng),
            DetectorKind::DriftChamber(chamber) => chamber.noise(&self.response, signal, rng),
            DetectorKind::Voxel3D(voxel) => voxel.noise(&self.response, signal, rng),
            DetectorKind::GuardRing(ring) => ring.noise(&self.response, signal, rng),
        }
    }

    /// Smears a reconstructed direction for directional strip detectors.
    /// Every other detector returns the direction unchanged.
    pub fn noise_direction<R: Rng + ?Sized>(&self, direction: Vector3, energy: f64, rng: &mut R) -> Vector3 {
        match &self.kind {
            DetectorKind::Strip3D(strip) => strip.noise_direction(direction, energy, rng),
            _ => direction,
        }
    }

    pub fn depth_scale(&self, depth: f64) -> DepthScale {
        match &self.kind {
            DetectorKind::Strip3D(strip) => strip.depth_scale(depth),
            DetectorKind::DriftChamber(chamber) => chamber.depth_scale(depth),
            _ => DepthScale::UNIT,
        }
    }

    fn is_blocked(&self, point: &GridPoint) -> bool {
        self.blocked_trigger_channels
            .iter()
            .any(|c| *c == [point.x_grid, point.y_grid, point.z_grid])
    }

    pub fn is_above_trigger_threshold<R: Rng + ?Sized>(&self, energy: f64, point: &GridPoint, rng: &mut R) -> bool {
        if self.is_blocked(point) {
            return false;
        }
        self.response
            .is_above_trigger_threshold(energy, &self.depth_scale(point.position.z), rng)
    }

    pub fn is_above_noise_threshold<R: Rng + ?Sized>(&self, energy: f64, point: &GridPoint, rng: &mut R) -> bool {
        self.response
            .is_above_noise_threshold(energy, &self.depth_scale(point.position.z), rng)
    }

    pub fn sigmas_above_noise_level(&self, energy: f64, point: &GridPoint) -> f64 {
        self.response
            .sigmas_above_noise_level(energy, &self.depth_scale(point.position.z))
    }

    pub fn noise_threshold_equals_trigger_threshold(&self) -> bool {
        self.response.noise_threshold_equals_trigger_threshold
    }

    /// Centre of the channel of `point` in detector coordinates.
    pub fn position_in_detector(&self, point: &GridPoint) -> Vector3 {
        if point.kind == GridPointKind::GuardRing {
            return self.guard_ring_position();
        }
        match &self.kind {
            DetectorKind::Strip2D(layout) => layout.position_in_detector(point),
            DetectorKind::Strip3D(strip) => strip.layout.position_in_detector(point),
            DetectorKind::DriftChamber(chamber) => chamber.strip.layout.position_in_detector(point),
            DetectorKind::Voxel3D(voxel) => voxel.position_in_detector(point),
            DetectorKind::GuardRing(ring) => ring.position(),
        }
    }
}

pub fn guard_ring_name(detector: &str) -> String {
    format!("{}_GuardRing", detector)
}

impl Validate for Detector {
    fn validate(&mut self) -> EngineResult<()> {
        if self.name.trim().is_empty() {
            return Err(EngineError::InvalidConfig("a detector needs a name".into()));
        }
        let name = self.name.clone();
        match &mut self.kind {
            DetectorKind::Strip2D(layout) => layout.validate(&name)?,
            DetectorKind::Strip3D(strip) => strip.validate(&name)?,
            DetectorKind::DriftChamber(chamber) => chamber.validate(&name)?,
            DetectorKind::Voxel3D(voxel) => voxel.validate(&name)?,
            DetectorKind::GuardRing(ring) => {
                if !ring.active {
                    GuardRing::deactivate(&mut self.response);
                }
            }
        }
        self.response.validate(&name)?;

        let needs_ring = self.kind.guard_ring_offsets();
        match (self.guard_ring.is_some(), needs_ring) {
            (true, false) => {
                return Err(EngineError::InvalidConfig(format!(
                    "detector {}: a guard ring is configured but the offsets leave no room for it",
                    name
                )));
            }
            (false, true) => {
                debug!("detector {}: adding a default guard ring", name);
                let ring = GuardRing::at(self.kind.default_guard_ring_position());
                self.guard_ring = Some(Box::new(Detector::new(guard_ring_name(&name), DetectorKind::GuardRing(ring))));
            }
            _ => {}
        }

        let default_position = self.kind.default_guard_ring_position();
        if let Some(ring) = self.guard_ring.as_deref_mut() {
            match &mut ring.kind {
                DetectorKind::GuardRing(gr) => {
                    gr.unique_position.get_or_insert(default_position);
                }
                _ => {
                    return Err(EngineError::InvalidConfig(format!(
                        "detector {}: the guard ring must be of type guard_ring",
                        name
                    )));
                }
            }
            ring.name = guard_ring_name(&name);
            ring.validate()?;
        }
        Ok(())
    }
}
