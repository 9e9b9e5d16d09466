use crate::geometry::Vector3;
use crate::math::Rotation;
use serde::{Deserialize, Serialize};

/// One level of the placement chain: where a daughter volume sits inside
/// its mother, and how it is rotated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub name: String,
    #[serde(default)]
    pub position: Vector3,
    #[serde(default)]
    pub rotation: Option<Rotation>,
}

impl Placement {
    pub fn new(name: impl Into<String>, position: Vector3) -> Self {
        Self {
            name: name.into(),
            position,
            rotation: None,
        }
    }

    pub fn rotated(mut self, rotation: Rotation) -> Self {
        self.rotation = Some(rotation);
        self
    }
}

/// Chain of placements from the world volume down to a detector volume.
///
/// Two sequences address the same detector instance when both the detector
/// name and the detector volume name agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSequence {
    detector: String,
    detector_volume: String,
    #[serde(default)]
    placements: Vec<Placement>,
}

impl VolumeSequence {
    pub fn new(detector: impl Into<String>, detector_volume: impl Into<String>) -> Self {
        Self {
            detector: detector.into(),
            detector_volume: detector_volume.into(),
            placements: Vec::new(),
        }
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placements.push(placement);
        self
    }

    pub fn detector(&self) -> &str {
        &self.detector
    }

    pub fn detector_volume(&self) -> &str {
        &self.detector_volume
    }

    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    pub fn has_same_detector(&self, other: &VolumeSequence) -> bool {
        self.detector == other.detector && self.detector_volume == other.detector_volume
    }

    /// World position into the frame of the innermost placement, outermost
    /// level first.
    pub fn to_detector_frame(&self, world: Vector3) -> Vector3 {
        self.placements.iter().fold(world, |pos, level| {
            let shifted = pos - level.position;
            match &level.rotation {
                Some(rotation) => rotation.apply(shifted),
                None => shifted,
            }
        })
    }

    pub fn to_world_frame(&self, local: Vector3) -> Vector3 {
        self.placements.iter().rev().fold(local, |pos, level| {
            let unrotated = match &level.rotation {
                Some(rotation) => rotation.apply_inverse(pos),
                None => pos,
            };
            unrotated + level.position
        })
    }
}
