use crate::detector::response::{DepthScale, Response, Signal};
use crate::detector::strip3d::{diffuse, Drift, Strip3D};
use crate::geometry::Vector3;
use crate::grid::{GridPoint, GridPointKind};
use crate::math::{StatsHelper, Table};
use crate::prelude::{EngineError, EngineResult};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Speed of light in cm/s.
pub const SPEED_OF_LIGHT: f64 = 2.99792458e10;

fn default_light_speed() -> f64 {
    SPEED_OF_LIGHT
}

/// Face of the chamber carrying the scintillation light detector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightFace {
    #[default]
    None,
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

/// Strip readout of a drift volume whose scintillation light gives the
/// event time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftChamber {
    pub strip: Strip3D,
    #[serde(default = "default_light_speed")]
    pub light_speed: f64,
    #[serde(default)]
    pub light_face: LightFace,
    /// Gaussian width of the measured light energy over energy.
    #[serde(default)]
    pub light_energy_resolution: Option<Table>,
}

impl DriftChamber {
    pub fn new(strip: Strip3D) -> Self {
        Self {
            strip,
            light_speed: SPEED_OF_LIGHT,
            light_face: LightFace::None,
            light_energy_resolution: None,
        }
    }

    pub fn with_light_face(mut self, face: LightFace) -> Self {
        self.light_face = face;
        self
    }

    pub fn validate(&mut self, detector: &str) -> EngineResult<()> {
        self.strip.validate(detector)?;
        if self.light_speed <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "detector {}: the light speed must be positive",
                detector
            )));
        }
        if matches!(&self.light_energy_resolution, Some(t) if t.is_empty()) {
            return Err(EngineError::InvalidConfig(format!(
                "detector {}: light energy resolution has no data points",
                detector
            )));
        }
        Ok(())
    }

    /// Time the scintillation light needs from a wafer-local position to the
    /// light detector.
    pub fn light_travel_time(&self, local: Vector3) -> f64 {
        let size = self.strip.layout.structure.size;
        let distance = match self.light_face {
            LightFace::None => 0.0,
            LightFace::PositiveX => size.x - local.x,
            LightFace::NegativeX => local.x + size.x,
            LightFace::PositiveY => size.y - local.y,
            LightFace::NegativeY => local.y + size.y,
            LightFace::PositiveZ => size.z - local.z,
            LightFace::NegativeZ => local.z + size.z,
        };
        distance / self.light_speed
    }

    pub(crate) fn grid<R: Rng + ?Sized>(
        &self,
        detector: &str,
        pos: Vector3,
        energy: f64,
        time: f64,
        rng: &mut R,
    ) -> Vec<GridPoint> {
        let Some(hit) = self.strip.layout.locate(detector, pos) else {
            return Vec::new();
        };
        let time = time + self.light_travel_time(hit.local);
        diffuse(
            detector,
            &self.strip.layout,
            Drift {
                constant: self.strip.drift_constant,
                energy_per_electron: self.strip.energy_per_electron,
            },
            pos,
            energy,
            time,
            GridPointKind::VoxelDrift,
            rng,
        )
    }

    pub(crate) fn noise<R: Rng + ?Sized>(&self, response: &Response, signal: &Signal, rng: &mut R) -> Signal {
        self.strip.noise(response, signal, rng)
    }

    pub fn depth_scale(&self, depth: f64) -> DepthScale {
        self.strip.depth_scale(depth)
    }

    pub fn noise_light_energy<R: Rng + ?Sized>(&self, energy: f64, rng: &mut R) -> f64 {
        match &self.light_energy_resolution {
            Some(table) => StatsHelper::gaus(rng, energy, table.evaluate(energy)),
            None => energy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::strip::tests::germanium_layout;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn chamber(face: LightFace) -> DriftChamber {
        DriftChamber::new(Strip3D::new(germanium_layout()).with_drift(0.01, 1.0)).with_light_face(face)
    }

    #[test]
    fn light_travel_time_per_face() {
        let local = Vector3::new(1.2, -0.2, 0.25);
        let c = SPEED_OF_LIGHT;
        assert_eq!(chamber(LightFace::None).light_travel_time(local), 0.0);
        assert!((chamber(LightFace::PositiveX).light_travel_time(local) - 2.0 / c).abs() < 1e-20);
        assert!((chamber(LightFace::NegativeX).light_travel_time(local) - 4.4 / c).abs() < 1e-20);
        assert!((chamber(LightFace::NegativeY).light_travel_time(local) - 3.0 / c).abs() < 1e-20);
        assert!((chamber(LightFace::PositiveZ).light_travel_time(local) - 0.5 / c).abs() < 1e-20);
    }

    #[test]
    fn grid_diffuses_into_drift_voxels_with_light_delay() {
        let chamber = chamber(LightFace::PositiveX);
        let mut rng = StdRng::seed_from_u64(8);
        let points = chamber.grid("TPC", Vector3::new(0.0, 0.0, 0.0), 50.0, 1e-6, &mut rng);
        assert!(!points.is_empty());
        let expected = 1e-6 + 3.2 / SPEED_OF_LIGHT;
        for p in &points {
            assert_eq!(p.kind, GridPointKind::VoxelDrift);
            assert!((p.time - expected).abs() < 1e-18);
        }
        let total: f64 = points.iter().map(|p| p.energy).sum();
        assert!((total - 50.0).abs() < 1e-9);
    }

    #[test]
    fn light_energy_smearing_is_optional() {
        let mut chamber = chamber(LightFace::None);
        let mut rng = StdRng::seed_from_u64(9);
        assert_eq!(chamber.noise_light_energy(30.0, &mut rng), 30.0);
        chamber.light_energy_resolution = Some(Table::constant(3.0));
        assert_ne!(chamber.noise_light_energy(30.0, &mut rng), 30.0);
    }
}
