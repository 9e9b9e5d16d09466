use crate::detector::resolution::EnergyResolution;
use crate::detector::response::{DepthScale, Response, Signal};
use crate::geometry::Vector3;
use crate::grid::{GridPoint, GridPointKind};
use rand::Rng;
use serde::{Deserialize, Serialize};

fn active_by_default() -> bool {
    true
}

/// Single-channel veto electrode surrounding the sensitive area of a strip
/// or voxel detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardRing {
    #[serde(default = "active_by_default")]
    pub active: bool,
    /// Where every hit of the guard ring is reported.
    #[serde(default)]
    pub unique_position: Option<Vector3>,
}

impl Default for GuardRing {
    fn default() -> Self {
        Self {
            active: true,
            unique_position: None,
        }
    }
}

impl GuardRing {
    pub fn at(position: Vector3) -> Self {
        Self {
            active: true,
            unique_position: Some(position),
        }
    }

    pub fn inactive() -> Self {
        Self {
            active: false,
            ..Default::default()
        }
    }

    pub fn position(&self) -> Vector3 {
        self.unique_position.unwrap_or_default()
    }

    /// An inactive ring never measures energy and never triggers.
    pub(crate) fn deactivate(response: &mut Response) {
        response.energy_resolution = EnergyResolution::None;
        response.trigger_threshold = f64::MAX / 10.0;
        response.noise_threshold = 0.0;
        response.noise_threshold_equals_trigger_threshold = true;
    }

    pub(crate) fn grid(&self, energy: f64, time: f64) -> Vec<GridPoint> {
        vec![GridPoint::new(0, 0, 0, GridPointKind::GuardRing).with_signal(self.position(), energy, time)]
    }

    pub(crate) fn noise<R: Rng + ?Sized>(&self, response: &Response, signal: &Signal, rng: &mut R) -> Signal {
        if !self.active {
            let mut out = signal.clone();
            out.energy = 0.0;
            return out;
        }
        response.noise_with_threshold(signal, &DepthScale::UNIT, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn every_hit_lands_on_the_unique_position() {
        let ring = GuardRing::at(Vector3::new(-3.1, -3.1, 0.0));
        let points = ring.grid(20.0, 1e-7);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].kind, GridPointKind::GuardRing);
        assert_eq!(points[0].position, Vector3::new(-3.1, -3.1, 0.0));
        assert_eq!(points[0].energy, 20.0);
    }

    #[test]
    fn inactive_ring_measures_nothing() {
        let mut response = Response::default();
        GuardRing::deactivate(&mut response);
        response.validate("Ring").unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let signal = Signal {
            position: Vector3::default(),
            energy: 80.0,
            time: 0.0,
            flags: String::new(),
        };
        assert_eq!(GuardRing::inactive().noise(&response, &signal, &mut rng).energy, 0.0);
        assert_eq!(GuardRing::default().noise(&Response::default(), &signal, &mut rng).energy, 80.0);
    }
}
