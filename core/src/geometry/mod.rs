pub mod vector;
pub mod volume;

pub use vector::Vector3;
pub use volume::{Placement, VolumeSequence};

use crate::detector::{Detector, TimeResolution};
use crate::prelude::{EngineError, EngineResult, Validate};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Properties of the whole instrument rather than of a single detector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct System {
    pub time_resolution: TimeResolution,
}

impl System {
    pub fn noise_time<R: Rng + ?Sized>(&self, time: f64, rng: &mut R) -> f64 {
        self.time_resolution.sample(time, 0.0, rng)
    }
}

/// Validated, read-only detector setup shared by all engines.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    detectors: Vec<Detector>,
    system: System,
}

impl Geometry {
    pub fn new(mut detectors: Vec<Detector>, system: System) -> EngineResult<Self> {
        let mut names = HashSet::new();
        for detector in detectors.iter_mut() {
            detector.validate()?;
            if !names.insert(detector.name.clone()) {
                return Err(EngineError::InvalidConfig(format!(
                    "detector name {} is used twice",
                    detector.name
                )));
            }
        }
        if let TimeResolution::Gauss { width } = &system.time_resolution {
            if width.is_empty() {
                return Err(EngineError::InvalidConfig("system time resolution has no data points".into()));
            }
        }
        Ok(Self { detectors, system })
    }

    pub fn detector(&self, name: &str) -> Option<&Detector> {
        self.detectors.iter().find(|d| d.name == name)
    }

    pub fn detectors(&self) -> &[Detector] {
        &self.detectors
    }

    pub fn system(&self) -> &System {
        &self.system
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::tests::strip_2d;
    use crate::math::Table;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn duplicate_names_are_rejected() {
        let err = Geometry::new(vec![strip_2d("A", 0.0), strip_2d("A", 5.0)], System::default()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
    }

    #[test]
    fn lookup_by_name() {
        let geometry = Geometry::new(vec![strip_2d("A", 0.0), strip_2d("B", 5.0)], System::default()).unwrap();
        assert_eq!(geometry.detector("B").unwrap().response.trigger_threshold, 5.0);
        assert!(geometry.detector("C").is_none());
        assert_eq!(geometry.detectors().len(), 2);
    }

    #[test]
    fn system_time_smearing() {
        let system = System {
            time_resolution: TimeResolution::Gauss {
                width: Table::constant(1e-9),
            },
        };
        let mut rng = StdRng::seed_from_u64(4);
        let t = system.noise_time(5e-6, &mut rng);
        assert_ne!(t, 5e-6);
        assert!((t - 5e-6).abs() < 1e-8);
        assert_eq!(System::default().noise_time(5e-6, &mut rng), 5e-6);
    }
}
