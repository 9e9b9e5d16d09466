use crate::math::{StatsHelper, Table};
use crate::prelude::{EngineError, EngineResult};
use log::error;
use rand::Rng;
use serde::{Deserialize, Serialize};

const LORENTZ_MIN_HEIGHT: f64 = 0.0025;
const GAUSS_LANDAU_TRIALS: usize = 100;

/// Multiplicative factors applied to the energy resolution parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolutionScale {
    pub peak1: f64,
    pub width1: f64,
    pub peak2: f64,
    pub width2: f64,
    pub ratio: f64,
}

impl ResolutionScale {
    pub const UNIT: ResolutionScale = ResolutionScale {
        peak1: 1.0,
        width1: 1.0,
        peak2: 1.0,
        width2: 1.0,
        ratio: 1.0,
    };
}

impl Default for ResolutionScale {
    fn default() -> Self {
        Self::UNIT
    }
}

/// Energy resolution model. All parameters are tables over deposited energy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnergyResolution {
    None,
    #[default]
    Ideal,
    Gauss {
        peak: Table,
        width: Table,
    },
    Lorentz {
        peak: Table,
        width: Table,
    },
    GaussLandau {
        peak1: Table,
        width1: Table,
        peak2: Table,
        width2: Table,
        ratio: Table,
    },
}

impl EnergyResolution {
    /// Gaussian smearing around the deposited energy with a constant width.
    pub fn gauss_constant(width: f64) -> Self {
        EnergyResolution::Gauss {
            peak: Table::identity(),
            width: Table::constant(width),
        }
    }

    pub fn validate(&self, detector: &str) -> EngineResult<()> {
        let tables: Vec<(&str, &Table)> = match self {
            EnergyResolution::None | EnergyResolution::Ideal => Vec::new(),
            EnergyResolution::Gauss { peak, width } | EnergyResolution::Lorentz { peak, width } => {
                vec![("peak", peak), ("width", width)]
            }
            EnergyResolution::GaussLandau {
                peak1,
                width1,
                peak2,
                width2,
                ratio,
            } => vec![
                ("peak1", peak1),
                ("width1", width1),
                ("peak2", peak2),
                ("width2", width2),
                ("ratio", ratio),
            ],
        };
        for (label, table) in tables {
            if table.is_empty() {
                return Err(EngineError::InvalidConfig(format!(
                    "detector {}: energy resolution {} has no data points",
                    detector, label
                )));
            }
        }
        Ok(())
    }

    /// Draws a measured energy for a deposit of `energy`.
    pub fn sample<R: Rng + ?Sized>(&self, energy: f64, scale: &ResolutionScale, rng: &mut R) -> f64 {
        match self {
            EnergyResolution::None => 0.0,
            EnergyResolution::Ideal => energy,
            EnergyResolution::Gauss { peak, width } => {
                let peak = non_negative("peak", peak.evaluate(energy) * scale.peak1);
                let width = non_negative("width", width.evaluate(energy) * scale.width1);
                peak + StatsHelper::gaus(rng, 0.0, width)
            }
            EnergyResolution::Lorentz { peak, width } => {
                let peak = non_negative("peak", peak.evaluate(energy) * scale.peak1);
                let width = 2.35 / 2.0 * non_negative("width", width.evaluate(energy) * scale.width1);
                if width == 0.0 {
                    return peak;
                }
                let cutoff = (width * width * (1.0 - LORENTZ_MIN_HEIGHT) / LORENTZ_MIN_HEIGHT).sqrt();
                let offset = loop {
                    let e = StatsHelper::uniform(rng) * cutoff;
                    let height = width * width / (width * width + e * e);
                    if StatsHelper::uniform(rng) <= height {
                        break e;
                    }
                };
                if StatsHelper::uniform(rng) >= 0.5 {
                    peak + offset
                } else {
                    peak - offset
                }
            }
            EnergyResolution::GaussLandau {
                peak1,
                width1,
                peak2,
                width2,
                ratio,
            } => {
                let mean_gauss = non_negative("peak1", peak1.evaluate(energy) * scale.peak1);
                let sigma_gauss = non_negative("width1", width1.evaluate(energy) * scale.width1);
                let mean_landau = non_negative("peak2", peak2.evaluate(energy) * scale.peak2);
                let sigma_landau = non_negative("width2", width2.evaluate(energy) * scale.width2);
                let ratio = unit_interval(ratio.evaluate(energy) * scale.ratio);

                let density = |e: f64| {
                    let gauss = if sigma_gauss > 0.0 {
                        let arg = (e - mean_gauss) / sigma_gauss;
                        (-0.5 * arg * arg).exp()
                    } else {
                        0.0
                    };
                    ratio * gauss + (1.0 - ratio) * StatsHelper::landau(mean_landau - e, 0.0, sigma_landau)
                };

                let max = density(energy);
                let e_min = (mean_gauss - 10.0 * sigma_landau - 10.0 * sigma_gauss).max(0.0);
                let e_max = mean_gauss + 4.0 * sigma_landau + 4.0 * sigma_gauss;
                let mut candidate = e_min;
                for _ in 0..GAUSS_LANDAU_TRIALS {
                    candidate = e_min + StatsHelper::uniform(rng) * (e_max - e_min);
                    if density(candidate) >= StatsHelper::uniform(rng) * max {
                        break;
                    }
                }
                candidate
            }
        }
    }
}

/// Time resolution model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimeResolution {
    None,
    #[default]
    Ideal,
    Gauss {
        width: Table,
    },
}

impl TimeResolution {
    pub fn sample<R: Rng + ?Sized>(&self, time: f64, energy: f64, rng: &mut R) -> f64 {
        match self {
            TimeResolution::None => 0.0,
            TimeResolution::Ideal => time,
            TimeResolution::Gauss { width } => {
                StatsHelper::gaus(rng, time, non_negative("time width", width.evaluate(energy)))
            }
        }
    }
}

fn non_negative(label: &str, value: f64) -> f64 {
    if value < 0.0 {
        error!("resolution {} is negative ({}), using 0", label, value);
        0.0
    } else {
        value
    }
}

fn unit_interval(value: f64) -> f64 {
    if !(0.0..=1.0).contains(&value) {
        error!("energy resolution ratio {} outside [0, 1], clamping", value);
        value.clamp(0.0, 1.0)
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn none_and_ideal_are_deterministic() {
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(EnergyResolution::None.sample(662.0, &ResolutionScale::UNIT, &mut rng), 0.0);
        assert_eq!(EnergyResolution::Ideal.sample(662.0, &ResolutionScale::UNIT, &mut rng), 662.0);
    }

    #[test]
    fn gauss_spread_matches_width() {
        let mut rng = StdRng::seed_from_u64(11);
        let res = EnergyResolution::gauss_constant(2.0);
        let n = 20_000;
        let samples: Vec<f64> = (0..n)
            .map(|_| res.sample(100.0, &ResolutionScale::UNIT, &mut rng))
            .collect();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n as f64;
        assert!((mean - 100.0).abs() < 0.1);
        assert!((var.sqrt() - 2.0).abs() < 0.1);
    }

    #[test]
    fn lorentz_stays_within_cutoff() {
        let mut rng = StdRng::seed_from_u64(5);
        let res = EnergyResolution::Lorentz {
            peak: Table::identity(),
            width: Table::constant(1.0),
        };
        let w = 2.35 / 2.0;
        let cutoff = (w * w * (1.0 - LORENTZ_MIN_HEIGHT) / LORENTZ_MIN_HEIGHT).sqrt();
        for _ in 0..1000 {
            let e = res.sample(50.0, &ResolutionScale::UNIT, &mut rng);
            assert!((e - 50.0).abs() < cutoff);
        }
    }

    #[test]
    fn gauss_landau_stays_in_sampling_window() {
        let mut rng = StdRng::seed_from_u64(9);
        let res = EnergyResolution::GaussLandau {
            peak1: Table::identity(),
            width1: Table::constant(1.5),
            peak2: Table::identity(),
            width2: Table::constant(0.5),
            ratio: Table::constant(0.8),
        };
        for _ in 0..500 {
            let e = res.sample(300.0, &ResolutionScale::UNIT, &mut rng);
            assert!(e >= 300.0 - 20.0 && e <= 300.0 + 8.0);
        }
    }

    #[test]
    fn validate_requires_tables() {
        let res = EnergyResolution::Gauss {
            peak: Table::default(),
            width: Table::constant(1.0),
        };
        assert!(res.validate("D").is_err());
        assert!(EnergyResolution::gauss_constant(1.0).validate("D").is_ok());
    }

    #[test]
    fn time_resolution_none_zeroes_time() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(TimeResolution::None.sample(4.0, 10.0, &mut rng), 0.0);
        assert_eq!(TimeResolution::Ideal.sample(4.0, 10.0, &mut rng), 4.0);
    }
}
