use crate::detector::resolution::{EnergyResolution, ResolutionScale, TimeResolution};
use crate::geometry::Vector3;
use crate::grid::GridPoint;
use crate::math::{StatsHelper, Table};
use crate::prelude::{EngineError, EngineResult};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Measured quantities of one grid point as they pass through the noise
/// chain. Noising never mutates its input; it returns a new `Signal`.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub position: Vector3,
    pub energy: f64,
    pub time: f64,
    pub flags: String,
}

impl Signal {
    pub fn from_point(point: &GridPoint) -> Self {
        Self {
            position: point.position,
            energy: point.energy,
            time: point.time,
            flags: point.flags.clone(),
        }
    }

    pub fn apply_to(self, point: &mut GridPoint) {
        point.position = self.position;
        point.energy = self.energy;
        point.time = self.time;
        point.flags = self.flags;
    }
}

/// Depth dependent multiplicative corrections evaluated at one position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthScale {
    pub resolution: ResolutionScale,
    pub trigger: f64,
    pub noise: f64,
}

impl DepthScale {
    pub const UNIT: DepthScale = DepthScale {
        resolution: ResolutionScale::UNIT,
        trigger: 1.0,
        noise: 1.0,
    };
}

/// Electronics response shared by every detector kind: resolutions,
/// thresholds, failure, saturation and calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Response {
    pub energy_resolution: EnergyResolution,
    pub time_resolution: TimeResolution,
    pub failure_rate: f64,
    pub overflow: f64,
    pub overflow_sigma: f64,
    pub trigger_threshold: f64,
    pub trigger_threshold_sigma: f64,
    pub noise_threshold: f64,
    pub noise_threshold_sigma: f64,
    pub noise_threshold_equals_trigger_threshold: bool,
    pub energy_calibration: Option<Table>,
    pub noise_active: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            energy_resolution: EnergyResolution::Ideal,
            time_resolution: TimeResolution::Ideal,
            failure_rate: 0.0,
            overflow: 1e21,
            overflow_sigma: 1.0,
            trigger_threshold: 0.0,
            trigger_threshold_sigma: 0.0,
            noise_threshold: 0.0,
            noise_threshold_sigma: 0.0,
            noise_threshold_equals_trigger_threshold: false,
            energy_calibration: None,
            noise_active: true,
        }
    }
}

impl Response {
    pub fn validate(&self, detector: &str) -> EngineResult<()> {
        let invalid = |msg: &str| Err(EngineError::InvalidConfig(format!("detector {}: {}", detector, msg)));

        if !(0.0..=1.0).contains(&self.failure_rate) {
            return invalid("failure rate must be within [0, 1]");
        }
        if self.trigger_threshold < 0.0 || self.noise_threshold < 0.0 {
            return invalid("thresholds must not be negative");
        }
        if self.trigger_threshold_sigma < 0.0
            || self.noise_threshold_sigma < 0.0
            || self.overflow_sigma < 0.0
        {
            return invalid("threshold and overflow sigmas must not be negative");
        }
        if self.noise_threshold_equals_trigger_threshold && self.noise_threshold != 0.0 {
            return invalid("a noise threshold is given although it is pinned to the trigger threshold");
        }
        if let TimeResolution::Gauss { width } = &self.time_resolution {
            if width.is_empty() {
                return invalid("time resolution has no data points");
            }
        }
        if matches!(&self.energy_calibration, Some(table) if table.is_empty()) {
            return invalid("energy calibration has no data points");
        }
        self.energy_resolution.validate(detector)
    }

    pub(crate) fn fails<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        self.failure_rate > 0.0 && StatsHelper::uniform(rng) < self.failure_rate
    }

    /// Clips to a smeared saturation ceiling. The flag reports a clip.
    pub(crate) fn apply_overflow<R: Rng + ?Sized>(&self, energy: f64, rng: &mut R) -> (f64, bool) {
        let ceiling = StatsHelper::gaus(rng, self.overflow, self.overflow_sigma);
        if energy > ceiling {
            (ceiling, true)
        } else {
            (energy, false)
        }
    }

    pub fn trigger_threshold_at(&self, scale: &DepthScale) -> f64 {
        self.trigger_threshold * scale.trigger
    }

    pub fn noise_threshold_at(&self, scale: &DepthScale) -> f64 {
        if self.noise_threshold_equals_trigger_threshold {
            self.trigger_threshold_at(scale)
        } else {
            self.noise_threshold * scale.noise
        }
    }

    fn noise_threshold_sigma(&self) -> f64 {
        if self.noise_threshold_equals_trigger_threshold {
            self.trigger_threshold_sigma
        } else {
            self.noise_threshold_sigma
        }
    }

    pub(crate) fn below_noise_threshold<R: Rng + ?Sized>(
        &self,
        energy: f64,
        scale: &DepthScale,
        rng: &mut R,
    ) -> bool {
        let threshold = StatsHelper::gaus(rng, self.noise_threshold_at(scale), self.noise_threshold_sigma());
        energy < threshold
    }

    pub fn calibrate(&self, energy: f64) -> f64 {
        match &self.energy_calibration {
            Some(table) => table.evaluate(energy),
            None => energy,
        }
    }

    pub fn is_above_trigger_threshold<R: Rng + ?Sized>(
        &self,
        energy: f64,
        scale: &DepthScale,
        rng: &mut R,
    ) -> bool {
        if self.noise_threshold_equals_trigger_threshold {
            return true;
        }
        energy > StatsHelper::gaus(rng, self.trigger_threshold_at(scale), self.trigger_threshold_sigma)
    }

    pub fn is_above_noise_threshold<R: Rng + ?Sized>(
        &self,
        energy: f64,
        scale: &DepthScale,
        rng: &mut R,
    ) -> bool {
        energy > StatsHelper::gaus(rng, self.noise_threshold_at(scale), self.noise_threshold_sigma())
    }

    /// Distance of `energy` above the noise threshold in units of the
    /// threshold jitter. A sharp threshold yields plus or minus infinity.
    pub fn sigmas_above_noise_level(&self, energy: f64, scale: &DepthScale) -> f64 {
        let threshold = self.noise_threshold_at(scale);
        let sigma = self.noise_threshold_sigma();
        if sigma > 0.0 {
            (energy - threshold) / sigma
        } else if energy > threshold {
            f64::INFINITY
        } else {
            f64::NEG_INFINITY
        }
    }

    /// Failure, resolution, overflow, noise threshold, time and calibration,
    /// in that order.
    pub(crate) fn noise_with_threshold<R: Rng + ?Sized>(
        &self,
        signal: &Signal,
        scale: &DepthScale,
        rng: &mut R,
    ) -> Signal {
        let mut out = signal.clone();
        if !self.noise_active {
            return out;
        }
        if self.fails(rng) {
            out.energy = 0.0;
            return out;
        }
        out.energy = self.energy_resolution.sample(out.energy, &scale.resolution, rng);
        out.energy = self.apply_overflow(out.energy, rng).0;
        if self.below_noise_threshold(out.energy, scale, rng) {
            out.energy = 0.0;
            return out;
        }
        out.time = self.time_resolution.sample(out.time, out.energy, rng);
        out.energy = self.calibrate(out.energy);
        out
    }
}
