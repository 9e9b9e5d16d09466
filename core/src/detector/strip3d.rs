use crate::detector::resolution::ResolutionScale;
use crate::detector::response::{DepthScale, Response, Signal};
use crate::detector::strip::{Footprint, StripLayout};
use crate::geometry::Vector3;
use crate::grid::{GridPoint, GridPointKind};
use crate::math::{StatsHelper, Table};
use crate::prelude::{EngineError, EngineResult};
use log::{error, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const DEFAULT_ENERGY_PER_ELECTRON: f64 = 0.022;

const DEPTH_RESOLUTION_DRAWS: usize = 5;
const MAX_DEPTH_DRAWS: usize = 10_000;

fn default_energy_per_electron() -> f64 {
    DEFAULT_ENERGY_PER_ELECTRON
}

/// Multiplicative corrections as a function of depth. An empty table means
/// no correction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthCorrection {
    pub peak1: Table,
    pub width1: Table,
    pub peak2: Table,
    pub width2: Table,
    pub ratio: Table,
    pub trigger_threshold: Table,
    pub noise_threshold: Table,
}

impl DepthCorrection {
    pub fn scale(&self, depth: f64) -> DepthScale {
        let factor = |table: &Table| if table.is_empty() { 1.0 } else { table.evaluate(depth) };
        let threshold_factor = |label: &str, table: &Table| {
            let value = factor(table);
            if value > 0.0 {
                value
            } else {
                error!("{} depth correction at z={} is not positive ({}), ignoring it", label, depth, value);
                1.0
            }
        };
        DepthScale {
            resolution: ResolutionScale {
                peak1: factor(&self.peak1),
                width1: factor(&self.width1),
                peak2: factor(&self.peak2),
                width2: factor(&self.width2),
                ratio: factor(&self.ratio),
            },
            trigger: threshold_factor("trigger threshold", &self.trigger_threshold),
            noise: threshold_factor("noise threshold", &self.noise_threshold),
        }
    }
}

/// Double-sided strip detector with depth resolution and optional charge
/// diffusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strip3D {
    pub layout: StripLayout,
    /// Diffusion width per square root of drift length. Zero disables
    /// diffusion.
    #[serde(default)]
    pub drift_constant: f64,
    #[serde(default = "default_energy_per_electron")]
    pub energy_per_electron: f64,
    /// Depth resolution (cm) over energy.
    #[serde(default)]
    pub depth_resolution: Option<Table>,
    /// Spread of the depth resolution over energy.
    #[serde(default)]
    pub depth_resolution_sigma: Option<Table>,
    /// Below this energy no depth is measured.
    #[serde(default)]
    pub depth_resolution_threshold: f64,
    #[serde(default)]
    pub depth_correction: DepthCorrection,
    /// Angular resolution (rad) over energy of a directional strip detector.
    #[serde(default)]
    pub direction_resolution: Option<Table>,
}

impl Strip3D {
    pub fn new(layout: StripLayout) -> Self {
        Self {
            layout,
            drift_constant: 0.0,
            energy_per_electron: DEFAULT_ENERGY_PER_ELECTRON,
            depth_resolution: None,
            depth_resolution_sigma: None,
            depth_resolution_threshold: 0.0,
            depth_correction: DepthCorrection::default(),
            direction_resolution: None,
        }
    }

    pub fn with_drift(mut self, drift_constant: f64, energy_per_electron: f64) -> Self {
        self.drift_constant = drift_constant;
        self.energy_per_electron = energy_per_electron;
        self
    }

    pub fn with_depth_resolution(mut self, resolution: Table, sigma: Option<Table>) -> Self {
        self.depth_resolution = Some(resolution);
        self.depth_resolution_sigma = sigma;
        self
    }

    pub fn is_directional(&self) -> bool {
        self.direction_resolution.is_some()
    }

    pub fn validate(&mut self, detector: &str) -> EngineResult<()> {
        self.layout.validate(detector)?;
        let invalid = |msg: &str| Err(EngineError::InvalidConfig(format!("detector {}: {}", detector, msg)));
        if self.drift_constant < 0.0 {
            return invalid("the drift constant must not be negative");
        }
        if self.energy_per_electron <= 0.0 {
            return invalid("the energy per electron must be positive");
        }
        if self.depth_resolution_threshold < 0.0 {
            return invalid("the depth resolution threshold must not be negative");
        }
        let tables = [
            ("depth resolution", &self.depth_resolution),
            ("depth resolution sigma", &self.depth_resolution_sigma),
            ("direction resolution", &self.direction_resolution),
        ];
        for (label, table) in tables {
            if matches!(table, Some(t) if t.is_empty()) {
                return invalid(&format!("{} has no data points", label));
            }
        }
        Ok(())
    }

    pub fn depth_scale(&self, depth: f64) -> DepthScale {
        self.depth_correction.scale(depth)
    }

    pub(crate) fn grid<R: Rng + ?Sized>(
        &self,
        detector: &str,
        pos: Vector3,
        energy: f64,
        time: f64,
        rng: &mut R,
    ) -> Vec<GridPoint> {
        if self.drift_constant != 0.0 {
            return diffuse(
                detector,
                &self.layout,
                Drift {
                    constant: self.drift_constant,
                    energy_per_electron: self.energy_per_electron,
                },
                pos,
                energy,
                time,
                GridPointKind::Voxel,
                rng,
            );
        }
        match self.layout.discretize(detector, pos, false) {
            Some((point, local)) => vec![point.with_signal(Vector3::new(0.0, 0.0, local.z), energy, time)],
            None => Vec::new(),
        }
    }

    /// Failure, depth corrected resolution, overflow, depth, time and
    /// calibration, in that order.
    pub(crate) fn noise<R: Rng + ?Sized>(&self, response: &Response, signal: &Signal, rng: &mut R) -> Signal {
        let mut out = signal.clone();
        if !response.noise_active {
            return out;
        }
        if response.fails(rng) {
            out.energy = 0.0;
            return out;
        }
        let scale = self.depth_scale(out.position.z);
        out.energy = response.energy_resolution.sample(out.energy, &scale.resolution, rng);
        let (energy, overflowed) = response.apply_overflow(out.energy, rng);
        out.energy = energy;
        out.position.z = self.noise_depth(out.position.z, out.energy, overflowed, rng);
        out.time = response.time_resolution.sample(out.time, out.energy, rng);
        out.energy = response.calibrate(out.energy);
        out
    }

    fn noise_depth<R: Rng + ?Sized>(&self, depth: f64, energy: f64, overflowed: bool, rng: &mut R) -> f64 {
        let table = match &self.depth_resolution {
            Some(table) if !overflowed && energy >= self.depth_resolution_threshold => table,
            _ => return 0.0,
        };

        let mean = table.evaluate(energy);
        let spread = self
            .depth_resolution_sigma
            .as_ref()
            .map_or(0.0, |t| t.evaluate(energy));
        let sigma = draw_depth_sigma(mean, spread, rng);

        let half = self.layout.half_thickness();
        if sigma <= 0.0 {
            return depth.clamp(-half, half);
        }
        for _ in 0..MAX_DEPTH_DRAWS {
            let z = StatsHelper::gaus(rng, depth, sigma);
            if (-half..=half).contains(&z) {
                return z;
            }
        }
        warn!(
            "no depth inside [{}, {}] after {} draws around {} with sigma {}, clamping",
            -half, half, MAX_DEPTH_DRAWS, depth, sigma
        );
        depth.clamp(-half, half)
    }

    /// Smears a reconstructed direction within the xy plane. The z
    /// component is kept.
    pub fn noise_direction<R: Rng + ?Sized>(&self, direction: Vector3, energy: f64, rng: &mut R) -> Vector3 {
        let Some(table) = &self.direction_resolution else {
            return direction;
        };
        let angle = StatsHelper::gaus(rng, 0.0, table.evaluate(energy));
        let (sin, cos) = angle.sin_cos();
        Vector3::new(
            direction.x * cos - direction.y * sin,
            direction.x * sin + direction.y * cos,
            direction.z,
        )
    }
}

/// Draws the depth resolution for one hit. After a few negative draws the
/// mean resolution is used.
fn draw_depth_sigma<R: Rng + ?Sized>(mean: f64, spread: f64, rng: &mut R) -> f64 {
    (0..DEPTH_RESOLUTION_DRAWS)
        .map(|_| StatsHelper::gaus(rng, mean, spread))
        .find(|s| *s >= 0.0)
        .unwrap_or(mean)
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Drift {
    pub constant: f64,
    pub energy_per_electron: f64,
}

/// Splits a deposit into charge carriers, drifts each one towards the
/// readout plane and collects them on strips. Carriers leaving the
/// sensitive area are lost.
pub(crate) fn diffuse<R: Rng + ?Sized>(
    detector: &str,
    layout: &StripLayout,
    drift: Drift,
    pos: Vector3,
    energy: f64,
    time: f64,
    kind: GridPointKind,
    rng: &mut R,
) -> Vec<GridPoint> {
    let Some(hit) = layout.locate(detector, pos) else {
        return Vec::new();
    };
    match hit.footprint {
        Footprint::Outside => {
            error!("hit outside detector {}: {}", detector, hit.local);
            return Vec::new();
        }
        Footprint::GuardRing => return Vec::new(),
        Footprint::Sensitive => {}
    }

    let carriers = ((energy / drift.energy_per_electron).floor() as usize).max(1);
    let carrier_energy = energy / carriers as f64;

    let mut drift_length = hit.local.z + layout.half_thickness();
    if drift_length < 0.0 {
        error!(
            "detector {}: negative drift length {} at {}, using 0",
            detector, drift_length, hit.local
        );
        drift_length = 0.0;
    }
    let sigma = drift.constant * drift_length.sqrt();

    let mut points: Vec<GridPoint> = Vec::new();
    for _ in 0..carriers {
        let (dx, dy) = StatsHelper::normal_pair(rng);
        let local = Vector3::new(hit.local.x + dx * sigma, hit.local.y + dy * sigma, hit.local.z);
        if layout.footprint(local) != Footprint::Sensitive {
            continue;
        }
        let Some((x, y)) = layout.channel(detector, &hit, local) else {
            continue;
        };
        let point = GridPoint::new(x, y, 0, kind).with_signal(Vector3::new(0.0, 0.0, hit.local.z), carrier_energy, time);
        match points.iter_mut().find(|p| p.same_channel(&point)) {
            Some(existing) => {
                existing.merge(&point);
            }
            None => points.push(point),
        }
    }
    points
}
