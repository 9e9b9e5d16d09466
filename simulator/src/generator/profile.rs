use anyhow::{bail, Context};
use detcore::geometry::{Placement, Vector3, VolumeSequence};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Synthetic deposits standing in for a particle transport simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub detector: String,
    pub volume: String,
    /// keV
    pub energy_min: f64,
    /// keV
    pub energy_max: f64,
    pub hits_per_event: usize,
    /// Deposits are spread uniformly over +/- this extent around the
    /// detector centre.
    pub half_extent: Vector3,
    /// Seconds between consecutive events.
    pub event_spacing: f64,
    /// Outermost placement first.
    pub placements: Vec<Placement>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            detector: String::new(),
            volume: String::new(),
            energy_min: 100.0,
            energy_max: 1000.0,
            hits_per_event: 1,
            half_extent: Vector3::new(1.0, 1.0, 0.5),
            event_spacing: 1e-3,
            placements: Vec::new(),
        }
    }
}

impl SourceConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.detector.is_empty() {
            bail!("the source needs a target detector");
        }
        if !(self.energy_min > 0.0 && self.energy_min <= self.energy_max) {
            bail!(
                "source energy range [{}, {}] keV is empty or not positive",
                self.energy_min,
                self.energy_max
            );
        }
        if self.hits_per_event == 0 {
            bail!("the source has to create at least one hit per event");
        }
        Ok(())
    }

    pub fn sequence(&self) -> VolumeSequence {
        let volume = if self.volume.is_empty() {
            format!("{}_1", self.detector)
        } else {
            self.volume.clone()
        };
        self.placements
            .iter()
            .cloned()
            .fold(VolumeSequence::new(self.detector.clone(), volume), VolumeSequence::with_placement)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceHit {
    /// World frame.
    pub position: Vector3,
    pub energy: f64,
    pub time: f64,
    pub sequence: VolumeSequence,
}

pub struct HitGenerator {
    config: SourceConfig,
    sequence: VolumeSequence,
    rng: StdRng,
}

impl HitGenerator {
    pub fn new(config: SourceConfig, seed: u64) -> anyhow::Result<Self> {
        config.validate().context("validating source")?;
        let sequence = config.sequence();
        Ok(Self {
            config,
            sequence,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn event_time(&self, index: u64) -> f64 {
        index as f64 * self.config.event_spacing
    }

    pub fn next_event(&mut self) -> Vec<SourceHit> {
        let extent = self.config.half_extent;
        (0..self.config.hits_per_event)
            .map(|_| {
                let local = Vector3::new(
                    self.spread(extent.x),
                    self.spread(extent.y),
                    self.spread(extent.z),
                );
                let energy = if self.config.energy_max > self.config.energy_min {
                    self.rng.gen_range(self.config.energy_min..self.config.energy_max)
                } else {
                    self.config.energy_min
                };
                SourceHit {
                    position: self.sequence.to_world_frame(local),
                    energy,
                    time: 0.0,
                    sequence: self.sequence.clone(),
                }
            })
            .collect()
    }

    fn spread(&mut self, half: f64) -> f64 {
        if half > 0.0 {
            self.rng.gen_range(-half..half)
        } else {
            0.0
        }
    }
}
