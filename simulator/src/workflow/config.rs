use crate::generator::profile::SourceConfig;
use anyhow::{bail, Context};
use detcore::detector::Detector;
use detcore::geometry::{Geometry, System};
use detcore::trigger::{Trigger, TriggerBasic, TriggerMap, TriggerUnit};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Debug switches of the trigger unit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerUnitConfig {
    pub always_assume_trigger: bool,
    pub always_assume_veto: bool,
    pub ignore_vetoes: bool,
    pub ignore_thresholds: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_events")]
    pub events: u64,
    #[serde(default)]
    pub system: System,
    pub detectors: Vec<Detector>,
    #[serde(default)]
    pub trigger_unit: TriggerUnitConfig,
    /// Basic triggers, mutually exclusive with `trigger_map`.
    #[serde(default)]
    pub triggers: Vec<TriggerBasic>,
    /// Trigger map in its text form (`DT`, `TV`, `TN`, `VT` lines).
    #[serde(default)]
    pub trigger_map: Option<String>,
    pub source: SourceConfig,
}

fn default_events() -> u64 {
    1000
}

impl SimulationConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading simulation config {}", path_ref.display()))?;
        let config: SimulationConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing simulation config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn geometry(&self) -> anyhow::Result<Geometry> {
        Geometry::new(self.detectors.clone(), self.system.clone()).context("building detector geometry")
    }

    pub fn trigger_unit(&self) -> anyhow::Result<TriggerUnit> {
        let triggers = match (&self.trigger_map, self.triggers.is_empty()) {
            (Some(_), false) => bail!("either basic triggers or a trigger map can be configured, not both"),
            (Some(text), true) => {
                vec![Trigger::Map(TriggerMap::parse("TriggerMap", text).context("parsing trigger map")?)]
            }
            (None, _) => self.triggers.iter().cloned().map(Trigger::Basic).collect(),
        };
        let mut unit = TriggerUnit::new(triggers);
        unit.always_assume_trigger = self.trigger_unit.always_assume_trigger;
        unit.always_assume_veto = self.trigger_unit.always_assume_veto;
        unit.ignore_vetoes = self.trigger_unit.ignore_vetoes;
        unit.ignore_thresholds = self.trigger_unit.ignore_thresholds;
        Ok(unit)
    }
}
