use crate::detector::{Detector, DetectorType};
use crate::geometry::{Geometry, VolumeSequence};
use crate::grid::GridPoint;
use crate::prelude::{EngineError, EngineResult};
use crate::trigger::{Trigger, TriggerChannel};
use log::{debug, error, warn};
use rand::Rng;

/// Collects the triggers of a setup and decides whether an event is kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerUnit {
    pub always_assume_trigger: bool,
    pub always_assume_veto: bool,
    pub ignore_vetoes: bool,
    pub ignore_thresholds: bool,
    triggers: Vec<Trigger>,
}

impl TriggerUnit {
    pub fn new(triggers: Vec<Trigger>) -> Self {
        Self {
            triggers,
            ..Default::default()
        }
    }

    pub fn add_trigger(&mut self, trigger: Trigger) {
        self.triggers.push(trigger);
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    pub fn reset(&mut self) {
        for trigger in &mut self.triggers {
            trigger.reset();
        }
    }

    /// Registers a channel of `detector` that passes its trigger threshold.
    /// Returns whether any trigger took it.
    pub fn add_hit<R: Rng + ?Sized>(
        &mut self,
        energy: f64,
        detector: &Detector,
        point: &GridPoint,
        sequence: &VolumeSequence,
        rng: &mut R,
    ) -> bool {
        if !self.ignore_thresholds && !detector.is_above_trigger_threshold(energy, point, rng) {
            return false;
        }
        self.register(detector, sequence, TriggerChannel::Normal)
    }

    /// Registers a guard ring channel of `detector`, judged against the
    /// threshold of its guard ring.
    pub fn add_guard_ring_hit<R: Rng + ?Sized>(
        &mut self,
        energy: f64,
        detector: &Detector,
        point: &GridPoint,
        sequence: &VolumeSequence,
        rng: &mut R,
    ) -> bool {
        let (ring, channel) = match detector.guard_ring() {
            Some(ring) => (ring, TriggerChannel::GuardRing),
            None if detector.detector_type() == DetectorType::GuardRing => (detector, TriggerChannel::Normal),
            None => {
                error!("detector {} has no guard ring, dropping guard ring hit", detector.name);
                return false;
            }
        };
        if !self.ignore_thresholds && !ring.is_above_trigger_threshold(energy, point, rng) {
            return false;
        }
        self.register(detector, sequence, channel)
    }

    fn register(&mut self, detector: &Detector, sequence: &VolumeSequence, channel: TriggerChannel) -> bool {
        let mut added = false;
        for trigger in &mut self.triggers {
            if trigger.add_hit(detector, sequence, channel) {
                debug!("hit in {} added to trigger {}", detector.name, trigger.name());
                added = true;
            }
        }
        added
    }

    pub fn has_triggered(&self) -> bool {
        if self.always_assume_trigger {
            return true;
        }
        if self.always_assume_veto {
            return false;
        }
        if self.triggers.is_empty() {
            return true;
        }
        if self.triggers.iter().any(Trigger::has_non_vetoably_triggered) {
            return true;
        }
        if !self.ignore_vetoes && self.triggers.iter().any(Trigger::has_vetoed) {
            return false;
        }
        self.triggers.iter().any(Trigger::has_triggered)
    }

    pub fn has_vetoed(&self) -> bool {
        if self.always_assume_trigger {
            return false;
        }
        if self.always_assume_veto {
            return true;
        }
        if self.ignore_vetoes || self.triggers.is_empty() {
            return false;
        }
        if self.triggers.iter().any(Trigger::has_non_vetoably_triggered) {
            return false;
        }
        self.triggers.iter().any(Trigger::has_vetoed)
    }

    /// Names of the triggers raised by the current event.
    pub fn trigger_names(&self) -> Vec<String> {
        self.triggers
            .iter()
            .filter(|t| t.has_triggered())
            .map(|t| t.name().to_string())
            .collect()
    }

    /// Names of the vetoes raised by the current event.
    pub fn veto_names(&self) -> Vec<String> {
        self.triggers
            .iter()
            .filter(|t| t.has_vetoed())
            .map(|t| t.name().to_string())
            .collect()
    }

    pub fn validate(&mut self, geometry: &Geometry) -> EngineResult<()> {
        if let Some(first) = self.triggers.first() {
            let class = first.class();
            if let Some(other) = self.triggers.iter().find(|t| t.class() != class) {
                return Err(EngineError::InvalidConfig(format!(
                    "trigger {} is a {} trigger, but {} is a {} trigger: trigger classes cannot be mixed",
                    other.name(),
                    other.class(),
                    first.name(),
                    class
                )));
            }
        }

        let ignore_vetoes = self.ignore_vetoes;
        for trigger in &mut self.triggers {
            trigger.validate(geometry)?;
            if ignore_vetoes {
                trigger.set_ignore_vetoes(true);
            }
        }

        for detector in geometry.detectors() {
            if detector.detector_type() == DetectorType::GuardRing {
                continue;
            }
            let referenced = self.triggers.iter().any(|t| t.applies(detector));
            let positive = self
                .triggers
                .iter()
                .any(|t| t.includes_detector_as_positive_trigger(detector));
            if referenced && !positive && !detector.noise_threshold_equals_trigger_threshold() {
                return Err(EngineError::InvalidConfig(format!(
                    "detector {} only appears in vetoes and therefore needs its noise threshold equal to its trigger threshold",
                    detector.name
                )));
            }
            if !referenced && !self.triggers.is_empty() {
                warn!("no trigger criteria for detector {}: its hits can never trigger", detector.name);
            }
        }
        self.reset();
        Ok(())
    }
}
