use crate::detector::{Detector, DetectorType};
use crate::geometry::{Geometry, VolumeSequence};
use crate::prelude::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

/// Which readout of a detector a hit or a trigger entry refers to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerChannel {
    #[default]
    Normal,
    GuardRing,
}

/// Detectors addressed by a trigger entry: all detectors of a type, or one
/// detector by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerTarget {
    Type(DetectorType),
    Name(String),
}

impl TriggerTarget {
    fn matches(&self, detector: &Detector) -> bool {
        match self {
            TriggerTarget::Type(kind) => *kind == detector.detector_type(),
            TriggerTarget::Name(name) => *name == detector.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEntry {
    pub target: TriggerTarget,
    pub hits: u32,
    #[serde(default)]
    pub channel: TriggerChannel,
}

impl TriggerEntry {
    pub fn new(target: TriggerTarget, hits: u32) -> Self {
        Self {
            target,
            hits,
            channel: TriggerChannel::Normal,
        }
    }

    pub fn guard_ring(target: TriggerTarget, hits: u32) -> Self {
        Self {
            target,
            hits,
            channel: TriggerChannel::GuardRing,
        }
    }
}

fn by_detector_default() -> bool {
    true
}

/// Coincidence condition over a list of detector entries. Every entry has to
/// see its required number of hits. A veto condition rejects the event
/// instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerBasic {
    pub name: String,
    #[serde(default)]
    pub is_veto: bool,
    /// Count distinct detector instances instead of channels.
    #[serde(default = "by_detector_default")]
    pub trigger_by_detector: bool,
    #[serde(default)]
    pub ignore_vetoes: bool,
    pub entries: Vec<TriggerEntry>,
    #[serde(skip)]
    channel_hits: Vec<u32>,
    #[serde(skip)]
    instances: Vec<Vec<VolumeSequence>>,
}

impl TriggerBasic {
    pub fn new(name: impl Into<String>, entries: Vec<TriggerEntry>) -> Self {
        let mut trigger = Self {
            name: name.into(),
            is_veto: false,
            trigger_by_detector: true,
            ignore_vetoes: false,
            entries,
            channel_hits: Vec::new(),
            instances: Vec::new(),
        };
        trigger.reset();
        trigger
    }

    pub fn veto(name: impl Into<String>, entries: Vec<TriggerEntry>) -> Self {
        let mut trigger = Self::new(name, entries);
        trigger.is_veto = true;
        trigger
    }

    pub fn by_channel(mut self) -> Self {
        self.trigger_by_detector = false;
        self
    }

    pub fn reset(&mut self) {
        self.channel_hits = vec![0; self.entries.len()];
        self.instances = vec![Vec::new(); self.entries.len()];
    }

    /// Registers a hit in `detector`. Returns whether any entry took it.
    pub fn add_hit(&mut self, detector: &Detector, sequence: &VolumeSequence, channel: TriggerChannel) -> bool {
        if self.channel_hits.len() != self.entries.len() {
            self.reset();
        }
        let mut added = false;
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.channel != channel || !entry.target.matches(detector) {
                continue;
            }
            added = true;
            if self.trigger_by_detector {
                if !self.instances[i].iter().any(|s| s.has_same_detector(sequence)) {
                    self.instances[i].push(sequence.clone());
                }
                break;
            }
            self.channel_hits[i] += 1;
        }
        added
    }

    fn count(&self, entry: usize) -> u32 {
        if self.trigger_by_detector {
            self.instances.get(entry).map_or(0, |v| v.len() as u32)
        } else {
            self.channel_hits.get(entry).copied().unwrap_or(0)
        }
    }

    fn is_satisfied(&self) -> bool {
        !self.entries.is_empty()
            && self
                .entries
                .iter()
                .enumerate()
                .all(|(i, entry)| self.count(i) >= entry.hits)
    }

    pub fn has_triggered(&self) -> bool {
        !self.is_veto && self.is_satisfied()
    }

    pub fn has_vetoed(&self) -> bool {
        self.is_veto && !self.ignore_vetoes && self.is_satisfied()
    }

    pub fn applies(&self, detector: &Detector) -> bool {
        self.entries.iter().any(|e| e.target.matches(detector))
    }

    pub fn includes_detector_as_positive_trigger(&self, detector: &Detector) -> bool {
        !self.is_veto
            && self
                .entries
                .iter()
                .any(|e| e.channel == TriggerChannel::Normal && e.hits > 0 && e.target.matches(detector))
    }

    pub fn validate(&mut self, geometry: &Geometry) -> EngineResult<()> {
        let invalid = |msg: String| Err(EngineError::InvalidConfig(format!("trigger {}: {}", self.name, msg)));
        if self.entries.is_empty() {
            return invalid("no triggering detectors are defined".into());
        }
        let by_type = self.entries.iter().filter(|e| matches!(e.target, TriggerTarget::Type(_))).count();
        if by_type != 0 && by_type != self.entries.len() {
            return invalid("triggering detectors and triggering detector types cannot be mixed".into());
        }
        for (i, entry) in self.entries.iter().enumerate() {
            if self.entries[i + 1..]
                .iter()
                .any(|other| other.target == entry.target && other.channel == entry.channel)
            {
                return invalid(format!("{:?} appears twice", entry.target));
            }
            if entry.hits == 0 {
                return invalid(format!("{:?} requires zero hits", entry.target));
            }
            let matching: Vec<&Detector> = geometry
                .detectors()
                .iter()
                .filter(|d| entry.target.matches(d))
                .collect();
            if let TriggerTarget::Name(name) = &entry.target {
                if matching.is_empty() {
                    return invalid(format!("unknown detector {}", name));
                }
            }
            if entry.channel == TriggerChannel::GuardRing && !matching.iter().any(|d| d.has_guard_ring()) {
                return invalid(format!("guard ring trigger without guard ring detector: {:?}", entry.target));
            }
        }
        self.reset();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::tests::strip_2d;
    use crate::detector::{DetectorKind, Structure, StripLayout};
    use crate::geometry::{System, Vector3};
    use crate::prelude::Validate;

    fn geometry() -> Geometry {
        let mut ringed = Detector::new(
            "Ringed",
            DetectorKind::Strip2D(
                StripLayout::new(Structure::single(Vector3::new(1.0, 1.0, 0.5)), 10, 10).with_guard_ring(0.1, 0.1),
            ),
        );
        ringed.validate().unwrap();
        Geometry::new(vec![strip_2d("A", 0.0), strip_2d("B", 0.0), ringed], System::default()).unwrap()
    }

    fn named(name: &str, hits: u32) -> TriggerEntry {
        TriggerEntry::new(TriggerTarget::Name(name.into()), hits)
    }

    #[test]
    fn by_detector_counts_instances_once() {
        let geometry = geometry();
        let a = geometry.detector("A").unwrap();
        let mut trigger = TriggerBasic::new("A2", vec![named("A", 2)]);
        trigger.validate(&geometry).unwrap();
        let first = VolumeSequence::new("A", "A_1");
        assert!(trigger.add_hit(a, &first, TriggerChannel::Normal));
        assert!(trigger.add_hit(a, &first, TriggerChannel::Normal));
        assert!(!trigger.has_triggered());
        assert!(trigger.add_hit(a, &VolumeSequence::new("A", "A_2"), TriggerChannel::Normal));
        assert!(trigger.has_triggered());
        trigger.reset();
        assert!(!trigger.has_triggered());
    }

    #[test]
    fn by_channel_counts_every_hit() {
        let geometry = geometry();
        let a = geometry.detector("A").unwrap();
        let mut trigger = TriggerBasic::new("A2", vec![named("A", 2)]).by_channel();
        trigger.validate(&geometry).unwrap();
        let seq = VolumeSequence::new("A", "A_1");
        trigger.add_hit(a, &seq, TriggerChannel::Normal);
        trigger.add_hit(a, &seq, TriggerChannel::Normal);
        assert!(trigger.has_triggered());
        assert!(!trigger.has_vetoed());
    }

    #[test]
    fn coincidence_needs_every_entry() {
        let geometry = geometry();
        let mut trigger = TriggerBasic::new("AB", vec![named("A", 1), named("B", 1)]);
        trigger.validate(&geometry).unwrap();
        trigger.add_hit(geometry.detector("A").unwrap(), &VolumeSequence::new("A", "A_1"), TriggerChannel::Normal);
        assert!(!trigger.has_triggered());
        trigger.add_hit(geometry.detector("B").unwrap(), &VolumeSequence::new("B", "B_1"), TriggerChannel::Normal);
        assert!(trigger.has_triggered());
    }

    #[test]
    fn veto_only_vetoes() {
        let geometry = geometry();
        let mut veto = TriggerBasic::veto("VA", vec![named("A", 1)]);
        veto.validate(&geometry).unwrap();
        veto.add_hit(geometry.detector("A").unwrap(), &VolumeSequence::new("A", "A_1"), TriggerChannel::Normal);
        assert!(veto.has_vetoed());
        assert!(!veto.has_triggered());
        veto.ignore_vetoes = true;
        assert!(!veto.has_vetoed());
        assert!(!veto.includes_detector_as_positive_trigger(geometry.detector("A").unwrap()));
        assert!(veto.applies(geometry.detector("A").unwrap()));
    }

    #[test]
    fn type_entries_match_all_detectors_of_the_type() {
        let geometry = geometry();
        let mut trigger = TriggerBasic::new("Any", vec![TriggerEntry::new(TriggerTarget::Type(DetectorType::Strip2D), 1)]);
        trigger.validate(&geometry).unwrap();
        assert!(trigger.add_hit(geometry.detector("B").unwrap(), &VolumeSequence::new("B", "B_1"), TriggerChannel::Normal));
        assert!(!trigger.add_hit(geometry.detector("B").unwrap(), &VolumeSequence::new("B", "B_1"), TriggerChannel::GuardRing));
        assert!(trigger.has_triggered());
    }

    #[test]
    fn validation_errors() {
        let geometry = geometry();
        let mixed = vec![named("A", 1), TriggerEntry::new(TriggerTarget::Type(DetectorType::Strip2D), 1)];
        assert!(TriggerBasic::new("Mixed", mixed).validate(&geometry).is_err());
        assert!(TriggerBasic::new("Empty", Vec::new()).validate(&geometry).is_err());
        assert!(TriggerBasic::new("Twice", vec![named("A", 1), named("A", 2)]).validate(&geometry).is_err());
        assert!(TriggerBasic::new("Unknown", vec![named("Z", 1)]).validate(&geometry).is_err());
        let no_ring = vec![TriggerEntry::guard_ring(TriggerTarget::Name("A".into()), 1)];
        assert!(TriggerBasic::veto("NoRing", no_ring).validate(&geometry).is_err());
        let ring = vec![TriggerEntry::guard_ring(TriggerTarget::Name("Ringed".into()), 1)];
        assert!(TriggerBasic::veto("Ring", ring).validate(&geometry).is_ok());
    }
}
