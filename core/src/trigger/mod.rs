//! Trigger and veto decisions on the channels of one event.

pub mod basic;
pub mod map;
pub mod unit;

pub use basic::{TriggerBasic, TriggerChannel, TriggerEntry, TriggerTarget};
pub use map::{HitCondition, TriggerMap, TriggerMode, TriggerRow};
pub use unit::TriggerUnit;

use crate::detector::Detector;
use crate::geometry::{Geometry, VolumeSequence};
use crate::prelude::EngineResult;

#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    Basic(TriggerBasic),
    Map(TriggerMap),
}

impl Trigger {
    pub fn name(&self) -> &str {
        match self {
            Trigger::Basic(t) => &t.name,
            Trigger::Map(t) => &t.name,
        }
    }

    pub fn class(&self) -> &'static str {
        match self {
            Trigger::Basic(_) => "basic",
            Trigger::Map(_) => "universal",
        }
    }

    pub fn reset(&mut self) {
        match self {
            Trigger::Basic(t) => t.reset(),
            Trigger::Map(t) => t.reset(),
        }
    }

    pub fn add_hit(&mut self, detector: &Detector, sequence: &VolumeSequence, channel: TriggerChannel) -> bool {
        match self {
            Trigger::Basic(t) => t.add_hit(detector, sequence, channel),
            Trigger::Map(t) => t.add_hit(detector, channel),
        }
    }

    pub fn has_non_vetoably_triggered(&self) -> bool {
        match self {
            Trigger::Basic(_) => false,
            Trigger::Map(t) => t.has_non_vetoably_triggered(),
        }
    }

    pub fn has_triggered(&self) -> bool {
        match self {
            Trigger::Basic(t) => t.has_triggered(),
            Trigger::Map(t) => t.has_triggered(),
        }
    }

    pub fn has_vetoed(&self) -> bool {
        match self {
            Trigger::Basic(t) => t.has_vetoed(),
            Trigger::Map(t) => t.has_vetoed(),
        }
    }

    pub fn applies(&self, detector: &Detector) -> bool {
        match self {
            Trigger::Basic(t) => t.applies(detector),
            Trigger::Map(t) => t.applies(detector),
        }
    }

    pub fn includes_detector_as_positive_trigger(&self, detector: &Detector) -> bool {
        match self {
            Trigger::Basic(t) => t.includes_detector_as_positive_trigger(detector),
            Trigger::Map(t) => t.includes_detector_as_positive_trigger(detector),
        }
    }

    pub fn set_ignore_vetoes(&mut self, ignore: bool) {
        match self {
            Trigger::Basic(t) => t.ignore_vetoes = ignore,
            Trigger::Map(t) => t.ignore_vetoes = ignore,
        }
    }

    pub fn validate(&mut self, geometry: &Geometry) -> EngineResult<()> {
        match self {
            Trigger::Basic(t) => t.validate(geometry),
            Trigger::Map(t) => t.validate(geometry),
        }
    }
}
