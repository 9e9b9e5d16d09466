use crate::detector::{guard_ring_name, Detector};
use crate::geometry::Geometry;
use crate::prelude::{EngineError, EngineResult};
use crate::trigger::basic::TriggerChannel;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    VetoableTrigger,
    NonVetoableTrigger,
    Veto,
}

impl TriggerMode {
    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "TV" => Some(TriggerMode::VetoableTrigger),
            "TN" => Some(TriggerMode::NonVetoableTrigger),
            "VT" => Some(TriggerMode::Veto),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitCondition {
    pub hits: u32,
    /// `n+`: at least n hits. Otherwise exactly n.
    pub allow_more: bool,
}

impl HitCondition {
    fn is_met(&self, count: u32) -> bool {
        if self.allow_more {
            count >= self.hits
        } else {
            count == self.hits
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRow {
    pub mode: TriggerMode,
    /// One condition per detector of the map, in declaration order.
    pub conditions: Vec<HitCondition>,
}

/// Table of trigger, non-vetoable trigger and veto rows over a fixed list of
/// detectors.
///
/// ```text
/// DT GeD CsI
/// TV 1+ 0+
/// TN 2+ 0+
/// VT 0+ 1+
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerMap {
    pub name: String,
    pub ignore_vetoes: bool,
    detectors: Vec<String>,
    rows: Vec<TriggerRow>,
    counts: Vec<u32>,
}

impl TriggerMap {
    pub fn new(name: impl Into<String>, detectors: Vec<String>) -> Self {
        let counts = vec![0; detectors.len()];
        Self {
            name: name.into(),
            ignore_vetoes: false,
            detectors,
            rows: Vec::new(),
            counts,
        }
    }

    pub fn add_row(&mut self, mode: TriggerMode, conditions: Vec<HitCondition>) -> EngineResult<()> {
        if conditions.len() != self.detectors.len() {
            return Err(EngineError::InvalidConfig(format!(
                "trigger map {}: expected {} hit counts, got {}",
                self.name,
                self.detectors.len(),
                conditions.len()
            )));
        }
        self.rows.push(TriggerRow { mode, conditions });
        Ok(())
    }

    pub fn parse(name: impl Into<String>, text: &str) -> EngineResult<Self> {
        let mut map = TriggerMap::new(name, Vec::new());
        let mut declared = false;
        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.split('#').next().unwrap_or("").trim();
            let mut tokens = line.split_whitespace();
            let Some(keyword) = tokens.next() else {
                continue;
            };
            let err = |msg: String| EngineError::InvalidConfig(format!("trigger map {} line {}: {}", map.name, line_no, msg));
            if keyword == "DT" {
                if declared {
                    return Err(err("detectors are declared twice".into()));
                }
                let detectors: Vec<String> = tokens.map(str::to_string).collect();
                if detectors.is_empty() {
                    return Err(err("no detectors declared".into()));
                }
                map.detectors = detectors;
                map.counts = vec![0; map.detectors.len()];
                declared = true;
                continue;
            }
            let Some(mode) = TriggerMode::from_keyword(keyword) else {
                return Err(err(format!("unknown keyword {}", keyword)));
            };
            if !declared {
                return Err(err("a DT line has to come before the first trigger row".into()));
            }
            let conditions = tokens
                .map(|token| {
                    let (digits, allow_more) = match token.strip_suffix('+') {
                        Some(digits) => (digits, true),
                        None => (token, false),
                    };
                    digits
                        .parse::<u32>()
                        .map(|hits| HitCondition { hits, allow_more })
                        .map_err(|_| err(format!("cannot parse hit count {}", token)))
                })
                .collect::<EngineResult<Vec<_>>>()?;
            if conditions.len() != map.detectors.len() {
                return Err(err(format!(
                    "expected {} hit counts, got {}",
                    map.detectors.len(),
                    conditions.len()
                )));
            }
            map.rows.push(TriggerRow { mode, conditions });
        }
        if !declared {
            return Err(EngineError::InvalidConfig(format!("trigger map {}: no detectors declared", map.name)));
        }
        Ok(map)
    }

    pub fn detectors(&self) -> &[String] {
        &self.detectors
    }

    pub fn rows(&self) -> &[TriggerRow] {
        &self.rows
    }

    pub fn reset(&mut self) {
        self.counts = vec![0; self.detectors.len()];
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.detectors.iter().position(|d| d == name)
    }

    fn column_of(&self, detector: &Detector, channel: TriggerChannel) -> Option<usize> {
        match channel {
            TriggerChannel::Normal => self.column(&detector.name),
            TriggerChannel::GuardRing => self.column(&guard_ring_name(&detector.name)),
        }
    }

    pub fn add_hit(&mut self, detector: &Detector, channel: TriggerChannel) -> bool {
        match self.column_of(detector, channel) {
            Some(column) => {
                self.counts[column] += 1;
                true
            }
            None => false,
        }
    }

    fn any_row_met(&self, mode: TriggerMode) -> bool {
        self.rows.iter().filter(|r| r.mode == mode).any(|row| {
            row.conditions
                .iter()
                .zip(&self.counts)
                .all(|(condition, count)| condition.is_met(*count))
        })
    }

    pub fn has_non_vetoably_triggered(&self) -> bool {
        self.any_row_met(TriggerMode::NonVetoableTrigger)
    }

    pub fn has_triggered(&self) -> bool {
        if self.has_non_vetoably_triggered() {
            return true;
        }
        self.any_row_met(TriggerMode::VetoableTrigger)
            && (self.ignore_vetoes || !self.any_row_met(TriggerMode::Veto))
    }

    pub fn has_vetoed(&self) -> bool {
        if self.ignore_vetoes || self.has_non_vetoably_triggered() {
            return false;
        }
        self.any_row_met(TriggerMode::Veto)
    }

    pub fn has_veto_rows(&self) -> bool {
        self.rows.iter().any(|r| r.mode == TriggerMode::Veto)
    }

    pub fn applies(&self, detector: &Detector) -> bool {
        self.column(&detector.name).is_some() || self.column(&guard_ring_name(&detector.name)).is_some()
    }

    pub fn includes_detector_as_positive_trigger(&self, detector: &Detector) -> bool {
        let Some(column) = self.column(&detector.name) else {
            return false;
        };
        self.rows
            .iter()
            .filter(|r| r.mode != TriggerMode::Veto)
            .any(|r| r.conditions[column].hits > 0)
    }

    pub fn validate(&mut self, geometry: &Geometry) -> EngineResult<()> {
        let invalid = |msg: String| Err(EngineError::InvalidConfig(format!("trigger map {}: {}", self.name, msg)));
        if self.rows.is_empty() {
            return invalid("no trigger rows defined".into());
        }
        let mut seen = HashSet::new();
        for name in &self.detectors {
            if !seen.insert(name.as_str()) {
                return invalid(format!("detector {} appears twice", name));
            }
            let known = geometry.detectors().iter().any(|d| {
                d.name == *name || (d.has_guard_ring() && guard_ring_name(&d.name) == *name)
            });
            if !known {
                return invalid(format!("unknown detector {}", name));
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

    const MAP: &str = "
        # name      GeD  CsI
        DT GeD CsI
        TV 1+ 0+
        TN 2+ 0+   # two strips always win
        VT 0+ 1+
    ";

    #[test]
    fn parses_detectors_and_rows() {
        let map = TriggerMap::parse("Universal", MAP).unwrap();
        assert_eq!(map.detectors(), ["GeD".to_string(), "CsI".to_string()]);
        assert_eq!(map.rows().len(), 3);
        assert_eq!(map.rows()[1].mode, TriggerMode::NonVetoableTrigger);
        assert_eq!(
            map.rows()[0].conditions[0],
            HitCondition {
                hits: 1,
                allow_more: true
            }
        );
    }

    #[test]
    fn parse_errors_name_the_line() {
        let err = TriggerMap::parse("M", "DT A B\nTV 1+\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
        assert!(TriggerMap::parse("M", "TV 1\n").is_err());
        assert!(TriggerMap::parse("M", "DT A\nXX 1\n").is_err());
        assert!(TriggerMap::parse("M", "DT A\nTV one\n").is_err());
        assert!(TriggerMap::parse("M", "# nothing\n").is_err());
    }

    #[test]
    fn non_vetoable_trigger_beats_veto() {
        let ged = strip_2d("GeD", 0.0);
        let csi = strip_2d("CsI", 0.0);
        let mut map = TriggerMap::parse("Universal", MAP).unwrap();

        map.add_hit(&ged, TriggerChannel::Normal);
        assert!(map.has_triggered());
        map.add_hit(&csi, TriggerChannel::Normal);
        assert!(map.has_vetoed());
        assert!(!map.has_triggered());

        map.add_hit(&ged, TriggerChannel::Normal);
        assert!(map.has_non_vetoably_triggered());
        assert!(map.has_triggered());
        assert!(!map.has_vetoed());
    }

    #[test]
    fn exact_counts_reject_extra_hits() {
        let ged = strip_2d("GeD", 0.0);
        let mut map = TriggerMap::parse("Exact", "DT GeD\nTV 1\n").unwrap();
        map.add_hit(&ged, TriggerChannel::Normal);
        assert!(map.has_triggered());
        map.add_hit(&ged, TriggerChannel::Normal);
        assert!(!map.has_triggered());
        map.reset();
        assert!(!map.has_triggered());
    }

    #[test]
    fn guard_ring_hits_use_the_ring_column() {
        let ged = strip_2d("GeD", 0.0);
        let mut map = TriggerMap::parse("Ring", "DT GeD GeD_GuardRing\nTV 1+ 0\nVT 0+ 1+\n").unwrap();
        assert!(map.applies(&ged));
        map.add_hit(&ged, TriggerChannel::Normal);
        assert!(map.has_triggered());
        assert!(map.add_hit(&ged, TriggerChannel::GuardRing));
        assert!(map.has_vetoed());
        assert!(!map.has_triggered());
    }

    #[test]
    fn positive_trigger_detection() {
        let map = TriggerMap::parse("Universal", MAP).unwrap();
        assert!(map.includes_detector_as_positive_trigger(&strip_2d("GeD", 0.0)));
        assert!(!map.includes_detector_as_positive_trigger(&strip_2d("CsI", 0.0)));
        assert!(map.has_veto_rows());
    }
}
