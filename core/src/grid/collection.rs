use crate::geometry::VolumeSequence;
use crate::grid::GridPoint;
use crate::prelude::{EngineError, EngineResult};
use log::error;

/// All grid points of one detector instance within an event.
#[derive(Debug, Clone, PartialEq)]
pub struct GridPointCollection {
    sequence: VolumeSequence,
    points: Vec<GridPoint>,
}

impl GridPointCollection {
    pub fn new(sequence: VolumeSequence) -> Self {
        Self {
            sequence,
            points: Vec::new(),
        }
    }

    pub fn sequence(&self) -> &VolumeSequence {
        &self.sequence
    }

    pub fn points(&self) -> &[GridPoint] {
        &self.points
    }

    pub fn points_mut(&mut self) -> &mut [GridPoint] {
        &mut self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = &GridPoint> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn has_same_detector(&self, other: &GridPointCollection) -> bool {
        self.sequence.has_same_detector(&other.sequence)
    }

    /// Adds a point of the same kind as the points already present, merging it
    /// into an existing point on the same channel.
    pub fn add_point(&mut self, point: GridPoint) -> bool {
        if let Some(first) = self.points.first() {
            if first.kind != point.kind {
                error!(
                    "grid point of kind {:?} not added to a collection of {:?} points in {}",
                    point.kind,
                    first.kind,
                    self.sequence.detector()
                );
                return false;
            }
        }
        self.merge_point(point);
        true
    }

    /// Merges all points of `other`. Collections from different detector
    /// instances are never combined.
    pub fn add_collection(&mut self, other: GridPointCollection) -> EngineResult<()> {
        if !self.has_same_detector(&other) {
            return Err(EngineError::DetectorMismatch {
                expected: format!("{}/{}", self.sequence.detector(), self.sequence.detector_volume()),
                found: format!("{}/{}", other.sequence.detector(), other.sequence.detector_volume()),
            });
        }
        for point in other.points {
            self.merge_point(point);
        }
        Ok(())
    }

    fn merge_point(&mut self, point: GridPoint) {
        match self.points.iter_mut().find(|p| p.same_channel(&point)) {
            Some(existing) => {
                existing.merge(&point);
            }
            None => self.points.push(point),
        }
    }

    pub fn retain(&mut self, keep: impl FnMut(&GridPoint) -> bool) {
        self.points.retain(keep);
    }

    pub fn remove_non_read_outs(&mut self) {
        self.points.retain(|p| p.is_read_out);
    }

    pub fn energy(&self) -> f64 {
        self.points.iter().map(|p| p.energy).sum()
    }

    pub fn hits(&self) -> u32 {
        self.points.iter().map(|p| p.hits).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vector3;
    use crate::grid::GridPointKind;

    fn point(x: i32, energy: f64) -> GridPoint {
        GridPoint::new(x, 0, 0, GridPointKind::Voxel).with_signal(Vector3::default(), energy, 0.0)
    }

    #[test]
    fn add_point_merges_same_channel() {
        let mut c = GridPointCollection::new(VolumeSequence::new("D", "V"));
        assert!(c.add_point(point(1, 10.0)));
        assert!(c.add_point(point(1, 5.0)));
        assert!(c.add_point(point(2, 1.0)));
        assert_eq!(c.len(), 2);
        assert_eq!(c.energy(), 16.0);
        assert_eq!(c.hits(), 3);
    }

    #[test]
    fn add_point_rejects_other_kinds() {
        let mut c = GridPointCollection::new(VolumeSequence::new("D", "V"));
        c.add_point(point(1, 10.0));
        assert!(!c.add_point(GridPoint::new(0, 0, 0, GridPointKind::GuardRing)));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn add_collection_from_other_detector_is_an_error() {
        let mut a = GridPointCollection::new(VolumeSequence::new("D", "V1"));
        a.add_point(point(1, 10.0));
        let mut b = GridPointCollection::new(VolumeSequence::new("D", "V2"));
        b.add_point(point(1, 10.0));
        let err = a.add_collection(b).unwrap_err();
        assert!(matches!(err, EngineError::DetectorMismatch { .. }));
        assert_eq!(a.energy(), 10.0);
    }

    #[test]
    fn add_collection_merges_mixed_kinds() {
        let mut a = GridPointCollection::new(VolumeSequence::new("D", "V"));
        a.add_point(point(1, 10.0));
        let mut b = GridPointCollection::new(VolumeSequence::new("D", "V"));
        b.add_point(GridPoint::new(0, 0, 0, GridPointKind::GuardRing).with_signal(Vector3::default(), 3.0, 0.0));
        a.add_collection(b).unwrap();
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn remove_non_read_outs_keeps_order() {
        let mut c = GridPointCollection::new(VolumeSequence::new("D", "V"));
        for x in 0..4 {
            let mut p = point(x, 1.0);
            p.is_read_out = x % 2 == 0;
            c.add_point(p);
        }
        c.remove_non_read_outs();
        let xs: Vec<i32> = c.iter().map(|p| p.x_grid).collect();
        assert_eq!(xs, vec![0, 2]);
    }
}
