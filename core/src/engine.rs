//! Event pipeline: simulated energy deposits in, instrument readout out.

use crate::detector::{Detector, Signal};
use crate::geometry::{Geometry, Vector3, VolumeSequence};
use crate::grid::{GridPoint, GridPointCollection, GridPointKind};
use crate::prelude::{EngineError, EngineResult, Validate};
use crate::readout::EventReadout;
use crate::telemetry::{LogManager, MetricsRecorder};
use crate::trigger::TriggerUnit;
use log::{debug, error};
use rand::rngs::StdRng;
use std::sync::Arc;

/// A channel below its trigger threshold is still read out when it is at
/// least this many noise sigmas above its noise threshold and borders a
/// triggered channel.
pub const NEIGHBOR_SIGMA_CUT: f64 = 7.0;
/// Maximum channel distance (Chebyshev, in x and y) of such a neighbor.
pub const NEIGHBOR_DISTANCE: i32 = 1;

#[derive(Debug, Clone)]
struct RawHit {
    position: Vector3,
    energy: f64,
    time: f64,
    sequence: VolumeSequence,
}

pub struct DetectorEffectsEngine {
    geometry: Option<Arc<Geometry>>,
    trigger_unit: TriggerUnit,
    rng: StdRng,
    hits: Vec<RawHit>,
    collections: Vec<GridPointCollection>,
    event_time: f64,
    events: u64,
    metrics: MetricsRecorder,
    logger: LogManager,
}

impl DetectorEffectsEngine {
    pub fn new(rng: StdRng) -> Self {
        Self {
            geometry: None,
            trigger_unit: TriggerUnit::default(),
            rng,
            hits: Vec::new(),
            collections: Vec::new(),
            event_time: 0.0,
            events: 0,
            metrics: MetricsRecorder::new(),
            logger: LogManager::new("detector-effects"),
        }
    }

    pub fn with_geometry(mut self, geometry: Arc<Geometry>) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn with_trigger_unit(mut self, trigger_unit: TriggerUnit) -> Self {
        self.trigger_unit = trigger_unit;
        self
    }

    pub fn geometry(&self) -> Option<&Arc<Geometry>> {
        self.geometry.as_ref()
    }

    pub fn trigger_unit(&self) -> &TriggerUnit {
        &self.trigger_unit
    }

    pub fn trigger_unit_mut(&mut self) -> &mut TriggerUnit {
        &mut self.trigger_unit
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    /// Queues a deposit given in world coordinates.
    pub fn add_hit(&mut self, position: Vector3, energy: f64, time: f64, sequence: VolumeSequence) {
        self.hits.push(RawHit {
            position,
            energy,
            time,
            sequence,
        });
    }

    pub fn set_event_time(&mut self, time: f64) {
        self.event_time = time;
    }

    pub fn event_time(&self) -> f64 {
        self.event_time
    }

    /// Read-out channels of the last event that passed the trigger.
    pub fn collections(&self) -> &[GridPointCollection] {
        &self.collections
    }

    /// Number of events run so far.
    pub fn events(&self) -> u64 {
        self.events
    }

    /// Record of the last accepted event.
    pub fn readout(&self) -> EventReadout {
        EventReadout::new(
            self.events,
            self.event_time,
            self.trigger_unit.trigger_names(),
            &self.collections,
        )
    }

    pub fn reset(&mut self) {
        self.hits.clear();
        self.collections.clear();
        self.event_time = 0.0;
        self.trigger_unit.reset();
    }

    /// Digitizes, noises, triggers and reads out the queued deposits.
    /// Returns false when the event does not trigger or is vetoed; the
    /// event is then discarded entirely.
    pub fn run(&mut self) -> bool {
        let Some(geometry) = self.geometry.clone() else {
            error!("detector effects engine has no geometry");
            return false;
        };
        self.events += 1;
        self.collections.clear();

        self.event_time = geometry.system().noise_time(self.event_time, &mut self.rng);

        for hit in std::mem::take(&mut self.hits) {
            let Some(detector) = geometry.detector(hit.sequence.detector()) else {
                error!("hit in unknown detector {} ignored", hit.sequence.detector());
                continue;
            };
            let local = hit.sequence.to_detector_frame(hit.position);
            let points = detector.grid(local, hit.energy, hit.time, &mut self.rng);
            if points.is_empty() {
                continue;
            }
            let mut collection = GridPointCollection::new(hit.sequence);
            for point in points {
                collection.add_point(point);
            }
            self.merge_collection(collection);
        }

        let mut dropped = 0;
        for collection in &mut self.collections {
            let Some(detector) = geometry.detector(collection.sequence().detector()) else {
                continue;
            };
            for point in collection.points_mut() {
                let noised = detector.for_point(point).noise(&Signal::from_point(point), &mut self.rng);
                noised.apply_to(point);
            }
            let before = collection.len();
            collection.retain(|p| p.energy > 0.0);
            dropped += before - collection.len();
        }

        self.trigger_unit.reset();
        for collection in &mut self.collections {
            let Some(detector) = geometry.detector(collection.sequence().detector()) else {
                continue;
            };
            let sequence = collection.sequence().clone();
            for point in collection.points_mut() {
                let energy = point.energy;
                point.is_above_trigger_threshold = if point.kind == GridPointKind::GuardRing {
                    self.trigger_unit
                        .add_guard_ring_hit(energy, detector, point, &sequence, &mut self.rng)
                } else {
                    self.trigger_unit.add_hit(energy, detector, point, &sequence, &mut self.rng)
                };
            }
        }

        if !self.trigger_unit.has_triggered() || self.trigger_unit.has_vetoed() {
            debug!(
                "event {} rejected, vetoes: {:?}",
                self.events,
                self.trigger_unit.veto_names()
            );
            let points = self.collections.iter().map(GridPointCollection::len).sum();
            self.logger.event_summary(self.events, self.collections.len(), points, false);
            self.collections.clear();
            self.metrics.record_event(false);
            self.metrics.record_dropped_points(dropped);
            return false;
        }

        for collection in &mut self.collections {
            let Some(detector) = geometry.detector(collection.sequence().detector()) else {
                continue;
            };
            for point in collection.points_mut() {
                point.is_read_out = if point.is_above_trigger_threshold {
                    true
                } else {
                    let owner = detector.for_point(point);
                    !owner.noise_threshold_equals_trigger_threshold()
                        && owner.is_above_noise_threshold(point.energy, point, &mut self.rng)
                };
            }
            mark_neighbors(collection.points_mut(), detector);
        }

        for collection in &mut self.collections {
            let before = collection.len();
            collection.remove_non_read_outs();
            dropped += before - collection.len();
        }
        self.collections.retain(|c| !c.is_empty());

        let points = self.collections.iter().map(GridPointCollection::len).sum();
        self.logger.event_summary(self.events, self.collections.len(), points, true);
        self.metrics.record_event(true);
        self.metrics.record_dropped_points(dropped);
        true
    }

    fn merge_collection(&mut self, collection: GridPointCollection) {
        match self.collections.iter_mut().find(|c| c.has_same_detector(&collection)) {
            Some(existing) => {
                if let Err(err) = existing.add_collection(collection) {
                    error!("cannot merge grid points: {}", err);
                }
            }
            None => self.collections.push(collection),
        }
    }
}

/// Reads out channels which are significantly above the noise and border a
/// triggered channel of the same collection.
fn mark_neighbors(points: &mut [GridPoint], detector: &Detector) {
    let promoted: Vec<usize> = points
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.is_read_out)
        .filter(|(_, p)| {
            detector.for_point(p).sigmas_above_noise_level(p.energy, p) >= NEIGHBOR_SIGMA_CUT
        })
        .filter(|(_, p)| {
            points.iter().any(|q| {
                q.is_above_trigger_threshold && q.channel_distance(p) <= NEIGHBOR_DISTANCE
            })
        })
        .map(|(i, _)| i)
        .collect();
    for i in promoted {
        points[i].is_read_out = true;
    }
}

impl Validate for DetectorEffectsEngine {
    fn validate(&mut self) -> EngineResult<()> {
        let Some(geometry) = self.geometry.clone() else {
            return Err(EngineError::InvalidConfig(
                "the detector effects engine needs a geometry".into(),
            ));
        };
        self.trigger_unit.validate(&geometry)?;
        self.logger.record(&format!(
            "validated {} detectors and {} triggers",
            geometry.detectors().len(),
            self.trigger_unit.triggers().len()
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::tests::strip_2d;
    use crate::detector::{DetectorKind, DetectorType, GuardRing, Response, Strip3D, StripLayout, Structure};
    use crate::geometry::{Placement, System};
    use crate::math::Table;
    use crate::trigger::{Trigger, TriggerBasic, TriggerEntry, TriggerMap, TriggerTarget};
    use rand::SeedableRng;

    fn engine(detectors: Vec<Detector>, unit: TriggerUnit) -> DetectorEffectsEngine {
        let geometry = Geometry::new(detectors, System::default()).unwrap();
        let mut engine = DetectorEffectsEngine::new(StdRng::seed_from_u64(42))
            .with_geometry(Arc::new(geometry))
            .with_trigger_unit(unit);
        engine.validate().unwrap();
        engine
    }

    fn named_trigger(name: &str) -> Trigger {
        Trigger::Basic(TriggerBasic::new(
            format!("{}-trigger", name),
            vec![TriggerEntry::new(TriggerTarget::Name(name.into()), 1)],
        ))
    }

    fn in_(detector: &str) -> VolumeSequence {
        VolumeSequence::new(detector, format!("{}_1", detector))
    }

    fn pinned(name: &str, trigger_threshold: f64, sigma: f64) -> Detector {
        let mut detector = strip_2d(name, 0.0);
        detector.response = Response {
            trigger_threshold,
            trigger_threshold_sigma: sigma,
            noise_threshold_equals_trigger_threshold: true,
            ..Default::default()
        };
        detector.validate().unwrap();
        detector
    }

    /// Centre of strip `n` of the 64 strip, 6.4 cm test wafer.
    fn strip(n: i32) -> f64 {
        -3.2 + 0.1 * n as f64 + 0.05
    }

    #[test]
    fn validation_needs_geometry() {
        let mut engine = DetectorEffectsEngine::new(StdRng::seed_from_u64(0));
        assert!(matches!(engine.validate(), Err(EngineError::InvalidConfig(_))));
        assert!(!engine.run());
    }

    #[test]
    fn empty_event_after_reset_is_accepted() {
        let mut engine = engine(vec![strip_2d("A", 10.0)], TriggerUnit::default());
        engine.add_hit(Vector3::new(0.0, 0.0, 0.0), 100.0, 0.0, in_("A"));
        engine.reset();
        assert!(engine.run());
        assert!(engine.collections().is_empty());
        engine.reset();
        assert!(engine.run());
        assert!(engine.collections().is_empty());
    }

    #[test]
    fn single_hit_without_diffusion_gives_one_point() {
        let layout = StripLayout::new(Structure::single(Vector3::new(3.2, 3.2, 0.75)), 128, 128);
        let mut detector = Detector::new("GeD", DetectorKind::Strip3D(Strip3D::new(layout)));
        detector.validate().unwrap();
        let mut engine = engine(vec![detector], TriggerUnit::default());
        engine.add_hit(Vector3::new(0.11, -0.01, 0.2), 300.0, 0.0, in_("GeD"));
        assert!(engine.run());
        assert_eq!(engine.collections().len(), 1);
        let points = engine.collections()[0].points();
        assert_eq!(points.len(), 1);
        assert_eq!((points[0].x_grid, points[0].y_grid), (66, 63));
        assert_eq!(points[0].energy, 300.0);
    }

    #[test]
    fn placements_are_undone_before_gridding() {
        let mut engine = engine(vec![strip_2d("A", 0.0)], TriggerUnit::default());
        let sequence = in_("A").with_placement(Placement::new("Mother", Vector3::new(10.0, 0.0, 0.0)));
        engine.add_hit(Vector3::new(10.0 + strip(5), strip(9), 0.0), 100.0, 0.0, sequence);
        assert!(engine.run());
        let p = &engine.collections()[0].points()[0];
        assert_eq!((p.x_grid, p.y_grid), (5, 9));
    }

    #[test]
    fn hits_of_one_detector_share_a_collection() {
        let mut engine = engine(vec![strip_2d("A", 0.0), strip_2d("B", 0.0)], TriggerUnit::default());
        engine.add_hit(Vector3::new(strip(1), strip(1), 0.0), 100.0, 0.0, in_("A"));
        engine.add_hit(Vector3::new(strip(1), strip(1), 0.0), 50.0, 0.0, in_("A"));
        engine.add_hit(Vector3::new(strip(2), strip(1), 0.0), 50.0, 0.0, in_("A"));
        engine.add_hit(Vector3::new(strip(1), strip(1), 0.0), 70.0, 0.0, in_("B"));
        engine.add_hit(Vector3::default(), 70.0, 0.0, in_("Unknown"));
        assert!(engine.run());
        assert_eq!(engine.collections().len(), 2);
        let a = &engine.collections()[0];
        assert_eq!(a.len(), 2);
        assert_eq!(a.energy(), 200.0);
    }

    #[test]
    fn diffusion_conserves_energy() {
        let layout = StripLayout::new(Structure::single(Vector3::new(3.2, 3.2, 0.75)), 128, 128);
        let mut detector = Detector::new("GeD", DetectorKind::Strip3D(Strip3D::new(layout).with_drift(0.02, 0.022)));
        detector.validate().unwrap();
        let mut engine = engine(vec![detector], TriggerUnit::default());
        engine.add_hit(Vector3::new(0.1, 0.1, 0.3), 400.0, 0.0, in_("GeD"));
        assert!(engine.run());
        let total: f64 = engine.collections().iter().map(GridPointCollection::energy).sum();
        assert!((total - 400.0).abs() < 1e-6);
    }

    #[test]
    fn always_trigger_never_loses_events() {
        let mut accepted = Vec::new();
        for always in [false, true] {
            let mut unit = TriggerUnit::new(vec![named_trigger("A")]);
            unit.always_assume_trigger = always;
            let mut engine = engine(vec![strip_2d("A", 50.0)], unit);
            let mut outcome = Vec::new();
            for energy in [20.0, 80.0, 5.0, 300.0] {
                engine.reset();
                engine.add_hit(Vector3::new(strip(3), strip(3), 0.0), energy, 0.0, in_("A"));
                outcome.push(engine.run());
            }
            accepted.push(outcome);
        }
        assert_eq!(accepted[0], vec![false, true, false, true]);
        assert!(accepted[0].iter().zip(&accepted[1]).all(|(without, with)| !without || *with));
        assert!(accepted[1].iter().all(|a| *a));
    }

    #[test]
    fn non_vetoable_trigger_suppresses_veto() {
        let map = TriggerMap::parse("Universal", "DT A V\nTN 1+ 0+\nVT 0+ 1+\n").unwrap();
        let mut engine = engine(
            vec![strip_2d("A", 10.0), pinned("V", 10.0, 0.0)],
            TriggerUnit::new(vec![Trigger::Map(map)]),
        );
        engine.add_hit(Vector3::new(strip(3), strip(3), 0.0), 100.0, 0.0, in_("V"));
        assert!(!engine.run());
        assert!(engine.collections().is_empty());

        engine.reset();
        engine.add_hit(Vector3::new(strip(3), strip(3), 0.0), 100.0, 0.0, in_("V"));
        engine.add_hit(Vector3::new(strip(3), strip(3), 0.0), 100.0, 0.0, in_("A"));
        assert!(engine.run());
        assert_eq!(engine.collections().len(), 2);
    }

    #[test]
    fn pinned_detector_without_trigger_is_not_read_out() {
        let mut engine = engine(
            vec![strip_2d("A", 10.0), pinned("B", 10.0, 0.0)],
            TriggerUnit::new(vec![named_trigger("A")]),
        );
        engine.add_hit(Vector3::new(strip(3), strip(3), 0.0), 100.0, 0.0, in_("A"));
        engine.add_hit(Vector3::new(strip(3), strip(3), 0.0), 100.0, 0.0, in_("B"));
        assert!(engine.run());
        assert_eq!(engine.collections().len(), 1);
        assert_eq!(engine.collections()[0].sequence().detector(), "A");
    }

    #[test]
    fn neighbors_are_read_out_within_one_channel() {
        let mut detector = pinned("A", 50.0, 10.0);
        for channel in [[4, 4, 0], [6, 6, 0], [5, 7, 0]] {
            detector.blocked_trigger_channels.push(channel);
        }
        let mut engine = engine(vec![detector], TriggerUnit::new(vec![named_trigger("A")]));
        engine.add_hit(Vector3::new(strip(5), strip(5), 0.0), 300.0, 0.0, in_("A"));
        for (x, y) in [(4, 4), (6, 6), (5, 7)] {
            engine.add_hit(Vector3::new(strip(x), strip(y), 0.0), 150.0, 0.0, in_("A"));
        }
        assert!(engine.run());
        let mut channels: Vec<(i32, i32)> = engine.collections()[0]
            .iter()
            .map(|p| (p.x_grid, p.y_grid))
            .collect();
        channels.sort();
        assert_eq!(channels, vec![(4, 4), (5, 5), (6, 6)]);
    }

    #[test]
    fn neighbor_marking_requires_significance_and_adjacency() {
        let detector = strip_2d("A", 0.0).with_response(Response {
            noise_threshold: 10.0,
            noise_threshold_sigma: 1.0,
            ..Default::default()
        });
        let point = |x: i32, y: i32, energy: f64| {
            GridPoint::new(x, y, 0, GridPointKind::Voxel).with_signal(Vector3::default(), energy, 0.0)
        };
        let mut trigger = point(5, 5, 300.0);
        trigger.is_above_trigger_threshold = true;
        trigger.is_read_out = true;
        // (4, 4) sits exactly at the cut
        let mut points = vec![trigger, point(4, 4, 17.0), point(6, 6, 20.0), point(5, 7, 20.0), point(4, 6, 15.0)];
        mark_neighbors(&mut points, &detector);
        let read_out: Vec<bool> = points.iter().map(|p| p.is_read_out).collect();
        assert_eq!(read_out, vec![true, true, true, false, false]);
    }

    #[test]
    fn triggered_guard_ring_promotes_adjacent_channel() {
        let detector = strip_2d("A", 0.0).with_response(Response {
            noise_threshold: 10.0,
            noise_threshold_sigma: 1.0,
            ..Default::default()
        });
        let mut ring = GridPoint::new(0, 0, 0, GridPointKind::GuardRing).with_signal(Vector3::default(), 80.0, 0.0);
        ring.is_above_trigger_threshold = true;
        ring.is_read_out = true;
        let strip = GridPoint::new(1, 1, 0, GridPointKind::Voxel).with_signal(Vector3::default(), 20.0, 0.0);
        let mut points = vec![ring, strip];
        mark_neighbors(&mut points, &detector);
        assert!(points[1].is_read_out);
    }

    #[test]
    fn guard_ring_hit_vetoes_the_event() {
        let layout = StripLayout::new(Structure::single(Vector3::new(3.2, 3.2, 0.75)), 64, 64).with_guard_ring(0.2, 0.2);
        let mut detector = Detector::new("GeD", DetectorKind::Strip2D(layout)).with_guard_ring(
            Response {
                trigger_threshold: 20.0,
                ..Default::default()
            },
            GuardRing::default(),
        );
        detector.validate().unwrap();
        let unit = TriggerUnit::new(vec![
            named_trigger("GeD"),
            Trigger::Basic(TriggerBasic::veto(
                "GuardRingVeto",
                vec![TriggerEntry::guard_ring(TriggerTarget::Name("GeD".into()), 1)],
            )),
        ]);
        let mut engine = engine(vec![detector], unit);
        engine.add_hit(Vector3::new(0.0, 0.0, 0.0), 300.0, 0.0, in_("GeD"));
        engine.add_hit(Vector3::new(3.1, 0.0, 0.0), 10.0, 0.0, in_("GeD"));
        assert!(engine.run());

        engine.reset();
        engine.add_hit(Vector3::new(0.0, 0.0, 0.0), 300.0, 0.0, in_("GeD"));
        engine.add_hit(Vector3::new(3.1, 0.0, 0.0), 40.0, 0.0, in_("GeD"));
        assert!(!engine.run());
        assert_eq!(engine.metrics().snapshot().rejected, 1);
    }

    #[test]
    fn germanium_strip_event_end_to_end() {
        let layout = StripLayout::new(Structure::single(Vector3::new(3.2, 3.2, 0.75)), 128, 128);
        let strip = Strip3D::new(layout)
            .with_drift(0.02, 0.022)
            .with_depth_resolution(Table::new(vec![(600.0, 0.1)]), Some(Table::new(vec![(600.0, 0.02)])));
        let detector = Detector::new("GeD", DetectorKind::Strip3D(strip)).with_response(Response {
            trigger_threshold: 50.0,
            ..Default::default()
        });
        let unit = TriggerUnit::new(vec![Trigger::Basic(TriggerBasic::new(
            "Strip3D",
            vec![TriggerEntry::new(TriggerTarget::Type(DetectorType::Strip3D), 1)],
        ))]);
        let mut engine = engine(vec![detector], unit);
        engine.set_event_time(1.0);
        engine.add_hit(Vector3::new(0.1, 0.1, -0.5), 600.0, 0.0, in_("GeD"));
        assert!(engine.run());
        assert_eq!(engine.event_time(), 1.0);

        let collections = engine.collections();
        assert_eq!(collections.len(), 1);
        let total = collections[0].energy();
        assert!((total - 600.0).abs() < 1e-6, "total energy {}", total);
        for p in collections[0].iter() {
            assert!(p.position.z.abs() <= 0.75);
            assert!(p.is_read_out);
            if p.energy > 50.0 {
                assert!(p.is_above_trigger_threshold);
            }
        }
        let metrics = engine.metrics().snapshot();
        assert_eq!((metrics.processed, metrics.triggered), (1, 1));

        let readout = engine.readout();
        assert_eq!(readout.event, 1);
        assert_eq!(readout.triggers, vec!["Strip3D".to_string()]);
        assert!((readout.energy() - 600.0).abs() < 1e-6);
    }
}
