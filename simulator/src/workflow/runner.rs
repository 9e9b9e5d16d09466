use crate::generator::profile::HitGenerator;
use crate::workflow::config::SimulationConfig;
use anyhow::Context;
use detcore::prelude::Validate;
use detcore::DetectorEffectsEngine;
use log::{debug, info};
use rand::{rngs::StdRng, SeedableRng};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunSummary {
    pub processed: u64,
    pub triggered: u64,
    pub rejected: u64,
    /// keV handed to the engine.
    pub deposited_energy: f64,
    /// keV in read-out channels of accepted events.
    pub measured_energy: f64,
    pub interrupted: bool,
}

impl RunSummary {
    pub fn trigger_fraction(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.triggered as f64 / self.processed as f64
        }
    }
}

pub struct Runner {
    engine: DetectorEffectsEngine,
    generator: HitGenerator,
}

impl Runner {
    pub fn new(config: &SimulationConfig) -> anyhow::Result<Self> {
        let geometry = Arc::new(config.geometry()?);
        let mut engine = DetectorEffectsEngine::new(StdRng::seed_from_u64(config.seed))
            .with_geometry(geometry)
            .with_trigger_unit(config.trigger_unit()?);
        engine.validate().context("validating detector effects engine")?;
        let generator = HitGenerator::new(config.source.clone(), config.seed.wrapping_add(1))?;
        Ok(Self { engine, generator })
    }

    pub fn engine(&self) -> &DetectorEffectsEngine {
        &self.engine
    }

    /// Runs up to `events` events, stopping early once `interrupt` is set.
    /// Accepted events are appended to `sink` as JSON lines.
    pub fn run(
        &mut self,
        events: u64,
        interrupt: &AtomicBool,
        mut sink: Option<&mut dyn Write>,
    ) -> anyhow::Result<RunSummary> {
        let mut summary = RunSummary::default();
        for index in 0..events {
            if interrupt.load(Ordering::Relaxed) {
                info!("interrupted after {} events", summary.processed);
                summary.interrupted = true;
                break;
            }
            self.engine.reset();
            self.engine.set_event_time(self.generator.event_time(index));
            for hit in self.generator.next_event() {
                summary.deposited_energy += hit.energy;
                self.engine.add_hit(hit.position, hit.energy, hit.time, hit.sequence);
            }

            summary.processed += 1;
            if !self.engine.run() {
                summary.rejected += 1;
                continue;
            }
            summary.triggered += 1;
            let readout = self.engine.readout();
            summary.measured_energy += readout.energy();
            if let Some(out) = sink.as_mut() {
                let line = readout.to_json_line().context("serializing event")?;
                writeln!(out, "{}", line).context("writing event")?;
            }
            debug!("event {} accepted with {:.1} keV", index, readout.energy());
        }
        if let Some(out) = sink.as_mut() {
            out.flush().context("flushing event output")?;
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::config::tests::SETUP;

    fn config() -> SimulationConfig {
        serde_yaml::from_str(SETUP).unwrap()
    }

    #[test]
    fn runner_counts_and_writes_accepted_events() {
        let config = config();
        let mut runner = Runner::new(&config).unwrap();
        let mut out = Vec::new();
        let summary = runner
            .run(config.events, &AtomicBool::new(false), Some(&mut out))
            .unwrap();
        assert_eq!(summary.processed, 25);
        assert_eq!(summary.triggered + summary.rejected, 25);
        assert!(summary.triggered > 0);
        assert!(!summary.interrupted);
        assert!(summary.measured_energy <= summary.deposited_energy * 1.1);

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count() as u64, summary.triggered);
        for line in text.lines() {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["detectors"][0]["detector"], "GeD");
        }
    }

    #[test]
    fn interrupt_stops_before_the_first_event() {
        let mut runner = Runner::new(&config()).unwrap();
        let summary = runner.run(10, &AtomicBool::new(true), None).unwrap();
        assert_eq!(summary.processed, 0);
        assert!(summary.interrupted);
        assert_eq!(summary.trigger_fraction(), 0.0);
    }

    #[test]
    fn always_trigger_accepts_every_event() {
        let mut config = config();
        config.trigger_unit.always_assume_trigger = true;
        let mut runner = Runner::new(&config).unwrap();
        let summary = runner.run(5, &AtomicBool::new(false), None).unwrap();
        assert_eq!(summary.triggered, 5);
        assert_eq!(summary.trigger_fraction(), 1.0);
    }
}
