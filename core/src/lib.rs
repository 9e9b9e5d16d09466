//! Detector effects engine for Compton and pair telescopes.
//!
//! Ideal energy deposits from a particle transport simulation are turned into
//! what the instrument would actually record: deposits are discretized onto
//! readout channels, smeared by the electronics response, and kept only when
//! the trigger logic accepts the event.

pub mod detector;
pub mod engine;
pub mod geometry;
pub mod grid;
pub mod math;
pub mod prelude;
pub mod readout;
pub mod telemetry;
pub mod trigger;

pub use detector::{Detector, DetectorKind, DetectorType, Response};
pub use engine::DetectorEffectsEngine;
pub use geometry::{Geometry, System, Vector3, VolumeSequence};
pub use grid::{GridPoint, GridPointCollection, GridPointKind};
pub use prelude::{EngineError, EngineResult, Validate};
pub use readout::EventReadout;
pub use trigger::{Trigger, TriggerUnit};
