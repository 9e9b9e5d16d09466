//! Serializable record of one accepted event.

use crate::geometry::Vector3;
use crate::grid::{GridPointCollection, GridPointKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelReadout {
    pub channel: [i32; 3],
    pub kind: GridPointKind,
    pub energy: f64,
    pub time: f64,
    /// Detector-local position.
    pub position: Vector3,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub flags: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorReadout {
    pub detector: String,
    pub volume: String,
    pub channels: Vec<ChannelReadout>,
}

impl From<&GridPointCollection> for DetectorReadout {
    fn from(collection: &GridPointCollection) -> Self {
        Self {
            detector: collection.sequence().detector().to_string(),
            volume: collection.sequence().detector_volume().to_string(),
            channels: collection
                .iter()
                .map(|p| ChannelReadout {
                    channel: [p.x_grid, p.y_grid, p.z_grid],
                    kind: p.kind,
                    energy: p.energy,
                    time: p.time,
                    position: p.position,
                    flags: p.flags.trim().to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventReadout {
    pub event: u64,
    pub time: f64,
    pub triggers: Vec<String>,
    pub detectors: Vec<DetectorReadout>,
}

impl EventReadout {
    pub fn new(event: u64, time: f64, triggers: Vec<String>, collections: &[GridPointCollection]) -> Self {
        Self {
            event,
            time,
            triggers,
            detectors: collections.iter().map(DetectorReadout::from).collect(),
        }
    }

    pub fn energy(&self) -> f64 {
        self.detectors
            .iter()
            .flat_map(|d| d.channels.iter())
            .map(|c| c.energy)
            .sum()
    }

    /// One line of the JSON-lines event stream, without the newline.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::VolumeSequence;
    use crate::grid::GridPoint;

    #[test]
    fn json_line_carries_channels_and_flags() {
        let mut collection = GridPointCollection::new(VolumeSequence::new("GeD", "GeD_1"));
        let mut point = GridPoint::new(3, 7, 0, GridPointKind::Voxel).with_signal(Vector3::new(0.0, 0.0, 0.2), 511.0, 1e-6);
        point.flags.push_str(" OVERFLOW");
        collection.add_point(point);
        collection.add_point(GridPoint::new(4, 7, 0, GridPointKind::Voxel).with_signal(Vector3::default(), 150.0, 0.0));

        let readout = EventReadout::new(12, 2.5, vec!["GeD".into()], &[collection]);
        assert_eq!(readout.energy(), 661.0);
        let line = readout.to_json_line().unwrap();
        assert!(!line.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["event"], 12);
        assert_eq!(value["detectors"][0]["volume"], "GeD_1");
        assert_eq!(value["detectors"][0]["channels"][0]["channel"][1], 7);
        assert_eq!(value["detectors"][0]["channels"][0]["flags"], "OVERFLOW");
        assert!(value["detectors"][0]["channels"][1].get("flags").is_none());
        assert_eq!(value["detectors"][0]["channels"][1]["kind"], "voxel");
    }
}
