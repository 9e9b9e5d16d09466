use log::error;
use serde::{Deserialize, Serialize};

/// Immutable piecewise-linear lookup table.
///
/// Points are kept sorted by `x`. Evaluation interpolates linearly between
/// neighbours and extrapolates with the first or last segment outside the
/// covered range. A single point acts as a constant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<(f64, f64)>", into = "Vec<(f64, f64)>")]
pub struct Table {
    points: Vec<(f64, f64)>,
}

impl Table {
    pub fn new(mut points: Vec<(f64, f64)>) -> Self {
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { points }
    }

    pub fn constant(value: f64) -> Self {
        Self::new(vec![(0.0, value)])
    }

    /// Maps every `x` onto itself.
    pub fn identity() -> Self {
        Self::new(vec![(0.0, 0.0), (1.0, 1.0)])
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        match self.points.len() {
            0 => {
                error!("table contains no data points for evaluation");
                0.0
            }
            1 => self.points[0].1,
            n => {
                let upper = self.points.partition_point(|p| p.0 <= x).clamp(1, n - 1);
                let (x1, y1) = self.points[upper - 1];
                let (x2, y2) = self.points[upper];
                if x2 == x1 {
                    return y1;
                }
                y1 + (x - x1) * (y2 - y1) / (x2 - x1)
            }
        }
    }
}

impl From<Vec<(f64, f64)>> for Table {
    fn from(points: Vec<(f64, f64)>) -> Self {
        Self::new(points)
    }
}

impl From<Table> for Vec<(f64, f64)> {
    fn from(table: Table) -> Self {
        table.points
    }
}
