use crate::geometry::Vector3;
use ndarray::{arr1, arr2, Array2};
use serde::{Deserialize, Serialize};

/// 3x3 rotation applied to placement-local positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "[[f64; 3]; 3]", into = "[[f64; 3]; 3]")]
pub struct Rotation {
    matrix: Array2<f64>,
}

impl Rotation {
    pub fn identity() -> Self {
        Self::from_rows([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
    }

    pub fn from_rows(rows: [[f64; 3]; 3]) -> Self {
        Self { matrix: arr2(&rows) }
    }

    /// Right-handed rotation by `angle` radians about the z axis.
    pub fn about_z(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self::from_rows([[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]])
    }

    pub fn apply(&self, v: Vector3) -> Vector3 {
        let rotated = self.matrix.dot(&arr1(&[v.x, v.y, v.z]));
        Vector3::new(rotated[0], rotated[1], rotated[2])
    }

    /// Applies the transpose, which undoes `apply` for an orthonormal matrix.
    pub fn apply_inverse(&self, v: Vector3) -> Vector3 {
        let rotated = self.matrix.t().dot(&arr1(&[v.x, v.y, v.z]));
        Vector3::new(rotated[0], rotated[1], rotated[2])
    }
}

impl Default for Rotation {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<[[f64; 3]; 3]> for Rotation {
    fn from(rows: [[f64; 3]; 3]) -> Self {
        Self::from_rows(rows)
    }
}

impl From<Rotation> for [[f64; 3]; 3] {
    fn from(rotation: Rotation) -> Self {
        let m = &rotation.matrix;
        [
            [m[[0, 0]], m[[0, 1]], m[[0, 2]]],
            [m[[1, 0]], m[[1, 1]], m[[1, 2]]],
            [m[[2, 0]], m[[2, 1]], m[[2, 2]]],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarter_turn_about_z_maps_x_onto_y() {
        let r = Rotation::about_z(std::f64::consts::FRAC_PI_2);
        let v = r.apply(Vector3::new(1.0, 0.0, 2.0));
        assert!(v.x.abs() < 1e-12);
        assert!((v.y - 1.0).abs() < 1e-12);
        assert!((v.z - 2.0).abs() < 1e-12);
        let back = r.apply_inverse(v);
        assert!((back.x - 1.0).abs() < 1e-12);
        assert!(back.y.abs() < 1e-12);
    }
}
