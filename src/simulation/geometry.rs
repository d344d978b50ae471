//! Node positions and distance helpers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 3-D position in meters. `z` is the antenna height above ground used by
/// the two-ray ground model.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Vector3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// Squared Euclidean distance; cheaper when only comparing distances.
pub fn distance2(a: &Vector3, b: &Vector3) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    let dz = a.z - b.z;
    dx * dx + dy * dy + dz * dz
}

pub fn distance(a: &Vector3, b: &Vector3) -> f64 {
    distance2(a, b).sqrt()
}
