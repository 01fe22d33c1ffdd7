//! Unit scale factors
//!
//! Lengths are normalised to metres and angles to degrees, so `340[deg]`
//! evaluates to 340 and `1[mm]` to 0.001.

use std::f64::consts::PI;

/// Scale factor converting a value in `unit` to the base unit of its dimension
pub fn unit_scale(unit: &str) -> Option<f64> {
    let scale = match unit.trim() {
        "m" => 1.0,
        "cm" => 1e-2,
        "mm" => 1e-3,
        "um" | "µm" => 1e-6,
        "nm" => 1e-9,
        "in" => 0.0254,
        "mil" => 2.54e-5,
        "deg" => 1.0,
        "rad" => 180.0 / PI,
        _ => return None,
    };
    Some(scale)
}
