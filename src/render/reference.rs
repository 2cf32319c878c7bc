//! Reference shapes in filamentarity/planarity space.
//!
//! Objects are characterized by three length scales derived from Minkowski
//! functionals: thickness `T = 3V/S`, width `W = S/M` and length
//! `L = M/4π`, where `V`, `S` and `M` are volume, surface area and
//! integrated mean curvature. Planarity and filamentarity then are
//! `P = (W - T)/(W + T)` and `F = (L - W)/(L + W)`.
//!
//! The reference curve traces spheroids with two unit semi-axes and a third
//! one of length `λ`. A sphere sits at the origin, long needles approach
//! `F = 1` and flat disks approach `P = 1`.

use std::f64::consts::PI;

/// A point of the reference curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapePoint {
    pub lambda: f64,
    pub planarity: f64,
    pub filamentarity: f64,
}

/// Planarity and filamentarity of a spheroid with aspect ratio `lambda`.
pub fn spheroid(lambda: f64) -> ShapePoint {
    let volume = 4.0 / 3.0 * PI * lambda;
    let surface = spheroid_surface(lambda);
    let curvature = 2.0 * PI * spheroid_mean_width(lambda);

    let thickness = 3.0 * volume / surface;
    let width = surface / curvature;
    let length = curvature / (4.0 * PI);

    ShapePoint {
        lambda,
        planarity: (width - thickness) / (width + thickness),
        filamentarity: (length - width) / (length + width),
    }
}

fn spheroid_surface(lambda: f64) -> f64 {
    if (lambda - 1.0).abs() < 1e-9 {
        4.0 * PI
    } else if lambda > 1.0 {
        let e = (1.0 - 1.0 / (lambda * lambda)).sqrt();
        2.0 * PI * (1.0 + lambda / e * e.asin())
    } else {
        let e = (1.0 - lambda * lambda).sqrt();
        2.0 * PI * (1.0 + lambda * lambda / e * e.atanh())
    }
}

fn spheroid_mean_width(lambda: f64) -> f64 {
    if (lambda - 1.0).abs() < 1e-9 {
        2.0
    } else if lambda > 1.0 {
        let eps = (lambda * lambda - 1.0).sqrt();
        lambda + (lambda + eps).ln() / eps
    } else {
        lambda + lambda.acos() / (1.0 - lambda * lambda).sqrt()
    }
}

/// Samples the curve from flat disks through the sphere to long needles,
/// with aspect ratios spaced evenly in log space.
pub fn reference_curve(samples: usize) -> Vec<ShapePoint> {
    const LOG_MIN: f64 = -3.0;
    const LOG_MAX: f64 = 3.0;

    let samples = samples.max(2);

    (0..samples)
        .map(|i| {
            let t = i as f64 / (samples - 1) as f64;
            spheroid(10f64.powf(LOG_MIN + t * (LOG_MAX - LOG_MIN)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_is_origin() {
        let sphere = spheroid(1.0);
        assert!(sphere.planarity.abs() < 1e-9);
        assert!(sphere.filamentarity.abs() < 1e-9);
    }

    #[test]
    fn test_curve_is_continuous_through_sphere() {
        let below = spheroid(1.0 - 1e-6);
        let above = spheroid(1.0 + 1e-6);
        assert!(below.planarity.abs() < 1e-4 && below.filamentarity.abs() < 1e-4);
        assert!(above.planarity.abs() < 1e-4 && above.filamentarity.abs() < 1e-4);
    }

    #[test]
    fn test_needles_are_filaments() {
        let needle = spheroid(1000.0);
        assert!(needle.filamentarity > 0.9);
        assert!(needle.planarity.abs() < 0.2);
    }

    #[test]
    fn test_disks_are_planar() {
        let disk = spheroid(1e-3);
        assert!(disk.planarity > 0.9);
        assert!(disk.filamentarity.abs() < 0.3);
    }

    #[test]
    fn test_curve_stays_in_unit_square() {
        let curve = reference_curve(50);
        assert_eq!(curve.len(), 50);
        assert!(curve.iter().all(|p| (0.0..=1.0).contains(&p.planarity)
            && (0.0..=1.0).contains(&p.filamentarity)));
    }
}
