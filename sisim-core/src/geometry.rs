//! Planes and charge distributions used by the transport model.

use nalgebra::{Isometry3, Point3, Unit, Vector3};

/// Tolerance on cross products when testing for parallel directions.
pub const ANGULAR_TOLERANCE: f64 = 1e-10;

/// Oriented plane `normal . p = offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    normal: Unit<Vector3<f64>>,
    offset: f64,
}

impl Plane {
    pub fn new(normal: Unit<Vector3<f64>>, offset: f64) -> Self {
        Self { normal, offset }
    }

    /// Plane with the given normal through `point`.
    pub fn through_point(normal: Unit<Vector3<f64>>, point: &Point3<f64>) -> Self {
        Self {
            normal,
            offset: normal.dot(&point.coords),
        }
    }

    #[inline]
    pub fn normal(&self) -> &Unit<Vector3<f64>> {
        &self.normal
    }

    #[inline]
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Positive on the side the normal points to.
    #[inline]
    pub fn signed_distance(&self, point: &Point3<f64>) -> f64 {
        self.normal.dot(&point.coords) - self.offset
    }

    /// Intersection of the line `origin + t * direction` with this plane.
    pub fn intersect_line(&self, origin: &Point3<f64>, direction: &Vector3<f64>) -> Option<Point3<f64>> {
        let denom = self.normal.dot(direction);
        if denom.abs() < ANGULAR_TOLERANCE {
            return None;
        }
        let t = -self.signed_distance(origin) / denom;
        Some(origin + direction * t)
    }
}

/// Two-dimensional Gaussian in a plane, described by its principal axes.
///
/// Axis vectors carry their sigma as length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianDistribution2D {
    normalization: f64,
    mean: Point3<f64>,
    major_axis: Vector3<f64>,
    minor_axis: Vector3<f64>,
}

impl GaussianDistribution2D {
    pub fn new(
        normalization: f64,
        mean: Point3<f64>,
        major_axis: Vector3<f64>,
        minor_axis: Vector3<f64>,
    ) -> Self {
        Self {
            normalization,
            mean,
            major_axis,
            minor_axis,
        }
    }

    /// Total charge represented by the distribution.
    #[inline]
    pub fn normalization(&self) -> f64 {
        self.normalization
    }

    #[inline]
    pub fn mean(&self) -> &Point3<f64> {
        &self.mean
    }

    #[inline]
    pub fn major_axis(&self) -> &Vector3<f64> {
        &self.major_axis
    }

    #[inline]
    pub fn minor_axis(&self) -> &Vector3<f64> {
        &self.minor_axis
    }

    /// Width of the projection onto `axis` (unit vector).
    pub fn sigma_1d(&self, axis: &Vector3<f64>) -> f64 {
        let major = self.major_axis.dot(axis);
        let minor = self.minor_axis.dot(axis);
        (major * major + minor * minor).sqrt()
    }

    /// Covariance between the projections onto two unit vectors.
    pub fn covariance_xy(&self, x_axis: &Vector3<f64>, y_axis: &Vector3<f64>) -> f64 {
        self.major_axis.dot(x_axis) * self.major_axis.dot(y_axis)
            + self.minor_axis.dot(x_axis) * self.minor_axis.dot(y_axis)
    }

    /// Same distribution expressed in another frame.
    #[must_use]
    pub fn transformed(&self, transform: &Isometry3<f64>) -> Self {
        Self {
            normalization: self.normalization,
            mean: transform.transform_point(&self.mean),
            major_axis: transform.transform_vector(&self.major_axis),
            minor_axis: transform.transform_vector(&self.minor_axis),
        }
    }
}

/// Any unit vector perpendicular to `normal`.
pub fn perpendicular_unit(normal: &Vector3<f64>) -> Unit<Vector3<f64>> {
    let seed = if normal.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    Unit::new_normalize(normal.cross(&seed))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_signed_distance() {
        let plane = Plane::new(Vector3::z_axis(), 0.15);
        assert_relative_eq!(plane.signed_distance(&Point3::new(3.0, 1.0, 0.0)), -0.15);
        assert_relative_eq!(plane.signed_distance(&Point3::new(0.0, 0.0, 0.2)), 0.05, epsilon = 1e-12);
    }

    #[test]
    fn test_intersect_line() {
        let plane = Plane::through_point(Vector3::z_axis(), &Point3::new(0.0, 0.0, 0.15));
        let hit = plane
            .intersect_line(&Point3::origin(), &Vector3::new(1.0, 0.0, 1.0))
            .unwrap();
        assert_relative_eq!(hit, Point3::new(0.15, 0.0, 0.15), epsilon = 1e-12);

        assert!(plane
            .intersect_line(&Point3::origin(), &Vector3::x())
            .is_none());
    }

    #[test]
    fn test_projected_widths() {
        let dist = GaussianDistribution2D::new(
            100.0,
            Point3::origin(),
            Vector3::new(0.003, 0.0, 0.0),
            Vector3::new(0.0, 0.004, 0.0),
        );
        assert_relative_eq!(dist.sigma_1d(&Vector3::x()), 0.003);
        assert_relative_eq!(dist.sigma_1d(&Vector3::y()), 0.004);
        assert_eq!(dist.covariance_xy(&Vector3::x(), &Vector3::y()), 0.0);
    }

    #[test]
    fn test_perpendicular_unit() {
        let n = Vector3::new(0.0, 0.0, 1.0);
        let p = perpendicular_unit(&n);
        assert_relative_eq!(p.dot(&n), 0.0);
        assert_relative_eq!(p.norm(), 1.0);
    }
}
