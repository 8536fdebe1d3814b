//! Representation of bounding spheres.

use nalgebra::{Matrix4, Point3, UnitVector3};

/// A sphere represented by the center point and the radius.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sphere {
    center: Point3<f32>,
    radius: f32,
}

impl Sphere {
    /// Creates a new sphere with the given center and radius.
    ///
    /// # Panics
    /// If `radius` is negative.
    pub fn new(center: Point3<f32>, radius: f32) -> Self {
        assert!(radius >= 0.0);
        Self { center, radius }
    }

    /// Finds the smallest sphere centered on the cone axis that encloses the
    /// cone with the given apex, axis direction, height and half-angle.
    ///
    /// The sphere must cover both the apex and the rim of the cone's base
    /// disk. Placing the center a distance `t` along the axis and requiring
    /// equal distance to the apex and the rim gives
    /// `t = (h² + (h tan θ)²) / 2h`, which also covers every interior point.
    pub fn bounding_sphere_for_cone(
        apex: Point3<f32>,
        axis: UnitVector3<f32>,
        height: f32,
        half_angle: f32,
    ) -> Self {
        let base_radius = height * half_angle.tan();
        let center_distance = 0.5 * (height * height + base_radius * base_radius) / height;
        Self::new(apex + axis.scale(center_distance), center_distance)
    }

    /// Returns the center point of the sphere.
    pub fn center(&self) -> &Point3<f32> {
        &self.center
    }

    /// Returns the radius of the sphere.
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Returns the sphere transformed by the given rigid transform
    /// (the radius is preserved).
    pub fn rigidly_transformed(&self, transform: &Matrix4<f32>) -> Self {
        Self {
            center: transform.transform_point(&self.center),
            radius: self.radius,
        }
    }

    /// Whether the given point lies inside or on the boundary of the sphere,
    /// within a small floating-point tolerance.
    pub fn contains_point(&self, point: &Point3<f32>) -> bool {
        (point - self.center).norm_squared() <= self.radius * self.radius * (1.0 + 1e-5)
    }
}
