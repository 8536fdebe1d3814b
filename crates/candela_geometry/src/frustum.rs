//! Representation of view frusta.

use crate::Sphere;
use nalgebra::{Matrix4, Vector3};

/// A frustum given by the six planes of a view-projection transform, used for
/// coarse culling against bounding spheres.
///
/// Plane normals point into the frustum interior, so a point is inside when
/// its signed distance to every plane is non-negative.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frustum {
    planes: [Plane; 6],
}

/// A plane in Hessian normal form, `normal · p + displacement = 0`. The
/// normal is not required to be unit length, which suffices for sign tests
/// but means distances are scaled.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Plane {
    normal: Vector3<f32>,
    displacement: f32,
}

impl Frustum {
    /// Extracts the frustum planes from the given view-projection matrix
    /// (mapping to normalized device coordinates with z in [0, 1]).
    pub fn from_view_projection(matrix: &Matrix4<f32>) -> Self {
        let row = |idx: usize| matrix.row(idx).transpose();

        let row_0 = row(0);
        let row_1 = row(1);
        let row_2 = row(2);
        let row_3 = row(3);

        let planes = [
            Plane::from_coefficients(row_3 + row_0), // left
            Plane::from_coefficients(row_3 - row_0), // right
            Plane::from_coefficients(row_3 + row_1), // bottom
            Plane::from_coefficients(row_3 - row_1), // top
            Plane::from_coefficients(row_2),         // near
            Plane::from_coefficients(row_3 - row_2), // far
        ];

        Self { planes }
    }

    /// Whether the given sphere could intersect the frustum. May
    /// conservatively return `true` for spheres slightly outside a corner.
    pub fn could_contain_sphere(&self, sphere: &Sphere) -> bool {
        self.planes.iter().all(|plane| {
            let scaled_radius = sphere.radius() * plane.normal.norm();
            plane.signed_distance(sphere) >= -scaled_radius
        })
    }
}

impl Plane {
    fn from_coefficients(coefficients: nalgebra::Vector4<f32>) -> Self {
        Self {
            normal: coefficients.xyz(),
            displacement: coefficients.w,
        }
    }

    fn signed_distance(&self, sphere: &Sphere) -> f32 {
        self.normal.dot(&sphere.center().coords) + self.displacement
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PerspectiveTransform;
    use nalgebra::Point3;
    use std::f32::consts::FRAC_PI_2;

    fn test_frustum() -> Frustum {
        let projection = PerspectiveTransform::new(1.0, FRAC_PI_2, 0.1, 100.0);
        Frustum::from_view_projection(projection.matrix())
    }

    #[test]
    fn sphere_in_front_of_camera_intersects_frustum() {
        let frustum = test_frustum();
        let sphere = Sphere::new(Point3::new(0.0, 0.0, -10.0), 1.0);
        assert!(frustum.could_contain_sphere(&sphere));
    }

    #[test]
    fn sphere_behind_camera_is_outside_frustum() {
        let frustum = test_frustum();
        let sphere = Sphere::new(Point3::new(0.0, 0.0, 10.0), 1.0);
        assert!(!frustum.could_contain_sphere(&sphere));
    }

    #[test]
    fn sphere_beyond_far_plane_is_outside_frustum() {
        let frustum = test_frustum();
        let sphere = Sphere::new(Point3::new(0.0, 0.0, -200.0), 1.0);
        assert!(!frustum.could_contain_sphere(&sphere));
    }

    #[test]
    fn sphere_straddling_near_plane_intersects_frustum() {
        let frustum = test_frustum();
        let sphere = Sphere::new(Point3::new(0.0, 0.0, 0.0), 0.5);
        assert!(frustum.could_contain_sphere(&sphere));
    }
}
