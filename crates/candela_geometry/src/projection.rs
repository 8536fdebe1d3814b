//! Projection transformations.

use approx::assert_abs_diff_ne;
use nalgebra::{Matrix4, Point3, Vector3};

/// A perspective transformation that maps points in a view frustum pointing
/// along the negative z-axis into the volume spanning from -1 to 1 in x and y
/// and from 0 to 1 in z in normalized device coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PerspectiveTransform {
    matrix: Matrix4<f32>,
}

/// An orthographic transformation mapping an axis-aligned view volume to the
/// same normalized device coordinate ranges as [`PerspectiveTransform`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrthographicTransform {
    matrix: Matrix4<f32>,
}

/// One of the six faces of a cubemap. The enum value corresponds to the
/// conventional index of the face.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CubemapFace {
    PositiveX = 0,
    NegativeX = 1,
    PositiveY = 2,
    NegativeY = 3,
    PositiveZ = 4,
    NegativeZ = 5,
}

impl PerspectiveTransform {
    /// Creates a new perspective transformation.
    ///
    /// # Note
    /// `aspect_ratio` is the ratio of width to height of the view plane, and
    /// `vertical_field_of_view` is in radians.
    ///
    /// # Panics
    /// If `aspect_ratio`, `vertical_field_of_view` or `near_distance` is zero.
    pub fn new(
        aspect_ratio: f32,
        vertical_field_of_view: f32,
        near_distance: f32,
        far_distance: f32,
    ) -> Self {
        assert_abs_diff_ne!(aspect_ratio, 0.0);
        assert_abs_diff_ne!(vertical_field_of_view, 0.0);
        assert_abs_diff_ne!(near_distance, 0.0);
        assert!(far_distance > near_distance);

        let mut matrix = Matrix4::identity();

        matrix.m22 = 1.0 / (0.5 * vertical_field_of_view).tan();
        matrix.m11 = matrix.m22 / aspect_ratio;
        matrix.m33 = -far_distance / (far_distance - near_distance);
        matrix.m34 = matrix.m33 * near_distance;
        matrix.m43 = -1.0;
        matrix.m44 = 0.0;

        Self { matrix }
    }

    /// Returns a reference to the projection matrix.
    pub fn matrix(&self) -> &Matrix4<f32> {
        &self.matrix
    }

    /// Applies the transformation to the given view-space point.
    pub fn transform_point(&self, point: &Point3<f32>) -> Point3<f32> {
        let inverse_denom = -1.0 / point.z;
        Point3::new(
            self.matrix.m11 * point.x * inverse_denom,
            self.matrix.m22 * point.y * inverse_denom,
            (self.matrix.m33 * point.z + self.matrix.m34) * inverse_denom,
        )
    }
}

impl OrthographicTransform {
    /// Creates a new orthographic transformation for a view volume centered
    /// on the negative z-axis, with the given width and height and the given
    /// near and far distance.
    ///
    /// # Panics
    /// If `width` or `height` is zero, or if the distance span is empty.
    pub fn new(width: f32, height: f32, near_distance: f32, far_distance: f32) -> Self {
        assert_abs_diff_ne!(width, 0.0);
        assert_abs_diff_ne!(height, 0.0);
        assert!(far_distance > near_distance);

        let mut matrix = Matrix4::identity();

        matrix.m11 = 2.0 / width;
        matrix.m22 = 2.0 / height;
        matrix.m33 = -1.0 / (far_distance - near_distance);
        matrix.m34 = matrix.m33 * near_distance;

        Self { matrix }
    }

    /// Returns a reference to the projection matrix.
    pub fn matrix(&self) -> &Matrix4<f32> {
        &self.matrix
    }

    /// Applies the transformation to the given view-space point.
    pub fn transform_point(&self, point: &Point3<f32>) -> Point3<f32> {
        Point3::new(
            self.matrix.m11 * point.x,
            self.matrix.m22 * point.y,
            self.matrix.m33 * point.z + self.matrix.m34,
        )
    }
}

impl CubemapFace {
    /// Returns an array with each face in the conventional order.
    pub const fn all() -> [Self; 6] {
        [
            Self::PositiveX,
            Self::NegativeX,
            Self::PositiveY,
            Self::NegativeY,
            Self::PositiveZ,
            Self::NegativeZ,
        ]
    }

    /// Returns the index of the face according to the conventional ordering
    /// as a [`u32`].
    pub const fn as_idx_u32(&self) -> u32 {
        *self as u32
    }

    /// Returns the index of the face according to the conventional ordering
    /// as a [`usize`].
    pub const fn as_idx_usize(&self) -> usize {
        *self as usize
    }

    /// Returns the outward direction of the face.
    pub fn forward(&self) -> Vector3<f32> {
        match self {
            Self::PositiveX => Vector3::x(),
            Self::NegativeX => -Vector3::x(),
            Self::PositiveY => Vector3::y(),
            Self::NegativeY => -Vector3::y(),
            Self::PositiveZ => Vector3::z(),
            Self::NegativeZ => -Vector3::z(),
        }
    }

    /// Returns the up direction used when rendering into the face.
    pub fn up(&self) -> Vector3<f32> {
        match self {
            Self::PositiveY => Vector3::z(),
            Self::NegativeY => -Vector3::z(),
            _ => -Vector3::y(),
        }
    }

    /// Computes the view matrix for rendering this face of a cubemap centered
    /// at the given position.
    pub fn compute_view_matrix(&self, position: &Point3<f32>) -> Matrix4<f32> {
        Matrix4::look_at_rh(position, &(position + self.forward()), &self.up())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn perspective_transform_maps_near_and_far_plane_to_zero_and_one() {
        let transform = PerspectiveTransform::new(1.0, std::f32::consts::FRAC_PI_2, 0.1, 100.0);

        let on_near_plane = transform.transform_point(&Point3::new(0.0, 0.0, -0.1));
        let on_far_plane = transform.transform_point(&Point3::new(0.0, 0.0, -100.0));

        assert_abs_diff_eq!(on_near_plane.z, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(on_far_plane.z, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn orthographic_transform_maps_view_volume_corners_to_ndc_corners() {
        let transform = OrthographicTransform::new(4.0, 2.0, 1.0, 11.0);

        let corner = transform.transform_point(&Point3::new(2.0, 1.0, -11.0));

        assert_abs_diff_eq!(corner.x, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(corner.y, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(corner.z, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn cubemap_face_axes_are_orthogonal() {
        for face in CubemapFace::all() {
            assert_abs_diff_eq!(face.forward().dot(&face.up()), 0.0);
        }
    }

    #[test]
    fn cubemap_face_view_matrix_looks_along_face_direction() {
        let position = Point3::new(1.0, 2.0, 3.0);
        for face in CubemapFace::all() {
            let view = face.compute_view_matrix(&position);
            // A point straight ahead of the face lands on the negative view
            // space z-axis.
            let ahead = view.transform_point(&(position + face.forward().scale(5.0)));
            assert_abs_diff_eq!(ahead.x, 0.0, epsilon = 1e-5);
            assert_abs_diff_eq!(ahead.y, 0.0, epsilon = 1e-5);
            assert_abs_diff_eq!(ahead.z, -5.0, epsilon = 1e-5);
        }
    }
}
