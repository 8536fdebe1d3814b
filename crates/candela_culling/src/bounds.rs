//! View-space bounds of lights and reflection probes.

use crate::CullingCamera;
use candela_geometry::Sphere;

/// The view-space depth interval and conservative normalized-device-
/// coordinate rectangle occupied by one light or probe in one view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ItemBounds {
    pub min_depth: f32,
    pub max_depth: f32,
    pub ndc_x_min: f32,
    pub ndc_x_max: f32,
    pub ndc_y_min: f32,
    pub ndc_y_max: f32,
}

impl ItemBounds {
    /// Bounds of an item that is entirely outside the view.
    pub fn empty() -> Self {
        Self {
            min_depth: 1.0,
            max_depth: 0.0,
            ndc_x_min: 1.0,
            ndc_x_max: -1.0,
            ndc_y_min: 1.0,
            ndc_y_max: -1.0,
        }
    }

    /// Whether the item occupies no part of the view.
    pub fn is_empty(&self) -> bool {
        self.min_depth > self.max_depth
    }
}

/// Computes the bounds of the given world-space bounding sphere in the given
/// view.
///
/// The rectangle is conservative: for each extent the projection is evaluated
/// at both the closest and the farthest depth the sphere reaches and the
/// wider result is kept, so the true screen footprint is always covered.
/// Only symmetric perspective projections and axis-aligned orthographic
/// projections are supported, which is all a culling camera provides.
pub fn compute_item_bounds(sphere: &Sphere, camera: &CullingCamera) -> ItemBounds {
    let center = camera.view.transform_point(sphere.center());
    let radius = sphere.radius();
    let depth = -center.z;

    if depth + radius < camera.near || depth - radius > camera.far {
        return ItemBounds::empty();
    }

    let min_depth = (depth - radius).max(camera.near);
    let max_depth = (depth + radius).min(camera.far);

    let x_lo = center.x - radius;
    let x_hi = center.x + radius;
    let y_lo = center.y - radius;
    let y_hi = center.y + radius;

    let (ndc_x_min, ndc_x_max, ndc_y_min, ndc_y_max) = if camera.orthographic {
        let projection = &camera.projection;
        (
            projection.m11 * x_lo + projection.m14,
            projection.m11 * x_hi + projection.m14,
            projection.m22 * y_lo + projection.m24,
            projection.m22 * y_hi + projection.m24,
        )
    } else {
        let projection = &camera.projection;
        let near_denom = min_depth;
        let far_denom = (depth + radius).max(camera.near);
        let spread = |scale: f32, lo: f32, hi: f32| {
            let candidates = [
                scale * lo / near_denom,
                scale * lo / far_denom,
                scale * hi / near_denom,
                scale * hi / far_denom,
            ];
            let min = candidates.iter().copied().fold(f32::INFINITY, f32::min);
            let max = candidates.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            (min, max)
        };
        let (x_min, x_max) = spread(projection.m11, x_lo, x_hi);
        let (y_min, y_max) = spread(projection.m22, y_lo, y_hi);
        (x_min, x_max, y_min, y_max)
    };

    ItemBounds {
        min_depth,
        max_depth,
        ndc_x_min: ndc_x_min.max(-1.0),
        ndc_x_max: ndc_x_max.min(1.0),
        ndc_y_min: ndc_y_min.max(-1.0),
        ndc_y_max: ndc_y_max.min(1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use candela_geometry::{OrthographicTransform, PerspectiveTransform};
    use nalgebra::{Matrix4, Point3};
    use std::f32::consts::FRAC_PI_2;

    fn perspective_camera() -> CullingCamera {
        CullingCamera {
            view: Matrix4::identity(),
            projection: *PerspectiveTransform::new(1.0, FRAC_PI_2, 0.1, 100.0).matrix(),
            orthographic: false,
            near: 0.1,
            far: 100.0,
        }
    }

    #[test]
    fn centered_sphere_produces_symmetric_bounds() {
        let camera = perspective_camera();
        let sphere = Sphere::new(Point3::new(0.0, 0.0, -10.0), 1.0);

        let bounds = compute_item_bounds(&sphere, &camera);

        assert!(!bounds.is_empty());
        assert_abs_diff_eq!(bounds.min_depth, 9.0);
        assert_abs_diff_eq!(bounds.max_depth, 11.0);
        assert_abs_diff_eq!(bounds.ndc_x_min, -bounds.ndc_x_max, epsilon = 1e-6);
        assert_abs_diff_eq!(bounds.ndc_y_min, -bounds.ndc_y_max, epsilon = 1e-6);
    }

    #[test]
    fn sphere_behind_camera_has_empty_bounds() {
        let camera = perspective_camera();
        let sphere = Sphere::new(Point3::new(0.0, 0.0, 10.0), 1.0);

        assert!(compute_item_bounds(&sphere, &camera).is_empty());
    }

    #[test]
    fn sphere_beyond_far_plane_has_empty_bounds() {
        let camera = perspective_camera();
        let sphere = Sphere::new(Point3::new(0.0, 0.0, -200.0), 1.0);

        assert!(compute_item_bounds(&sphere, &camera).is_empty());
    }

    #[test]
    fn depth_interval_is_clamped_to_the_view_range() {
        let camera = perspective_camera();
        let sphere = Sphere::new(Point3::new(0.0, 0.0, -0.2), 1.0);

        let bounds = compute_item_bounds(&sphere, &camera);

        assert_abs_diff_eq!(bounds.min_depth, camera.near);
        assert_abs_diff_eq!(bounds.max_depth, 1.2);
    }

    #[test]
    fn orthographic_bounds_are_independent_of_depth() {
        let projection = OrthographicTransform::new(20.0, 20.0, 0.1, 100.0);
        let camera = CullingCamera {
            view: Matrix4::identity(),
            projection: *projection.matrix(),
            orthographic: true,
            near: 0.1,
            far: 100.0,
        };

        let close = compute_item_bounds(&Sphere::new(Point3::new(2.0, 0.0, -5.0), 1.0), &camera);
        let far = compute_item_bounds(&Sphere::new(Point3::new(2.0, 0.0, -50.0), 1.0), &camera);

        assert_abs_diff_eq!(close.ndc_x_min, far.ndc_x_min, epsilon = 1e-6);
        assert_abs_diff_eq!(close.ndc_x_max, far.ndc_x_max, epsilon = 1e-6);
    }

    #[test]
    fn off_center_sphere_footprint_covers_its_projection() {
        let camera = perspective_camera();
        let sphere = Sphere::new(Point3::new(3.0, 0.0, -10.0), 1.0);

        let bounds = compute_item_bounds(&sphere, &camera);

        // The projected center must lie inside the conservative rectangle.
        let projected_x = 1.0 * 3.0 / 10.0;
        assert!(bounds.ndc_x_min <= projected_x && projected_x <= bounds.ndc_x_max);
    }
}
