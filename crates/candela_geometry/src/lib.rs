//! Geometric primitives and projection transforms used by the lighting and
//! culling crates.

pub mod frustum;
pub mod projection;
pub mod sphere;

pub use frustum::Frustum;
pub use projection::{CubemapFace, OrthographicTransform, PerspectiveTransform};
pub use sphere::Sphere;
