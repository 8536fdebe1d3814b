//! Light sources.

pub mod shadow_map;

use anyhow::{Result, bail};
use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use candela_geometry::Sphere;
use nalgebra::{Point3, UnitVector3};

/// The number of shadow map slices an omnidirectional light requires, one per
/// cubemap face.
pub const SLICES_PER_OMNIDIRECTIONAL_LIGHT: u32 = 6;

/// The kind of a light source, together with its kind-specific parameters.
///
/// Behavior differences between the kinds are confined to a handful of pure
/// functions (bounding volume, slice count, shader parameter packing), so the
/// kinds are dispatched over with `match` rather than through a trait.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightKind {
    /// Light arriving from a single direction everywhere in the scene, like
    /// sunlight. Directional lights are globally visible and never receive
    /// shadow atlas slices.
    Directional,
    /// Light emitted uniformly in all directions from a position, with an
    /// influence sphere of the given radius.
    Omnidirectional { range: f32 },
    /// Light emitted in a cone around a direction, with the given influence
    /// range along the axis and cone half-angle in radians.
    Spot { range: f32, half_angle: f32 },
}

/// How the shadows cast by a light are sampled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShadowMode {
    /// The light casts no shadows.
    None,
    /// Single-tap shadow sampling with hard edges.
    Hard,
    /// Filtered shadow sampling with softened edges.
    Soft,
}

bitflags! {
    /// Bitflags encoding a set of binary states or properties for a light.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Zeroable, Pod)]
    pub struct LightFlags: u8 {
        /// The light is the scene's main light, which is shadowed through a
        /// dedicated path rather than the shared atlas.
        const IS_MAIN_LIGHT = 1 << 0;
        /// The bound of the light's shadow casters is empty or invalid, so
        /// rendering a shadow map for it would be wasted work.
        const CASTERS_DEGENERATE = 1 << 1;
    }
}

/// A visible light source as provided by the scene for one frame. The light's
/// index is its position in the frame's light list; no identity is carried
/// across frames.
#[derive(Clone, Copy, Debug)]
pub struct SceneLight {
    pub kind: LightKind,
    /// World-space position (ignored for directional lights).
    pub position: Point3<f32>,
    /// World-space direction the light points in (spot and directional).
    pub direction: UnitVector3<f32>,
    pub shadow_mode: ShadowMode,
    /// Shadow opacity in [0, 1]; zero disables shadow casting entirely.
    pub shadow_strength: f32,
    /// Resolution hint from the scene's screen-coverage heuristic, in texels.
    pub requested_resolution: u32,
    /// Squared distance from the camera, derived once per frame upstream.
    pub camera_distance_squared: f32,
    pub flags: LightFlags,
}

/// A visible reflection probe as provided by the scene for one frame.
#[derive(Clone, Copy, Debug)]
pub struct ReflectionProbe {
    pub bounding_sphere: Sphere,
    /// Probes with higher importance are evaluated first in the shader, so
    /// that less important probes layered inside them win in blending order.
    pub importance: i32,
}

/// Per-light shadow parameters consumed by the lighting shaders.
///
/// # Warning
/// The fields must not be reordered, as this ordering is expected by the
/// shader.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Zeroable, Pod)]
pub struct ShadowParams {
    strength: f32,
    /// 1.0 when the shadow map should be sampled with filtering.
    softness: f32,
    /// 1.0 when the light samples six cubemap-face slices.
    is_omnidirectional: f32,
    /// Index of the light's first atlas slice, or [`Self::INVALID_SLICE`]
    /// when the light casts no shadows this frame.
    first_slice_index: f32,
}

/// Global configuration for the lighting and culling subsystems.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug)]
pub struct LightingConfig {
    /// The width and height of the shadow atlas in texels. Must be a power of
    /// two.
    pub shadow_atlas_resolution: u32,
    /// The smallest atlas slice resolution at which hard shadows are still
    /// worth rendering.
    pub min_hard_shadow_resolution: u32,
    /// The smallest atlas slice resolution at which soft shadows are still
    /// worth rendering.
    pub min_soft_shadow_resolution: u32,
    /// Upper bound on the number of lights participating in Forward+
    /// culling.
    pub max_additional_lights: usize,
    /// Upper bound on the number of reflection probes participating in
    /// Forward+ culling.
    pub max_reflection_probes: usize,
    /// Total number of 32-bit words available for the per-tile light masks.
    pub tile_word_budget: usize,
    /// Total number of 32-bit words available for the depth-bin light masks.
    pub zbin_word_budget: usize,
    /// The tile width the tile-size search starts from, in pixels.
    pub min_tile_width: u32,
}

impl SceneLight {
    /// The near plane distance used for all shadow slice projections. Lights
    /// with a range not exceeding this are degenerate for shadow purposes.
    pub const SHADOW_NEAR_DISTANCE: f32 = 0.05;

    /// Whether the light should receive shadow atlas slices this frame.
    pub fn casts_shadows(&self) -> bool {
        if self.shadow_mode == ShadowMode::None
            || self.shadow_strength <= 0.0
            || self.flags.contains(LightFlags::IS_MAIN_LIGHT)
            || self.flags.contains(LightFlags::CASTERS_DEGENERATE)
        {
            return false;
        }
        match self.kind {
            LightKind::Directional => false,
            LightKind::Omnidirectional { range } | LightKind::Spot { range, .. } => {
                range > Self::SHADOW_NEAR_DISTANCE
            }
        }
    }

    /// The number of shadow map slices the light requires when casting
    /// shadows.
    pub fn shadow_slice_count(&self) -> u32 {
        match self.kind {
            LightKind::Directional => 0,
            LightKind::Omnidirectional { .. } => SLICES_PER_OMNIDIRECTIONAL_LIGHT,
            LightKind::Spot { .. } => 1,
        }
    }

    /// Whether the light participates in Forward+ binning and tiling.
    /// Directional lights do not; they are globally visible and handled by a
    /// separate uniform path.
    pub fn participates_in_culling(&self) -> bool {
        !matches!(self.kind, LightKind::Directional)
    }

    /// The bounding sphere of the world-space volume the light can
    /// illuminate, or [`None`] for directional lights and lights with a
    /// degenerate range.
    pub fn bounding_sphere(&self) -> Option<Sphere> {
        match self.kind {
            LightKind::Directional => None,
            LightKind::Omnidirectional { range } if range > 0.0 => {
                Some(Sphere::new(self.position, range))
            }
            LightKind::Spot { range, half_angle } if range > 0.0 => {
                Some(Sphere::bounding_sphere_for_cone(
                    self.position,
                    self.direction,
                    range,
                    // A half-angle at or beyond 90 degrees has no finite
                    // base disk; bound it with the widest representable
                    // cone instead.
                    half_angle.clamp(0.0, 1.55),
                ))
            }
            _ => None,
        }
    }
}

impl ShadowParams {
    /// Sentinel slice index marking a light without atlas slices.
    pub const INVALID_SLICE: f32 = -1.0;

    /// Creates the shadow parameters for a light whose first atlas slice has
    /// the given index.
    pub fn for_light(light: &SceneLight, first_slice_index: u32) -> Self {
        Self {
            strength: light.shadow_strength,
            softness: if light.shadow_mode == ShadowMode::Soft {
                1.0
            } else {
                0.0
            },
            is_omnidirectional: if matches!(light.kind, LightKind::Omnidirectional { .. }) {
                1.0
            } else {
                0.0
            },
            first_slice_index: first_slice_index as f32,
        }
    }

    /// Creates the shadow parameters for a light that casts no shadows this
    /// frame.
    pub fn disabled() -> Self {
        Self {
            strength: 0.0,
            softness: 0.0,
            is_omnidirectional: 0.0,
            first_slice_index: Self::INVALID_SLICE,
        }
    }

    /// Returns the shadow strength.
    pub fn strength(&self) -> f32 {
        self.strength
    }

    /// Returns the index of the light's first atlas slice, or [`None`] when
    /// the light casts no shadows this frame.
    pub fn first_slice_index(&self) -> Option<u32> {
        if self.first_slice_index < 0.0 {
            None
        } else {
            Some(self.first_slice_index as u32)
        }
    }
}

impl LightingConfig {
    /// Checks that the configuration values are usable.
    ///
    /// # Errors
    /// Returns an error if the atlas resolution is not a power of two, if a
    /// minimum shadow resolution exceeds the atlas resolution, or if any
    /// budget is zero.
    pub fn validate(&self) -> Result<()> {
        if !self.shadow_atlas_resolution.is_power_of_two() {
            bail!(
                "Shadow atlas resolution {} is not a power of two",
                self.shadow_atlas_resolution
            );
        }
        if self.min_hard_shadow_resolution == 0 || self.min_soft_shadow_resolution == 0 {
            bail!("Minimum shadow resolutions must be nonzero");
        }
        if self
            .min_hard_shadow_resolution
            .max(self.min_soft_shadow_resolution)
            > self.shadow_atlas_resolution
        {
            bail!(
                "Minimum shadow resolution exceeds the atlas resolution {}",
                self.shadow_atlas_resolution
            );
        }
        if self.tile_word_budget == 0 || self.zbin_word_budget == 0 {
            bail!("Tile and depth-bin word budgets must be nonzero");
        }
        if self.min_tile_width == 0 || !self.min_tile_width.is_power_of_two() {
            bail!(
                "Minimum tile width {} is not a power of two",
                self.min_tile_width
            );
        }
        Ok(())
    }
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            shadow_atlas_resolution: 2048,
            min_hard_shadow_resolution: 8,
            min_soft_shadow_resolution: 16,
            max_additional_lights: 256,
            max_reflection_probes: 64,
            tile_word_budget: 4096,
            zbin_word_budget: 4096,
            min_tile_width: 8,
        }
    }
}
