//! Shadow atlas slice allocation.
//!
//! Every frame, each shadow-casting non-directional light is expanded into
//! one (spot) or six (omnidirectional) slice requests. The requests are
//! sorted by a total priority order and packed into a single square shadow
//! atlas. When the requests do not fit, all requested resolutions are scaled
//! down by a common power-of-two factor, and lights whose slices would drop
//! below the minimum worthwhile resolution lose their slices entirely for
//! the frame.

use crate::{LightKind, LightingConfig, SceneLight, ShadowParams};
use candela_geometry::{CubemapFace, Frustum, PerspectiveTransform};
use const_fnv1a_hash::fnv1a_hash_64;
use nalgebra::{Matrix4, Point3, UnitVector3, Vector3};
use std::cmp::Ordering;
use std::f32::consts::FRAC_PI_2;

/// A request for one shadow map slice, valid for a single frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowSliceRequest {
    pub light_index: u32,
    /// Index of the slice within its light: zero for spot lights, the
    /// cubemap face index for omnidirectional lights.
    pub slice_index: u32,
    pub requested_resolution: u32,
    pub soft: bool,
    pub omnidirectional: bool,
    pub camera_distance_squared: f32,
}

/// An axis-aligned free rectangle inside the shadow atlas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct AtlasRegion {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

/// One placed shadow map slice, with the transforms needed to render into it
/// and to sample it from the lit-scene shader.
#[derive(Clone, Debug, PartialEq)]
pub struct AllocatedSlice {
    pub light_index: u32,
    pub slice_index: u32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub resolution: u32,
    /// World to light-slice view space.
    pub view: Matrix4<f32>,
    /// Light-slice view space to normalized device coordinates.
    pub projection: Matrix4<f32>,
    /// World space directly to the slice's UV sub-rectangle of the atlas.
    pub world_to_atlas: Matrix4<f32>,
}

/// The finalized result of shadow atlas allocation for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ShadowAtlasLayout {
    atlas_width: u32,
    atlas_height: u32,
    slices: Vec<AllocatedSlice>,
    shadow_params: Vec<ShadowParams>,
    frame_signature: u64,
}

/// Reusable working memory for [`allocate_shadow_atlas`]. Keeping it around
/// across frames avoids reallocating the request and free-region lists once
/// their capacity has grown to the scene's steady state.
#[derive(Debug, Default)]
pub struct ShadowAtlasScratch {
    requests: Vec<ShadowSliceRequest>,
    free_regions: Vec<AtlasRegion>,
    placements: Vec<(u32, u32)>,
}

impl ShadowAtlasScratch {
    pub fn new() -> Self {
        Self::default()
    }

    fn clear(&mut self) {
        self.requests.clear();
        self.free_regions.clear();
        self.placements.clear();
    }
}

impl AllocatedSlice {
    /// Returns the combined view-projection matrix for rendering casters
    /// into the slice.
    pub fn view_projection(&self) -> Matrix4<f32> {
        self.projection * self.view
    }

    /// Returns the frustum enclosing everything that can cast a shadow into
    /// the slice, for culling caster draws.
    pub fn caster_frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection())
    }
}

impl ShadowAtlasLayout {
    /// Creates the layout used when no light produced any surviving slice:
    /// a 1x1 atlas that downstream passes bind as a neutral dummy texture.
    fn empty(light_count: usize, frame_signature: u64) -> Self {
        Self {
            atlas_width: 1,
            atlas_height: 1,
            slices: Vec::new(),
            shadow_params: vec![ShadowParams::disabled(); light_count],
            frame_signature,
        }
    }

    /// The width of the atlas render target in texels.
    pub fn atlas_width(&self) -> u32 {
        self.atlas_width
    }

    /// The height of the atlas render target in texels.
    pub fn atlas_height(&self) -> u32 {
        self.atlas_height
    }

    /// Whether any slice was allocated this frame.
    pub fn has_slices(&self) -> bool {
        !self.slices.is_empty()
    }

    /// The allocated slices, in placement priority order. An
    /// omnidirectional light's six face slices are contiguous and ordered by
    /// face index.
    pub fn slices(&self) -> &[AllocatedSlice] {
        &self.slices
    }

    /// Per input light shadow parameters, indexed by the light's position in
    /// the frame's light list.
    pub fn shadow_params(&self) -> &[ShadowParams] {
        &self.shadow_params
    }

    /// Hash over the shadow-relevant shape of the frame's light list and the
    /// final atlas width. Callers may skip re-deriving persistent GPU state
    /// when the signature matches the previous frame's.
    pub fn frame_signature(&self) -> u64 {
        self.frame_signature
    }
}

/// Allocates shadow atlas slices for all shadow-casting lights in the given
/// frame light list.
///
/// The allocation is deterministic: identical input light lists produce
/// bit-identical layouts.
pub fn allocate_shadow_atlas(
    lights: &[SceneLight],
    config: &LightingConfig,
    scratch: &mut ShadowAtlasScratch,
) -> ShadowAtlasLayout {
    scratch.clear();

    collect_slice_requests(lights, &mut scratch.requests);
    scratch.requests.sort_by(compare_requests);

    let atlas_resolution = config.shadow_atlas_resolution;

    // The scale factor from the area estimate is a floor once a packing
    // attempt has failed: a fragmentation failure at some factor must never
    // be retried at a smaller one, or the loop would not be bounded.
    let mut packing_floor = 1u32;
    let scale_factor = loop {
        if scratch.requests.is_empty() {
            let signature = compute_frame_signature(lights, 1);
            return ShadowAtlasLayout::empty(lights.len(), signature);
        }

        let factor =
            packing_floor.max(estimate_scale_factor(&scratch.requests, atlas_resolution));

        if drop_illegal_slice_groups(&mut scratch.requests, factor, config) {
            // The set shrank, so the area estimate may have changed.
            continue;
        }

        if try_pack(
            &scratch.requests,
            factor,
            atlas_resolution,
            &mut scratch.free_regions,
            &mut scratch.placements,
        ) {
            break factor;
        }

        let max_requested = scratch
            .requests
            .iter()
            .map(|request| request.requested_resolution)
            .max()
            .unwrap_or(1);
        if factor >= max_requested {
            // Every slice is already scaled to a single texel, so doubling
            // the factor cannot free any space; shed load instead.
            let light_index = scratch.requests[scratch.requests.len() - 1].light_index;
            scratch.requests.retain(|request| request.light_index != light_index);
            log::debug!("Dropping shadow slices of light {light_index}: atlas is full");
            continue;
        }
        packing_floor = factor.saturating_mul(2);
    };

    finalize_layout(lights, scratch, scale_factor)
}

fn collect_slice_requests(lights: &[SceneLight], requests: &mut Vec<ShadowSliceRequest>) {
    for (light_index, light) in lights.iter().enumerate() {
        if !light.casts_shadows() {
            if light.shadow_mode != crate::ShadowMode::None {
                log::trace!("Skipping shadow work for degenerate light {light_index}");
            }
            continue;
        }
        for slice_index in 0..light.shadow_slice_count() {
            requests.push(ShadowSliceRequest {
                light_index: light_index as u32,
                slice_index,
                requested_resolution: light.requested_resolution,
                soft: light.shadow_mode == crate::ShadowMode::Soft,
                omnidirectional: matches!(light.kind, LightKind::Omnidirectional { .. }),
                camera_distance_squared: light.camera_distance_squared,
            });
        }
    }
}

/// Total priority order over slice requests. Under scarcity, higher
/// resolution, softer, omnidirectional and closer shadows win placement,
/// with the frame-stable light and slice indices as final tie-breaks.
fn compare_requests(a: &ShadowSliceRequest, b: &ShadowSliceRequest) -> Ordering {
    b.requested_resolution
        .cmp(&a.requested_resolution)
        .then_with(|| b.soft.cmp(&a.soft))
        .then_with(|| b.omnidirectional.cmp(&a.omnidirectional))
        .then_with(|| {
            a.camera_distance_squared
                .total_cmp(&b.camera_distance_squared)
        })
        .then_with(|| a.light_index.cmp(&b.light_index))
        .then_with(|| a.slice_index.cmp(&b.slice_index))
}

fn scaled_resolution(requested_resolution: u32, scale_factor: u32) -> u32 {
    (requested_resolution / scale_factor).max(1)
}

fn minimum_legal_resolution(request: &ShadowSliceRequest, config: &LightingConfig) -> u32 {
    if request.soft {
        config.min_soft_shadow_resolution
    } else {
        config.min_hard_shadow_resolution
    }
}

/// Estimates the smallest power-of-two scale factor at which the total area
/// of all scaled requests fits in the atlas.
fn estimate_scale_factor(requests: &[ShadowSliceRequest], atlas_resolution: u32) -> u32 {
    let atlas_area = u64::from(atlas_resolution) * u64::from(atlas_resolution);
    let max_requested = requests
        .iter()
        .map(|request| request.requested_resolution)
        .max()
        .unwrap_or(1);

    let mut factor = 1;
    while total_scaled_area(requests, factor) > atlas_area && factor < max_requested {
        factor *= 2;
    }
    factor
}

fn total_scaled_area(requests: &[ShadowSliceRequest], scale_factor: u32) -> u64 {
    requests
        .iter()
        .map(|request| {
            let size = u64::from(scaled_resolution(request.requested_resolution, scale_factor));
            size * size
        })
        .sum()
}

/// Removes every slice of any light whose scaled resolution would fall below
/// the minimum worthwhile resolution, lowest-priority light first. Returns
/// whether anything was dropped.
fn drop_illegal_slice_groups(
    requests: &mut Vec<ShadowSliceRequest>,
    scale_factor: u32,
    config: &LightingConfig,
) -> bool {
    let mut dropped = false;
    while let Some(position) = requests.iter().rposition(|request| {
        scaled_resolution(request.requested_resolution, scale_factor)
            < minimum_legal_resolution(request, config)
    }) {
        let light_index = requests[position].light_index;
        requests.retain(|request| request.light_index != light_index);
        log::debug!(
            "Dropping shadow slices of light {light_index}: resolution would fall below \
             the minimum at atlas scale factor {scale_factor}"
        );
        dropped = true;
    }
    dropped
}

/// Greedy guillotine packing of the scaled requests into the atlas square.
///
/// Walks the requests in priority order and places each in the first free
/// region large enough, splitting off the leftover strips. Fails as a whole
/// on the first request that fits nowhere, regardless of how much total free
/// area remains; the caller then retries with a doubled scale factor.
fn try_pack(
    requests: &[ShadowSliceRequest],
    scale_factor: u32,
    atlas_resolution: u32,
    free_regions: &mut Vec<AtlasRegion>,
    placements: &mut Vec<(u32, u32)>,
) -> bool {
    free_regions.clear();
    placements.clear();
    free_regions.push(AtlasRegion {
        x: 0,
        y: 0,
        width: atlas_resolution,
        height: atlas_resolution,
    });

    for request in requests {
        let size = scaled_resolution(request.requested_resolution, scale_factor);

        let Some(index) = free_regions
            .iter()
            .position(|region| region.width >= size && region.height >= size)
        else {
            return false;
        };

        let region = free_regions.remove(index);
        placements.push((region.x, region.y));

        // Guillotine split: the strip right of the placed square keeps the
        // full region height, the strip below keeps the placed width.
        if region.width > size {
            free_regions.push(AtlasRegion {
                x: region.x + size,
                y: region.y,
                width: region.width - size,
                height: region.height,
            });
        }
        if region.height > size {
            free_regions.push(AtlasRegion {
                x: region.x,
                y: region.y + size,
                width: size,
                height: region.height - size,
            });
        }
    }
    true
}

fn finalize_layout(
    lights: &[SceneLight],
    scratch: &mut ShadowAtlasScratch,
    scale_factor: u32,
) -> ShadowAtlasLayout {
    // Snap the render target to the next power-of-two bounding box of the
    // area the placements actually use.
    let mut used_width = 0;
    let mut used_height = 0;
    for (request, &(x, y)) in scratch.requests.iter().zip(&scratch.placements) {
        let size = scaled_resolution(request.requested_resolution, scale_factor);
        used_width = used_width.max(x + size);
        used_height = used_height.max(y + size);
    }
    let atlas_width = used_width.next_power_of_two();
    let atlas_height = used_height.next_power_of_two();

    let mut shadow_params = vec![ShadowParams::disabled(); lights.len()];
    let mut slices = Vec::with_capacity(scratch.requests.len());

    for (slice_position, (request, &(offset_x, offset_y))) in scratch
        .requests
        .iter()
        .zip(&scratch.placements)
        .enumerate()
    {
        let light = &lights[request.light_index as usize];
        let resolution = scaled_resolution(request.requested_resolution, scale_factor);

        let (view, projection) = compute_slice_view_and_projection(light, request.slice_index);
        let world_to_atlas =
            atlas_remap_matrix(offset_x, offset_y, resolution, atlas_width, atlas_height)
                * projection
                * view;

        if request.slice_index == 0 {
            shadow_params[request.light_index as usize] =
                ShadowParams::for_light(light, slice_position as u32);
        }

        slices.push(AllocatedSlice {
            light_index: request.light_index,
            slice_index: request.slice_index,
            offset_x,
            offset_y,
            resolution,
            view,
            projection,
            world_to_atlas,
        });
    }

    let frame_signature = compute_frame_signature(lights, atlas_width);

    ShadowAtlasLayout {
        atlas_width,
        atlas_height,
        slices,
        shadow_params,
        frame_signature,
    }
}

fn compute_slice_view_and_projection(
    light: &SceneLight,
    slice_index: u32,
) -> (Matrix4<f32>, Matrix4<f32>) {
    match light.kind {
        LightKind::Directional => unreachable!("directional lights receive no atlas slices"),
        LightKind::Omnidirectional { range } => {
            let face = CubemapFace::all()[slice_index as usize];
            let view = face.compute_view_matrix(&light.position);
            let projection = PerspectiveTransform::new(
                1.0,
                FRAC_PI_2,
                SceneLight::SHADOW_NEAR_DISTANCE,
                range,
            );
            (view, *projection.matrix())
        }
        LightKind::Spot { range, half_angle } => {
            let view = spot_view_matrix(&light.position, &light.direction);
            // The full cone must fit in the view, so the vertical field of
            // view is twice the half-angle (clamped short of a degenerate
            // 180 degree frustum).
            let vertical_field_of_view = (2.0 * half_angle).clamp(0.01, 3.1);
            let projection = PerspectiveTransform::new(
                1.0,
                vertical_field_of_view,
                SceneLight::SHADOW_NEAR_DISTANCE,
                range,
            );
            (view, *projection.matrix())
        }
    }
}

fn spot_view_matrix(position: &Point3<f32>, direction: &UnitVector3<f32>) -> Matrix4<f32> {
    // When the light points nearly straight up or down the usual up vector
    // becomes parallel to the view direction, so fall back to the negative
    // z-axis.
    let up = if direction.y.abs() > 0.999 {
        -Vector3::z()
    } else {
        Vector3::y()
    };
    Matrix4::look_at_rh(position, &(position + direction.into_inner()), &up)
}

/// Builds the matrix mapping slice normalized device coordinates to the
/// slice's UV sub-rectangle of the atlas, with v increasing downwards.
fn atlas_remap_matrix(
    offset_x: u32,
    offset_y: u32,
    resolution: u32,
    atlas_width: u32,
    atlas_height: u32,
) -> Matrix4<f32> {
    let scale_u = resolution as f32 / atlas_width as f32;
    let scale_v = resolution as f32 / atlas_height as f32;
    let offset_u = offset_x as f32 / atlas_width as f32;
    let offset_v = offset_y as f32 / atlas_height as f32;

    #[rustfmt::skip]
    let matrix = Matrix4::new(
        0.5 * scale_u, 0.0,            0.0, 0.5 * scale_u + offset_u,
        0.0,           -0.5 * scale_v, 0.0, 0.5 * scale_v + offset_v,
        0.0,           0.0,            1.0, 0.0,
        0.0,           0.0,            0.0, 1.0,
    );
    matrix
}

/// Hash over the point-light count, the soft-shadow count, the per-light
/// requested-resolution buckets and the atlas width. Changes whenever the
/// shadow-relevant shape of the frame differs from the previous one.
fn compute_frame_signature(lights: &[SceneLight], atlas_width: u32) -> u64 {
    let mut bytes = Vec::with_capacity(8 + lights.len());

    let mut omnidirectional_count = 0u32;
    let mut soft_count = 0u32;
    for light in lights {
        if !light.casts_shadows() {
            continue;
        }
        if matches!(light.kind, LightKind::Omnidirectional { .. }) {
            omnidirectional_count += 1;
        }
        if light.shadow_mode == crate::ShadowMode::Soft {
            soft_count += 1;
        }
        let resolution_bucket = if light.requested_resolution == 0 {
            0
        } else {
            light.requested_resolution.ilog2() as u8
        };
        bytes.push(resolution_bucket);
    }

    bytes.extend_from_slice(&omnidirectional_count.to_le_bytes());
    bytes.extend_from_slice(&soft_count.to_le_bytes());
    bytes.extend_from_slice(&atlas_width.to_le_bytes());

    fnv1a_hash_64(&bytes, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LightFlags, ShadowMode};
    use proptest::prelude::*;

    fn test_light(kind: LightKind, shadow_mode: ShadowMode, resolution: u32) -> SceneLight {
        SceneLight {
            kind,
            position: Point3::new(0.0, 5.0, 0.0),
            direction: UnitVector3::new_normalize(Vector3::new(0.0, -1.0, 0.1)),
            shadow_mode,
            shadow_strength: 1.0,
            requested_resolution: resolution,
            camera_distance_squared: 25.0,
            flags: LightFlags::empty(),
        }
    }

    fn spot(resolution: u32) -> SceneLight {
        test_light(
            LightKind::Spot {
                range: 20.0,
                half_angle: 0.6,
            },
            ShadowMode::Hard,
            resolution,
        )
    }

    fn omni(resolution: u32, shadow_mode: ShadowMode) -> SceneLight {
        test_light(
            LightKind::Omnidirectional { range: 15.0 },
            shadow_mode,
            resolution,
        )
    }

    fn allocate(lights: &[SceneLight], config: &LightingConfig) -> ShadowAtlasLayout {
        let mut scratch = ShadowAtlasScratch::new();
        allocate_shadow_atlas(lights, config, &mut scratch)
    }

    fn assert_no_overlaps(layout: &ShadowAtlasLayout) {
        let slices = layout.slices();
        for (i, a) in slices.iter().enumerate() {
            assert!(a.offset_x + a.resolution <= layout.atlas_width());
            assert!(a.offset_y + a.resolution <= layout.atlas_height());
            for b in &slices[i + 1..] {
                let disjoint_x = a.offset_x + a.resolution <= b.offset_x
                    || b.offset_x + b.resolution <= a.offset_x;
                let disjoint_y = a.offset_y + a.resolution <= b.offset_y
                    || b.offset_y + b.resolution <= a.offset_y;
                assert!(
                    disjoint_x || disjoint_y,
                    "slices {a:?} and {b:?} overlap in the atlas"
                );
            }
        }
    }

    #[test]
    fn single_spot_light_is_placed_at_the_atlas_origin() {
        let config = LightingConfig::default();
        let layout = allocate(&[spot(1024)], &config);

        assert_eq!(layout.slices().len(), 1);
        let slice = &layout.slices()[0];
        assert_eq!((slice.offset_x, slice.offset_y), (0, 0));
        assert_eq!(slice.resolution, 1024);
        assert_eq!(layout.atlas_width(), 1024);
        assert_eq!(layout.atlas_height(), 1024);
        assert_eq!(layout.shadow_params()[0].first_slice_index(), Some(0));
    }

    #[test]
    fn three_soft_point_lights_scale_down_once_to_fit() {
        let config = LightingConfig::default();
        let lights = [
            omni(512, ShadowMode::Soft),
            omni(512, ShadowMode::Soft),
            omni(512, ShadowMode::Soft),
        ];
        let layout = allocate(&lights, &config);

        // 18 * 512^2 exceeds the 2048^2 atlas, so the scale factor doubles
        // and all 18 slices land at 256.
        assert_eq!(layout.slices().len(), 18);
        assert!(layout.slices().iter().all(|slice| slice.resolution == 256));
        assert_no_overlaps(&layout);
    }

    #[test]
    fn zero_shadow_casting_lights_produce_the_empty_fallback() {
        let config = LightingConfig::default();
        let mut light = spot(512);
        light.shadow_mode = ShadowMode::None;

        let layout = allocate(&[light], &config);

        assert!(!layout.has_slices());
        assert_eq!(layout.atlas_width(), 1);
        assert_eq!(layout.atlas_height(), 1);
        assert_eq!(layout.shadow_params()[0].first_slice_index(), None);
    }

    #[test]
    fn soft_shadows_sort_before_hard_at_equal_resolution() {
        let config = LightingConfig::default();
        let hard = spot(256);
        let mut soft = spot(256);
        soft.shadow_mode = ShadowMode::Soft;

        let layout = allocate(&[hard, soft], &config);

        assert_eq!(layout.slices().len(), 2);
        // The soft light (index 1) wins the first, contested placement.
        assert_eq!(layout.slices()[0].light_index, 1);
        assert_eq!(
            (layout.slices()[0].offset_x, layout.slices()[0].offset_y),
            (0, 0)
        );
    }

    #[test]
    fn omnidirectional_slices_are_contiguous_and_face_ordered() {
        let config = LightingConfig::default();
        let layout = allocate(&[omni(256, ShadowMode::Hard)], &config);

        assert_eq!(layout.slices().len(), 6);
        for (face_index, slice) in layout.slices().iter().enumerate() {
            assert_eq!(slice.slice_index, face_index as u32);
        }
        assert_eq!(layout.shadow_params()[0].first_slice_index(), Some(0));
    }

    #[test]
    fn oversubscription_drops_lights_instead_of_failing() {
        let config = LightingConfig {
            shadow_atlas_resolution: 64,
            ..Default::default()
        };
        let lights: Vec<_> = (0..100).map(|_| omni(1024, ShadowMode::Soft)).collect();

        let layout = allocate(&lights, &config);

        // Whatever survives is legal, intact per light and non-overlapping.
        assert_eq!(layout.slices().len() % 6, 0);
        assert!(
            layout
                .slices()
                .iter()
                .all(|slice| slice.resolution >= config.min_soft_shadow_resolution)
        );
        assert_no_overlaps(&layout);
    }

    #[test]
    fn raising_a_request_never_shrinks_that_lights_allocation() {
        let config = LightingConfig {
            shadow_atlas_resolution: 256,
            ..Default::default()
        };
        let baseline = allocate(&[spot(128), spot(128)], &config);
        let raised = allocate(&[spot(256), spot(128)], &config);

        let resolution_of = |layout: &ShadowAtlasLayout, light_index: u32| {
            layout
                .slices()
                .iter()
                .find(|slice| slice.light_index == light_index)
                .map(|slice| slice.resolution)
                .unwrap_or(0)
        };

        assert!(resolution_of(&raised, 0) >= resolution_of(&baseline, 0));
    }

    #[test]
    fn camera_distance_breaks_resolution_ties() {
        let config = LightingConfig::default();
        let mut near = spot(256);
        near.camera_distance_squared = 1.0;
        let mut far = spot(256);
        far.camera_distance_squared = 100.0;

        let layout = allocate(&[far, near], &config);

        assert_eq!(layout.slices()[0].light_index, 1);
    }

    #[test]
    fn identical_input_produces_identical_layouts() {
        let config = LightingConfig::default();
        let lights = [
            spot(512),
            omni(256, ShadowMode::Soft),
            spot(64),
            omni(1024, ShadowMode::Hard),
        ];

        assert_eq!(allocate(&lights, &config), allocate(&lights, &config));
    }

    #[test]
    fn frame_signature_tracks_shadow_relevant_changes() {
        let config = LightingConfig::default();
        let baseline = allocate(&[spot(512), omni(256, ShadowMode::Soft)], &config);
        let same = allocate(&[spot(512), omni(256, ShadowMode::Soft)], &config);
        let different = allocate(&[spot(512), omni(512, ShadowMode::Soft)], &config);

        assert_eq!(baseline.frame_signature(), same.frame_signature());
        assert_ne!(baseline.frame_signature(), different.frame_signature());
    }

    #[test]
    fn world_to_atlas_lands_inside_the_slice_uv_rectangle() {
        let config = LightingConfig::default();
        let light = spot(512);
        let layout = allocate(&[light], &config);
        let slice = &layout.slices()[0];

        // A point in front of the spot light, inside its cone.
        let target = light.position + light.direction.scale(5.0);
        let uv = slice.world_to_atlas.transform_point(&target);

        let u_min = slice.offset_x as f32 / layout.atlas_width() as f32;
        let v_min = slice.offset_y as f32 / layout.atlas_height() as f32;
        let u_max = (slice.offset_x + slice.resolution) as f32 / layout.atlas_width() as f32;
        let v_max = (slice.offset_y + slice.resolution) as f32 / layout.atlas_height() as f32;

        assert!(uv.x >= u_min && uv.x <= u_max);
        assert!(uv.y >= v_min && uv.y <= v_max);
        assert!(uv.z >= 0.0 && uv.z <= 1.0);
    }

    #[test]
    fn caster_frustum_contains_the_lit_volume() {
        use candela_geometry::Sphere;

        let config = LightingConfig::default();
        let light = spot(512);
        let layout = allocate(&[light], &config);
        let frustum = layout.slices()[0].caster_frustum();

        let inside = Sphere::new(light.position + light.direction.scale(5.0), 0.5);
        let behind = Sphere::new(light.position - light.direction.scale(5.0), 0.5);

        assert!(frustum.could_contain_sphere(&inside));
        assert!(!frustum.could_contain_sphere(&behind));
    }

    fn arbitrary_light() -> impl Strategy<Value = SceneLight> {
        (
            prop_oneof![Just(false), Just(true)],
            prop_oneof![Just(ShadowMode::Hard), Just(ShadowMode::Soft)],
            8u32..2048,
            0.1f32..10_000.0,
        )
            .prop_map(|(omnidirectional, shadow_mode, resolution, distance_squared)| {
                let kind = if omnidirectional {
                    LightKind::Omnidirectional { range: 12.0 }
                } else {
                    LightKind::Spot {
                        range: 12.0,
                        half_angle: 0.7,
                    }
                };
                let mut light = test_light(kind, shadow_mode, resolution);
                light.camera_distance_squared = distance_squared;
                light
            })
    }

    proptest! {
        #[test]
        fn allocation_respects_capacity_and_overlap_invariants(
            lights in prop::collection::vec(arbitrary_light(), 0..12)
        ) {
            let config = LightingConfig::default();
            let layout = allocate(&lights, &config);

            assert_no_overlaps(&layout);

            let total_area: u64 = layout
                .slices()
                .iter()
                .map(|slice| u64::from(slice.resolution) * u64::from(slice.resolution))
                .sum();
            let atlas_area = u64::from(config.shadow_atlas_resolution)
                * u64::from(config.shadow_atlas_resolution);
            prop_assert!(total_area <= atlas_area);

            prop_assert!(layout.atlas_width() <= config.shadow_atlas_resolution);
            prop_assert!(layout.atlas_height() <= config.shadow_atlas_resolution);

            for slice in layout.slices() {
                let light = &lights[slice.light_index as usize];
                let minimum = if light.shadow_mode == ShadowMode::Soft {
                    config.min_soft_shadow_resolution
                } else {
                    config.min_hard_shadow_resolution
                };
                prop_assert!(slice.resolution >= minimum);
            }
        }

        #[test]
        fn allocation_is_deterministic(
            lights in prop::collection::vec(arbitrary_light(), 0..12)
        ) {
            let config = LightingConfig::default();
            prop_assert_eq!(allocate(&lights, &config), allocate(&lights, &config));
        }

        #[test]
        fn every_surviving_light_keeps_its_full_slice_group(
            lights in prop::collection::vec(arbitrary_light(), 0..12)
        ) {
            let config = LightingConfig {
                shadow_atlas_resolution: 128,
                ..Default::default()
            };
            let layout = allocate(&lights, &config);

            for (light_index, light) in lights.iter().enumerate() {
                let slice_count = layout
                    .slices()
                    .iter()
                    .filter(|slice| slice.light_index == light_index as u32)
                    .count() as u32;
                prop_assert!(
                    slice_count == 0 || slice_count == light.shadow_slice_count()
                );
            }
        }
    }
}
