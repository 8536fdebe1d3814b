//! Forward+ light culling.
//!
//! Partitions the camera's depth range into logarithmic (or, for
//! orthographic views, linear) bins and the screen into square tiles, and
//! computes per-bin and per-tile bitmasks of the lights and reflection
//! probes that are potentially visible there. The per-pixel shader combines
//! the two masks to shrink its light list without a linear scan.
//!
//! The work is decomposed into three passes with explicit dependencies: the
//! per-item min/max depth pass runs first, then the depth-binning pass and
//! the two-stage tiling pass run concurrently, each parallelized over
//! disjoint output ranges.

pub mod bounds;
pub mod tile;
pub mod zbin;

use bounds::{ItemBounds, compute_item_bounds};
use bytemuck::{Pod, Zeroable};
use candela_geometry::Sphere;
use candela_light::{LightingConfig, ReflectionProbe, SceneLight};
use candela_thread::RayonThreadPool;
use nalgebra::Matrix4;
use rayon::prelude::*;
use tile::{TileColumnRange, TileGrid, compute_row_ranges, expand_row};
use zbin::{DepthBinner, fill_bin};

/// The view and projection of one culling eye. Only symmetric perspective
/// and axis-aligned orthographic projections are supported.
#[derive(Clone, Copy, Debug)]
pub struct CullingCamera {
    pub view: Matrix4<f32>,
    pub projection: Matrix4<f32>,
    pub orthographic: bool,
    pub near: f32,
    pub far: f32,
}

/// The per-frame input to the culling engine.
#[derive(Clone, Copy, Debug)]
pub struct CullingInput<'a> {
    pub lights: &'a [SceneLight],
    pub probes: &'a [ReflectionProbe],
    /// One camera per eye; two for stereo rendering.
    pub cameras: &'a [CullingCamera],
    /// Viewport size in pixels, shared by all eyes.
    pub viewport: (u32, u32),
}

/// Uniform scalars accompanying the bin and tile buffers, letting GPU code
/// invert the depth-bin mapping and address the tile grid.
///
/// # Warning
/// The fields must not be reordered, as this ordering is expected by the
/// shader.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Zeroable, Pod)]
pub struct CullingUniforms {
    pub bin_scale: f32,
    pub bin_offset: f32,
    pub bin_count: u32,
    pub words_per_entry: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
    pub tile_width: u32,
    pub view_count: u32,
    pub light_item_count: u32,
    pub probe_count: u32,
    _padding: [u32; 2],
}

/// Per-frame Forward+ culling engine. Owns its scratch and output buffers,
/// which are reused by capacity across frames and recomputed unconditionally
/// every frame; mask bit indices are only meaningful within the frame they
/// were produced in.
#[derive(Debug)]
pub struct ForwardCullingEngine {
    config: LightingConfig,
    /// World-space bounding sphere per culled item: first the participating
    /// lights in input order, then the probes in evaluation order.
    item_spheres: Vec<Sphere>,
    /// Input light index per light item.
    light_item_indices: Vec<u32>,
    /// Input probe index per probe item, sorted into evaluation order.
    probe_order: Vec<u32>,
    /// Per item per view, view-major.
    item_bounds: Vec<ItemBounds>,
    /// Per item per view per tile row, view-major then item-major.
    row_ranges: Vec<TileColumnRange>,
    zbin_words: Vec<u32>,
    tile_words: Vec<u32>,
    uniforms: CullingUniforms,
}

impl ForwardCullingEngine {
    /// Creates a new engine with the given configuration.
    pub fn new(config: LightingConfig) -> Self {
        Self {
            config,
            item_spheres: Vec::new(),
            light_item_indices: Vec::new(),
            probe_order: Vec::new(),
            item_bounds: Vec::new(),
            row_ranges: Vec::new(),
            zbin_words: Vec::new(),
            tile_words: Vec::new(),
            uniforms: CullingUniforms::zeroed(),
        }
    }

    /// Recomputes the depth-bin and tile masks for the given frame on the
    /// given thread pool. Blocks until all passes have completed, so the
    /// output buffers are ready for upload when this returns.
    ///
    /// # Panics
    /// If no camera is given or the viewport is empty.
    pub fn cull(&mut self, input: &CullingInput<'_>, thread_pool: &RayonThreadPool) {
        assert!(!input.cameras.is_empty());

        let view_count = input.cameras.len();
        self.gather_items(input);

        let item_count = self.item_spheres.len();
        let words_per_entry = item_count.div_ceil(32);

        let grid = TileGrid::fit(input.viewport, words_per_entry, view_count, &self.config);

        let words_per_bin = 1 + words_per_entry;
        let bin_count = (self.config.zbin_word_budget / (words_per_bin * view_count)).max(1);
        let camera = &input.cameras[0];
        let binner = DepthBinner::new(
            camera.orthographic,
            camera.near,
            camera.far,
            bin_count as u32,
        );

        self.item_bounds
            .resize(item_count * view_count, ItemBounds::empty());
        self.row_ranges.resize(
            item_count * view_count * grid.tiles_y() as usize,
            TileColumnRange::EMPTY,
        );
        self.zbin_words.clear();
        self.zbin_words.resize(bin_count * words_per_bin * view_count, 0);
        self.tile_words.clear();
        self.tile_words
            .resize(grid.tile_count() * words_per_entry * view_count, 0);

        let Self {
            item_spheres,
            item_bounds,
            row_ranges,
            zbin_words,
            tile_words,
            ..
        } = self;

        let cameras = input.cameras;
        let viewport = input.viewport;
        let tiles_y = grid.tiles_y() as usize;
        let row_words = grid.tiles_x() as usize * words_per_entry;

        // With no culled items every buffer stays zero-filled and there is
        // no work to schedule.
        if item_count > 0 {
            thread_pool.pool().install(|| {
                // Pass a: view-space bounds of every item in every view. The
                // two downstream passes both consume these, so this pass
                // forms a barrier.
                item_bounds
                    .par_iter_mut()
                    .enumerate()
                    .for_each(|(index, bounds_out)| {
                        let view = index / item_count;
                        let item = index % item_count;
                        *bounds_out = compute_item_bounds(&item_spheres[item], &cameras[view]);
                    });

                // Both downstream passes read the bounds concurrently.
                let item_bounds: &[ItemBounds] = item_bounds;

                rayon::join(
                    // Pass b: depth binning, parallel over bins. Each task
                    // owns the words of one bin.
                    || {
                        zbin_words
                            .par_chunks_mut(words_per_bin)
                            .enumerate()
                            .for_each(|(global_bin, bin_words)| {
                                let view = global_bin / bin_count;
                                let bin = (global_bin % bin_count) as u32;
                                let bin_start = binner.bin_start_depth(bin);
                                let bin_end = binner.bin_start_depth(bin + 1);
                                let view_bounds =
                                    &item_bounds[view * item_count..(view + 1) * item_count];
                                fill_bin(bin_words, bin_start, bin_end, view_bounds);
                            });
                    },
                    // Pass c: tiling. The row-range stage is parallel over
                    // items, the expansion stage over tile rows; the second
                    // starts only once the first has finished.
                    || {
                        row_ranges
                            .par_chunks_mut(tiles_y)
                            .enumerate()
                            .for_each(|(index, item_rows)| {
                                compute_row_ranges(
                                    item_rows,
                                    &item_bounds[index],
                                    viewport,
                                    &grid,
                                );
                            });

                        tile_words
                            .par_chunks_mut(row_words)
                            .enumerate()
                            .for_each(|(index, words)| {
                                let view = index / tiles_y;
                                let row = index % tiles_y;
                                let ranges_of_item = (0..item_count).map(|item| {
                                    &row_ranges[(view * item_count + item) * tiles_y + row]
                                });
                                expand_row(words, words_per_entry, ranges_of_item);
                            });
                    },
                );
            });
        }

        self.uniforms = CullingUniforms {
            bin_scale: binner.scale(),
            bin_offset: binner.offset(),
            bin_count: bin_count as u32,
            words_per_entry: words_per_entry as u32,
            tiles_x: grid.tiles_x(),
            tiles_y: grid.tiles_y(),
            tile_width: grid.tile_width(),
            view_count: view_count as u32,
            light_item_count: self.light_item_indices.len() as u32,
            probe_count: self.probe_order.len() as u32,
            _padding: [0; 2],
        };
    }

    /// Collects the culled items for the frame: participating lights in
    /// input order followed by the probes sorted by importance and size, so
    /// that smaller probes layered inside more important ones win in
    /// shader-side blending order.
    fn gather_items(&mut self, input: &CullingInput<'_>) {
        self.item_spheres.clear();
        self.light_item_indices.clear();
        self.probe_order.clear();

        for (light_index, light) in input.lights.iter().enumerate() {
            if !light.participates_in_culling() {
                continue;
            }
            if self.light_item_indices.len() >= self.config.max_additional_lights {
                log::warn!(
                    "Ignoring lights beyond the configured maximum of {}",
                    self.config.max_additional_lights
                );
                break;
            }
            let Some(sphere) = light.bounding_sphere() else {
                continue;
            };
            self.light_item_indices.push(light_index as u32);
            self.item_spheres.push(sphere);
        }

        self.probe_order
            .extend(0..input.probes.len().min(self.config.max_reflection_probes) as u32);
        if input.probes.len() > self.config.max_reflection_probes {
            log::warn!(
                "Ignoring reflection probes beyond the configured maximum of {}",
                self.config.max_reflection_probes
            );
        }
        let probes = input.probes;
        self.probe_order.sort_by(|&a, &b| {
            let probe_a = &probes[a as usize];
            let probe_b = &probes[b as usize];
            probe_b
                .importance
                .cmp(&probe_a.importance)
                .then_with(|| {
                    probe_b
                        .bounding_sphere
                        .radius()
                        .total_cmp(&probe_a.bounding_sphere.radius())
                })
                .then_with(|| a.cmp(&b))
        });

        for &probe_index in &self.probe_order {
            self.item_spheres
                .push(probes[probe_index as usize].bounding_sphere);
        }
    }

    /// Returns the uniform scalars for the current frame's buffers.
    pub fn uniforms(&self) -> &CullingUniforms {
        &self.uniforms
    }

    /// Returns the depth-bin words for the current frame: per view, per bin,
    /// one header word followed by the item mask words.
    pub fn zbin_words(&self) -> &[u32] {
        &self.zbin_words
    }

    /// Returns the tile mask words for the current frame: per view, tile
    /// rows top to bottom, `words_per_entry` words per tile.
    pub fn tile_words(&self) -> &[u32] {
        &self.tile_words
    }

    /// Returns the input light index each light mask bit refers to.
    pub fn light_item_indices(&self) -> &[u32] {
        &self.light_item_indices
    }

    /// Returns the input probe index each probe mask bit refers to, in
    /// evaluation order.
    pub fn probe_order(&self) -> &[u32] {
        &self.probe_order
    }

    /// Looks up the tile mask words of the given tile.
    pub fn tile_mask(&self, view: usize, row: u32, column: u32) -> &[u32] {
        let words_per_entry = self.uniforms.words_per_entry as usize;
        let tiles_x = self.uniforms.tiles_x as usize;
        let tiles_y = self.uniforms.tiles_y as usize;
        let tile = (view * tiles_y + row as usize) * tiles_x + column as usize;
        &self.tile_words[tile * words_per_entry..(tile + 1) * words_per_entry]
    }

    /// Looks up the header and mask words of the given depth bin.
    pub fn zbin(&self, view: usize, bin: u32) -> &[u32] {
        let words_per_bin = 1 + self.uniforms.words_per_entry as usize;
        let bin_count = self.uniforms.bin_count as usize;
        let index = view * bin_count + bin as usize;
        &self.zbin_words[index * words_per_bin..(index + 1) * words_per_bin]
    }
}
