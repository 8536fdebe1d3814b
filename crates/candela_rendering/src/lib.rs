//! Per-frame orchestration of the Candela lighting engine.
//!
//! The renderer drives this crate through two calls per frame: [`setup`]
//! runs the shadow atlas allocator and the Forward+ culling engine and syncs
//! their outputs to the GPU, and the render-side methods bind the produced
//! resources and open the atlas render pass for the caster draws.
//!
//! [`setup`]: ForwardLightingSystem::setup

pub mod resources;

use anyhow::{Result, ensure};
use candela_culling::{CullingCamera, CullingInput, ForwardCullingEngine};
use candela_gpu::{device::GraphicsDevice, wgpu};
use candela_light::{
    LightingConfig, ReflectionProbe, SceneLight,
    shadow_map::{
        AllocatedSlice, ShadowAtlasLayout, ShadowAtlasScratch, allocate_shadow_atlas,
    },
};
use candela_thread::RayonThreadPool;
use resources::ForwardLightingGPUResources;

/// The scene data consumed by one frame of lighting setup.
#[derive(Clone, Copy, Debug)]
pub struct FrameInput<'a> {
    pub lights: &'a [SceneLight],
    pub probes: &'a [ReflectionProbe],
    /// One camera per eye; two for stereo rendering.
    pub cameras: &'a [CullingCamera],
    /// Viewport size in pixels, shared by all eyes.
    pub viewport: (u32, u32),
}

/// The per-frame light visibility and shadow-resolution allocation engine.
#[derive(Debug)]
pub struct ForwardLightingSystem {
    config: LightingConfig,
    shadow_scratch: ShadowAtlasScratch,
    culling_engine: ForwardCullingEngine,
    atlas_layout: Option<ShadowAtlasLayout>,
    gpu_resources: Option<ForwardLightingGPUResources>,
}

impl ForwardLightingSystem {
    /// Creates a new lighting system with the given configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: LightingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            culling_engine: ForwardCullingEngine::new(config.clone()),
            config,
            shadow_scratch: ShadowAtlasScratch::new(),
            atlas_layout: None,
            gpu_resources: None,
        })
    }

    /// Runs the shadow atlas allocation and Forward+ culling for the given
    /// frame and syncs the outputs to the GPU. Must be called before any
    /// shadow or lighting draw work for the frame; blocks on the culling
    /// task graph so the buffers are complete when it returns.
    ///
    /// # Errors
    /// Returns an error if the frame has no camera, an empty viewport, or
    /// more lights than the configured maximum.
    pub fn setup(
        &mut self,
        graphics_device: &GraphicsDevice,
        frame: &FrameInput<'_>,
        thread_pool: &RayonThreadPool,
    ) -> Result<()> {
        ensure!(!frame.cameras.is_empty(), "Frame has no culling camera");
        ensure!(
            frame.viewport.0 > 0 && frame.viewport.1 > 0,
            "Frame has an empty viewport"
        );
        ensure!(
            frame.lights.len() <= self.config.max_additional_lights,
            "Frame has {} lights, more than the configured maximum of {}",
            frame.lights.len(),
            self.config.max_additional_lights
        );

        let atlas_layout =
            allocate_shadow_atlas(frame.lights, &self.config, &mut self.shadow_scratch);

        self.culling_engine.cull(
            &CullingInput {
                lights: frame.lights,
                probes: frame.probes,
                cameras: frame.cameras,
                viewport: frame.viewport,
            },
            thread_pool,
        );

        match &mut self.gpu_resources {
            Some(gpu_resources) => {
                gpu_resources.sync(graphics_device, &atlas_layout, &self.culling_engine);
            }
            None => {
                self.gpu_resources = Some(ForwardLightingGPUResources::new(
                    graphics_device,
                    &self.config,
                    &atlas_layout,
                    &self.culling_engine,
                ));
            }
        }

        self.atlas_layout = Some(atlas_layout);
        Ok(())
    }

    /// Begins the render pass that draws all shadow casters into the atlas,
    /// cleared to the maximum depth. Use [`set_slice_viewport`] to restrict
    /// the pass to one slice before issuing its draws.
    ///
    /// # Panics
    /// If [`setup`](Self::setup) has not been called.
    pub fn begin_shadow_atlas_pass<'a>(
        &self,
        command_encoder: &'a mut wgpu::CommandEncoder,
    ) -> wgpu::RenderPass<'a> {
        let gpu_resources = self
            .gpu_resources
            .as_ref()
            .expect("Shadow atlas pass begun before setup");

        command_encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Shadow atlas render pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: gpu_resources.atlas_texture().view(),
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        })
    }

    /// Returns the allocated shadow slices of the current frame, or an empty
    /// slice before the first [`setup`](Self::setup).
    pub fn shadow_slices(&self) -> &[AllocatedSlice] {
        self.atlas_layout
            .as_ref()
            .map_or(&[], ShadowAtlasLayout::slices)
    }

    /// Returns the finalized shadow atlas layout of the current frame, if
    /// [`setup`](Self::setup) has run.
    pub fn shadow_atlas_layout(&self) -> Option<&ShadowAtlasLayout> {
        self.atlas_layout.as_ref()
    }

    /// Returns the culling engine holding the frame's depth-bin and tile
    /// mask buffers.
    pub fn culling_engine(&self) -> &ForwardCullingEngine {
        &self.culling_engine
    }

    /// Returns the GPU resources for the current frame, if
    /// [`setup`](Self::setup) has run.
    pub fn gpu_resources(&self) -> Option<&ForwardLightingGPUResources> {
        self.gpu_resources.as_ref()
    }

    /// Returns the configuration the system was created with.
    pub fn config(&self) -> &LightingConfig {
        &self.config
    }
}

/// Restricts the given render pass to the atlas region of the given slice.
pub fn set_slice_viewport(render_pass: &mut wgpu::RenderPass<'_>, slice: &AllocatedSlice) {
    render_pass.set_viewport(
        slice.offset_x as f32,
        slice.offset_y as f32,
        slice.resolution as f32,
        slice.resolution as f32,
        0.0,
        1.0,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creating_a_system_with_an_invalid_config_fails() {
        let config = LightingConfig {
            shadow_atlas_resolution: 1000,
            ..Default::default()
        };
        assert!(ForwardLightingSystem::new(config).is_err());
    }

    #[test]
    fn a_fresh_system_has_no_slices_or_resources() {
        let system = ForwardLightingSystem::new(LightingConfig::default()).unwrap();
        assert!(system.shadow_slices().is_empty());
        assert!(system.shadow_atlas_layout().is_none());
        assert!(system.gpu_resources().is_none());
    }
}
