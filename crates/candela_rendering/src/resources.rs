//! GPU resources holding the culling and shadow outputs.

use candela_culling::ForwardCullingEngine;
use candela_gpu::{
    buffer::{
        GPUBuffer, create_storage_buffer_bind_group_layout_entry,
        create_uniform_buffer_bind_group_layout_entry,
    },
    device::GraphicsDevice,
    texture::ShadowAtlasTexture,
    wgpu,
};
use candela_light::{LightingConfig, ShadowParams, shadow_map::ShadowAtlasLayout};
use std::{borrow::Cow, mem, sync::OnceLock};

static FORWARD_LIGHTING_BIND_GROUP_LAYOUT: OnceLock<wgpu::BindGroupLayout> = OnceLock::new();

/// Manager of the GPU buffers and textures holding the per-frame lighting
/// data: the culling uniforms, the depth-bin and tile mask words, the
/// per-light shadow parameters and the shadow atlas texture, all exposed
/// through a single bind group.
///
/// The buffers have fixed capacities derived from the configured word
/// budgets and are never resized mid-frame; only the atlas texture is
/// recreated, and only when the shadow frame signature indicates the layout
/// changed shape.
#[derive(Debug)]
pub struct ForwardLightingGPUResources {
    atlas_texture: ShadowAtlasTexture,
    uniforms_buffer: GPUBuffer,
    zbin_buffer: GPUBuffer,
    tile_buffer: GPUBuffer,
    shadow_params_buffer: GPUBuffer,
    bind_group: wgpu::BindGroup,
    atlas_signature: u64,
}

impl ForwardLightingGPUResources {
    const VISIBILITY: wgpu::ShaderStages = wgpu::ShaderStages::FRAGMENT;

    /// The binding location of the culling uniforms.
    pub const fn uniforms_binding() -> u32 {
        0
    }
    /// The binding location of the depth-bin word buffer.
    pub const fn zbin_binding() -> u32 {
        1
    }
    /// The binding location of the tile mask word buffer.
    pub const fn tile_binding() -> u32 {
        2
    }
    /// The binding location of the per-light shadow parameters.
    pub const fn shadow_params_binding() -> u32 {
        3
    }
    /// The binding location of the shadow atlas texture.
    pub const fn atlas_texture_binding() -> u32 {
        4
    }
    /// The binding location of the shadow atlas sampler.
    pub const fn atlas_sampler_binding() -> u32 {
        5
    }

    /// Creates the GPU resources for the given first frame's outputs.
    pub fn new(
        graphics_device: &GraphicsDevice,
        config: &LightingConfig,
        atlas_layout: &ShadowAtlasLayout,
        culling_engine: &ForwardCullingEngine,
    ) -> Self {
        let atlas_texture = Self::create_atlas_texture(graphics_device, atlas_layout);

        let uniforms_buffer = GPUBuffer::new_with_spare_capacity(
            graphics_device,
            mem::size_of::<candela_culling::CullingUniforms>(),
            bytemuck::bytes_of(culling_engine.uniforms()),
            wgpu::BufferUsages::UNIFORM,
            Cow::Borrowed("Culling uniforms"),
        );
        let zbin_buffer = GPUBuffer::new_with_spare_capacity(
            graphics_device,
            config.zbin_word_budget * mem::size_of::<u32>(),
            bytemuck::cast_slice(culling_engine.zbin_words()),
            wgpu::BufferUsages::STORAGE,
            Cow::Borrowed("Depth-bin masks"),
        );
        let tile_buffer = GPUBuffer::new_with_spare_capacity(
            graphics_device,
            config.tile_word_budget * mem::size_of::<u32>(),
            bytemuck::cast_slice(culling_engine.tile_words()),
            wgpu::BufferUsages::STORAGE,
            Cow::Borrowed("Tile masks"),
        );
        let shadow_params_buffer = GPUBuffer::new_with_spare_capacity(
            graphics_device,
            config.max_additional_lights.max(1) * mem::size_of::<ShadowParams>(),
            bytemuck::cast_slice(atlas_layout.shadow_params()),
            wgpu::BufferUsages::STORAGE,
            Cow::Borrowed("Shadow parameters"),
        );

        let bind_group = Self::create_bind_group(
            graphics_device,
            &atlas_texture,
            &uniforms_buffer,
            &zbin_buffer,
            &tile_buffer,
            &shadow_params_buffer,
        );

        Self {
            atlas_texture,
            uniforms_buffer,
            zbin_buffer,
            tile_buffer,
            shadow_params_buffer,
            bind_group,
            atlas_signature: atlas_layout.frame_signature(),
        }
    }

    /// Brings the GPU resources in sync with the given frame's outputs.
    /// Queues buffer writes for the culling data and recreates the atlas
    /// texture and bind group only when the shadow layout changed shape.
    pub fn sync(
        &mut self,
        graphics_device: &GraphicsDevice,
        atlas_layout: &ShadowAtlasLayout,
        culling_engine: &ForwardCullingEngine,
    ) {
        if atlas_layout.frame_signature() != self.atlas_signature
            || self.atlas_texture.width() != atlas_layout.atlas_width()
            || self.atlas_texture.height() != atlas_layout.atlas_height()
        {
            log::debug!(
                "Recreating {}x{} shadow atlas texture",
                atlas_layout.atlas_width(),
                atlas_layout.atlas_height()
            );
            self.atlas_texture = Self::create_atlas_texture(graphics_device, atlas_layout);
            self.atlas_signature = atlas_layout.frame_signature();
            self.bind_group = Self::create_bind_group(
                graphics_device,
                &self.atlas_texture,
                &self.uniforms_buffer,
                &self.zbin_buffer,
                &self.tile_buffer,
                &self.shadow_params_buffer,
            );
        }

        self.uniforms_buffer
            .update_valid_bytes(graphics_device, bytemuck::bytes_of(culling_engine.uniforms()));
        self.zbin_buffer.update_valid_bytes(
            graphics_device,
            bytemuck::cast_slice(culling_engine.zbin_words()),
        );
        self.tile_buffer.update_valid_bytes(
            graphics_device,
            bytemuck::cast_slice(culling_engine.tile_words()),
        );
        self.shadow_params_buffer.update_valid_bytes(
            graphics_device,
            bytemuck::cast_slice(atlas_layout.shadow_params()),
        );
    }

    /// Returns the texture holding the shadow atlas.
    pub fn atlas_texture(&self) -> &ShadowAtlasTexture {
        &self.atlas_texture
    }

    /// Returns the bind group exposing all lighting resources.
    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    /// Returns the bind group layout for the lighting resources, creating it
    /// if it has not already been created.
    pub fn get_or_create_bind_group_layout(
        graphics_device: &GraphicsDevice,
    ) -> &'static wgpu::BindGroupLayout {
        FORWARD_LIGHTING_BIND_GROUP_LAYOUT.get_or_init(|| {
            graphics_device
                .device()
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    entries: &[
                        create_uniform_buffer_bind_group_layout_entry(
                            Self::uniforms_binding(),
                            Self::VISIBILITY,
                        ),
                        create_storage_buffer_bind_group_layout_entry(
                            Self::zbin_binding(),
                            Self::VISIBILITY,
                        ),
                        create_storage_buffer_bind_group_layout_entry(
                            Self::tile_binding(),
                            Self::VISIBILITY,
                        ),
                        create_storage_buffer_bind_group_layout_entry(
                            Self::shadow_params_binding(),
                            Self::VISIBILITY,
                        ),
                        ShadowAtlasTexture::create_texture_bind_group_layout_entry(
                            Self::atlas_texture_binding(),
                            Self::VISIBILITY,
                        ),
                        ShadowAtlasTexture::create_sampler_bind_group_layout_entry(
                            Self::atlas_sampler_binding(),
                            Self::VISIBILITY,
                        ),
                    ],
                    label: Some("Forward lighting bind group layout"),
                })
        })
    }

    fn create_atlas_texture(
        graphics_device: &GraphicsDevice,
        atlas_layout: &ShadowAtlasLayout,
    ) -> ShadowAtlasTexture {
        if atlas_layout.has_slices() {
            ShadowAtlasTexture::new(
                graphics_device,
                atlas_layout.atlas_width(),
                atlas_layout.atlas_height(),
                "Shadow atlas texture",
            )
        } else {
            ShadowAtlasTexture::empty(graphics_device)
        }
    }

    fn create_bind_group(
        graphics_device: &GraphicsDevice,
        atlas_texture: &ShadowAtlasTexture,
        uniforms_buffer: &GPUBuffer,
        zbin_buffer: &GPUBuffer,
        tile_buffer: &GPUBuffer,
        shadow_params_buffer: &GPUBuffer,
    ) -> wgpu::BindGroup {
        let layout = Self::get_or_create_bind_group_layout(graphics_device);
        graphics_device
            .device()
            .create_bind_group(&wgpu::BindGroupDescriptor {
                layout,
                entries: &[
                    uniforms_buffer.create_bind_group_entry(Self::uniforms_binding()),
                    zbin_buffer.create_bind_group_entry(Self::zbin_binding()),
                    tile_buffer.create_bind_group_entry(Self::tile_binding()),
                    shadow_params_buffer.create_bind_group_entry(Self::shadow_params_binding()),
                    wgpu::BindGroupEntry {
                        binding: Self::atlas_texture_binding(),
                        resource: wgpu::BindingResource::TextureView(atlas_texture.view()),
                    },
                    wgpu::BindGroupEntry {
                        binding: Self::atlas_sampler_binding(),
                        resource: wgpu::BindingResource::Sampler(atlas_texture.sampler()),
                    },
                ],
                label: Some("Forward lighting bind group"),
            })
    }
}
