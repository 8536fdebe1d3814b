//! Textures holding the shadow atlas.

use crate::device::GraphicsDevice;

/// The texture format of the shadow atlas. Slice depths are rendered as
/// 32-bit float color so the lit-scene shader can sample them without a
/// comparison sampler.
pub const SHADOW_MAP_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

/// The texture holding every shadow map slice of the frame, packed into one
/// render target.
#[derive(Debug)]
pub struct ShadowAtlasTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    width: u32,
    height: u32,
}

impl ShadowAtlasTexture {
    /// Creates a new shadow atlas texture with the given extent in texels.
    pub fn new(graphics_device: &GraphicsDevice, width: u32, height: u32, label: &str) -> Self {
        let device = graphics_device.device();

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SHADOW_MAP_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT,
            label: Some(label),
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
            width,
            height,
        }
    }

    /// Creates the 1x1 dummy atlas bound when no light produced any shadow
    /// slice, giving downstream shaders a valid but neutral sampling source.
    pub fn empty(graphics_device: &GraphicsDevice) -> Self {
        Self::new(graphics_device, 1, 1, "Empty shadow atlas texture")
    }

    /// Returns the width of the atlas in texels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height of the atlas in texels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns a view into the full atlas texture.
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Returns a sampler for the atlas texture.
    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    /// Returns the underlying [`wgpu::Texture`].
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// Creates the bind group layout entry for the atlas texture, assigned
    /// to the given binding.
    pub const fn create_texture_bind_group_layout_entry(
        binding: u32,
        visibility: wgpu::ShaderStages,
    ) -> wgpu::BindGroupLayoutEntry {
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        }
    }

    /// Creates the bind group layout entry for the atlas sampler, assigned
    /// to the given binding.
    pub const fn create_sampler_bind_group_layout_entry(
        binding: u32,
        visibility: wgpu::ShaderStages,
    ) -> wgpu::BindGroupLayoutEntry {
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
            count: None,
        }
    }
}
