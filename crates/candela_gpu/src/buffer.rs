//! GPU buffers for the culling and shadow data.

use crate::device::GraphicsDevice;
use std::borrow::Cow;

/// A GPU buffer with a fixed capacity, refilled from the start every frame.
/// Only the bytes written by the most recent update are meaningful; the
/// remainder is spare capacity so per-frame uploads never reallocate.
#[derive(Debug)]
pub struct GPUBuffer {
    buffer: wgpu::Buffer,
    buffer_size: usize,
    label: Cow<'static, str>,
}

impl GPUBuffer {
    /// Creates a GPU buffer with the given fixed size and usage. The given
    /// slice of valid bytes is written into the beginning of the buffer.
    ///
    /// # Panics
    /// - If `buffer_size` is zero.
    /// - If the size of the `valid_bytes` slice exceeds `buffer_size`.
    pub fn new_with_spare_capacity(
        graphics_device: &GraphicsDevice,
        buffer_size: usize,
        valid_bytes: &[u8],
        usage: wgpu::BufferUsages,
        label: Cow<'static, str>,
    ) -> Self {
        assert_ne!(buffer_size, 0, "Tried to create empty GPU buffer");
        assert!(valid_bytes.len() <= buffer_size);

        let buffer_label = format!("{label} GPU buffer");
        let buffer = graphics_device.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some(&buffer_label),
            size: buffer_size as u64,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        if !valid_bytes.is_empty() {
            graphics_device.queue().write_buffer(&buffer, 0, valid_bytes);
        }

        Self {
            buffer,
            buffer_size,
            label,
        }
    }

    /// Returns the label of the buffer.
    pub fn label(&self) -> &Cow<'static, str> {
        &self.label
    }

    /// Returns the size of the buffer in bytes.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Queues a write of the given bytes to the beginning of the buffer.
    ///
    /// # Panics
    /// If the byte slice exceeds the buffer size.
    pub fn update_valid_bytes(&self, graphics_device: &GraphicsDevice, updated_bytes: &[u8]) {
        assert!(
            updated_bytes.len() <= self.buffer_size,
            "Tried to write {} bytes into {} byte {} buffer",
            updated_bytes.len(),
            self.buffer_size,
            self.label,
        );
        if !updated_bytes.is_empty() {
            graphics_device
                .queue()
                .write_buffer(&self.buffer, 0, updated_bytes);
        }
    }

    /// Creates a bind group entry for the full buffer, assigned to the given
    /// binding.
    pub fn create_bind_group_entry(&self, binding: u32) -> wgpu::BindGroupEntry<'_> {
        wgpu::BindGroupEntry {
            binding,
            resource: self.buffer.as_entire_binding(),
        }
    }

    /// Returns the underlying [`wgpu::Buffer`].
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

/// Creates a bind group layout entry for a uniform buffer, assigned to the
/// given binding and visible to the given shader stages.
pub const fn create_uniform_buffer_bind_group_layout_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Creates a bind group layout entry for a read-only storage buffer,
/// assigned to the given binding and visible to the given shader stages.
pub const fn create_storage_buffer_bind_group_layout_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
