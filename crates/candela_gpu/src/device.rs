//! Graphics device connection.

/// The connection to a graphics device, holding the device handle and its
/// command queue.
#[derive(Debug)]
pub struct GraphicsDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl GraphicsDevice {
    /// Wraps the given device and queue.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self { device, queue }
    }

    /// Returns the underlying [`wgpu::Device`].
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns the underlying [`wgpu::Queue`].
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}
