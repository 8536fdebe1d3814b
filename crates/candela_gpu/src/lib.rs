//! GPU abstractions for the Candela lighting engine.

pub mod buffer;
pub mod device;
pub mod texture;

pub use wgpu;
