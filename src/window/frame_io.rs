//! Frame input/output types
//!
//! Types for passing data to and from the render loop callback.

use crate::context::WgpuContext;
use crate::core::texture::DepthTexture;
use crate::renderer::viewer::Viewport;
use crate::window::event::{Event, Key};

/// Input data for a frame.
pub struct FrameInput<'a> {
    /// Events that occurred since the last frame.
    pub events: Vec<Event>,
    /// Seconds since the render loop started.
    pub elapsed_time: f64,
    /// Seconds since the previous frame.
    pub delta_time: f64,
    pub viewport: Viewport,
    pub ctx: &'a WgpuContext,
    /// The surface texture view to render to.
    pub surface_view: &'a wgpu::TextureView,
    /// Screen depth buffer, sized like the surface.
    pub depth_texture: &'a DepthTexture,
    pub surface_format: wgpu::TextureFormat,
}

impl FrameInput<'_> {
    pub fn width(&self) -> u32 {
        self.viewport.width
    }

    pub fn height(&self) -> u32 {
        self.viewport.height
    }

    pub fn aspect(&self) -> f32 {
        self.viewport.aspect()
    }

    /// Keys pressed this frame that no handler consumed yet, marking them
    /// handled.
    pub fn take_key_presses(&mut self) -> Vec<(Key, crate::window::Modifiers)> {
        let mut keys = Vec::new();
        for event in self.events.iter_mut() {
            if let Event::KeyPress {
                key,
                modifiers,
                handled: false,
            } = event
            {
                keys.push((*key, *modifiers));
                event.set_handled();
            }
        }
        keys
    }
}

/// Output data from a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameOutput {
    /// Stop the render loop after this frame.
    pub exit: bool,
}

impl FrameOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exit() -> Self {
        Self { exit: true }
    }
}
