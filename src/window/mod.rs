//! Window management module
//!
//! Runs a winit event loop, owns the surface and its depth buffer, and calls
//! a per-frame callback with the collected input.

pub mod event;
pub mod frame_io;
pub mod settings;

pub use event::{Event, Key, Modifiers, MouseButton};
pub use frame_io::{FrameInput, FrameOutput};
pub use settings::WindowSettings;

use crate::context::{device_descriptor, WgpuContext};
use crate::core::texture::DepthTexture;
use crate::core::RenderTarget;
use crate::renderer::viewer::Viewport;
use std::sync::Arc;
use std::time::Instant;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

/// Pixels scrolled per wheel line.
const LINE_SCROLL: f32 = 20.0;

/// A window with GPU rendering context.
pub struct Window {
    settings: WindowSettings,
}

impl Window {
    pub fn new(settings: WindowSettings) -> Self {
        Self { settings }
    }

    /// Run the render loop until the window closes or the callback asks to
    /// exit.
    pub fn render_loop<F, S>(self, state: S, callback: F) -> anyhow::Result<()>
    where
        F: FnMut(&mut S, FrameInput<'_>) -> FrameOutput + 'static,
        S: 'static,
    {
        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);

        let mut app = App {
            settings: self.settings,
            state,
            callback,
            graphics: None,
            events: Vec::new(),
            start_time: Instant::now(),
            last_frame_time: Instant::now(),
            mouse_position: (0.0, 0.0),
            modifiers: Modifiers::default(),
        };

        event_loop.run_app(&mut app)?;
        Ok(())
    }
}

struct Graphics {
    window: Arc<winit::window::Window>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    ctx: WgpuContext,
    depth_texture: DepthTexture,
}

impl Graphics {
    fn new(event_loop: &ActiveEventLoop, settings: &WindowSettings) -> anyhow::Result<Self> {
        let attributes = winit::window::WindowAttributes::default()
            .with_title(&settings.title)
            .with_inner_size(winit::dpi::LogicalSize::new(settings.size.0, settings.size.1))
            .with_resizable(settings.resizable)
            .with_maximized(settings.maximized);
        let window = Arc::new(event_loop.create_window(attributes)?);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(window.clone())?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))?;
        let (device, queue) = pollster::block_on(adapter.request_device(&device_descriptor()))?;
        let ctx = WgpuContext::new(device, queue);

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first())
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Surface reports no supported formats"))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: settings.present_mode(),
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&ctx.device, &config);

        let depth_texture = DepthTexture::new(&ctx, config.width, config.height, "screen depth");
        tracing::info!(
            "Window ready: {}x{} {:?}, adapter {}",
            config.width,
            config.height,
            format,
            adapter.get_info().name
        );

        Ok(Self {
            window,
            surface,
            config,
            ctx,
            depth_texture,
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.ctx.device, &self.config);
        self.depth_texture.resize(&self.ctx, width, height);
    }
}

struct App<S, F> {
    settings: WindowSettings,
    state: S,
    callback: F,
    graphics: Option<Graphics>,
    events: Vec<Event>,
    start_time: Instant,
    last_frame_time: Instant,
    mouse_position: (f32, f32),
    modifiers: Modifiers,
}

impl<S, F> App<S, F>
where
    F: FnMut(&mut S, FrameInput<'_>) -> FrameOutput,
{
    /// Render one frame. Returns `true` when the loop should stop.
    fn redraw(&mut self) -> bool {
        let Some(graphics) = &mut self.graphics else {
            return false;
        };

        let now = Instant::now();
        let elapsed_time = (now - self.start_time).as_secs_f64();
        let delta_time = (now - self.last_frame_time).as_secs_f64();
        self.last_frame_time = now;

        let surface_texture = match graphics.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                graphics
                    .surface
                    .configure(&graphics.ctx.device, &graphics.config);
                return false;
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::debug!("Surface timed out, skipping frame");
                return false;
            }
            Err(e) => {
                tracing::error!("Surface error: {:?}", e);
                return false;
            }
        };
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let input = FrameInput {
            events: std::mem::take(&mut self.events),
            elapsed_time,
            delta_time,
            viewport: Viewport::new(graphics.config.width, graphics.config.height),
            ctx: &graphics.ctx,
            surface_view: &view,
            depth_texture: &graphics.depth_texture,
            surface_format: graphics.config.format,
        };
        let output = (self.callback)(&mut self.state, input);

        graphics.window.pre_present_notify();
        surface_texture.present();
        output.exit
    }
}

impl<S, F> ApplicationHandler for App<S, F>
where
    F: FnMut(&mut S, FrameInput<'_>) -> FrameOutput + 'static,
    S: 'static,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.graphics.is_some() {
            return;
        }

        match Graphics::new(event_loop, &self.settings) {
            Ok(graphics) => {
                self.graphics = Some(graphics);
                self.start_time = Instant::now();
                self.last_frame_time = self.start_time;
            }
            Err(e) => {
                tracing::error!("Failed to initialize graphics: {:#}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let modifiers = self.modifiers;

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(graphics) = &mut self.graphics {
                    graphics.resize(size.width, size.height);
                }
                self.events.push(Event::Resize {
                    width: size.width,
                    height: size.height,
                });
            }
            WindowEvent::ModifiersChanged(state) => {
                self.modifiers = Modifiers::from_winit(state.state());
            }
            WindowEvent::CursorMoved { position, .. } => {
                let previous = self.mouse_position;
                self.mouse_position = (position.x as f32, position.y as f32);
                self.events.push(Event::MouseMotion {
                    delta: (
                        self.mouse_position.0 - previous.0,
                        self.mouse_position.1 - previous.1,
                    ),
                    position: self.mouse_position,
                    modifiers,
                    handled: false,
                });
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let Some(button) = MouseButton::from_winit(button) else {
                    return;
                };
                let position = self.mouse_position;
                self.events.push(match state {
                    ElementState::Pressed => Event::MousePress {
                        button,
                        position,
                        modifiers,
                        handled: false,
                    },
                    ElementState::Released => Event::MouseRelease {
                        button,
                        position,
                        modifiers,
                        handled: false,
                    },
                });
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let delta = match delta {
                    winit::event::MouseScrollDelta::LineDelta(x, y) => {
                        (x * LINE_SCROLL, y * LINE_SCROLL)
                    }
                    winit::event::MouseScrollDelta::PixelDelta(pos) => (pos.x as f32, pos.y as f32),
                };
                self.events.push(Event::MouseWheel {
                    delta,
                    position: self.mouse_position,
                    modifiers,
                    handled: false,
                });
            }
            WindowEvent::KeyboardInput { event, .. } => {
                let Some(key) = Key::from_winit(&event.logical_key) else {
                    return;
                };
                self.events.push(match event.state {
                    ElementState::Pressed => Event::KeyPress {
                        key,
                        modifiers,
                        handled: false,
                    },
                    ElementState::Released => Event::KeyRelease {
                        key,
                        modifiers,
                        handled: false,
                    },
                });
            }
            WindowEvent::RedrawRequested => {
                if self.redraw() {
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(graphics) = &self.graphics {
            graphics.window.request_redraw();
        }
    }
}

/// Render target covering the whole surface, with the screen depth buffer.
pub fn screen_target<'a>(input: &'a FrameInput<'a>) -> RenderTarget<'a> {
    RenderTarget::from_surface(
        input.surface_view,
        Some(input.depth_texture),
        input.viewport.width,
        input.viewport.height,
        input.surface_format,
    )
}
