// =============================================================================
// VK-FRAMELOOP DRIVER - winit window + one coloured triangle
// =============================================================================
//
// The binary is the application driver: it owns the window, forwards resize
// notifications, calls `draw_frame` once per redraw and terminates the engine
// on close. Any fatal engine error ends the process with status 1.
//
// FRAME FLOW (inside Engine::draw_frame):
// 1. Wait for this slot's fence
// 2. Acquire swapchain image
// 3. Reset slot, record commands (TriangleRecorder draws the vertex buffer)
// 4. Submit to the graphics queue
// 5. Present
//
// =============================================================================

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Fullscreen, Window, WindowAttributes},
};

use vk_frameloop::backend::buffer::Buffer;
use vk_frameloop::backend::command::{DrawRecorder, FrameContext};
use vk_frameloop::backend::pipeline::VertexLayout;
use vk_frameloop::backend::ResourceHandle;
use vk_frameloop::{BufferRequest, Config, Engine};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml
    let config = Config::load();

    init_logging(&config);
    log::info!("Starting vk-frameloop");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!("Preferred present mode: {}", config.graphics.present_mode);

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app).context("Event loop failed")?;

    if let Some(error) = app.fatal.take() {
        // Tear the engine down before leaving; exit() skips destructors.
        drop(app);
        log::error!("Fatal: {:#}", error);
        std::process::exit(1);
    }
    Ok(())
}

/// `RUST_LOG` wins over the configured level when set.
fn init_logging(config: &Config) {
    use env_logger::Builder;

    let mut builder = Builder::new();
    builder.filter_level(config.log_level());
    builder.parse_default_env();
    builder.init();
}

// =============================================================================
// GEOMETRY
// =============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct Vertex {
    position: [f32; 2],
    color: [f32; 3],
}

const TRIANGLE: [Vertex; 3] = [
    Vertex {
        position: [0.0, -0.5],
        color: [1.0, 0.0, 0.0],
    },
    Vertex {
        position: [0.5, 0.5],
        color: [0.0, 1.0, 0.0],
    },
    Vertex {
        position: [-0.5, 0.5],
        color: [0.0, 0.0, 1.0],
    },
];

fn vertex_layout() -> VertexLayout {
    VertexLayout::interleaved(&[
        (vk::Format::R32G32_SFLOAT, std::mem::size_of::<[f32; 2]>() as u32),
        (vk::Format::R32G32B32_SFLOAT, std::mem::size_of::<[f32; 3]>() as u32),
    ])
}

/// Draws the vertex buffer as a plain triangle list.
struct TriangleRecorder {
    vertices: Arc<ResourceHandle<Buffer>>,
    vertex_count: u32,
}

impl DrawRecorder for TriangleRecorder {
    fn record(&mut self, device: &ash::Device, cmd: vk::CommandBuffer, _frame: &FrameContext) {
        unsafe {
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertices.buffer()], &[0]);
            device.cmd_draw(cmd, self.vertex_count, 1, 0, 0);
        }
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

struct App {
    config: Config,
    window: Option<Arc<Window>>,
    engine: Option<Engine>,
    is_fullscreen: bool,
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        let is_fullscreen = config.window.fullscreen;
        Self {
            config,
            window: None,
            engine: None,
            is_fullscreen,
            fatal: None,
        }
    }

    fn init_engine(&self, window: Arc<Window>) -> Result<Engine> {
        let mut engine = Engine::init(&self.config, window, vertex_layout())
            .context("Failed to initialize Vulkan")?;

        let size = std::mem::size_of_val(&TRIANGLE) as vk::DeviceSize;
        let vertices = engine
            .create_buffer(BufferRequest::vertex(size))
            .context("Failed to create vertex buffer")?;
        vertices
            .write(&TRIANGLE)
            .context("Failed to upload vertices")?;

        engine.set_recorder(Box::new(TriangleRecorder {
            vertices,
            vertex_count: TRIANGLE.len() as u32,
        }));
        Ok(engine)
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        self.fatal = Some(error);
        event_loop.exit();
    }

    fn shutdown(&mut self) {
        if let Some(engine) = self.engine.take() {
            if let Err(e) = engine.terminate() {
                log::error!("Teardown failed: {}", e);
            }
        }
    }

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));
        if self.config.window.fullscreen {
            window_attributes =
                window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.fail(event_loop, anyhow::Error::new(e).context("Failed to create window"));
                return;
            }
        };

        match self.init_engine(Arc::clone(&window)) {
            Ok(engine) => self.engine = Some(engine),
            Err(e) => {
                self.fail(event_loop, e);
                return;
            }
        }
        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.shutdown();
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(ref mut engine) = self.engine {
                    engine.notify_resized();
                }
            }

            WindowEvent::RedrawRequested => {
                let Some(ref mut engine) = self.engine else {
                    return;
                };
                if let Err(e) = engine.draw_frame() {
                    self.shutdown();
                    self.fail(event_loop, anyhow::Error::new(e).context("Render error"));
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() {
                    if let PhysicalKey::Code(key) = event.physical_key {
                        match key {
                            KeyCode::Escape => {
                                log::info!("ESC pressed, exiting...");
                                self.shutdown();
                                event_loop.exit();
                            }
                            KeyCode::F11 => self.toggle_fullscreen(),
                            _ => {}
                        }
                    }
                }
            }

            _ => {}
        }
    }

    /// Request continuous redraws.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}
