// Engine - the context object the application drives
//
// Builds every GPU object in dependency order, registering each on the
// destruction queue the moment it exists. If any step fails the queue is
// flushed before the error is returned, so no partial engine survives.
//
// INIT ORDER:
// instance -> debug messenger -> surface -> physical device + queue solve ->
// device -> render pass -> shaders -> pipeline layout -> pipeline ->
// command pool -> command buffers -> frame slots -> swapchain

use ash::extensions::khr;
use ash::vk;
use std::ffi::CString;
use std::sync::Arc;

use crate::backend::buffer::{Buffer, BufferDescription};
use crate::backend::command::{
    ClearOnly, CommandBuffers, CommandBuffersDescription, CommandPool, CommandPoolDescription,
    DrawRecorder,
};
use crate::backend::destruction::DestructionQueue;
use crate::backend::device::{self, Device, DeviceDescription, Queues};
use crate::backend::handle::ResourceHandle;
use crate::backend::instance::{
    self, DebugMessenger, DebugMessengerDescription, Instance, InstanceDescription, Surface,
    SurfaceDescription, VALIDATION_LAYER,
};
use crate::backend::pipeline::{
    GraphicsPipeline, GraphicsPipelineDescription, PipelineLayout, PipelineLayoutDescription,
    RenderPass, RenderPassDescription, VertexLayout,
};
use crate::backend::presenter::Presenter;
use crate::backend::queue_family::QueueRole;
use crate::backend::shader::{ShaderModule, ShaderModuleDescription};
use crate::backend::swapchain::{choose_surface_format, SurfaceSupport, SwapchainState};
use crate::backend::sync::FrameSlot;
use crate::config::Config;
use crate::error::EngineResult;
use crate::frame::{FrameLoop, FrameOutcome, SkipReason};
use crate::swapchain::{SwapchainManager, SwapchainStatus};
use crate::window::PresentTarget;

/// Push constant space available to draw recorders (the guaranteed minimum).
pub const PUSH_CONSTANT_BYTES: u32 = 128;

/// Parameters for [`Engine::create_buffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRequest {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub memory_flags: vk::MemoryPropertyFlags,
}

impl BufferRequest {
    /// Host-visible, coherent vertex buffer the CPU can write directly.
    pub fn vertex(size: vk::DeviceSize) -> Self {
        Self {
            size,
            usage: vk::BufferUsageFlags::VERTEX_BUFFER,
            memory_flags: vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT,
        }
    }
}

pub struct Engine {
    presenter: Presenter,
    frame_loop: FrameLoop<SwapchainState>,
    destruction: DestructionQueue,
    terminated: bool,
}

impl Engine {
    /// Create everything up to and including the first swapchain.
    pub fn init(
        config: &Config,
        window: Arc<dyn PresentTarget>,
        vertex_layout: VertexLayout,
    ) -> EngineResult<Self> {
        log::info!("Initializing Vulkan...");
        let mut destruction = DestructionQueue::new();
        destruction.reserve(16 + 3 * config.frames_in_flight());

        match Self::build(config, window, vertex_layout, &mut destruction) {
            Ok((presenter, frame_loop)) => {
                log::info!("Vulkan initialized successfully!");
                Ok(Self {
                    presenter,
                    frame_loop,
                    destruction,
                    terminated: false,
                })
            }
            Err(e) => {
                log::error!("Initialization failed, releasing partial state: {}", e);
                // SAFETY: nothing has been submitted to the GPU yet.
                unsafe { destruction.flush() };
                Err(e)
            }
        }
    }

    fn build(
        config: &Config,
        window: Arc<dyn PresentTarget>,
        vertex_layout: VertexLayout,
        destruction: &mut DestructionQueue,
    ) -> EngineResult<(Presenter, FrameLoop<SwapchainState>)> {
        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Instance, validation, surface
        // ─────────────────────────────────────────────────────────────────────
        let entry = instance::load_entry()?;
        let enable_validation = config.validation_enabled();
        let display = window.raw_display_handle();

        let extensions = instance::required_extensions(display, enable_validation)?;
        instance::check_instance_extensions(&entry, &extensions)?;
        let layers = if enable_validation {
            vec![VALIDATION_LAYER.to_owned()]
        } else {
            Vec::new()
        };
        instance::check_layers(&entry, &layers)?;

        let instance = Arc::new(ResourceHandle::<Instance>::init(InstanceDescription {
            entry,
            application_name: CString::new(config.window.title.replace('\0', ""))
                .unwrap_or_default(),
            api_version: vk::API_VERSION_1_2,
            extensions,
            layers,
        })?);
        destruction.push(Arc::clone(&instance));

        if enable_validation {
            let messenger = ResourceHandle::<DebugMessenger>::init(
                DebugMessengerDescription::new(Arc::clone(&instance)),
            )?;
            destruction.push(Arc::new(messenger));
            log::info!("Validation layers enabled");
        }

        let surface = Arc::new(ResourceHandle::<Surface>::init(SurfaceDescription::new(
            Arc::clone(&instance),
            display,
            window.raw_window_handle(),
        ))?);
        destruction.push(Arc::clone(&surface));

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Physical device, queue roles, logical device
        // ─────────────────────────────────────────────────────────────────────
        let candidates = device::enumerate_candidates(&instance, &surface)?;
        let swapchain_extension = khr::Swapchain::name().to_string_lossy().into_owned();
        let (physical, assignment) = device::pick_physical_device(
            candidates,
            &[swapchain_extension.as_str()],
            &config.queue_weights(),
        )?;
        log::info!(
            "Using GPU: {} ({:?}, Vulkan {}.{}.{})",
            physical.name,
            physical.device_type,
            vk::api_version_major(physical.api_version),
            vk::api_version_minor(physical.api_version),
            vk::api_version_patch(physical.api_version)
        );
        for role in QueueRole::ALL {
            let slot = assignment.slot(role);
            log::info!(
                "{} queue: family {} index {}",
                role,
                slot.family_index,
                slot.queue_index
            );
        }
        if assignment.has_shared_transfer() {
            log::info!("No dedicated transfer family, sharing the graphics family");
        }

        let device = Arc::new(ResourceHandle::<Device>::init(DeviceDescription {
            instance: Arc::clone(&instance),
            physical,
            queues: assignment,
            extensions: vec![khr::Swapchain::name().to_owned()],
        })?);
        destruction.push(Arc::clone(&device));
        let queues = Queues::fetch(&device);

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Render pass and pipeline
        // ─────────────────────────────────────────────────────────────────────
        // The render pass outlives swapchains, so it uses the format every
        // swapchain on this surface will negotiate to.
        let preferences = config.swapchain_preferences();
        // SAFETY: the physical device came from this instance.
        let support = unsafe { SurfaceSupport::query(&surface, device.physical().handle) }?;
        let color_format = choose_surface_format(&support.formats, preferences.surface_format)?;

        let render_pass = Arc::new(ResourceHandle::<RenderPass>::init(RenderPassDescription {
            device: Arc::clone(&device),
            color_format: color_format.format,
        })?);
        destruction.push(Arc::clone(&render_pass));

        let search_dirs = &config.shaders.search_dirs;
        let vertex_shader = Arc::new(ResourceHandle::<ShaderModule>::init(
            ShaderModuleDescription::load(
                Arc::clone(&device),
                &config.shaders.vertex,
                vk::ShaderStageFlags::VERTEX,
                search_dirs,
            )?,
        )?);
        destruction.push(Arc::clone(&vertex_shader));

        let fragment_shader = Arc::new(ResourceHandle::<ShaderModule>::init(
            ShaderModuleDescription::load(
                Arc::clone(&device),
                &config.shaders.fragment,
                vk::ShaderStageFlags::FRAGMENT,
                search_dirs,
            )?,
        )?);
        destruction.push(Arc::clone(&fragment_shader));

        let pipeline_layout = Arc::new(ResourceHandle::<PipelineLayout>::init(
            PipelineLayoutDescription {
                device: Arc::clone(&device),
                push_constant_ranges: vec![vk::PushConstantRange {
                    stage_flags: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                    offset: 0,
                    size: PUSH_CONSTANT_BYTES,
                }],
            },
        )?);
        destruction.push(Arc::clone(&pipeline_layout));

        let pipeline = Arc::new(ResourceHandle::<GraphicsPipeline>::init(
            GraphicsPipelineDescription {
                device: Arc::clone(&device),
                layout: Arc::clone(&pipeline_layout),
                render_pass: Arc::clone(&render_pass),
                vertex_shader,
                fragment_shader,
                vertex_layout,
            },
        )?);
        destruction.push(Arc::clone(&pipeline));

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Commands and frame slots
        // ─────────────────────────────────────────────────────────────────────
        let frames_in_flight = config.frames_in_flight();
        let command_pool = Arc::new(ResourceHandle::<CommandPool>::init(
            CommandPoolDescription {
                device: Arc::clone(&device),
                queue_family_index: device
                    .queue_assignment()
                    .slot(QueueRole::Graphics)
                    .family_index,
                flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            },
        )?);
        destruction.push(Arc::clone(&command_pool));

        let command_buffers = Arc::new(ResourceHandle::<CommandBuffers>::init(
            CommandBuffersDescription {
                pool: command_pool,
                level: vk::CommandBufferLevel::PRIMARY,
                count: frames_in_flight as u32,
            },
        )?);
        destruction.push(Arc::clone(&command_buffers));

        let slots = command_buffers
            .handle()
            .iter()
            .map(|&cmd| FrameSlot::new(&device, cmd, destruction))
            .collect::<EngineResult<Vec<_>>>()?;
        log::info!("Created {} frame slots", slots.len());

        let mut presenter = Presenter {
            device,
            surface,
            render_pass,
            pipeline,
            pipeline_layout,
            queues,
            slots,
            recorder: Box::new(ClearOnly),
            clear_color: config.graphics.clear_color,
            window,
        };

        // ─────────────────────────────────────────────────────────────────────
        // STEP 5: First swapchain
        // ─────────────────────────────────────────────────────────────────────
        let mut frame_loop = FrameLoop::new(SwapchainManager::new(preferences), frames_in_flight);
        frame_loop.start(&mut presenter)?;

        Ok((presenter, frame_loop))
    }

    /// Run one frame. Recoverable surface conditions come back as skipped
    /// frames; an `Err` is always fatal.
    pub fn draw_frame(&mut self) -> EngineResult<FrameOutcome> {
        if self.terminated {
            return Ok(FrameOutcome::Skipped(SkipReason::Terminated));
        }
        let outcome = self.frame_loop.draw_frame(&mut self.presenter)?;
        if let FrameOutcome::Skipped(reason) = outcome {
            log::debug!("Skipped frame: {:?}", reason);
        }
        Ok(outcome)
    }

    /// Resize hook for the window layer.
    pub fn notify_resized(&mut self) {
        self.frame_loop.notify_resized();
    }

    pub fn set_recorder(&mut self, recorder: Box<dyn DrawRecorder>) {
        self.presenter.set_recorder(recorder);
    }

    /// Create a buffer that lives until the engine is terminated.
    pub fn create_buffer(&mut self, request: BufferRequest) -> EngineResult<Arc<ResourceHandle<Buffer>>> {
        let buffer = Arc::new(ResourceHandle::<Buffer>::init(BufferDescription {
            device: Arc::clone(self.presenter.device()),
            size: request.size,
            usage: request.usage,
            memory_flags: request.memory_flags,
        })?);
        self.destruction.push(Arc::clone(&buffer));
        Ok(buffer)
    }

    pub fn device(&self) -> &Arc<ResourceHandle<Device>> {
        self.presenter.device()
    }

    pub fn swapchain_status(&self) -> SwapchainStatus {
        self.frame_loop.swapchain().status()
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frame_loop.frames_in_flight()
    }

    /// Wait for the GPU, destroy the swapchain, then everything else in
    /// reverse creation order.
    pub fn terminate(mut self) -> EngineResult<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> EngineResult<()> {
        if self.terminated {
            return Ok(());
        }
        self.terminated = true;
        log::info!("Cleaning up Vulkan resources...");

        // Teardown continues past a failed wait; there is nothing better to do.
        let swapchain = self.frame_loop.shutdown(&mut self.presenter);
        let idle = self.presenter.device().wait_idle();
        // SAFETY: the device is idle (or lost, in which case nothing runs).
        unsafe { self.destruction.flush() };

        log::info!("Cleanup complete");
        swapchain.and(idle)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("Teardown failed: {}", e);
        }
    }
}
