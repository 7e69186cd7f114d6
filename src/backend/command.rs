// Command pools, command buffers and per-frame recording
//
// The engine owns the framing of every frame's command buffer (begin/end,
// render pass, viewport and scissor). What gets drawn inside is up to a
// `DrawRecorder` supplied by the application.

use ash::vk;
use std::sync::Arc;

use super::device::Device;
use super::handle::{Creatable, Destroyable, ResourceHandle, ResourceKind};
use crate::error::{EngineError, EngineResult};

pub struct CommandPool;

pub struct CommandPoolDescription {
    pub device: Arc<ResourceHandle<Device>>,
    pub queue_family_index: u32,
    pub flags: vk::CommandPoolCreateFlags,
}

impl Creatable for CommandPool {
    const KIND: ResourceKind = ResourceKind::CommandPool;
    type Handle = vk::CommandPool;
    type Description = CommandPoolDescription;

    unsafe fn create(description: &CommandPoolDescription) -> EngineResult<vk::CommandPool> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(description.queue_family_index)
            .flags(description.flags);
        description
            .device
            .handle()
            .create_command_pool(&pool_info, None)
            .map_err(|e| EngineError::creation(Self::KIND, e))
    }
}

impl Destroyable for CommandPool {
    unsafe fn destroy(handle: &vk::CommandPool, description: &CommandPoolDescription) {
        description.device.handle().destroy_command_pool(*handle, None);
    }
}

/// A batch of command buffers allocated together from one pool.
pub struct CommandBuffers;

pub struct CommandBuffersDescription {
    pub pool: Arc<ResourceHandle<CommandPool>>,
    pub level: vk::CommandBufferLevel,
    pub count: u32,
}

impl CommandBuffersDescription {
    fn device(&self) -> &ash::Device {
        self.pool.description().device.handle()
    }
}

impl Creatable for CommandBuffers {
    const KIND: ResourceKind = ResourceKind::CommandBuffers;
    type Handle = Vec<vk::CommandBuffer>;
    type Description = CommandBuffersDescription;

    unsafe fn create(description: &CommandBuffersDescription) -> EngineResult<Self::Handle> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(description.pool.raw())
            .level(description.level)
            .command_buffer_count(description.count);
        description
            .device()
            .allocate_command_buffers(&alloc_info)
            .map_err(|e| EngineError::creation(Self::KIND, e))
    }
}

impl Destroyable for CommandBuffers {
    unsafe fn destroy(handle: &Vec<vk::CommandBuffer>, description: &CommandBuffersDescription) {
        if handle.len() != description.count as usize {
            log::warn!(
                "Freeing {} command buffers but {} were allocated",
                handle.len(),
                description.count
            );
        }
        description
            .device()
            .free_command_buffers(description.pool.raw(), handle);
    }
}

/// What a recorder needs to know about the frame being recorded.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    pub extent: vk::Extent2D,
    pub image_index: u32,
    pub frame_index: usize,
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
}

/// Records draw commands inside the engine's render pass.
///
/// The pipeline is already bound and viewport/scissor already set when
/// `record` is called.
pub trait DrawRecorder {
    fn record(&mut self, device: &ash::Device, cmd: vk::CommandBuffer, frame: &FrameContext);
}

/// Records nothing, leaving a cleared frame.
#[derive(Debug, Default)]
pub struct ClearOnly;

impl DrawRecorder for ClearOnly {
    fn record(&mut self, _device: &ash::Device, _cmd: vk::CommandBuffer, _frame: &FrameContext) {}
}

/// Per-frame targets for [`record_frame`].
pub struct FrameTargets {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub clear_color: [f32; 4],
}

/// Record one frame: begin, render pass, dynamic state, recorder content, end.
///
/// # Safety
/// `cmd` must be reset and not in use by the GPU.
pub unsafe fn record_frame(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    targets: &FrameTargets,
    frame: &FrameContext,
    recorder: &mut dyn DrawRecorder,
) -> EngineResult<()> {
    let begin_info =
        vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    device
        .begin_command_buffer(cmd, &begin_info)
        .map_err(|e| EngineError::vulkan("vkBeginCommandBuffer", e))?;

    let clear_values = [vk::ClearValue {
        color: vk::ClearColorValue {
            float32: targets.clear_color,
        },
    }];
    let render_area = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: frame.extent,
    };

    // The render pass' external dependency orders our colour writes after
    // the presentation engine has released the image.
    let render_pass_begin = vk::RenderPassBeginInfo::builder()
        .render_pass(targets.render_pass)
        .framebuffer(targets.framebuffer)
        .render_area(render_area)
        .clear_values(&clear_values);
    device.cmd_begin_render_pass(cmd, &render_pass_begin, vk::SubpassContents::INLINE);

    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: frame.extent.width as f32,
        height: frame.extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    device.cmd_set_viewport(cmd, 0, &[viewport]);
    device.cmd_set_scissor(cmd, 0, &[render_area]);
    device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, frame.pipeline);

    recorder.record(device, cmd, frame);

    device.cmd_end_render_pass(cmd);
    device
        .end_command_buffer(cmd)
        .map_err(|e| EngineError::vulkan("vkEndCommandBuffer", e))
}
