// Vulkan side of the frame loop
//
// Owns the per-frame slots, the queues and the objects every frame's
// command buffer refers to. Implements the swapchain and frame backends the
// lifecycle and loop are written against.

use ash::vk;
use std::sync::Arc;

use super::command::{record_frame, DrawRecorder, FrameContext, FrameTargets};
use super::device::{Device, Queues};
use super::handle::ResourceHandle;
use super::instance::Surface;
use super::pipeline::{GraphicsPipeline, PipelineLayout, RenderPass};
use super::swapchain::{SurfaceSupport, SwapchainConfig, SwapchainState};
use super::sync::FrameSlot;
use crate::error::{EngineError, EngineResult};
use crate::frame::{AcquireStatus, FrameBackend, FrameInfo, PresentStatus};
use crate::swapchain::SwapchainBackend;
use crate::window::PresentTarget;

pub struct Presenter {
    pub(crate) device: Arc<ResourceHandle<Device>>,
    pub(crate) surface: Arc<ResourceHandle<Surface>>,
    pub(crate) render_pass: Arc<ResourceHandle<RenderPass>>,
    pub(crate) pipeline: Arc<ResourceHandle<GraphicsPipeline>>,
    pub(crate) pipeline_layout: Arc<ResourceHandle<PipelineLayout>>,
    pub(crate) queues: Queues,
    pub(crate) slots: Vec<FrameSlot>,
    pub(crate) recorder: Box<dyn DrawRecorder>,
    pub(crate) clear_color: [f32; 4],
    pub(crate) window: Arc<dyn PresentTarget>,
}

impl Presenter {
    pub fn set_recorder(&mut self, recorder: Box<dyn DrawRecorder>) {
        self.recorder = recorder;
    }

    pub fn device(&self) -> &Arc<ResourceHandle<Device>> {
        &self.device
    }

    fn slot(&self, slot: usize) -> &FrameSlot {
        &self.slots[slot]
    }
}

impl SwapchainBackend for Presenter {
    type Target = SwapchainState;

    fn framebuffer_extent(&self) -> vk::Extent2D {
        let (width, height) = self.window.framebuffer_size();
        vk::Extent2D { width, height }
    }

    fn surface_support(&self) -> EngineResult<SurfaceSupport> {
        // SAFETY: the physical device was enumerated from the surface's instance.
        unsafe { SurfaceSupport::query(&self.surface, self.device.physical().handle) }
    }

    fn wait_idle(&mut self) -> EngineResult<()> {
        self.device.wait_idle()
    }

    fn build(
        &mut self,
        config: &SwapchainConfig,
        previous: Option<&SwapchainState>,
    ) -> EngineResult<SwapchainState> {
        let pass_format = self.render_pass.description().color_format;
        if config.surface_format.format != pass_format {
            log::warn!(
                "Surface format changed to {:?} but the render pass was built for {:?}",
                config.surface_format.format,
                pass_format
            );
        }
        SwapchainState::build(
            &self.device,
            &self.surface,
            &self.render_pass,
            config,
            previous,
        )
    }

    fn teardown(&mut self, target: SwapchainState) {
        // SAFETY: the lifecycle only tears down after waiting for the device.
        unsafe { target.destroy() }
    }
}

impl FrameBackend for Presenter {
    fn wait_for_slot(&mut self, slot: usize) -> EngineResult<()> {
        self.slot(slot).in_flight.wait()
    }

    fn acquire_image(&mut self, slot: usize, target: &SwapchainState) -> EngineResult<AcquireStatus> {
        let result = unsafe {
            target.swapchain.description().loader.acquire_next_image(
                target.swapchain.raw(),
                u64::MAX,
                self.slot(slot).image_acquired.raw(),
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireStatus::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireStatus::OutOfDate),
            Err(e) => Err(EngineError::vulkan("vkAcquireNextImageKHR", e)),
        }
    }

    fn release_acquired(&mut self, slot: usize) -> EngineResult<()> {
        let wait_semaphores = [self.slot(slot).image_acquired.raw()];
        let wait_stages = [vk::PipelineStageFlags::ALL_COMMANDS];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .build();

        unsafe {
            self.device
                .handle()
                .queue_submit(self.queues.graphics, &[submit_info], vk::Fence::null())
        }
        .map_err(|e| EngineError::vulkan("vkQueueSubmit", e))
    }

    fn reset_slot(&mut self, slot: usize) -> EngineResult<()> {
        let frame = self.slot(slot);
        frame.in_flight.reset()?;
        unsafe {
            self.device
                .handle()
                .reset_command_buffer(frame.command_buffer, vk::CommandBufferResetFlags::empty())
        }
        .map_err(|e| EngineError::vulkan("vkResetCommandBuffer", e))
    }

    fn record(&mut self, slot: usize, target: &SwapchainState, frame: FrameInfo) -> EngineResult<()> {
        let framebuffer = target
            .framebuffers
            .get(frame.image_index as usize)
            .ok_or(EngineError::ImageIndexOutOfRange {
                index: frame.image_index,
                count: target.framebuffers.len(),
            })?;

        let targets = FrameTargets {
            render_pass: self.render_pass.raw(),
            framebuffer: framebuffer.raw(),
            clear_color: self.clear_color,
        };
        let context = FrameContext {
            extent: target.config.extent,
            image_index: frame.image_index,
            frame_index: frame.frame_index,
            pipeline: self.pipeline.raw(),
            pipeline_layout: self.pipeline_layout.raw(),
        };
        let cmd = self.slots[slot].command_buffer;

        // SAFETY: the slot's fence was waited on and its buffer reset.
        unsafe {
            record_frame(
                self.device.handle(),
                cmd,
                &targets,
                &context,
                self.recorder.as_mut(),
            )
        }
    }

    fn submit(&mut self, slot: usize) -> EngineResult<()> {
        let frame = self.slot(slot);
        let wait_semaphores = [frame.image_acquired.raw()];
        // Only colour output waits for the image; vertex work can start early.
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [frame.command_buffer];
        let signal_semaphores = [frame.render_finished.raw()];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.device.handle().queue_submit(
                self.queues.graphics,
                &[submit_info],
                frame.in_flight.raw(),
            )
        }
        .map_err(|e| EngineError::vulkan("vkQueueSubmit", e))
    }

    fn present(
        &mut self,
        slot: usize,
        target: &SwapchainState,
        image_index: u32,
    ) -> EngineResult<PresentStatus> {
        let wait_semaphores = [self.slot(slot).render_finished.raw()];
        let swapchains = [target.swapchain.raw()];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            target
                .swapchain
                .description()
                .loader
                .queue_present(self.queues.present, &present_info)
        };

        match result {
            Ok(false) => Ok(PresentStatus::Presented),
            Ok(true) => Ok(PresentStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
            Err(e) => Err(EngineError::vulkan("vkQueuePresentKHR", e)),
        }
    }
}
