// Synchronization primitives
//
// Fences, semaphores for GPU-CPU and GPU-GPU sync, and the per-frame slot
// that bundles them with a command buffer.

use ash::vk;
use std::sync::Arc;

use super::destruction::DestructionQueue;
use super::device::Device;
use super::handle::{Creatable, Destroyable, ResourceHandle, ResourceKind};
use crate::error::{EngineError, EngineResult};

pub struct Semaphore;

pub struct SemaphoreDescription {
    pub device: Arc<ResourceHandle<Device>>,
}

impl Creatable for Semaphore {
    const KIND: ResourceKind = ResourceKind::Semaphore;
    type Handle = vk::Semaphore;
    type Description = SemaphoreDescription;

    unsafe fn create(description: &SemaphoreDescription) -> EngineResult<vk::Semaphore> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        description
            .device
            .handle()
            .create_semaphore(&create_info, None)
            .map_err(|e| EngineError::creation(Self::KIND, e))
    }
}

impl Destroyable for Semaphore {
    unsafe fn destroy(handle: &vk::Semaphore, description: &SemaphoreDescription) {
        description.device.handle().destroy_semaphore(*handle, None);
    }
}

pub struct Fence;

pub struct FenceDescription {
    pub device: Arc<ResourceHandle<Device>>,
    pub signaled: bool,
}

impl Creatable for Fence {
    const KIND: ResourceKind = ResourceKind::Fence;
    type Handle = vk::Fence;
    type Description = FenceDescription;

    unsafe fn create(description: &FenceDescription) -> EngineResult<vk::Fence> {
        let flags = if description.signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        description
            .device
            .handle()
            .create_fence(&create_info, None)
            .map_err(|e| EngineError::creation(Self::KIND, e))
    }
}

impl Destroyable for Fence {
    unsafe fn destroy(handle: &vk::Fence, description: &FenceDescription) {
        description.device.handle().destroy_fence(*handle, None);
    }
}

impl ResourceHandle<Fence> {
    /// Block until the GPU signals the fence. No timeout: a hung GPU stalls here.
    pub fn wait(&self) -> EngineResult<()> {
        unsafe {
            self.description()
                .device
                .handle()
                .wait_for_fences(&[self.raw()], true, u64::MAX)
        }
        .map_err(|e| EngineError::vulkan("vkWaitForFences", e))
    }

    pub fn reset(&self) -> EngineResult<()> {
        unsafe { self.description().device.handle().reset_fences(&[self.raw()]) }
            .map_err(|e| EngineError::vulkan("vkResetFences", e))
    }
}

/// Frame synchronization - one per frame in flight
pub struct FrameSlot {
    /// Signaled when this slot's last submission has finished. Starts signaled.
    pub in_flight: Arc<ResourceHandle<Fence>>,
    pub image_acquired: Arc<ResourceHandle<Semaphore>>,
    pub render_finished: Arc<ResourceHandle<Semaphore>>,
    pub command_buffer: vk::CommandBuffer,
}

impl FrameSlot {
    /// Create the slot's sync objects, registering each for teardown as soon
    /// as it exists so a later failure leaks nothing.
    pub fn new(
        device: &Arc<ResourceHandle<Device>>,
        command_buffer: vk::CommandBuffer,
        destruction: &mut DestructionQueue,
    ) -> EngineResult<Self> {
        let in_flight = Arc::new(ResourceHandle::<Fence>::init(FenceDescription {
            device: Arc::clone(device),
            signaled: true,
        })?);
        destruction.push(Arc::clone(&in_flight));

        let mut semaphore = || -> EngineResult<Arc<ResourceHandle<Semaphore>>> {
            let semaphore = Arc::new(ResourceHandle::<Semaphore>::init(SemaphoreDescription {
                device: Arc::clone(device),
            })?);
            destruction.push(Arc::clone(&semaphore));
            Ok(semaphore)
        };

        Ok(Self {
            in_flight,
            image_acquired: semaphore()?,
            render_finished: semaphore()?,
            command_buffer,
        })
    }
}
