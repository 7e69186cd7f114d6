// Resource handles - the create/destroy protocol every GPU object follows
//
// A `ResourceHandle<R>` pairs the native handle with the description that
// produced it. Descriptions are plain data holding every parameter of the
// native create-info, including a shared reference to the parent object
// (device, instance, render pass...). Parents are always built first, so the
// references form a DAG and never a cycle.

use ash::vk;
use std::fmt;

use crate::error::EngineResult;

/// Every kind of object the engine creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Instance,
    DebugMessenger,
    Surface,
    Device,
    Swapchain,
    ImageView,
    RenderPass,
    ShaderModule,
    GraphicsPipeline,
    PipelineLayout,
    Framebuffer,
    CommandPool,
    CommandBuffers,
    Semaphore,
    Fence,
    Buffer,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Instance => "instance",
            Self::DebugMessenger => "debug messenger",
            Self::Surface => "surface",
            Self::Device => "device",
            Self::Swapchain => "swapchain",
            Self::ImageView => "image view",
            Self::RenderPass => "render pass",
            Self::ShaderModule => "shader module",
            Self::GraphicsPipeline => "graphics pipeline",
            Self::PipelineLayout => "pipeline layout",
            Self::Framebuffer => "framebuffer",
            Self::CommandPool => "command pool",
            Self::CommandBuffers => "command buffers",
            Self::Semaphore => "semaphore",
            Self::Fence => "fence",
            Self::Buffer => "buffer",
        };
        f.write_str(name)
    }
}

/// Null-sentinel check for native handles.
pub trait NativeHandle {
    fn is_null(&self) -> bool;
}

macro_rules! impl_native_handle {
    ($($ty:ty),* $(,)?) => {
        $(
            impl NativeHandle for $ty {
                fn is_null(&self) -> bool {
                    vk::Handle::as_raw(*self) == 0
                }
            }
        )*
    };
}

impl_native_handle!(
    vk::DebugUtilsMessengerEXT,
    vk::SurfaceKHR,
    vk::SwapchainKHR,
    vk::ImageView,
    vk::RenderPass,
    vk::ShaderModule,
    vk::Pipeline,
    vk::PipelineLayout,
    vk::Framebuffer,
    vk::CommandPool,
    vk::Semaphore,
    vk::Fence,
);

impl NativeHandle for ash::Instance {
    fn is_null(&self) -> bool {
        self.handle() == vk::Instance::null()
    }
}

impl NativeHandle for ash::Device {
    fn is_null(&self) -> bool {
        self.handle() == vk::Device::null()
    }
}

impl NativeHandle for Vec<vk::CommandBuffer> {
    fn is_null(&self) -> bool {
        self.is_empty() || self.iter().any(|cmd| vk::Handle::as_raw(*cmd) == 0)
    }
}

/// Capability: the object can be built from its description.
pub trait Creatable {
    const KIND: ResourceKind;
    type Handle: NativeHandle;
    type Description;

    /// Build the native create-info from `description` and call the driver.
    ///
    /// # Safety
    /// Every parent referenced by `description` must still be alive.
    unsafe fn create(description: &Self::Description) -> EngineResult<Self::Handle>;
}

/// Capability: the object can be released given its handle and description.
pub trait Destroyable: Creatable {
    /// # Safety
    /// The handle must have come from `create` with the same description, must
    /// not be referenced by pending GPU work, and must not be destroyed twice.
    unsafe fn destroy(handle: &Self::Handle, description: &Self::Description);
}

/// A native handle together with the description that produced it.
pub struct ResourceHandle<R: Creatable> {
    handle: R::Handle,
    description: R::Description,
}

impl<R: Creatable> ResourceHandle<R> {
    /// Create the native object. On failure nothing is left to clean up.
    pub fn init(description: R::Description) -> EngineResult<Self> {
        // SAFETY: descriptions can only hold parents that were already built
        // and are kept alive by the shared references inside them.
        let handle = unsafe { R::create(&description) }?;
        log::trace!("Created {}", R::KIND);
        Ok(Self {
            handle,
            description,
        })
    }

    pub fn handle(&self) -> &R::Handle {
        &self.handle
    }

    pub fn description(&self) -> &R::Description {
        &self.description
    }

    pub fn kind(&self) -> ResourceKind {
        R::KIND
    }

    pub fn is_valid(&self) -> bool {
        !self.handle.is_null()
    }
}

impl<R: Creatable> ResourceHandle<R>
where
    R::Handle: Copy,
{
    pub fn raw(&self) -> R::Handle {
        self.handle
    }
}

impl<R: Destroyable> ResourceHandle<R> {
    /// Release the native object.
    ///
    /// # Safety
    /// See [`Destroyable::destroy`]. Calling this twice is a caller error.
    pub unsafe fn destroy(&self) {
        if !self.is_valid() {
            log::warn!("Ignoring destroy of a null {} handle", R::KIND);
            return;
        }
        log::trace!("Destroying {}", R::KIND);
        R::destroy(&self.handle, &self.description);
    }
}

impl<R: Creatable> fmt::Debug for ResourceHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("kind", &R::KIND)
            .field("valid", &self.is_valid())
            .finish_non_exhaustive()
    }
}
