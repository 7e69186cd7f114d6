// Destruction queue
//
// Resources are pushed in creation order and destroyed in exact reverse order
// at flush. Because a resource is always created after everything it depends
// on, LIFO teardown never destroys a parent before its children.

use std::sync::Arc;

use super::buffer::Buffer;
use super::command::{CommandBuffers, CommandPool};
use super::device::Device;
use super::handle::{ResourceHandle, ResourceKind};
use super::instance::{DebugMessenger, Instance, Surface};
use super::pipeline::{Framebuffer, GraphicsPipeline, PipelineLayout, RenderPass};
use super::shader::ShaderModule;
use super::swapchain::{ImageView, Swapchain};
use super::sync::{Fence, Semaphore};

/// A deferred teardown action.
pub trait Retire {
    fn kind(&self) -> ResourceKind;

    /// # Safety
    /// The resource must no longer be referenced by pending GPU work.
    unsafe fn retire(self);
}

macro_rules! retirements {
    ($($variant:ident),* $(,)?) => {
        /// A resource awaiting teardown, tagged with its kind.
        pub enum Retirement {
            $($variant(Arc<ResourceHandle<$variant>>),)*
        }

        impl Retire for Retirement {
            fn kind(&self) -> ResourceKind {
                match self {
                    $(Self::$variant(_) => ResourceKind::$variant,)*
                }
            }

            unsafe fn retire(self) {
                match self {
                    $(Self::$variant(resource) => resource.destroy(),)*
                }
            }
        }

        $(
            impl From<Arc<ResourceHandle<$variant>>> for Retirement {
                fn from(resource: Arc<ResourceHandle<$variant>>) -> Self {
                    Self::$variant(resource)
                }
            }
        )*
    };
}

retirements!(
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
);

pub struct DestructionQueue<R: Retire = Retirement> {
    pending: Vec<R>,
}

impl<R: Retire> Default for DestructionQueue<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Retire> DestructionQueue<R> {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Capacity hint only.
    pub fn reserve(&mut self, additional: usize) {
        self.pending.reserve(additional);
    }

    pub fn push(&mut self, resource: impl Into<R>) {
        self.pending.push(resource.into());
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Tear everything down, last pushed first. The queue is empty afterwards.
    ///
    /// # Safety
    /// The device must be idle: nothing pushed here may still be in use by the GPU.
    pub unsafe fn flush(&mut self) {
        log::debug!("Flushing {} deferred destructions", self.pending.len());
        while let Some(resource) = self.pending.pop() {
            log::trace!("Retiring {}", resource.kind());
            resource.retire();
        }
    }
}
