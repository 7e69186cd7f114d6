// Backend module - Vulkan abstraction layer
//
// Every GPU object is a `ResourceHandle<R>` built from a plain description.
// Modules are listed leaves first.

pub mod handle;
pub mod queue_family;
pub mod destruction;

pub mod instance;
pub mod device;
pub mod swapchain;
pub mod pipeline;
pub mod shader;
pub mod command;
pub mod sync;
pub mod buffer;
pub mod presenter;

pub use destruction::{DestructionQueue, Retirement};
pub use handle::{ResourceHandle, ResourceKind};
pub use presenter::Presenter;
