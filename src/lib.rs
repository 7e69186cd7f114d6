// vk-frameloop - GPU object lifecycle and a double-buffered present loop on Vulkan
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  Engine (context object the application drives)                 │
// │    ├── FrameLoop (fence wait, acquire, record, submit, present) │
// │    │     └── SwapchainManager (create / recreate / destroy)     │
// │    ├── Presenter (Vulkan backend for both of the above)         │
// │    └── DestructionQueue (LIFO teardown of everything else)      │
// └─────────────────────────────────────────────────────────────────┘

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod swapchain;
pub mod window;

pub use config::Config;
pub use engine::{BufferRequest, Engine};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use frame::{FrameLoop, FrameOutcome, SkipReason};
pub use window::PresentTarget;
