// Error types
//
// Every fallible operation in the engine returns `EngineResult<T>`.
// `EngineError::kind()` tells the frame loop whether a failure is fatal or
// something the swapchain manager absorbs by skipping a frame. Out-of-date
// and suboptimal surfaces are statuses, not errors.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

use crate::backend::handle::ResourceKind;
use crate::backend::queue_family::QueueRole;

pub type EngineResult<T> = Result<T, EngineError>;

/// Whether an error must abort the caller or is absorbed by the present loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Fatal,
    Recoverable,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to load the Vulkan library: {0}")]
    Loading(String),

    #[error("Required instance extension `{0}` is not available")]
    MissingInstanceExtension(String),

    #[error("Required layer `{0}` is not available")]
    MissingLayer(String),

    #[error("No physical device satisfies the renderer's requirements")]
    NoSuitableDevice,

    #[error("No queue family can serve the {0} role")]
    MissingQueueFamily(QueueRole),

    #[error("No memory type with {required:?} is allowed by type bits {type_bits:#034b}")]
    NoSuitableMemoryType {
        required: vk::MemoryPropertyFlags,
        type_bits: u32,
    },

    #[error("Shader `{name}` not found in any of {searched:?}")]
    ShaderNotFound { name: String, searched: Vec<PathBuf> },

    #[error("Failed to read shader {path:?}: {source}")]
    ShaderIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Surface reported no {0}")]
    EmptySurfaceSupport(&'static str),

    #[error("Failed to create {kind}: {result}")]
    Creation { kind: ResourceKind, result: vk::Result },

    #[error("Vulkan call {call} failed: {result}")]
    Vulkan {
        call: &'static str,
        result: vk::Result,
    },

    #[error("Acquired image {index} but the swapchain has {count} framebuffers")]
    ImageIndexOutOfRange { index: u32, count: usize },
}

impl EngineError {
    pub fn creation(kind: ResourceKind, result: vk::Result) -> Self {
        Self::Creation { kind, result }
    }

    /// Out-of-date and suboptimal results of acquire and present never get
    /// here; they come back as `AcquireStatus` / `PresentStatus` values.
    pub fn vulkan(call: &'static str, result: vk::Result) -> Self {
        Self::Vulkan { call, result }
    }

    /// Swapchain creation failed because the window still belongs to another swapchain.
    pub fn is_surface_in_use(&self) -> bool {
        matches!(
            self,
            Self::Creation {
                kind: ResourceKind::Swapchain,
                result: vk::Result::ERROR_NATIVE_WINDOW_IN_USE_KHR,
            }
        )
    }

    pub fn kind(&self) -> ErrorKind {
        if self.is_surface_in_use() {
            ErrorKind::Recoverable
        } else {
            ErrorKind::Fatal
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_date_outside_the_frame_loop_is_fatal() {
        let error = EngineError::vulkan("vkGetSwapchainImagesKHR", vk::Result::ERROR_OUT_OF_DATE_KHR);
        assert_eq!(error.kind(), ErrorKind::Fatal);
        assert!(error.to_string().contains("vkGetSwapchainImagesKHR"));
    }

    #[test]
    fn surface_in_use_only_counts_for_swapchains() {
        let swapchain = EngineError::creation(
            ResourceKind::Swapchain,
            vk::Result::ERROR_NATIVE_WINDOW_IN_USE_KHR,
        );
        assert!(swapchain.is_surface_in_use());
        assert!(!swapchain.is_fatal());

        let surface = EngineError::creation(
            ResourceKind::Surface,
            vk::Result::ERROR_NATIVE_WINDOW_IN_USE_KHR,
        );
        assert!(!surface.is_surface_in_use());
        assert!(surface.is_fatal());
    }

    #[test]
    fn startup_failures_are_fatal() {
        assert!(EngineError::NoSuitableDevice.is_fatal());
        assert!(EngineError::MissingQueueFamily(QueueRole::Present).is_fatal());
        assert!(EngineError::vulkan("vkQueueSubmit", vk::Result::ERROR_DEVICE_LOST).is_fatal());
    }

    #[test]
    fn display_names_the_failing_role() {
        let message = EngineError::MissingQueueFamily(QueueRole::Transfer).to_string();
        assert!(message.contains("transfer"));
    }
}
