// Swapchain lifecycle
//
// Uninitialized -> Active <-> PendingRecreate -> Destroyed
//
// The manager decides when a swapchain is (re)built and keeps the old one
// alive until its replacement and all of the replacement's views and
// framebuffers exist. The actual driver work sits behind `SwapchainBackend`.

use ash::vk;

use crate::backend::swapchain::{negotiate, SurfaceSupport, SwapchainConfig, SwapchainPreferences};
use crate::error::EngineResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainStatus {
    Uninitialized,
    Active,
    PendingRecreate,
    Destroyed,
}

/// Why a (re)creation did not produce a new swapchain this time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    /// The window is minimized; nothing can be presented to it.
    ZeroArea,
    /// The window still belongs to another swapchain.
    SurfaceInUse,
    /// The swapchain was shut down for good.
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecreateOutcome {
    Recreated,
    Deferred(DeferReason),
}

/// Driver-side operations the lifecycle needs.
pub trait SwapchainBackend {
    /// Swapchain plus its views and framebuffers.
    type Target;

    /// Current framebuffer size of the window, in pixels.
    fn framebuffer_extent(&self) -> vk::Extent2D;

    fn surface_support(&self) -> EngineResult<SurfaceSupport>;

    fn wait_idle(&mut self) -> EngineResult<()>;

    /// Build a complete target, passing `previous` to the driver for reuse.
    /// A failed build leaves nothing behind.
    fn build(
        &mut self,
        config: &SwapchainConfig,
        previous: Option<&Self::Target>,
    ) -> EngineResult<Self::Target>;

    /// Destroy framebuffers, image views and the swapchain, in that order.
    /// Only called once the device is idle.
    fn teardown(&mut self, target: Self::Target);
}

pub struct SwapchainManager<T> {
    status: SwapchainStatus,
    preferences: SwapchainPreferences,
    current: Option<T>,
    config: Option<SwapchainConfig>,
    recreations: u64,
    /// A failed creation already retired `current`; it may not be handed to
    /// the driver as the old swapchain again.
    retired: bool,
}

impl<T> SwapchainManager<T> {
    pub fn new(preferences: SwapchainPreferences) -> Self {
        Self {
            status: SwapchainStatus::Uninitialized,
            preferences,
            current: None,
            config: None,
            recreations: 0,
            retired: false,
        }
    }

    pub fn status(&self) -> SwapchainStatus {
        self.status
    }

    pub fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    pub fn config(&self) -> Option<&SwapchainConfig> {
        self.config.as_ref()
    }

    /// Number of successful rebuilds after the first creation.
    pub fn recreations(&self) -> u64 {
        self.recreations
    }

    /// True while no usable swapchain exists or a rebuild is pending.
    pub fn needs_rebuild(&self) -> bool {
        matches!(
            self.status,
            SwapchainStatus::Uninitialized | SwapchainStatus::PendingRecreate
        )
    }

    /// Initial creation. A minimized window defers it to the first frame.
    pub fn create<B>(&mut self, backend: &mut B) -> EngineResult<RecreateOutcome>
    where
        B: SwapchainBackend<Target = T>,
    {
        if self.status != SwapchainStatus::Uninitialized {
            log::warn!("Ignoring swapchain creation in state {:?}", self.status);
            return Ok(RecreateOutcome::Recreated);
        }
        self.rebuild(backend)
    }

    /// Mark the current swapchain stale. Cheap; the rebuild happens later.
    pub fn request_recreate(&mut self) {
        if self.status == SwapchainStatus::Active {
            log::debug!("Swapchain recreation requested");
            self.status = SwapchainStatus::PendingRecreate;
        }
    }

    /// Rebuild if one is pending.
    pub fn recreate<B>(&mut self, backend: &mut B) -> EngineResult<RecreateOutcome>
    where
        B: SwapchainBackend<Target = T>,
    {
        match self.status {
            SwapchainStatus::Active => Ok(RecreateOutcome::Recreated),
            SwapchainStatus::Destroyed => {
                log::warn!("Ignoring recreation of a destroyed swapchain");
                Ok(RecreateOutcome::Deferred(DeferReason::Destroyed))
            }
            SwapchainStatus::Uninitialized | SwapchainStatus::PendingRecreate => {
                self.rebuild(backend)
            }
        }
    }

    fn rebuild<B>(&mut self, backend: &mut B) -> EngineResult<RecreateOutcome>
    where
        B: SwapchainBackend<Target = T>,
    {
        let extent = backend.framebuffer_extent();
        if extent.width == 0 || extent.height == 0 {
            // Re-sampled on the next frame; no blocking wait for a restore.
            if self.status == SwapchainStatus::Uninitialized {
                log::info!("Window has no area, deferring swapchain creation");
            }
            self.status = SwapchainStatus::PendingRecreate;
            return Ok(RecreateOutcome::Deferred(DeferReason::ZeroArea));
        }

        backend.wait_idle()?;
        let support = backend.surface_support()?;
        let config = negotiate(&support, extent, &self.preferences)?;
        // The surface can report a zero extent before the window does.
        if config.extent.width == 0 || config.extent.height == 0 {
            log::debug!("Surface has no area, deferring swapchain creation");
            self.status = SwapchainStatus::PendingRecreate;
            return Ok(RecreateOutcome::Deferred(DeferReason::ZeroArea));
        }

        let previous = if self.retired {
            None
        } else {
            self.current.as_ref()
        };
        let replacement = match backend.build(&config, previous) {
            Ok(target) => target,
            Err(e) if e.is_surface_in_use() => {
                log::warn!("Surface still in use, retrying swapchain creation next frame");
                // Creation retires the old swapchain even when it fails.
                self.retired |= self.current.is_some();
                self.status = SwapchainStatus::PendingRecreate;
                return Ok(RecreateOutcome::Deferred(DeferReason::SurfaceInUse));
            }
            Err(e) => return Err(e),
        };
        self.retired = false;

        if let Some(old) = self.current.replace(replacement) {
            backend.teardown(old);
            self.recreations += 1;
            log::info!(
                "Swapchain recreated at {}x{}",
                config.extent.width,
                config.extent.height
            );
        }
        self.config = Some(config);
        self.status = SwapchainStatus::Active;
        Ok(RecreateOutcome::Recreated)
    }

    /// Wait for the device, then destroy the swapchain. Terminal.
    pub fn destroy<B>(&mut self, backend: &mut B) -> EngineResult<()>
    where
        B: SwapchainBackend<Target = T>,
    {
        if self.status == SwapchainStatus::Destroyed {
            log::warn!("Swapchain already destroyed");
            return Ok(());
        }
        // A lost device fails the wait but still has to be torn down.
        let idle = backend.wait_idle();
        if let Some(target) = self.current.take() {
            backend.teardown(target);
        }
        self.config = None;
        self.retired = false;
        self.status = SwapchainStatus::Destroyed;
        idle
    }
}
