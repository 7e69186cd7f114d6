// Frame synchronization loop
//
// One iteration: wait for the slot's fence, acquire an image, reset the slot,
// record, submit, present. N slots bound how far the host can run ahead of
// the GPU. Out-of-date surfaces and resizes skip the frame and rebuild the
// swapchain instead of surfacing an error.

use crate::error::EngineResult;
use crate::swapchain::{DeferReason, RecreateOutcome, SwapchainBackend, SwapchainManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireStatus {
    Acquired { image_index: u32, suboptimal: bool },
    OutOfDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    Suboptimal,
    OutOfDate,
}

/// Per-iteration numbers handed to command recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub frame_index: usize,
    pub image_index: u32,
}

/// Per-slot GPU work. Slot indices are always below the loop's frame count.
pub trait FrameBackend: SwapchainBackend {
    /// Block until the slot's previous submission has completed.
    fn wait_for_slot(&mut self, slot: usize) -> EngineResult<()>;

    /// Acquire the next image, signaling the slot's image-acquired semaphore.
    fn acquire_image(&mut self, slot: usize, target: &Self::Target) -> EngineResult<AcquireStatus>;

    /// Consume the image-acquired signal of a frame that will not be submitted.
    fn release_acquired(&mut self, slot: usize) -> EngineResult<()>;

    /// Unsignal the slot's fence and reset its command buffer.
    fn reset_slot(&mut self, slot: usize) -> EngineResult<()>;

    fn record(&mut self, slot: usize, target: &Self::Target, frame: FrameInfo) -> EngineResult<()>;

    /// Submit the slot's command buffer; signals render-finished and the fence.
    fn submit(&mut self, slot: usize) -> EngineResult<()>;

    fn present(
        &mut self,
        slot: usize,
        target: &Self::Target,
        image_index: u32,
    ) -> EngineResult<PresentStatus>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Minimized window.
    ZeroArea,
    /// Swapchain creation hit a surface still owned by another swapchain.
    SurfaceInUse,
    /// Acquire reported the swapchain out of date.
    OutOfDate,
    /// A resize notification arrived.
    Resized,
    /// The loop has been shut down.
    Terminated,
}

impl From<DeferReason> for SkipReason {
    fn from(reason: DeferReason) -> Self {
        match reason {
            DeferReason::ZeroArea => Self::ZeroArea,
            DeferReason::SurfaceInUse => Self::SurfaceInUse,
            DeferReason::Destroyed => Self::Terminated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented { image_index: u32 },
    Skipped(SkipReason),
}

pub struct FrameLoop<T> {
    swapchain: SwapchainManager<T>,
    frames_in_flight: usize,
    frame_index: usize,
    resize_pending: bool,
}

impl<T> FrameLoop<T> {
    pub fn new(swapchain: SwapchainManager<T>, frames_in_flight: usize) -> Self {
        Self {
            swapchain,
            frames_in_flight: frames_in_flight.max(1),
            frame_index: 0,
            resize_pending: false,
        }
    }

    pub fn swapchain(&self) -> &SwapchainManager<T> {
        &self.swapchain
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Slot the next iteration will use.
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// Resize hook. Only sets a flag; the next `draw_frame` acts on it.
    pub fn notify_resized(&mut self) {
        self.resize_pending = true;
    }

    pub fn resize_pending(&self) -> bool {
        self.resize_pending
    }

    /// Build the first swapchain.
    pub fn start<B>(&mut self, backend: &mut B) -> EngineResult<RecreateOutcome>
    where
        B: FrameBackend<Target = T>,
    {
        self.swapchain.create(backend)
    }

    /// Run one iteration. Errors are always fatal; every recoverable status
    /// turns into a skipped frame.
    pub fn draw_frame<B>(&mut self, backend: &mut B) -> EngineResult<FrameOutcome>
    where
        B: FrameBackend<Target = T>,
    {
        // Left over from a present that went stale, a minimized window or a
        // surface that was still busy.
        if self.swapchain.needs_rebuild() {
            if let RecreateOutcome::Deferred(reason) = self.swapchain.recreate(backend)? {
                return Ok(FrameOutcome::Skipped(reason.into()));
            }
            // Area is back; a resize seen while deferring is already covered.
            self.resize_pending = false;
        }
        let Some(target) = self.swapchain.current() else {
            return Ok(FrameOutcome::Skipped(SkipReason::Terminated));
        };

        let slot = self.frame_index;
        backend.wait_for_slot(slot)?;

        let image_index = match backend.acquire_image(slot, target)? {
            AcquireStatus::Acquired {
                image_index,
                suboptimal,
            } => {
                if suboptimal {
                    log::debug!("Acquired a suboptimal swapchain image");
                }
                image_index
            }
            AcquireStatus::OutOfDate => {
                log::debug!("Swapchain out of date on acquire, skipping frame");
                return self.rebuild_and_skip(backend, SkipReason::OutOfDate);
            }
        };

        if self.resize_pending {
            log::debug!("Window resized, skipping frame");
            backend.release_acquired(slot)?;
            return self.rebuild_and_skip(backend, SkipReason::Resized);
        }

        backend.reset_slot(slot)?;
        backend.record(
            slot,
            target,
            FrameInfo {
                frame_index: slot,
                image_index,
            },
        )?;
        backend.submit(slot)?;

        // The slot's fence now guards the submission, so the next frame may
        // move on regardless of how present goes.
        self.frame_index = (self.frame_index + 1) % self.frames_in_flight;

        match backend.present(slot, target, image_index)? {
            PresentStatus::Presented => {}
            PresentStatus::Suboptimal | PresentStatus::OutOfDate => {
                self.swapchain.request_recreate();
            }
        }
        Ok(FrameOutcome::Presented { image_index })
    }

    fn rebuild_and_skip<B>(&mut self, backend: &mut B, reason: SkipReason) -> EngineResult<FrameOutcome>
    where
        B: FrameBackend<Target = T>,
    {
        self.resize_pending = false;
        self.swapchain.request_recreate();
        match self.swapchain.recreate(backend)? {
            RecreateOutcome::Recreated => Ok(FrameOutcome::Skipped(reason)),
            RecreateOutcome::Deferred(deferred) => Ok(FrameOutcome::Skipped(deferred.into())),
        }
    }

    /// Wait for the GPU and destroy the swapchain. Frame slots are the
    /// backend's to release.
    pub fn shutdown<B>(&mut self, backend: &mut B) -> EngineResult<()>
    where
        B: FrameBackend<Target = T>,
    {
        self.swapchain.destroy(backend)
    }
}
