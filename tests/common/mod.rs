// Scripted stand-in for the Vulkan backend.
//
// Records every call in order and models fences as "submitted, not yet
// observed" flags so tests can check how far the host ran ahead of the GPU.

#![allow(dead_code)]

use ash::vk;
use std::collections::VecDeque;

use vk_frameloop::backend::handle::ResourceKind;
use vk_frameloop::backend::swapchain::{SurfaceSupport, SwapchainConfig, SwapchainPreferences};
use vk_frameloop::frame::{AcquireStatus, FrameBackend, FrameInfo, FrameLoop, PresentStatus};
use vk_frameloop::swapchain::{SwapchainBackend, SwapchainManager};
use vk_frameloop::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    WaitIdle,
    Build(u32),
    Teardown(u32),
    WaitSlot(usize),
    Acquire(usize),
    Release(usize),
    Reset(usize),
    Record { slot: usize, image_index: u32 },
    Submit(usize),
    Present { slot: usize, image_index: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockTarget {
    pub id: u32,
    pub extent: vk::Extent2D,
    pub framebuffer_count: usize,
    pub previous: Option<u32>,
}

pub struct MockBackend {
    pub calls: Vec<Call>,
    pub framebuffer: vk::Extent2D,
    /// Defined current extent reported by the surface; `None` follows the window.
    pub surface_extent: Option<vk::Extent2D>,
    pub acquire_script: VecDeque<AcquireStatus>,
    pub acquire_error: Option<EngineError>,
    pub present_script: VecDeque<PresentStatus>,
    pub build_failures: VecDeque<EngineError>,
    pub live_targets: Vec<u32>,
    /// Submitted, and the slot's fence not yet waited on.
    pub unobserved: Vec<bool>,
    pub max_unobserved: usize,
    next_image: u32,
    next_id: u32,
}

impl MockBackend {
    pub fn new(width: u32, height: u32, slots: usize) -> Self {
        Self {
            calls: Vec::new(),
            framebuffer: vk::Extent2D { width, height },
            surface_extent: None,
            acquire_script: VecDeque::new(),
            acquire_error: None,
            present_script: VecDeque::new(),
            build_failures: VecDeque::new(),
            live_targets: Vec::new(),
            unobserved: vec![false; slots],
            max_unobserved: 0,
            next_image: 0,
            next_id: 1,
        }
    }

    pub fn surface_in_use() -> EngineError {
        EngineError::creation(
            ResourceKind::Swapchain,
            vk::Result::ERROR_NATIVE_WINDOW_IN_USE_KHR,
        )
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.framebuffer = vk::Extent2D { width, height };
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|call| matches(call)).count()
    }

    pub fn submits(&self) -> usize {
        self.count(|call| matches!(call, Call::Submit(_)))
    }

    pub fn presents(&self) -> usize {
        self.count(|call| matches!(call, Call::Present { .. }))
    }

    pub fn builds(&self) -> usize {
        self.count(|call| matches!(call, Call::Build(_)))
    }

    pub fn calls_since(&self, mark: usize) -> &[Call] {
        &self.calls[mark..]
    }

    pub fn position(&self, call: Call) -> Option<usize> {
        self.calls.iter().position(|c| *c == call)
    }
}

impl SwapchainBackend for MockBackend {
    type Target = MockTarget;

    fn framebuffer_extent(&self) -> vk::Extent2D {
        self.framebuffer
    }

    fn surface_support(&self) -> EngineResult<SurfaceSupport> {
        Ok(SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 3,
                // Undefined unless scripted: the swapchain follows the window size.
                current_extent: self.surface_extent.unwrap_or(vk::Extent2D {
                    width: u32::MAX,
                    height: u32::MAX,
                }),
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 8192,
                    height: 8192,
                },
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                ..Default::default()
            },
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        })
    }

    fn wait_idle(&mut self) -> EngineResult<()> {
        self.calls.push(Call::WaitIdle);
        // An idle device has signaled every fence.
        self.unobserved.iter_mut().for_each(|pending| *pending = false);
        Ok(())
    }

    fn build(
        &mut self,
        config: &SwapchainConfig,
        previous: Option<&MockTarget>,
    ) -> EngineResult<MockTarget> {
        if let Some(error) = self.build_failures.pop_front() {
            return Err(error);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.calls.push(Call::Build(id));
        self.live_targets.push(id);
        Ok(MockTarget {
            id,
            extent: config.extent,
            framebuffer_count: config.image_count as usize,
            previous: previous.map(|target| target.id),
        })
    }

    fn teardown(&mut self, target: MockTarget) {
        self.calls.push(Call::Teardown(target.id));
        self.live_targets.retain(|&id| id != target.id);
    }
}

impl FrameBackend for MockBackend {
    fn wait_for_slot(&mut self, slot: usize) -> EngineResult<()> {
        self.calls.push(Call::WaitSlot(slot));
        self.unobserved[slot] = false;
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize, target: &MockTarget) -> EngineResult<AcquireStatus> {
        self.calls.push(Call::Acquire(slot));
        if let Some(error) = self.acquire_error.take() {
            return Err(error);
        }
        if let Some(status) = self.acquire_script.pop_front() {
            return Ok(status);
        }
        let image_index = self.next_image % target.framebuffer_count as u32;
        self.next_image += 1;
        Ok(AcquireStatus::Acquired {
            image_index,
            suboptimal: false,
        })
    }

    fn release_acquired(&mut self, slot: usize) -> EngineResult<()> {
        self.calls.push(Call::Release(slot));
        Ok(())
    }

    fn reset_slot(&mut self, slot: usize) -> EngineResult<()> {
        self.calls.push(Call::Reset(slot));
        Ok(())
    }

    fn record(&mut self, slot: usize, target: &MockTarget, frame: FrameInfo) -> EngineResult<()> {
        assert!((frame.image_index as usize) < target.framebuffer_count);
        assert_eq!(frame.frame_index, slot);
        self.calls.push(Call::Record {
            slot,
            image_index: frame.image_index,
        });
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> EngineResult<()> {
        assert!(
            !self.unobserved[slot],
            "slot {slot} submitted again before its fence was waited on"
        );
        self.calls.push(Call::Submit(slot));
        self.unobserved[slot] = true;
        let outstanding = self.unobserved.iter().filter(|&&pending| pending).count();
        self.max_unobserved = self.max_unobserved.max(outstanding);
        Ok(())
    }

    fn present(
        &mut self,
        slot: usize,
        _target: &MockTarget,
        image_index: u32,
    ) -> EngineResult<PresentStatus> {
        self.calls.push(Call::Present { slot, image_index });
        Ok(self
            .present_script
            .pop_front()
            .unwrap_or(PresentStatus::Presented))
    }
}

/// A started loop over a fresh 800x600 mock.
pub fn started_loop(slots: usize) -> (FrameLoop<MockTarget>, MockBackend) {
    let mut backend = MockBackend::new(800, 600, slots);
    let mut frame_loop = FrameLoop::new(SwapchainManager::new(SwapchainPreferences::default()), slots);
    frame_loop.start(&mut backend).expect("initial swapchain");
    (frame_loop, backend)
}
