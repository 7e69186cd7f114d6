//! Swapchain creation, recreation and destruction driven through the frame loop.

mod common;

use ash::vk;
use common::{started_loop, Call, MockBackend};
use vk_frameloop::backend::handle::ResourceKind;
use vk_frameloop::backend::swapchain::SwapchainPreferences;
use vk_frameloop::frame::{FrameLoop, FrameOutcome, SkipReason};
use vk_frameloop::swapchain::{DeferReason, RecreateOutcome, SwapchainManager, SwapchainStatus};
use vk_frameloop::EngineError;

#[test]
fn first_creation_matches_the_window() {
    let (frame_loop, backend) = started_loop(2);
    let swapchain = frame_loop.swapchain();

    assert_eq!(swapchain.status(), SwapchainStatus::Active);
    assert_eq!(backend.calls, vec![Call::WaitIdle, Call::Build(1)]);

    let target = swapchain.current().unwrap();
    assert_eq!(target.extent, vk::Extent2D { width: 800, height: 600 });
    assert_eq!(target.framebuffer_count, 3);
    assert_eq!(target.previous, None);

    let config = swapchain.config().unwrap();
    assert_eq!(config.present_mode, vk::PresentModeKHR::MAILBOX);
    assert_eq!(config.image_count, 3);
    assert_eq!(swapchain.recreations(), 0);
}

#[test]
fn recreation_request_before_creation_is_ignored() {
    let mut manager: SwapchainManager<common::MockTarget> =
        SwapchainManager::new(SwapchainPreferences::default());

    manager.request_recreate();

    assert_eq!(manager.status(), SwapchainStatus::Uninitialized);
    assert!(manager.needs_rebuild());
}

// ============================================================================
// ZERO AREA
// ============================================================================

#[test]
fn minimized_at_startup_defers_creation() {
    let mut backend = MockBackend::new(0, 0, 2);
    let mut frame_loop = FrameLoop::new(SwapchainManager::new(SwapchainPreferences::default()), 2);

    let outcome = frame_loop.start(&mut backend).unwrap();

    assert_eq!(outcome, RecreateOutcome::Deferred(DeferReason::ZeroArea));
    assert_eq!(frame_loop.swapchain().status(), SwapchainStatus::PendingRecreate);
    assert!(backend.calls.is_empty());

    for _ in 0..3 {
        let outcome = frame_loop.draw_frame(&mut backend).unwrap();
        assert_eq!(outcome, FrameOutcome::Skipped(SkipReason::ZeroArea));
    }
    // Deferral never blocks on the GPU.
    assert!(backend.calls.is_empty());

    backend.resize(640, 480);
    let outcome = frame_loop.draw_frame(&mut backend).unwrap();

    assert!(matches!(outcome, FrameOutcome::Presented { .. }));
    assert_eq!(&backend.calls[..3], &[Call::WaitIdle, Call::Build(1), Call::WaitSlot(0)]);
    let target = frame_loop.swapchain().current().unwrap();
    assert_eq!(target.extent, vk::Extent2D { width: 640, height: 480 });
    assert_eq!(frame_loop.swapchain().recreations(), 0);
}

#[test]
fn minimize_keeps_the_old_swapchain_until_restore() {
    let (mut frame_loop, mut backend) = started_loop(2);

    backend.resize(0, 0);
    frame_loop.notify_resized();
    let outcome = frame_loop.draw_frame(&mut backend).unwrap();

    assert_eq!(outcome, FrameOutcome::Skipped(SkipReason::ZeroArea));
    assert_eq!(frame_loop.swapchain().status(), SwapchainStatus::PendingRecreate);
    assert_eq!(backend.live_targets, vec![1]);

    let mark = backend.calls.len();
    let outcome = frame_loop.draw_frame(&mut backend).unwrap();
    assert_eq!(outcome, FrameOutcome::Skipped(SkipReason::ZeroArea));
    assert!(backend.calls_since(mark).is_empty());

    backend.resize(1024, 768);
    let outcome = frame_loop.draw_frame(&mut backend).unwrap();

    assert!(matches!(outcome, FrameOutcome::Presented { .. }));
    let target = frame_loop.swapchain().current().unwrap();
    assert_eq!(target.id, 2);
    assert_eq!(target.previous, Some(1));
    assert_eq!(target.extent, vk::Extent2D { width: 1024, height: 768 });
    assert_eq!(backend.live_targets, vec![2]);
}

#[test]
fn zero_surface_extent_defers_even_with_a_sized_window() {
    let mut backend = MockBackend::new(800, 600, 2);
    backend.surface_extent = Some(vk::Extent2D { width: 0, height: 0 });
    let mut frame_loop = FrameLoop::new(SwapchainManager::new(SwapchainPreferences::default()), 2);

    let outcome = frame_loop.start(&mut backend).unwrap();

    assert_eq!(outcome, RecreateOutcome::Deferred(DeferReason::ZeroArea));
    assert_eq!(frame_loop.swapchain().status(), SwapchainStatus::PendingRecreate);
    assert_eq!(backend.builds(), 0);

    let outcome = frame_loop.draw_frame(&mut backend).unwrap();
    assert_eq!(outcome, FrameOutcome::Skipped(SkipReason::ZeroArea));
    assert_eq!(backend.builds(), 0);

    backend.surface_extent = Some(vk::Extent2D { width: 800, height: 600 });
    let outcome = frame_loop.draw_frame(&mut backend).unwrap();

    assert!(matches!(outcome, FrameOutcome::Presented { .. }));
    let target = frame_loop.swapchain().current().unwrap();
    assert_eq!(target.extent, vk::Extent2D { width: 800, height: 600 });
}

#[test]
fn zero_surface_extent_keeps_the_old_swapchain() {
    let (mut frame_loop, mut backend) = started_loop(2);
    backend.surface_extent = Some(vk::Extent2D { width: 0, height: 0 });

    frame_loop.notify_resized();
    let outcome = frame_loop.draw_frame(&mut backend).unwrap();

    assert_eq!(outcome, FrameOutcome::Skipped(SkipReason::ZeroArea));
    assert_eq!(backend.builds(), 1);
    assert_eq!(backend.live_targets, vec![1]);
}

// ============================================================================
// BUILD FAILURES
// ============================================================================

#[test]
fn surface_in_use_retries_on_the_next_frame() {
    let (mut frame_loop, mut backend) = started_loop(2);
    backend.build_failures.push_back(MockBackend::surface_in_use());

    frame_loop.notify_resized();
    let outcome = frame_loop.draw_frame(&mut backend).unwrap();

    assert_eq!(outcome, FrameOutcome::Skipped(SkipReason::SurfaceInUse));
    assert_eq!(frame_loop.swapchain().status(), SwapchainStatus::PendingRecreate);
    assert_eq!(frame_loop.swapchain().current().unwrap().id, 1);
    assert_eq!(backend.live_targets, vec![1]);

    let outcome = frame_loop.draw_frame(&mut backend).unwrap();

    assert!(matches!(outcome, FrameOutcome::Presented { .. }));
    assert_eq!(frame_loop.swapchain().status(), SwapchainStatus::Active);
    assert_eq!(backend.live_targets, vec![2]);
    // The failed attempt retired swapchain 1, so the retry must not reuse it.
    assert_eq!(frame_loop.swapchain().current().unwrap().previous, None);
    assert!(backend.position(Call::Build(2)).unwrap() < backend.position(Call::Teardown(1)).unwrap());
}

#[test]
fn old_swapchain_is_reused_again_after_a_successful_retry() {
    let (mut frame_loop, mut backend) = started_loop(2);
    backend.build_failures.push_back(MockBackend::surface_in_use());

    frame_loop.notify_resized();
    frame_loop.draw_frame(&mut backend).unwrap();
    frame_loop.draw_frame(&mut backend).unwrap();

    frame_loop.notify_resized();
    frame_loop.draw_frame(&mut backend).unwrap();

    let target = frame_loop.swapchain().current().unwrap();
    assert_eq!(target.id, 3);
    assert_eq!(target.previous, Some(2));
}

#[test]
fn other_build_failures_are_fatal_and_keep_the_old_swapchain() {
    let (mut frame_loop, mut backend) = started_loop(2);
    backend.build_failures.push_back(EngineError::creation(
        ResourceKind::Swapchain,
        vk::Result::ERROR_INITIALIZATION_FAILED,
    ));

    frame_loop.notify_resized();
    let error = frame_loop.draw_frame(&mut backend).unwrap_err();

    assert!(error.is_fatal());
    assert_eq!(frame_loop.swapchain().current().unwrap().id, 1);
    assert_eq!(backend.live_targets, vec![1]);
    assert!(!backend.calls.contains(&Call::Teardown(1)));
}

// ============================================================================
// DESTRUCTION
// ============================================================================

#[test]
fn shutdown_waits_then_tears_down_once() {
    let (mut frame_loop, mut backend) = started_loop(2);
    frame_loop.draw_frame(&mut backend).unwrap();
    let mark = backend.calls.len();

    frame_loop.shutdown(&mut backend).unwrap();

    assert_eq!(backend.calls_since(mark), &[Call::WaitIdle, Call::Teardown(1)]);
    assert_eq!(frame_loop.swapchain().status(), SwapchainStatus::Destroyed);
    assert!(frame_loop.swapchain().current().is_none());
    assert!(backend.live_targets.is_empty());

    let outcome = frame_loop.draw_frame(&mut backend).unwrap();
    assert_eq!(outcome, FrameOutcome::Skipped(SkipReason::Terminated));

    let mark = backend.calls.len();
    frame_loop.shutdown(&mut backend).unwrap();
    assert!(backend.calls_since(mark).is_empty());
}

#[test]
fn shutdown_while_minimized_has_nothing_to_tear_down() {
    let mut backend = MockBackend::new(0, 0, 2);
    let mut frame_loop = FrameLoop::new(SwapchainManager::new(SwapchainPreferences::default()), 2);
    frame_loop.start(&mut backend).unwrap();

    frame_loop.shutdown(&mut backend).unwrap();

    assert_eq!(backend.calls, vec![Call::WaitIdle]);
    assert_eq!(frame_loop.swapchain().status(), SwapchainStatus::Destroyed);
}
