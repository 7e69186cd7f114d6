//! Frame loop behavior against a scripted backend.

mod common;

use ash::vk;
use common::{started_loop, Call};
use vk_frameloop::frame::{AcquireStatus, FrameOutcome, PresentStatus, SkipReason};
use vk_frameloop::swapchain::SwapchainStatus;
use vk_frameloop::EngineError;

// ============================================================================
// STEADY STATE
// ============================================================================

#[test]
fn host_never_runs_more_than_frames_in_flight_ahead() {
    for slots in 1..=3 {
        let (mut frame_loop, mut backend) = started_loop(slots);

        for _ in 0..50 {
            let outcome = frame_loop.draw_frame(&mut backend).unwrap();
            assert!(matches!(outcome, FrameOutcome::Presented { .. }));
        }

        assert!(backend.max_unobserved <= slots);
        assert_eq!(backend.submits(), 50);
        assert_eq!(backend.presents(), 50);

        let submitted: Vec<usize> = backend
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Submit(slot) => Some(*slot),
                _ => None,
            })
            .collect();
        let expected: Vec<usize> = (0..50).map(|i| i % slots).collect();
        assert_eq!(submitted, expected);
    }
}

#[test]
fn one_iteration_runs_in_order() {
    let (mut frame_loop, mut backend) = started_loop(2);
    let mark = backend.calls.len();

    let outcome = frame_loop.draw_frame(&mut backend).unwrap();

    assert_eq!(outcome, FrameOutcome::Presented { image_index: 0 });
    assert_eq!(
        backend.calls_since(mark),
        &[
            Call::WaitSlot(0),
            Call::Acquire(0),
            Call::Reset(0),
            Call::Record {
                slot: 0,
                image_index: 0
            },
            Call::Submit(0),
            Call::Present {
                slot: 0,
                image_index: 0
            },
        ]
    );
    assert_eq!(frame_loop.frame_index(), 1);
}

#[test]
fn frames_in_flight_is_at_least_one() {
    let (frame_loop, _backend) = started_loop(0);
    assert_eq!(frame_loop.frames_in_flight(), 1);
}

// ============================================================================
// RESIZE
// ============================================================================

#[test]
fn resize_skips_before_recording_and_rebuilds() {
    let (mut frame_loop, mut backend) = started_loop(2);
    frame_loop.draw_frame(&mut backend).unwrap();

    backend.resize(1024, 768);
    frame_loop.notify_resized();
    assert!(frame_loop.resize_pending());
    let mark = backend.calls.len();

    let outcome = frame_loop.draw_frame(&mut backend).unwrap();

    assert_eq!(outcome, FrameOutcome::Skipped(SkipReason::Resized));
    assert_eq!(
        backend.calls_since(mark),
        &[
            Call::WaitSlot(1),
            Call::Acquire(1),
            Call::Release(1),
            Call::WaitIdle,
            Call::Build(2),
            Call::Teardown(1),
        ]
    );
    assert!(!frame_loop.resize_pending());
    assert_eq!(frame_loop.frame_index(), 1);

    let target = frame_loop.swapchain().current().unwrap();
    assert_eq!(target.extent, vk::Extent2D { width: 1024, height: 768 });
    assert_eq!(target.previous, Some(1));

    let outcome = frame_loop.draw_frame(&mut backend).unwrap();
    assert!(matches!(outcome, FrameOutcome::Presented { .. }));
    assert_eq!(backend.submits(), 2);
}

#[test]
fn several_resizes_collapse_into_one_rebuild() {
    let (mut frame_loop, mut backend) = started_loop(2);

    frame_loop.notify_resized();
    frame_loop.notify_resized();
    frame_loop.notify_resized();
    let outcome = frame_loop.draw_frame(&mut backend).unwrap();

    assert_eq!(outcome, FrameOutcome::Skipped(SkipReason::Resized));
    assert_eq!(backend.builds(), 2);

    frame_loop.draw_frame(&mut backend).unwrap();
    assert_eq!(backend.builds(), 2);
}

// ============================================================================
// OUT OF DATE / SUBOPTIMAL
// ============================================================================

#[test]
fn out_of_date_acquire_rebuilds_at_the_same_size() {
    let (mut frame_loop, mut backend) = started_loop(2);
    backend.acquire_script.push_back(AcquireStatus::OutOfDate);
    let mark = backend.calls.len();

    let outcome = frame_loop.draw_frame(&mut backend).unwrap();

    assert_eq!(outcome, FrameOutcome::Skipped(SkipReason::OutOfDate));
    assert_eq!(
        backend.calls_since(mark),
        &[
            Call::WaitSlot(0),
            Call::Acquire(0),
            Call::WaitIdle,
            Call::Build(2),
            Call::Teardown(1),
        ]
    );

    let target = frame_loop.swapchain().current().unwrap();
    assert_eq!(target.id, 2);
    assert_eq!(target.previous, Some(1));
    assert_eq!(target.extent, vk::Extent2D { width: 800, height: 600 });
    assert_eq!(target.framebuffer_count, 3);
    assert_eq!(backend.live_targets, vec![2]);
    assert_eq!(frame_loop.swapchain().recreations(), 1);
    assert_eq!(frame_loop.frame_index(), 0);
}

#[test]
fn old_swapchain_outlives_its_replacement_build() {
    let (mut frame_loop, mut backend) = started_loop(2);
    backend.acquire_script.push_back(AcquireStatus::OutOfDate);

    frame_loop.draw_frame(&mut backend).unwrap();

    let built = backend.position(Call::Build(2)).unwrap();
    let torn_down = backend.position(Call::Teardown(1)).unwrap();
    assert!(built < torn_down);
}

#[test]
fn out_of_date_present_rebuilds_on_the_next_frame() {
    let (mut frame_loop, mut backend) = started_loop(2);
    backend.present_script.push_back(PresentStatus::OutOfDate);

    let outcome = frame_loop.draw_frame(&mut backend).unwrap();

    assert!(matches!(outcome, FrameOutcome::Presented { .. }));
    assert_eq!(frame_loop.swapchain().status(), SwapchainStatus::PendingRecreate);
    assert_eq!(frame_loop.frame_index(), 1);
    assert_eq!(backend.builds(), 1);

    let mark = backend.calls.len();
    let outcome = frame_loop.draw_frame(&mut backend).unwrap();

    assert!(matches!(outcome, FrameOutcome::Presented { .. }));
    assert_eq!(
        &backend.calls_since(mark)[..4],
        &[
            Call::WaitIdle,
            Call::Build(2),
            Call::Teardown(1),
            Call::WaitSlot(1),
        ]
    );
    assert_eq!(frame_loop.swapchain().status(), SwapchainStatus::Active);
}

#[test]
fn suboptimal_present_requests_a_rebuild() {
    let (mut frame_loop, mut backend) = started_loop(2);
    backend.present_script.push_back(PresentStatus::Suboptimal);

    frame_loop.draw_frame(&mut backend).unwrap();

    assert_eq!(frame_loop.swapchain().status(), SwapchainStatus::PendingRecreate);
}

#[test]
fn suboptimal_acquire_still_presents() {
    let (mut frame_loop, mut backend) = started_loop(2);
    backend.acquire_script.push_back(AcquireStatus::Acquired {
        image_index: 2,
        suboptimal: true,
    });

    let outcome = frame_loop.draw_frame(&mut backend).unwrap();

    assert_eq!(outcome, FrameOutcome::Presented { image_index: 2 });
    assert_eq!(frame_loop.swapchain().status(), SwapchainStatus::Active);
    assert_eq!(backend.builds(), 1);
}

// ============================================================================
// FATAL ERRORS
// ============================================================================

#[test]
fn device_loss_on_acquire_propagates() {
    let (mut frame_loop, mut backend) = started_loop(2);
    backend.acquire_error = Some(EngineError::vulkan(
        "vkAcquireNextImageKHR",
        vk::Result::ERROR_DEVICE_LOST,
    ));

    let error = frame_loop.draw_frame(&mut backend).unwrap_err();

    assert!(error.is_fatal());
    assert_eq!(backend.submits(), 0);
    assert_eq!(backend.presents(), 0);
    assert_eq!(frame_loop.frame_index(), 0);
}
