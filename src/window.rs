// Window boundary
//
// The engine never talks to the windowing library directly. Anything that
// can report its framebuffer size and hand out raw handles can be rendered to.

use raw_window_handle::{
    HasRawDisplayHandle, HasRawWindowHandle, RawDisplayHandle, RawWindowHandle,
};

pub trait PresentTarget {
    /// Drawable size in physical pixels. Zero in either axis while minimized.
    fn framebuffer_size(&self) -> (u32, u32);

    fn raw_display_handle(&self) -> RawDisplayHandle;

    fn raw_window_handle(&self) -> RawWindowHandle;
}

impl PresentTarget for winit::window::Window {
    fn framebuffer_size(&self) -> (u32, u32) {
        let size = self.inner_size();
        (size.width, size.height)
    }

    fn raw_display_handle(&self) -> RawDisplayHandle {
        HasRawDisplayHandle::raw_display_handle(self)
    }

    fn raw_window_handle(&self) -> RawWindowHandle {
        HasRawWindowHandle::raw_window_handle(self)
    }
}
