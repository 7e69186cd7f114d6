// Instance-level objects: instance, debug messenger, window surface
//
// Also holds the extension/layer availability checks run before the
// instance is created, and the validation callback that routes messages
// into the `log` facade.

use ash::extensions::{ext::DebugUtils, khr};
use ash::{vk, Entry};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;

use super::handle::{Creatable, Destroyable, ResourceHandle, ResourceKind};
use crate::error::{EngineError, EngineResult};

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Load the Vulkan library.
pub fn load_entry() -> EngineResult<Entry> {
    unsafe { Entry::load() }.map_err(|e| EngineError::Loading(e.to_string()))
}

/// Instance extensions needed to present to `display` plus debug utils when validating.
pub fn required_extensions(
    display: RawDisplayHandle,
    enable_validation: bool,
) -> EngineResult<Vec<CString>> {
    let surface_extensions = ash_window::enumerate_required_extensions(display)
        .map_err(|e| EngineError::vulkan("ash_window::enumerate_required_extensions", e))?;

    let mut extensions: Vec<CString> = surface_extensions
        .iter()
        .map(|&name| unsafe { CStr::from_ptr(name) }.to_owned())
        .collect();
    if enable_validation {
        extensions.push(DebugUtils::name().to_owned());
    }
    Ok(extensions)
}

/// Fail with the first requested extension the loader does not offer.
pub fn check_instance_extensions(entry: &Entry, required: &[CString]) -> EngineResult<()> {
    let available = entry
        .enumerate_instance_extension_properties(None)
        .map_err(|e| EngineError::vulkan("vkEnumerateInstanceExtensionProperties", e))?;
    let available: Vec<&CStr> = available
        .iter()
        .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) })
        .collect();

    match first_missing(required, &available) {
        Some(missing) => Err(EngineError::MissingInstanceExtension(missing)),
        None => Ok(()),
    }
}

pub fn check_layers(entry: &Entry, required: &[CString]) -> EngineResult<()> {
    let available = entry
        .enumerate_instance_layer_properties()
        .map_err(|e| EngineError::vulkan("vkEnumerateInstanceLayerProperties", e))?;
    let available: Vec<&CStr> = available
        .iter()
        .map(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) })
        .collect();

    match first_missing(required, &available) {
        Some(missing) => Err(EngineError::MissingLayer(missing)),
        None => Ok(()),
    }
}

fn first_missing(required: &[CString], available: &[&CStr]) -> Option<String> {
    required
        .iter()
        .find(|name| !available.contains(&name.as_c_str()))
        .map(|name| name.to_string_lossy().into_owned())
}

fn as_ptrs(names: &[CString]) -> Vec<*const c_char> {
    names.iter().map(|name| name.as_ptr()).collect()
}

// =============================================================================
// INSTANCE
// =============================================================================

pub struct Instance;

pub struct InstanceDescription {
    pub entry: Entry,
    pub application_name: CString,
    pub api_version: u32,
    pub extensions: Vec<CString>,
    pub layers: Vec<CString>,
}

impl Creatable for Instance {
    const KIND: ResourceKind = ResourceKind::Instance;
    type Handle = ash::Instance;
    type Description = InstanceDescription;

    unsafe fn create(description: &InstanceDescription) -> EngineResult<ash::Instance> {
        let engine_name = c"vk-frameloop";
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&description.application_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(description.api_version);

        let extensions = as_ptrs(&description.extensions);
        let layers = as_ptrs(&description.layers);

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        description
            .entry
            .create_instance(&create_info, None)
            .map_err(|e| EngineError::creation(Self::KIND, e))
    }
}

impl Destroyable for Instance {
    unsafe fn destroy(handle: &ash::Instance, _description: &InstanceDescription) {
        handle.destroy_instance(None);
    }
}

impl ResourceHandle<Instance> {
    pub fn entry(&self) -> &Entry {
        &self.description().entry
    }
}

// =============================================================================
// DEBUG MESSENGER
// =============================================================================

pub struct DebugMessenger;

pub struct DebugMessengerDescription {
    pub instance: Arc<ResourceHandle<Instance>>,
    pub loader: DebugUtils,
    pub severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    pub message_types: vk::DebugUtilsMessageTypeFlagsEXT,
}

impl DebugMessengerDescription {
    pub fn new(instance: Arc<ResourceHandle<Instance>>) -> Self {
        let loader = DebugUtils::new(instance.entry(), instance.handle());
        Self {
            instance,
            loader,
            severity: vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            message_types: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        }
    }
}

impl Creatable for DebugMessenger {
    const KIND: ResourceKind = ResourceKind::DebugMessenger;
    type Handle = vk::DebugUtilsMessengerEXT;
    type Description = DebugMessengerDescription;

    unsafe fn create(description: &DebugMessengerDescription) -> EngineResult<Self::Handle> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(description.severity)
            .message_type(description.message_types)
            .pfn_user_callback(Some(debug_callback));

        description
            .loader
            .create_debug_utils_messenger(&create_info, None)
            .map_err(|e| EngineError::creation(Self::KIND, e))
    }
}

impl Destroyable for DebugMessenger {
    unsafe fn destroy(handle: &Self::Handle, description: &DebugMessengerDescription) {
        description.loader.destroy_debug_utils_messenger(*handle, None);
    }
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("[Vulkan] {}", message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("[Vulkan] {}", message),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::info!("[Vulkan] {}", message),
        _ => log::debug!("[Vulkan] {}", message),
    }

    vk::FALSE
}

// =============================================================================
// SURFACE
// =============================================================================

pub struct Surface;

pub struct SurfaceDescription {
    pub instance: Arc<ResourceHandle<Instance>>,
    pub loader: khr::Surface,
    pub display: RawDisplayHandle,
    pub window: RawWindowHandle,
}

impl SurfaceDescription {
    pub fn new(
        instance: Arc<ResourceHandle<Instance>>,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Self {
        let loader = khr::Surface::new(instance.entry(), instance.handle());
        Self {
            instance,
            loader,
            display,
            window,
        }
    }
}

impl Creatable for Surface {
    const KIND: ResourceKind = ResourceKind::Surface;
    type Handle = vk::SurfaceKHR;
    type Description = SurfaceDescription;

    unsafe fn create(description: &SurfaceDescription) -> EngineResult<vk::SurfaceKHR> {
        let instance = &description.instance;
        ash_window::create_surface(
            instance.entry(),
            instance.handle(),
            description.display,
            description.window,
            None,
        )
        .map_err(|e| EngineError::creation(Self::KIND, e))
    }
}

impl Destroyable for Surface {
    unsafe fn destroy(handle: &vk::SurfaceKHR, description: &SurfaceDescription) {
        description.loader.destroy_surface(*handle, None);
    }
}

impl ResourceHandle<Surface> {
    pub fn loader(&self) -> &khr::Surface {
        &self.description().loader
    }

    /// Whether `family_index` on `physical_device` can present to this surface.
    pub fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        family_index: u32,
    ) -> EngineResult<bool> {
        unsafe {
            self.loader()
                .get_physical_device_surface_support(physical_device, family_index, self.raw())
        }
        .map_err(|e| EngineError::vulkan("vkGetPhysicalDeviceSurfaceSupportKHR", e))
    }
}
