// Vulkan Device - physical device selection and logical device creation
//
// Responsibilities:
// - Snapshot every adapter into a PhysicalDeviceCandidate
// - Pick the best candidate that passes the queue solver (prefer discrete GPU)
// - Logical device + queue creation from the solver's assignment

use ash::extensions::khr;
use ash::vk;
use std::ffi::{CStr, CString};
use std::sync::Arc;

use super::handle::{Creatable, Destroyable, ResourceHandle, ResourceKind};
use super::instance::{Instance, Surface};
use super::queue_family::{
    self, QueueCapabilities, QueueFamilyAssignment, QueueFamilyRecord, QueueRole, QueueWeights,
};
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryHeap {
    pub size: vk::DeviceSize,
    pub device_local: bool,
}

/// Immutable snapshot of one adapter, taken once at startup.
#[derive(Debug, Clone)]
pub struct PhysicalDeviceCandidate {
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub memory_heaps: Vec<MemoryHeap>,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub extensions: Vec<String>,
    pub queue_families: Vec<QueueFamilyRecord>,
}

impl PhysicalDeviceCandidate {
    pub fn supports_extension(&self, name: &str) -> bool {
        self.extensions.iter().any(|ext| ext == name)
    }

    pub fn device_local_bytes(&self) -> vk::DeviceSize {
        self.memory_heaps
            .iter()
            .filter(|heap| heap.device_local)
            .map(|heap| heap.size)
            .sum()
    }

    fn type_score(&self) -> u64 {
        match self.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
            vk::PhysicalDeviceType::VIRTUAL_GPU => 10,
            _ => 1,
        }
    }
}

/// Query every adapter, probing present support against `surface`.
pub fn enumerate_candidates(
    instance: &ResourceHandle<Instance>,
    surface: &ResourceHandle<Surface>,
) -> EngineResult<Vec<PhysicalDeviceCandidate>> {
    let instance_fns = instance.handle();
    let devices = unsafe { instance_fns.enumerate_physical_devices() }
        .map_err(|e| EngineError::vulkan("vkEnumeratePhysicalDevices", e))?;

    let mut candidates = Vec::with_capacity(devices.len());
    for physical_device in devices {
        let props = unsafe { instance_fns.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance_fns.get_physical_device_memory_properties(physical_device) };
        let extensions = unsafe {
            instance_fns.enumerate_device_extension_properties(physical_device)
        }
        .map_err(|e| EngineError::vulkan("vkEnumerateDeviceExtensionProperties", e))?
        .iter()
        .map(|ext| {
            unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }
                .to_string_lossy()
                .into_owned()
        })
        .collect();

        let family_props =
            unsafe { instance_fns.get_physical_device_queue_family_properties(physical_device) };
        let mut queue_families = Vec::with_capacity(family_props.len());
        for (index, family) in family_props.iter().enumerate() {
            let index = index as u32;
            let present = surface.supports_present(physical_device, index)?;
            queue_families.push(QueueFamilyRecord {
                index,
                capabilities: QueueCapabilities::from_vk(family.queue_flags, present),
                queue_count: family.queue_count,
            });
        }

        let memory_heaps = memory_properties.memory_heaps
            [..memory_properties.memory_heap_count as usize]
            .iter()
            .map(|heap| MemoryHeap {
                size: heap.size,
                device_local: heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL),
            })
            .collect();

        candidates.push(PhysicalDeviceCandidate {
            handle: physical_device,
            name: unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
                .to_string_lossy()
                .into_owned(),
            device_type: props.device_type,
            api_version: props.api_version,
            memory_heaps,
            memory_properties,
            extensions,
            queue_families,
        });
    }

    Ok(candidates)
}

/// Choose the highest-scoring candidate that has every required extension and
/// a complete queue assignment.
pub fn pick_physical_device(
    candidates: Vec<PhysicalDeviceCandidate>,
    required_extensions: &[&str],
    weights: &QueueWeights,
) -> EngineResult<(PhysicalDeviceCandidate, QueueFamilyAssignment)> {
    let mut best: Option<((u64, vk::DeviceSize), PhysicalDeviceCandidate, QueueFamilyAssignment)> =
        None;

    for candidate in candidates {
        if let Some(missing) = required_extensions
            .iter()
            .find(|ext| !candidate.supports_extension(ext))
        {
            log::info!("Skipping {}: missing extension {}", candidate.name, missing);
            continue;
        }

        let assignment = match queue_family::solve(&candidate.queue_families, weights) {
            Ok(assignment) => assignment,
            Err(e) => {
                log::info!("Skipping {}: {}", candidate.name, e);
                continue;
            }
        };

        let score = (candidate.type_score(), candidate.device_local_bytes());
        if best.as_ref().map_or(true, |(best_score, _, _)| score > *best_score) {
            best = Some((score, candidate, assignment));
        }
    }

    best.map(|(_, candidate, assignment)| (candidate, assignment))
        .ok_or(EngineError::NoSuitableDevice)
}

// =============================================================================
// LOGICAL DEVICE
// =============================================================================

pub struct Device;

pub struct DeviceDescription {
    pub instance: Arc<ResourceHandle<Instance>>,
    pub physical: PhysicalDeviceCandidate,
    pub queues: QueueFamilyAssignment,
    pub extensions: Vec<CString>,
}

impl Creatable for Device {
    const KIND: ResourceKind = ResourceKind::Device;
    type Handle = ash::Device;
    type Description = DeviceDescription;

    unsafe fn create(description: &DeviceDescription) -> EngineResult<ash::Device> {
        let priorities: Vec<Vec<f32>> = description
            .queues
            .families()
            .iter()
            .map(|family| family.priorities())
            .collect();

        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = description
            .queues
            .families()
            .iter()
            .zip(&priorities)
            .map(|(family, priorities)| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family.family_index)
                    .queue_priorities(priorities)
                    .build()
            })
            .collect();

        let extensions: Vec<_> = description.extensions.iter().map(|ext| ext.as_ptr()).collect();
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        description
            .instance
            .handle()
            .create_device(description.physical.handle, &create_info, None)
            .map_err(|e| EngineError::creation(Self::KIND, e))
    }
}

impl Destroyable for Device {
    unsafe fn destroy(handle: &ash::Device, _description: &DeviceDescription) {
        handle.destroy_device(None);
    }
}

impl ResourceHandle<Device> {
    pub fn physical(&self) -> &PhysicalDeviceCandidate {
        &self.description().physical
    }

    pub fn queue_assignment(&self) -> &QueueFamilyAssignment {
        &self.description().queues
    }

    pub fn instance(&self) -> &Arc<ResourceHandle<Instance>> {
        &self.description().instance
    }

    pub fn swapchain_loader(&self) -> khr::Swapchain {
        khr::Swapchain::new(self.instance().handle(), self.handle())
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> EngineResult<()> {
        unsafe { self.handle().device_wait_idle() }
            .map_err(|e| EngineError::vulkan("vkDeviceWaitIdle", e))
    }
}

/// Queue handles for every role, fetched once after device creation.
#[derive(Debug, Clone, Copy)]
pub struct Queues {
    pub graphics: vk::Queue,
    pub compute: vk::Queue,
    pub transfer: vk::Queue,
    pub present: vk::Queue,
}

impl Queues {
    pub fn fetch(device: &ResourceHandle<Device>) -> Self {
        let assignment = device.queue_assignment();
        let queue = |role: QueueRole| {
            let slot = assignment.slot(role);
            unsafe {
                device
                    .handle()
                    .get_device_queue(slot.family_index, slot.queue_index)
            }
        };
        Self {
            graphics: queue(QueueRole::Graphics),
            compute: queue(QueueRole::Compute),
            transfer: queue(QueueRole::Transfer),
            present: queue(QueueRole::Present),
        }
    }
}
