// Buffer utilities for vertex, index, and uniform buffers
//
// Provides helpers for creating GPU-accessible memory buffers

use ash::vk;
use std::sync::Arc;

use super::device::Device;
use super::handle::{Creatable, Destroyable, NativeHandle, ResourceHandle, ResourceKind};
use crate::error::{EngineError, EngineResult};

/// Find a memory type index allowed by `requirements` whose flags include `required`.
pub fn find_memory_type(
    required: vk::MemoryPropertyFlags,
    requirements: &vk::MemoryRequirements,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
) -> EngineResult<u32> {
    let type_bits = requirements.memory_type_bits;
    let count = memory_properties.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32);

    (0..count)
        .find(|&i| {
            let has_type = (type_bits & (1 << i)) != 0;
            let has_properties = memory_properties.memory_types[i as usize]
                .property_flags
                .contains(required);
            has_type && has_properties
        })
        .ok_or(EngineError::NoSuitableMemoryType {
            required,
            type_bits,
        })
}

/// Host writes to non-coherent memory only become visible after a flush.
fn needs_flush(memory_flags: vk::MemoryPropertyFlags) -> bool {
    !memory_flags.contains(vk::MemoryPropertyFlags::HOST_COHERENT)
}

/// A buffer and the memory bound to it.
#[derive(Debug, Clone, Copy)]
pub struct BufferAllocation {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
}

impl NativeHandle for BufferAllocation {
    fn is_null(&self) -> bool {
        vk::Handle::as_raw(self.buffer) == 0 || vk::Handle::as_raw(self.memory) == 0
    }
}

pub struct Buffer;

pub struct BufferDescription {
    pub device: Arc<ResourceHandle<Device>>,
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub memory_flags: vk::MemoryPropertyFlags,
}

impl Creatable for Buffer {
    const KIND: ResourceKind = ResourceKind::Buffer;
    type Handle = BufferAllocation;
    type Description = BufferDescription;

    unsafe fn create(description: &BufferDescription) -> EngineResult<BufferAllocation> {
        let device = description.device.handle();
        let fail = |e| EngineError::creation(Self::KIND, e);

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(description.size)
            .usage(description.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = device.create_buffer(&buffer_info, None).map_err(fail)?;

        let requirements = device.get_buffer_memory_requirements(buffer);
        let memory_type_index = match find_memory_type(
            description.memory_flags,
            &requirements,
            &description.device.physical().memory_properties,
        ) {
            Ok(index) => index,
            Err(e) => {
                device.destroy_buffer(buffer, None);
                return Err(e);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        let memory = match device.allocate_memory(&alloc_info, None) {
            Ok(memory) => memory,
            Err(e) => {
                device.destroy_buffer(buffer, None);
                return Err(fail(e));
            }
        };

        if let Err(e) = device.bind_buffer_memory(buffer, memory, 0) {
            device.destroy_buffer(buffer, None);
            device.free_memory(memory, None);
            return Err(fail(e));
        }

        Ok(BufferAllocation {
            buffer,
            memory,
            size: description.size,
        })
    }
}

impl Destroyable for Buffer {
    unsafe fn destroy(handle: &BufferAllocation, description: &BufferDescription) {
        let device = description.device.handle();
        device.destroy_buffer(handle.buffer, None);
        device.free_memory(handle.memory, None);
    }
}

impl ResourceHandle<Buffer> {
    pub fn buffer(&self) -> vk::Buffer {
        self.handle().buffer
    }

    /// Copy `data` into a host-visible buffer.
    pub fn write<T: Copy>(&self, data: &[T]) -> EngineResult<()> {
        let description = self.description();
        if !description
            .memory_flags
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
        {
            log::warn!("Ignoring write to a buffer that is not host visible");
            return Ok(());
        }

        let element_size = std::mem::size_of::<T>() as vk::DeviceSize;
        if element_size == 0 {
            return Ok(());
        }
        let capacity = self.handle().size / element_size;
        let count = (data.len() as vk::DeviceSize).min(capacity) as usize;
        if count < data.len() {
            log::warn!(
                "Write of {} elements truncated to {} to fit the buffer",
                data.len(),
                count
            );
        }
        if count == 0 {
            return Ok(());
        }
        let size = count as vk::DeviceSize * element_size;

        let device = description.device.handle();
        unsafe {
            let ptr = device
                .map_memory(self.handle().memory, 0, size, vk::MemoryMapFlags::empty())
                .map_err(|e| EngineError::vulkan("vkMapMemory", e))? as *mut T;
            ptr.copy_from_nonoverlapping(data.as_ptr(), count);
            let flushed = if needs_flush(description.memory_flags) {
                let range = vk::MappedMemoryRange::builder()
                    .memory(self.handle().memory)
                    .offset(0)
                    .size(vk::WHOLE_SIZE)
                    .build();
                device
                    .flush_mapped_memory_ranges(&[range])
                    .map_err(|e| EngineError::vulkan("vkFlushMappedMemoryRanges", e))
            } else {
                Ok(())
            };
            // Unmapped whether or not the flush went through.
            device.unmap_memory(self.handle().memory);
            flushed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, flags) in types.iter().enumerate() {
            props.memory_types[i] = vk::MemoryType {
                property_flags: *flags,
                heap_index: 0,
            };
        }
        props
    }

    fn requirements(type_bits: u32) -> vk::MemoryRequirements {
        vk::MemoryRequirements {
            size: 256,
            alignment: 16,
            memory_type_bits: type_bits,
        }
    }

    #[test]
    fn picks_first_allowed_type_with_superset_flags() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        let wanted = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        assert_eq!(find_memory_type(wanted, &requirements(0b111), &props).unwrap(), 2);
        assert_eq!(
            find_memory_type(vk::MemoryPropertyFlags::HOST_VISIBLE, &requirements(0b111), &props)
                .unwrap(),
            1
        );
    }

    #[test]
    fn type_bits_exclude_otherwise_matching_types() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE,
        ]);
        let index =
            find_memory_type(vk::MemoryPropertyFlags::DEVICE_LOCAL, &requirements(0b10), &props)
                .unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn no_match_reports_no_suitable_memory_type() {
        let props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        match find_memory_type(vk::MemoryPropertyFlags::HOST_VISIBLE, &requirements(0b1), &props) {
            Err(EngineError::NoSuitableMemoryType {
                required,
                type_bits,
            }) => {
                assert_eq!(required, vk::MemoryPropertyFlags::HOST_VISIBLE);
                assert_eq!(type_bits, 0b1);
            }
            other => panic!("expected NoSuitableMemoryType, got {other:?}"),
        }
    }

    #[test]
    fn only_non_coherent_memory_is_flushed() {
        assert!(needs_flush(vk::MemoryPropertyFlags::HOST_VISIBLE));
        assert!(!needs_flush(
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        ));
    }

    #[test]
    fn bits_beyond_the_type_count_are_ignored() {
        let props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        assert!(find_memory_type(
            vk::MemoryPropertyFlags::empty(),
            &requirements(0b10),
            &props
        )
        .is_err());
    }
}
