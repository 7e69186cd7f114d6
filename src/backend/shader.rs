// Shader module loading
//
// Vulkan uses SPIR-V bytecode for shaders. Compiled files are looked up by
// name against an ordered list of directories; the first match wins.

use ash::vk;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::device::Device;
use super::handle::{Creatable, Destroyable, ResourceHandle, ResourceKind};
use crate::error::{EngineError, EngineResult};

/// Find `name` in the first directory of `search_dirs` that contains it.
pub fn locate_shader<P: AsRef<Path>>(name: &str, search_dirs: &[P]) -> EngineResult<PathBuf> {
    search_dirs
        .iter()
        .map(|dir| dir.as_ref().join(name))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| EngineError::ShaderNotFound {
            name: name.to_string(),
            searched: search_dirs.iter().map(|dir| dir.as_ref().to_path_buf()).collect(),
        })
}

/// Read a SPIR-V file into aligned words.
pub fn load_spirv(path: &Path) -> EngineResult<Vec<u32>> {
    let io_error = |source| EngineError::ShaderIo {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(io_error)?;
    ash::util::read_spv(&mut file).map_err(io_error)
}

pub struct ShaderModule;

pub struct ShaderModuleDescription {
    pub device: Arc<ResourceHandle<Device>>,
    pub name: String,
    pub stage: vk::ShaderStageFlags,
    pub code: Vec<u32>,
}

impl ShaderModuleDescription {
    /// Locate and read `name`, ready for module creation.
    pub fn load<P: AsRef<Path>>(
        device: Arc<ResourceHandle<Device>>,
        name: &str,
        stage: vk::ShaderStageFlags,
        search_dirs: &[P],
    ) -> EngineResult<Self> {
        let path = locate_shader(name, search_dirs)?;
        log::info!("Loading {:?} shader from {:?}", stage, path);
        Ok(Self {
            device,
            name: name.to_string(),
            stage,
            code: load_spirv(&path)?,
        })
    }
}

impl Creatable for ShaderModule {
    const KIND: ResourceKind = ResourceKind::ShaderModule;
    type Handle = vk::ShaderModule;
    type Description = ShaderModuleDescription;

    unsafe fn create(description: &ShaderModuleDescription) -> EngineResult<vk::ShaderModule> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(&description.code);
        description
            .device
            .handle()
            .create_shader_module(&create_info, None)
            .map_err(|e| EngineError::creation(Self::KIND, e))
    }
}

impl Destroyable for ShaderModule {
    unsafe fn destroy(handle: &vk::ShaderModule, description: &ShaderModuleDescription) {
        description.device.handle().destroy_shader_module(*handle, None);
    }
}
