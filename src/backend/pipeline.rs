// Graphics pipeline creation and management
//
// The graphics pipeline defines how vertices are processed and rasterized.
// It includes: vertex input, shaders, rasterization, blending.
// Viewport and scissor are dynamic so the pipeline survives swapchain
// recreation; only the render pass depends on the surface format.

use ash::vk;
use std::ffi::CStr;
use std::sync::Arc;

use super::device::Device;
use super::handle::{Creatable, Destroyable, ResourceHandle, ResourceKind};
use super::shader::ShaderModule;
use super::swapchain::ImageView;
use crate::error::{EngineError, EngineResult};

const SHADER_ENTRY_POINT: &CStr = c"main";

pub struct RenderPass;

pub struct RenderPassDescription {
    pub device: Arc<ResourceHandle<Device>>,
    pub color_format: vk::Format,
}

impl Creatable for RenderPass {
    const KIND: ResourceKind = ResourceKind::RenderPass;
    type Handle = vk::RenderPass;
    type Description = RenderPassDescription;

    unsafe fn create(description: &RenderPassDescription) -> EngineResult<vk::RenderPass> {
        // Color attachment (the swapchain image)
        let color_attachment = vk::AttachmentDescription::builder()
            .format(description.color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .build();

        let color_attachment_ref = vk::AttachmentReference::builder()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .build();

        let color_attachments = &[color_attachment_ref];
        let subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(color_attachments)
            .build();

        // The acquire semaphore is waited on at COLOR_ATTACHMENT_OUTPUT, so
        // the layout transition has to happen at that stage too.
        let dependency = vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .build();

        let attachments = &[color_attachment];
        let subpasses = &[subpass];
        let dependencies = &[dependency];

        let render_pass_info = vk::RenderPassCreateInfo::builder()
            .attachments(attachments)
            .subpasses(subpasses)
            .dependencies(dependencies);

        description
            .device
            .handle()
            .create_render_pass(&render_pass_info, None)
            .map_err(|e| EngineError::creation(Self::KIND, e))
    }
}

impl Destroyable for RenderPass {
    unsafe fn destroy(handle: &vk::RenderPass, description: &RenderPassDescription) {
        description.device.handle().destroy_render_pass(*handle, None);
    }
}

pub struct PipelineLayout;

pub struct PipelineLayoutDescription {
    pub device: Arc<ResourceHandle<Device>>,
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
}

impl Creatable for PipelineLayout {
    const KIND: ResourceKind = ResourceKind::PipelineLayout;
    type Handle = vk::PipelineLayout;
    type Description = PipelineLayoutDescription;

    unsafe fn create(description: &PipelineLayoutDescription) -> EngineResult<vk::PipelineLayout> {
        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .push_constant_ranges(&description.push_constant_ranges);
        description
            .device
            .handle()
            .create_pipeline_layout(&layout_info, None)
            .map_err(|e| EngineError::creation(Self::KIND, e))
    }
}

impl Destroyable for PipelineLayout {
    unsafe fn destroy(handle: &vk::PipelineLayout, description: &PipelineLayoutDescription) {
        description.device.handle().destroy_pipeline_layout(*handle, None);
    }
}

/// Vertex input bindings and attributes fed to the pipeline.
#[derive(Debug, Clone, Default)]
pub struct VertexLayout {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl VertexLayout {
    /// One interleaved per-vertex binding with tightly packed attributes,
    /// at consecutive locations starting from 0.
    pub fn interleaved(formats: &[(vk::Format, u32)]) -> Self {
        let mut offset = 0;
        let attributes = formats
            .iter()
            .enumerate()
            .map(|(location, &(format, size))| {
                let attribute = vk::VertexInputAttributeDescription {
                    location: location as u32,
                    binding: 0,
                    format,
                    offset,
                };
                offset += size;
                attribute
            })
            .collect::<Vec<_>>();

        let bindings = if attributes.is_empty() {
            Vec::new()
        } else {
            vec![vk::VertexInputBindingDescription {
                binding: 0,
                stride: offset,
                input_rate: vk::VertexInputRate::VERTEX,
            }]
        };

        Self {
            bindings,
            attributes,
        }
    }

    pub fn stride(&self) -> u32 {
        self.bindings.first().map_or(0, |binding| binding.stride)
    }
}

pub struct GraphicsPipeline;

pub struct GraphicsPipelineDescription {
    pub device: Arc<ResourceHandle<Device>>,
    pub layout: Arc<ResourceHandle<PipelineLayout>>,
    pub render_pass: Arc<ResourceHandle<RenderPass>>,
    pub vertex_shader: Arc<ResourceHandle<ShaderModule>>,
    pub fragment_shader: Arc<ResourceHandle<ShaderModule>>,
    pub vertex_layout: VertexLayout,
}

impl Creatable for GraphicsPipeline {
    const KIND: ResourceKind = ResourceKind::GraphicsPipeline;
    type Handle = vk::Pipeline;
    type Description = GraphicsPipelineDescription;

    unsafe fn create(description: &GraphicsPipelineDescription) -> EngineResult<vk::Pipeline> {
        let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(description.vertex_shader.raw())
            .name(SHADER_ENTRY_POINT)
            .build();

        let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(description.fragment_shader.raw())
            .name(SHADER_ENTRY_POINT)
            .build();

        let shader_stages = &[vert_stage, frag_stage];

        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&description.vertex_layout.bindings)
            .vertex_attribute_descriptions(&description.vertex_layout.attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Counts only; the actual rectangles are set while recording.
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        // Color blending (no blending, opaque)
        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build();

        let color_blend_attachments = &[color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(color_blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(description.layout.raw())
            .render_pass(description.render_pass.raw())
            .subpass(0)
            .build();

        let pipelines = description
            .device
            .handle()
            .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
            .map_err(|(_, e)| EngineError::creation(Self::KIND, e))?;

        pipelines
            .into_iter()
            .next()
            .ok_or(EngineError::creation(Self::KIND, vk::Result::ERROR_UNKNOWN))
    }
}

impl Destroyable for GraphicsPipeline {
    unsafe fn destroy(handle: &vk::Pipeline, description: &GraphicsPipelineDescription) {
        description.device.handle().destroy_pipeline(*handle, None);
    }
}

pub struct Framebuffer;

pub struct FramebufferDescription {
    pub render_pass: Arc<ResourceHandle<RenderPass>>,
    pub attachments: Vec<Arc<ResourceHandle<ImageView>>>,
    pub extent: vk::Extent2D,
}

impl FramebufferDescription {
    fn device(&self) -> &ash::Device {
        self.render_pass.description().device.handle()
    }
}

impl Creatable for Framebuffer {
    const KIND: ResourceKind = ResourceKind::Framebuffer;
    type Handle = vk::Framebuffer;
    type Description = FramebufferDescription;

    unsafe fn create(description: &FramebufferDescription) -> EngineResult<vk::Framebuffer> {
        let attachments = description
            .attachments
            .iter()
            .map(|view| view.raw())
            .collect::<Vec<_>>();
        let framebuffer_info = vk::FramebufferCreateInfo::builder()
            .render_pass(description.render_pass.raw())
            .attachments(&attachments)
            .width(description.extent.width)
            .height(description.extent.height)
            .layers(1);

        description
            .device()
            .create_framebuffer(&framebuffer_info, None)
            .map_err(|e| EngineError::creation(Self::KIND, e))
    }
}

impl Destroyable for Framebuffer {
    unsafe fn destroy(handle: &vk::Framebuffer, description: &FramebufferDescription) {
        description.device().destroy_framebuffer(*handle, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleaved_layout_packs_attributes() {
        let layout = VertexLayout::interleaved(&[
            (vk::Format::R32G32_SFLOAT, 8),
            (vk::Format::R32G32B32_SFLOAT, 12),
        ]);

        assert_eq!(layout.stride(), 20);
        assert_eq!(layout.bindings.len(), 1);
        assert_eq!(layout.attributes.len(), 2);
        assert_eq!(layout.attributes[0].offset, 0);
        assert_eq!(layout.attributes[1].offset, 8);
        assert_eq!(layout.attributes[1].location, 1);
        assert_eq!(layout.attributes[1].format, vk::Format::R32G32B32_SFLOAT);
    }

    #[test]
    fn empty_layout_has_no_binding() {
        let layout = VertexLayout::interleaved(&[]);
        assert!(layout.bindings.is_empty());
        assert_eq!(layout.stride(), 0);
    }
}
