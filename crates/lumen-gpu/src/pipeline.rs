//! Graphics pipeline creation.

use crate::error::{GpuError, Result};
use crate::render_pass::RenderPass;
use ash::vk;
use std::sync::Arc;

/// The shader stages a pipeline program may provide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader (required).
    Vertex,
    /// Fragment shader (required).
    Fragment,
    /// Tessellation control shader.
    TessellationControl,
    /// Tessellation evaluation shader.
    TessellationEvaluation,
    /// Geometry shader.
    Geometry,
}

impl ShaderStage {
    /// Map a bytecode file stem to its stage, following the
    /// stage-keyword-to-filename convention.
    #[must_use]
    pub fn from_stem(stem: &str) -> Option<Self> {
        match stem {
            "vert" => Some(Self::Vertex),
            "frag" => Some(Self::Fragment),
            "tesc" => Some(Self::TessellationControl),
            "tese" => Some(Self::TessellationEvaluation),
            "geom" => Some(Self::Geometry),
            _ => None,
        }
    }

    /// The Vulkan stage flag for this stage.
    #[must_use]
    pub const fn flags(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
            Self::TessellationControl => vk::ShaderStageFlags::TESSELLATION_CONTROL,
            Self::TessellationEvaluation => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
            Self::Geometry => vk::ShaderStageFlags::GEOMETRY,
        }
    }
}

/// A pipeline layout, destroyed on drop.
pub struct PipelineLayout {
    device: Arc<ash::Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Create a pipeline layout from set layouts and push-constant ranges.
    pub fn new(
        device: &Arc<ash::Device>,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe {
            device
                .create_pipeline_layout(&create_info, None)
                .map_err(|e| GpuError::PipelineCreation(e.to_string()))?
        };

        Ok(Self {
            device: device.clone(),
            layout,
        })
    }

    /// Get the raw layout handle.
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Inputs for building a graphics pipeline.
pub struct GraphicsPipelineDesc {
    /// SPIR-V words per provided stage.
    pub stages: Vec<(ShaderStage, Vec<u32>)>,
    /// Vertex buffer bindings.
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    /// Vertex attribute descriptions.
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    /// Fixed viewport/scissor extent.
    pub extent: vk::Extent2D,
}

/// A graphics pipeline, destroyed on drop.
pub struct GraphicsPipeline {
    device: Arc<ash::Device>,
    pipeline: vk::Pipeline,
}

impl GraphicsPipeline {
    /// Build a graphics pipeline against the given render pass and layout.
    ///
    /// The fixed-function state is the renderer's single configuration:
    /// triangle lists, back-face culling, a Y-flipped viewport covering the
    /// full extent, standard alpha blending, and LESS depth testing.
    pub fn new(
        device: &Arc<ash::Device>,
        render_pass: &RenderPass,
        layout: &PipelineLayout,
        desc: &GraphicsPipelineDesc,
    ) -> Result<Self> {
        let mut modules = Vec::with_capacity(desc.stages.len());
        for (stage, code) in &desc.stages {
            let module_info = vk::ShaderModuleCreateInfo::default().code(code);
            match unsafe { device.create_shader_module(&module_info, None) } {
                Ok(module) => modules.push((stage.flags(), module)),
                Err(e) => {
                    destroy_modules(device, &modules);
                    return Err(GpuError::ShaderCompilation(format!("{stage:?}: {e}")));
                }
            }
        }

        let stage_infos: Vec<vk::PipelineShaderStageCreateInfo> = modules
            .iter()
            .map(|&(flags, module)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(flags)
                    .module(module)
                    .name(c"main")
            })
            .collect();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&desc.vertex_bindings)
            .vertex_attribute_descriptions(&desc.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Y-flipped viewport so world space stays right-handed with +Y up
        let viewport = vk::Viewport {
            x: 0.0,
            y: desc.extent.height as f32,
            width: desc.extent.width as f32,
            height: -(desc.extent.height as f32),
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: desc.extent,
        };
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(std::slice::from_ref(&viewport))
            .scissors(std::slice::from_ref(&scissor));

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false)
            .line_width(1.0);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS);

        let blend_attachment = vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
            .color_write_mask(vk::ColorComponentFlags::RGBA);
        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .attachments(std::slice::from_ref(&blend_attachment));

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stage_infos)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .layout(layout.handle())
            .render_pass(render_pass.handle())
            .subpass(0);

        let result = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
        };

        destroy_modules(device, &modules);

        let pipelines =
            result.map_err(|(_, e)| GpuError::PipelineCreation(e.to_string()))?;

        Ok(Self {
            device: device.clone(),
            pipeline: pipelines[0],
        })
    }

    /// Get the raw pipeline handle.
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
    }
}

/// Shader modules are only needed during pipeline construction.
fn destroy_modules(device: &ash::Device, modules: &[(vk::ShaderStageFlags, vk::ShaderModule)]) {
    for &(_, module) in modules {
        unsafe {
            device.destroy_shader_module(module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_stems_follow_naming_convention() {
        assert_eq!(ShaderStage::from_stem("vert"), Some(ShaderStage::Vertex));
        assert_eq!(ShaderStage::from_stem("frag"), Some(ShaderStage::Fragment));
        assert_eq!(
            ShaderStage::from_stem("tesc"),
            Some(ShaderStage::TessellationControl)
        );
        assert_eq!(
            ShaderStage::from_stem("tese"),
            Some(ShaderStage::TessellationEvaluation)
        );
        assert_eq!(ShaderStage::from_stem("geom"), Some(ShaderStage::Geometry));
        assert_eq!(ShaderStage::from_stem("comp"), None);
    }
}
