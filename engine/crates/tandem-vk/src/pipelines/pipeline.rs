use ash::vk;
use itertools::Itertools;

use crate::error::construction_error;
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::VulkanDevice;
use crate::pipelines::render_pass::VulkanRenderPass;
use crate::pipelines::shader::VulkanShaderModule;
use crate::resources::descriptors::VulkanBindings;
use crate::vulkan_backend::VulkanBackend;
use tandem_gfx::backend::PipelineDesc;
use tandem_gfx::renderer::shader::{ShaderKind, ShaderStage};
use tandem_gfx::{GfxError, GfxResult};

/// 三角形 patch 的控制点数量
const PATCH_CONTROL_POINTS: u32 = 3;

/// pipeline 以及它独占的 pipeline layout
pub struct VulkanPipeline {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    bind_point: vk::PipelineBindPoint,
}
// 创建与销毁
impl VulkanPipeline {
    pub fn new(device: &VulkanDevice, desc: &PipelineDesc<'_, VulkanBackend>) -> GfxResult<Self> {
        let _span = tracy_client::span!("VulkanPipeline::new");
        let object_name = format!("{}::{}", Self::debug_type_name(), desc.name);

        let layout = Self::create_layout(device, desc.bindings, desc.name)?;

        // shader module 只在创建 pipeline 期间需要
        let mut modules = Vec::new();
        for (stage, code) in desc.shader.stages() {
            match VulkanShaderModule::new(device, stage, code, desc.name) {
                Ok(module) => modules.push(module),
                Err(e) => {
                    modules.into_iter().for_each(|m| m.destroy(device));
                    unsafe { device.destroy_pipeline_layout(layout, None) };
                    return Err(e);
                }
            }
        }

        let result = match desc.kind {
            ShaderKind::Compute => Self::create_compute(device, &modules, layout),
            ShaderKind::Graphics => desc
                .render_pass
                .ok_or_else(|| GfxError::construction(&object_name, "graphics pipeline requires a render pass"))
                .and_then(|render_pass| {
                    let has_tessellation = desc.shader.has_shader(ShaderStage::TessellationControl)
                        || desc.shader.has_shader(ShaderStage::TessellationEvaluation);
                    Self::create_graphics(device, desc, &modules, layout, render_pass, has_tessellation)
                }),
        };
        modules.into_iter().for_each(|m| m.destroy(device));

        let pipeline = match result {
            Ok(pipeline) => pipeline,
            Err(e) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(match e {
                    GfxError::ConstructionFailure { .. } | GfxError::DeviceLost(_) => e,
                    other => GfxError::construction(&object_name, other),
                });
            }
        };

        let pipeline = Self {
            pipeline,
            layout,
            bind_point: match desc.kind {
                ShaderKind::Graphics => vk::PipelineBindPoint::GRAPHICS,
                ShaderKind::Compute => vk::PipelineBindPoint::COMPUTE,
            },
        };
        device.set_debug_name(&pipeline, desc.name);
        device.set_object_debug_name(layout, format!("GfxPipelineLayout::{}", desc.name));
        Ok(pipeline)
    }

    fn create_layout(
        device: &VulkanDevice,
        bindings: Option<&VulkanBindings>,
        name: &str,
    ) -> GfxResult<vk::PipelineLayout> {
        let set_layouts = bindings.map(|b| b.set_layout()).into_iter().collect_vec();
        let create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        unsafe { device.create_pipeline_layout(&create_info, None) }
            .map_err(|e| construction_error(&format!("GfxPipelineLayout::{name}"), e))
    }

    fn create_compute(
        device: &VulkanDevice,
        modules: &[VulkanShaderModule],
        layout: vk::PipelineLayout,
    ) -> GfxResult<vk::Pipeline> {
        let Some(module) = modules.first() else {
            return Err(GfxError::construction("GfxComputePipeline", "missing compute shader"));
        };
        let create_info = vk::ComputePipelineCreateInfo::default().stage(module.stage_info()).layout(layout);
        let pipelines = unsafe {
            device.create_compute_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&create_info), None)
        }
        .map_err(|(_, e)| construction_error("GfxComputePipeline", e))?;
        pipelines.first().copied().ok_or_else(|| GfxError::construction("GfxComputePipeline", "no pipeline created"))
    }

    fn create_graphics(
        device: &VulkanDevice,
        desc: &PipelineDesc<'_, VulkanBackend>,
        modules: &[VulkanShaderModule],
        layout: vk::PipelineLayout,
        render_pass: &VulkanRenderPass,
        has_tessellation: bool,
    ) -> GfxResult<vk::Pipeline> {
        let shader_stages_info = modules.iter().map(|m| m.stage_info()).collect_vec();

        // 顶点数据都从 storage buffer 中读取，没有 vertex input
        let vertex_input_state_info = vk::PipelineVertexInputStateCreateInfo::default();
        let input_assembly_info = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(Self::topology(has_tessellation))
            .primitive_restart_enable(false);
        let tessellation_info =
            vk::PipelineTessellationStateCreateInfo::default().patch_control_points(PATCH_CONTROL_POINTS);

        // viewport 和 scissor 具体值由 dynamic 决定，但是数量由该 create info 决定
        let viewport_info = vk::PipelineViewportStateCreateInfo {
            viewport_count: 1,
            scissor_count: 1,
            ..Default::default()
        };

        let rasterize_state_info = Self::rasterization_state(desc.wireframe);
        let msaa_info =
            vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let colour_blend_states = [Self::colour_blend_state(desc.alpha_blending)];
        let colour_blend_info = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&colour_blend_states);

        let depth_stencil_info = Self::depth_stencil_state(desc.depth_test && render_pass.has_depth());

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state_info = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let mut pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages_info)
            .vertex_input_state(&vertex_input_state_info)
            .input_assembly_state(&input_assembly_info)
            .viewport_state(&viewport_info)
            .rasterization_state(&rasterize_state_info)
            .multisample_state(&msaa_info)
            .color_blend_state(&colour_blend_info)
            .depth_stencil_state(&depth_stencil_info)
            .dynamic_state(&dynamic_state_info)
            .layout(layout)
            .render_pass(render_pass.handle())
            .subpass(0);
        if has_tessellation {
            pipeline_info = pipeline_info.tessellation_state(&tessellation_info);
        }

        let pipelines = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_info), None)
        }
        .map_err(|(_, e)| construction_error(&format!("GfxGraphicsPipeline::{}", desc.name), e))?;
        pipelines.first().copied().ok_or_else(|| {
            GfxError::construction(format!("GfxGraphicsPipeline::{}", desc.name), "no pipeline created")
        })
    }

    pub fn destroy(self, device: &VulkanDevice) {
        unsafe {
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.layout, None);
        }
    }
}
// pipeline state
impl VulkanPipeline {
    #[inline]
    pub fn topology(has_tessellation: bool) -> vk::PrimitiveTopology {
        if has_tessellation { vk::PrimitiveTopology::PATCH_LIST } else { vk::PrimitiveTopology::TRIANGLE_LIST }
    }

    /// 不做背面剔除，按照 OpenGL 的传统将 CCW 视为 front face
    pub fn rasterization_state(wireframe: bool) -> vk::PipelineRasterizationStateCreateInfo<'static> {
        vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(if wireframe { vk::PolygonMode::LINE } else { vk::PolygonMode::FILL })
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false)
    }

    pub fn colour_blend_state(alpha_blending: bool) -> vk::PipelineColorBlendAttachmentState {
        let state = vk::PipelineColorBlendAttachmentState::default().color_write_mask(vk::ColorComponentFlags::RGBA);
        if !alpha_blending {
            return state.blend_enable(false);
        }
        state
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .alpha_blend_op(vk::BlendOp::ADD)
    }

    pub fn depth_stencil_state(depth_test: bool) -> vk::PipelineDepthStencilStateCreateInfo<'static> {
        vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(depth_test)
            .depth_write_enable(depth_test)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false)
    }
}
// getters
impl VulkanPipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    #[inline]
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        self.bind_point
    }
}
impl DebugType for VulkanPipeline {
    fn debug_type_name() -> &'static str {
        "GfxPipeline"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology() {
        assert_eq!(VulkanPipeline::topology(false), vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(VulkanPipeline::topology(true), vk::PrimitiveTopology::PATCH_LIST);
    }

    #[test]
    fn test_wireframe_rasterization() {
        assert_eq!(VulkanPipeline::rasterization_state(true).polygon_mode, vk::PolygonMode::LINE);
        assert_eq!(VulkanPipeline::rasterization_state(false).polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(VulkanPipeline::rasterization_state(false).cull_mode, vk::CullModeFlags::NONE);
    }

    #[test]
    fn test_alpha_blending() {
        let blended = VulkanPipeline::colour_blend_state(true);
        assert_eq!(blended.blend_enable, vk::TRUE);
        assert_eq!(blended.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(blended.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);

        let opaque = VulkanPipeline::colour_blend_state(false);
        assert_eq!(opaque.blend_enable, vk::FALSE);
        assert_eq!(opaque.color_write_mask, vk::ColorComponentFlags::RGBA);
    }

    #[test]
    fn test_depth_state() {
        let state = VulkanPipeline::depth_stencil_state(true);
        assert_eq!(state.depth_test_enable, vk::TRUE);
        assert_eq!(state.depth_write_enable, vk::TRUE);
        assert_eq!(VulkanPipeline::depth_stencil_state(false).depth_test_enable, vk::FALSE);
    }
}
