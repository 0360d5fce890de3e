use ash::vk;
use glam::UVec2;

use crate::error::construction_error;
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::VulkanDevice;
use crate::resources::format::VulkanFormatUtils;
use tandem_gfx::GfxResult;
use tandem_gfx::backend::{FinalLayout, LoadOp, RenderPassDesc};
use tandem_gfx::resources::image_format::ImageFormat;

/// 单个 subpass 的 render pass：一个 colour attachment，可选一个 depth attachment
pub struct VulkanRenderPass {
    handle: vk::RenderPass,
    colour_format: ImageFormat,
    has_depth: bool,
}
// 创建与销毁
impl VulkanRenderPass {
    pub fn new(device: &VulkanDevice, desc: &RenderPassDesc) -> GfxResult<Self> {
        let _span = tracy_client::span!("VulkanRenderPass::new");

        let mut attachments = vec![Self::colour_attachment(desc)];
        if let Some(depth_format) = desc.depth_format {
            attachments.push(Self::depth_attachment(depth_format, desc.store_depth));
        }

        let colour_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&colour_refs);
        if desc.depth_format.is_some() {
            subpass = subpass.depth_stencil_attachment(&depth_ref);
        }

        let dependencies = Self::subpass_dependencies();
        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(&dependencies);

        let handle = unsafe { device.create_render_pass(&create_info, None) }
            .map_err(|e| construction_error(&format!("GfxRenderPass::{}", desc.name), e))?;

        let render_pass = Self {
            handle,
            colour_format: desc.colour_format,
            has_depth: desc.depth_format.is_some(),
        };
        device.set_debug_name(&render_pass, desc.name);
        Ok(render_pass)
    }

    #[inline]
    pub fn destroy(self, device: &VulkanDevice) {
        unsafe {
            device.destroy_render_pass(self.handle, None);
        }
    }
}
// 创建过程的辅助函数
impl VulkanRenderPass {
    /// - clear：之前的内容可以丢弃，从 UNDEFINED 开始
    /// - load：attachment 必须处于上一次 render pass 结束时的 layout
    pub fn colour_attachment(desc: &RenderPassDesc) -> vk::AttachmentDescription {
        let final_layout = Self::final_layout(desc.final_layout);
        let (load_op, initial_layout) = match desc.load {
            LoadOp::Clear => (vk::AttachmentLoadOp::CLEAR, vk::ImageLayout::UNDEFINED),
            LoadOp::Load => (vk::AttachmentLoadOp::LOAD, final_layout),
        };
        vk::AttachmentDescription::default()
            .format(VulkanFormatUtils::to_vk(desc.colour_format))
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(load_op)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(initial_layout)
            .final_layout(final_layout)
    }

    /// depth 每次都会 clear
    pub fn depth_attachment(format: ImageFormat, store: bool) -> vk::AttachmentDescription {
        vk::AttachmentDescription::default()
            .format(VulkanFormatUtils::to_vk(format))
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(if store { vk::AttachmentStoreOp::STORE } else { vk::AttachmentStoreOp::DONT_CARE })
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
    }

    #[inline]
    pub fn final_layout(layout: FinalLayout) -> vk::ImageLayout {
        match layout {
            FinalLayout::Present => vk::ImageLayout::PRESENT_SRC_KHR,
            FinalLayout::ShaderRead => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    /// 外部的读写（采样、transfer、acquire）与 attachment 写入之间的同步
    fn subpass_dependencies() -> [vk::SubpassDependency; 2] {
        [
            vk::SubpassDependency::default()
                .src_subpass(vk::SUBPASS_EXTERNAL)
                .dst_subpass(0)
                .src_stage_mask(
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                        | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS
                        | vk::PipelineStageFlags::FRAGMENT_SHADER
                        | vk::PipelineStageFlags::COMPUTE_SHADER
                        | vk::PipelineStageFlags::TRANSFER,
                )
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE | vk::AccessFlags::SHADER_WRITE)
                .dst_stage_mask(
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                )
                .dst_access_mask(
                    vk::AccessFlags::COLOR_ATTACHMENT_READ
                        | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                ),
            vk::SubpassDependency::default()
                .src_subpass(0)
                .dst_subpass(vk::SUBPASS_EXTERNAL)
                .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
                .dst_stage_mask(
                    vk::PipelineStageFlags::FRAGMENT_SHADER
                        | vk::PipelineStageFlags::COMPUTE_SHADER
                        | vk::PipelineStageFlags::TRANSFER,
                )
                .dst_access_mask(vk::AccessFlags::SHADER_READ | vk::AccessFlags::TRANSFER_READ),
        ]
    }
}
// getters
impl VulkanRenderPass {
    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.handle
    }

    #[inline]
    pub fn has_depth(&self) -> bool {
        self.has_depth
    }

    #[inline]
    pub fn colour_format(&self) -> ImageFormat {
        self.colour_format
    }
}
impl DebugType for VulkanRenderPass {
    fn debug_type_name() -> &'static str {
        "GfxRenderPass"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

pub struct VulkanFramebuffer {
    handle: vk::Framebuffer,
    extent: UVec2,
}
// 创建与销毁
impl VulkanFramebuffer {
    /// attachment 的顺序与 render pass 一致：colour 在前，depth 在后
    pub fn new(
        device: &VulkanDevice,
        render_pass: &VulkanRenderPass,
        colour_view: vk::ImageView,
        depth_view: Option<vk::ImageView>,
        extent: UVec2,
        name: &str,
    ) -> GfxResult<Self> {
        let attachments = std::iter::once(colour_view).chain(depth_view).collect::<Vec<_>>();
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.handle())
            .attachments(&attachments)
            .width(extent.x.max(1))
            .height(extent.y.max(1))
            .layers(1);

        let handle = unsafe { device.create_framebuffer(&create_info, None) }
            .map_err(|e| construction_error(&format!("GfxFramebuffer::{name}"), e))?;

        let framebuffer = Self { handle, extent };
        device.set_debug_name(&framebuffer, name);
        Ok(framebuffer)
    }

    #[inline]
    pub fn destroy(self, device: &VulkanDevice) {
        unsafe {
            device.destroy_framebuffer(self.handle, None);
        }
    }
}
// getters
impl VulkanFramebuffer {
    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.handle
    }

    #[inline]
    pub fn extent(&self) -> UVec2 {
        self.extent
    }
}
impl DebugType for VulkanFramebuffer {
    fn debug_type_name() -> &'static str {
        "GfxFramebuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(load: LoadOp, final_layout: FinalLayout) -> RenderPassDesc<'static> {
        RenderPassDesc {
            colour_format: ImageFormat::Bgra32,
            depth_format: Some(ImageFormat::Depth32F),
            load,
            final_layout,
            store_depth: false,
            name: "test",
        }
    }

    #[test]
    fn test_clear_starts_undefined() {
        let attachment = VulkanRenderPass::colour_attachment(&desc(LoadOp::Clear, FinalLayout::Present));
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachment.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(attachment.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn test_load_keeps_previous_layout() {
        let attachment = VulkanRenderPass::colour_attachment(&desc(LoadOp::Load, FinalLayout::ShaderRead));
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::LOAD);
        assert_eq!(attachment.initial_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(attachment.final_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_depth_attachment_store() {
        let discarded = VulkanRenderPass::depth_attachment(ImageFormat::Depth32F, false);
        assert_eq!(discarded.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(discarded.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(discarded.format, vk::Format::D32_SFLOAT);

        let stored = VulkanRenderPass::depth_attachment(ImageFormat::Depth16, true);
        assert_eq!(stored.store_op, vk::AttachmentStoreOp::STORE);
    }
}
