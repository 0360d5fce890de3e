use glam::UVec2;
use glow::HasContext;

use crate::error::construction_error;
use crate::foundation::debug_output::{GlDebugOutput, GlDebugType};
use crate::resources::format::GlFormatUtils;
use crate::resources::image::GlImage;
use tandem_gfx::GfxResult;
use tandem_gfx::backend::{ImageComponent, LoadOp, RenderPassDesc};
use tandem_gfx::resources::image_format::ImageFormat;

/// GL 没有 render pass 对象，只记录开始时需要 clear 哪些 attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlRenderPass {
    colour_format: ImageFormat,
    clear_colour: bool,
    has_depth: bool,
}
impl GlRenderPass {
    pub fn new(desc: &RenderPassDesc) -> Self {
        Self {
            colour_format: desc.colour_format,
            clear_colour: desc.load == LoadOp::Clear,
            has_depth: desc.depth_format.is_some(),
        }
    }

    #[inline]
    pub fn colour_format(&self) -> ImageFormat {
        self.colour_format
    }

    #[inline]
    pub fn clears_colour(&self) -> bool {
        self.clear_colour
    }

    /// depth 每次都会 clear
    #[inline]
    pub fn has_depth(&self) -> bool {
        self.has_depth
    }
}

/// `handle` 为 None 时表示窗口的 default framebuffer
pub struct GlFramebuffer {
    handle: Option<glow::NativeFramebuffer>,
    extent: UVec2,
}
// 创建与销毁
impl GlFramebuffer {
    /// default framebuffer 的 depth 由窗口系统提供
    pub fn default_framebuffer(extent: UVec2) -> Self {
        Self { handle: None, extent }
    }

    pub fn new(
        gl: &glow::Context,
        colour: &GlImage,
        depth: Option<&GlImage>,
        extent: UVec2,
        name: &str,
    ) -> GfxResult<Self> {
        let object_name = format!("{}::{name}", Self::debug_type_name());
        let handle = unsafe { gl.create_framebuffer() }.map_err(|e| construction_error(&object_name, e))?;

        let status = unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(handle));
            gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(colour.texture()),
                0,
            );
            if let Some(depth) = depth {
                gl.framebuffer_texture_2d(
                    glow::FRAMEBUFFER,
                    GlFormatUtils::attachment(depth.format()),
                    glow::TEXTURE_2D,
                    Some(depth.texture()),
                    0,
                );
            }
            gl.draw_buffers(&[glow::COLOR_ATTACHMENT0]);
            let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            status
        };
        if status != glow::FRAMEBUFFER_COMPLETE {
            unsafe { gl.delete_framebuffer(handle) };
            return Err(construction_error(&object_name, format!("framebuffer incomplete: {status:#x}")));
        }

        let framebuffer = Self {
            handle: Some(handle),
            extent,
        };
        GlDebugOutput::set_debug_name(gl, &framebuffer, name);
        Ok(framebuffer)
    }

    pub fn destroy(self, gl: &glow::Context) {
        if let Some(handle) = self.handle {
            unsafe { gl.delete_framebuffer(handle) };
        }
    }
}
// getters
impl GlFramebuffer {
    #[inline]
    pub fn handle(&self) -> Option<glow::NativeFramebuffer> {
        self.handle
    }

    #[inline]
    pub fn extent(&self) -> UVec2 {
        self.extent
    }
}
impl GlDebugType for GlFramebuffer {
    fn debug_type_name() -> &'static str {
        "GfxFramebuffer"
    }

    fn gl_identifier() -> u32 {
        glow::FRAMEBUFFER
    }

    fn gl_name(&self) -> u32 {
        self.handle.map_or(0, |h| h.0.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_gfx::backend::FinalLayout;

    #[test]
    fn test_render_pass_load_op() {
        let mut desc = RenderPassDesc {
            colour_format: ImageFormat::Rgba32,
            depth_format: None,
            load: LoadOp::Clear,
            final_layout: FinalLayout::Present,
            store_depth: false,
            name: "test",
        };
        let clear = GlRenderPass::new(&desc);
        assert!(clear.clears_colour());
        assert!(!clear.has_depth());

        desc.load = LoadOp::Load;
        desc.depth_format = Some(ImageFormat::Depth32F);
        let load = GlRenderPass::new(&desc);
        assert!(!load.clears_colour());
        assert!(load.has_depth());
    }

    #[test]
    fn test_default_framebuffer() {
        let framebuffer = GlFramebuffer::default_framebuffer(UVec2::new(800, 600));
        assert!(framebuffer.handle().is_none());
        assert_eq!(framebuffer.extent(), UVec2::new(800, 600));
    }
}
