use glam::{UVec2, UVec3, Vec4};

use crate::pipelines::pipeline::GlPipelineState;
use crate::pipelines::render_pass::GlRenderPass;

/// render pass 开始时需要 clear 的内容
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlClear {
    pub colour: Option<[f32; 4]>,
    pub depth: bool,
}

impl GlClear {
    /// 只有 load op 为 clear 的 render pass 才会 clear colour，没有指定颜色时使用全 0
    pub fn new(render_pass: &GlRenderPass, clear_colour: Option<Vec4>) -> Self {
        Self {
            colour: render_pass
                .clears_colour()
                .then(|| clear_colour.unwrap_or(Vec4::ZERO).to_array()),
            depth: render_pass.has_depth(),
        }
    }
}

/// 录制时已经解析成 GL 对象的命令，在提交时按顺序重放
///
/// descriptor set 只记录下标，提交时再读取最新的 binding 表
#[derive(Debug, Clone, PartialEq)]
pub enum GlOp {
    PushGroup(String),
    PopGroup,
    BeginPass {
        framebuffer: Option<glow::NativeFramebuffer>,
        extent: UVec2,
        clear: GlClear,
    },
    EndPass,
    UsePipeline {
        program: glow::NativeProgram,
        state: GlPipelineState,
    },
    BindSet(usize),
    Viewport(UVec2),
    Scissor {
        offset: UVec2,
        extent: UVec2,
    },
    BindIndexBuffer(glow::NativeBuffer),
    Draw {
        vertex_count: u32,
    },
    DrawIndexed {
        index_count: u32,
    },
    DrawIndirect {
        buffer: glow::NativeBuffer,
        draw_count: u32,
        stride: u32,
    },
    DrawIndexedIndirect {
        buffer: glow::NativeBuffer,
        draw_count: u32,
        stride: u32,
    },
    Dispatch(UVec3),
}

impl GlOp {
    #[inline]
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            Self::Draw { .. } | Self::DrawIndexed { .. } | Self::DrawIndirect { .. } | Self::DrawIndexedIndirect { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_gfx::backend::{FinalLayout, LoadOp, RenderPassDesc};
    use tandem_gfx::resources::image_format::ImageFormat;

    fn render_pass(load: LoadOp, depth: bool) -> GlRenderPass {
        GlRenderPass::new(&RenderPassDesc {
            colour_format: ImageFormat::Rgba32,
            depth_format: depth.then_some(ImageFormat::Depth32F),
            load,
            final_layout: FinalLayout::ShaderRead,
            store_depth: false,
            name: "test",
        })
    }

    #[test]
    fn test_clear_follows_load_op() {
        let clear = GlClear::new(&render_pass(LoadOp::Clear, true), Some(Vec4::new(1.0, 0.0, 0.0, 1.0)));
        assert_eq!(clear.colour, Some([1.0, 0.0, 0.0, 1.0]));
        assert!(clear.depth);

        let clear = GlClear::new(&render_pass(LoadOp::Clear, false), None);
        assert_eq!(clear.colour, Some([0.0; 4]));
        assert!(!clear.depth);

        // load 时忽略 clear colour
        let clear = GlClear::new(&render_pass(LoadOp::Load, true), Some(Vec4::ONE));
        assert_eq!(clear.colour, None);
        assert!(clear.depth);
    }

    #[test]
    fn test_draw_ops() {
        assert!(GlOp::Draw { vertex_count: 3 }.is_draw());
        assert!(!GlOp::Dispatch(UVec3::ONE).is_draw());
        assert!(!GlOp::BindSet(0).is_draw());
    }
}
