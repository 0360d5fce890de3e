use glow::HasContext;

use crate::foundation::debug_output::{GlDebugOutput, GlDebugType};
use crate::gl_backend::GlBackend;
use crate::pipelines::program::GlProgram;
use tandem_gfx::backend::PipelineDesc;
use tandem_gfx::commands::command_list::BindPoint;
use tandem_gfx::renderer::shader::{ShaderKind, ShaderStage};
use tandem_gfx::{GfxError, GfxResult};

/// GL 的固定功能状态，在绑定 pipeline 时一次性设置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlPipelineState {
    pub depth_test: bool,
    pub alpha_blending: bool,
    pub wireframe: bool,
    /// draw 调用使用的图元
    pub primitive: u32,
}

impl GlPipelineState {
    /// compute pipeline 不使用这些状态
    pub const COMPUTE: Self = Self {
        depth_test: false,
        alpha_blending: false,
        wireframe: false,
        primitive: glow::TRIANGLES,
    };

    /// 有 tessellation 时每 3 个顶点组成一个 patch
    pub fn primitive(tessellation: bool) -> u32 {
        if tessellation { glow::PATCHES } else { glow::TRIANGLES }
    }

    pub fn apply(&self, gl: &glow::Context) {
        unsafe {
            if self.depth_test {
                gl.enable(glow::DEPTH_TEST);
                gl.depth_func(glow::LESS);
                gl.depth_mask(true);
            } else {
                gl.disable(glow::DEPTH_TEST);
                gl.depth_mask(false);
            }

            if self.alpha_blending {
                gl.enable(glow::BLEND);
                gl.blend_equation(glow::FUNC_ADD);
                gl.blend_func_separate(
                    glow::SRC_ALPHA,
                    glow::ONE_MINUS_SRC_ALPHA,
                    glow::ONE,
                    glow::ONE_MINUS_SRC_ALPHA,
                );
            } else {
                gl.disable(glow::BLEND);
            }

            gl.polygon_mode(glow::FRONT_AND_BACK, if self.wireframe { glow::LINE } else { glow::FILL });
            gl.disable(glow::CULL_FACE);
            gl.front_face(glow::CCW);

            if self.primitive == glow::PATCHES {
                gl.patch_parameter_i32(glow::PATCH_VERTICES, 3);
            }
        }
    }
}

pub struct GlPipeline {
    program: GlProgram,
    state: GlPipelineState,
    bind_point: BindPoint,
}
// 创建与销毁
impl GlPipeline {
    pub fn new(gl: &glow::Context, desc: &PipelineDesc<'_, GlBackend>) -> GfxResult<Self> {
        let _span = tracy_client::span!("GlPipeline::new");
        if desc.kind == ShaderKind::Graphics && desc.render_pass.is_none() {
            return Err(GfxError::InvalidOutputConfiguration(format!(
                "GfxPipeline::{}: a graphics pipeline needs a render pass",
                desc.name
            )));
        }

        let program = GlProgram::new(gl, desc.shader, desc.name)?;
        let (state, bind_point) = Self::state_from_desc(desc);
        let pipeline = Self {
            program,
            state,
            bind_point,
        };
        GlDebugOutput::set_debug_name(gl, &pipeline, desc.name);
        Ok(pipeline)
    }

    pub fn state_from_desc(desc: &PipelineDesc<'_, GlBackend>) -> (GlPipelineState, BindPoint) {
        match desc.kind {
            ShaderKind::Compute => (GlPipelineState::COMPUTE, BindPoint::Compute),
            ShaderKind::Graphics => (
                GlPipelineState {
                    depth_test: desc.depth_test,
                    alpha_blending: desc.alpha_blending,
                    wireframe: desc.wireframe,
                    primitive: GlPipelineState::primitive(desc.shader.has_shader(ShaderStage::TessellationControl)),
                },
                BindPoint::Graphics,
            ),
        }
    }

    pub fn destroy(self, gl: &glow::Context) {
        self.program.destroy(gl);
    }
}
// getters
impl GlPipeline {
    #[inline]
    pub fn program(&self) -> glow::NativeProgram {
        self.program.handle()
    }

    #[inline]
    pub fn state(&self) -> GlPipelineState {
        self.state
    }

    #[inline]
    pub fn bind_point(&self) -> BindPoint {
        self.bind_point
    }
}
impl GlDebugType for GlPipeline {
    fn debug_type_name() -> &'static str {
        "GfxPipeline"
    }

    fn gl_identifier() -> u32 {
        glow::PROGRAM
    }

    fn gl_name(&self) -> u32 {
        self.program.handle().0.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_gfx::renderer::shader::ShaderInfo;

    fn desc<'a>(shader: &'a ShaderInfo, kind: ShaderKind) -> PipelineDesc<'a, GlBackend> {
        PipelineDesc {
            shader,
            kind,
            bindings: None,
            render_pass: None,
            depth_test: true,
            alpha_blending: true,
            wireframe: false,
            name: "test",
        }
    }

    #[test]
    fn test_graphics_state() {
        let mut shader = ShaderInfo::default();
        shader.set_shader(ShaderStage::Vertex, b"v".to_vec()).set_shader(ShaderStage::Fragment, b"f".to_vec());
        let (state, bind_point) = GlPipeline::state_from_desc(&desc(&shader, ShaderKind::Graphics));
        assert_eq!(bind_point, BindPoint::Graphics);
        assert!(state.depth_test && state.alpha_blending && !state.wireframe);
        assert_eq!(state.primitive, glow::TRIANGLES);

        shader
            .set_shader(ShaderStage::TessellationControl, b"tc".to_vec())
            .set_shader(ShaderStage::TessellationEvaluation, b"te".to_vec());
        let (state, _) = GlPipeline::state_from_desc(&desc(&shader, ShaderKind::Graphics));
        assert_eq!(state.primitive, glow::PATCHES);
    }

    #[test]
    fn test_compute_ignores_raster_state() {
        let mut shader = ShaderInfo::default();
        shader.set_shader(ShaderStage::Compute, b"c".to_vec());
        let (state, bind_point) = GlPipeline::state_from_desc(&desc(&shader, ShaderKind::Compute));
        assert_eq!(bind_point, BindPoint::Compute);
        assert_eq!(state, GlPipelineState::COMPUTE);
    }
}
