use glow::HasContext;

use crate::error::construction_error;
use tandem_gfx::GfxResult;
use tandem_gfx::renderer::shader::{ShaderInfo, ShaderStage};

/// 由 GLSL 源码编译链接得到的 program
pub struct GlProgram {
    handle: glow::NativeProgram,
}
// 创建与销毁
impl GlProgram {
    /// 每个 stage 的字节都是 UTF-8 编码的 GLSL 源码
    pub fn new(gl: &glow::Context, shader: &ShaderInfo, name: &str) -> GfxResult<Self> {
        let _span = tracy_client::span!("GlProgram::new");
        let object_name = format!("GfxProgram::{name}");

        let mut shaders = Vec::new();
        let compiled = shader.stages().try_for_each(|(stage, bytes)| {
            let shader = Self::compile_stage(gl, stage, bytes, &object_name)?;
            shaders.push(shader);
            Ok(())
        });
        let linked = compiled.and_then(|()| Self::link(gl, &shaders, &object_name));

        for shader in shaders {
            unsafe { gl.delete_shader(shader) };
        }
        linked.map(|handle| Self { handle })
    }

    fn compile_stage(
        gl: &glow::Context,
        stage: ShaderStage,
        bytes: &[u8],
        object_name: &str,
    ) -> GfxResult<glow::NativeShader> {
        let source = std::str::from_utf8(bytes)
            .map_err(|e| construction_error(object_name, format!("{stage:?} source is not UTF-8: {e}")))?;

        let shader = unsafe { gl.create_shader(Self::shader_type(stage)) }
            .map_err(|e| construction_error(object_name, e))?;
        unsafe {
            gl.shader_source(shader, source);
            gl.compile_shader(shader);
            if !gl.get_shader_compile_status(shader) {
                let log = gl.get_shader_info_log(shader);
                gl.delete_shader(shader);
                return Err(construction_error(object_name, format!("{stage:?} failed to compile:\n{log}")));
            }
        }
        Ok(shader)
    }

    fn link(gl: &glow::Context, shaders: &[glow::NativeShader], object_name: &str) -> GfxResult<glow::NativeProgram> {
        let program = unsafe { gl.create_program() }.map_err(|e| construction_error(object_name, e))?;
        unsafe {
            for shader in shaders {
                gl.attach_shader(program, *shader);
            }
            gl.link_program(program);
            for shader in shaders {
                gl.detach_shader(program, *shader);
            }
            if !gl.get_program_link_status(program) {
                let log = gl.get_program_info_log(program);
                gl.delete_program(program);
                return Err(construction_error(object_name, format!("failed to link:\n{log}")));
            }
        }
        Ok(program)
    }

    pub fn shader_type(stage: ShaderStage) -> u32 {
        match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::TessellationControl => glow::TESS_CONTROL_SHADER,
            ShaderStage::TessellationEvaluation => glow::TESS_EVALUATION_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
            ShaderStage::Compute => glow::COMPUTE_SHADER,
        }
    }

    pub fn destroy(self, gl: &glow::Context) {
        unsafe {
            gl.delete_program(self.handle);
        }
    }
}
impl GlProgram {
    #[inline]
    pub fn handle(&self) -> glow::NativeProgram {
        self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_types() {
        assert_eq!(GlProgram::shader_type(ShaderStage::Vertex), glow::VERTEX_SHADER);
        assert_eq!(GlProgram::shader_type(ShaderStage::TessellationEvaluation), glow::TESS_EVALUATION_SHADER);
        assert_eq!(GlProgram::shader_type(ShaderStage::Compute), glow::COMPUTE_SHADER);
    }
}
