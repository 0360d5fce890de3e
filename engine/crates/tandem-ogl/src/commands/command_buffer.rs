use glam::UVec2;
use glow::HasContext;

use crate::commands::gl_op::{GlClear, GlOp};
use crate::gl_backend::GlBackend;
use crate::resources::bindings::GlBindings;
use tandem_gfx::backend::RecordTargets;
use tandem_gfx::commands::command_list::{Command, CommandList};
use tandem_gfx::{GfxError, GfxResult};

/// GL 没有 command buffer，录制的结果是一串解析好的 [`GlOp`]，提交时在 context 上重放
pub struct GlCommandBuffer {
    ops: Vec<GlOp>,
    name: String,
}
// 创建
impl GlCommandBuffer {
    pub fn new(name: &str) -> Self {
        Self {
            ops: Vec::new(),
            name: name.to_string(),
        }
    }
}
// getters
impl GlCommandBuffer {
    #[inline]
    pub fn ops(&self) -> &[GlOp] {
        &self.ops
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}
// 录制
impl GlCommandBuffer {
    /// 录制失败时 command buffer 为空，不会重放出一半的命令
    pub fn record_list(&mut self, commands: &CommandList, targets: &RecordTargets<'_, GlBackend>) -> GfxResult<()> {
        let _span = tracy_client::span!("GlCommandBuffer::record_list");
        self.ops.clear();

        let ops = commands.iter().map(|command| Self::translate(command, targets)).collect::<GfxResult<Vec<_>>>();
        match ops {
            Ok(ops) => {
                self.ops = ops;
                Ok(())
            }
            Err(e) => {
                log::error!("failed to record {}: {e}", self.name);
                Err(e)
            }
        }
    }

    fn translate(command: &Command, targets: &RecordTargets<'_, GlBackend>) -> GfxResult<GlOp> {
        let op = match command {
            Command::BeginLabel { name, .. } => GlOp::PushGroup(name.clone()),
            Command::EndLabel => GlOp::PopGroup,
            Command::BeginRenderPass {
                framebuffer,
                extent,
                clear_colour,
            } => {
                let render_pass = targets.render_pass()?;
                GlOp::BeginPass {
                    framebuffer: targets.framebuffer(*framebuffer)?.handle(),
                    extent: *extent,
                    clear: GlClear::new(render_pass, *clear_colour),
                }
            }
            Command::EndRenderPass => GlOp::EndPass,
            Command::BindPipeline { .. } => {
                let pipeline = targets.pipeline();
                GlOp::UsePipeline {
                    program: pipeline.program(),
                    state: pipeline.state(),
                }
            }
            Command::BindDescriptorSet { set, .. } => {
                let bindings = targets
                    .bindings()
                    .ok_or_else(|| GfxError::InvalidHandle("renderer has no descriptor bindings".to_string()))?;
                if bindings.set(*set).is_none() {
                    return Err(GfxError::InvalidHandle(format!("descriptor set {set} does not exist")));
                }
                GlOp::BindSet(*set)
            }
            Command::SetViewport { extent } => GlOp::Viewport(*extent),
            Command::SetScissor { offset, extent } => GlOp::Scissor {
                offset: *offset,
                extent: *extent,
            },
            Command::BindIndexBuffer { buffer } => GlOp::BindIndexBuffer(targets.buffer(*buffer)?.handle()),
            Command::Draw { vertex_count } => GlOp::Draw {
                vertex_count: *vertex_count,
            },
            Command::DrawIndexed { index_count } => GlOp::DrawIndexed {
                index_count: *index_count,
            },
            Command::DrawIndirect {
                buffer,
                draw_count,
                stride,
            } => GlOp::DrawIndirect {
                buffer: targets.buffer(*buffer)?.handle(),
                draw_count: *draw_count,
                stride: *stride,
            },
            Command::DrawIndexedIndirect {
                buffer,
                draw_count,
                stride,
            } => GlOp::DrawIndexedIndirect {
                buffer: targets.buffer(*buffer)?.handle(),
                draw_count: *draw_count,
                stride: *stride,
            },
            Command::Dispatch { groups } => GlOp::Dispatch(*groups),
        };
        Ok(op)
    }
}
// 重放
impl GlCommandBuffer {
    /// `vertex_array` 是后端持有的空 VAO，index buffer 的绑定记录在它上面
    pub fn execute(
        &self,
        gl: &glow::Context,
        vertex_array: glow::NativeVertexArray,
        bindings: Option<&GlBindings>,
    ) -> GfxResult<()> {
        let _span = tracy_client::span!("GlCommandBuffer::execute");
        let debug_groups = gl.supports_debug();
        let mut primitive = glow::TRIANGLES;

        unsafe { gl.bind_vertex_array(Some(vertex_array)) };
        for op in &self.ops {
            unsafe {
                match op {
                    GlOp::PushGroup(name) if debug_groups => {
                        gl.push_debug_group(glow::DEBUG_SOURCE_APPLICATION, 0, name);
                    }
                    GlOp::PopGroup if debug_groups => gl.pop_debug_group(),
                    GlOp::PushGroup(_) | GlOp::PopGroup => {}
                    GlOp::BeginPass {
                        framebuffer,
                        extent,
                        clear,
                    } => Self::begin_pass(gl, *framebuffer, *extent, clear),
                    GlOp::EndPass => {
                        gl.disable(glow::SCISSOR_TEST);
                        gl.bind_framebuffer(glow::FRAMEBUFFER, None);
                    }
                    GlOp::UsePipeline { program, state } => {
                        gl.use_program(Some(*program));
                        state.apply(gl);
                        primitive = state.primitive;
                    }
                    GlOp::BindSet(set) => {
                        let bindings = bindings.ok_or_else(|| {
                            GfxError::InvalidHandle(format!("{}: renderer has no descriptor bindings", self.name))
                        })?;
                        bindings.bind(gl, *set)?;
                    }
                    GlOp::Viewport(extent) => gl.viewport(0, 0, extent.x as i32, extent.y as i32),
                    GlOp::Scissor { offset, extent } => {
                        gl.scissor(offset.x as i32, offset.y as i32, extent.x as i32, extent.y as i32);
                    }
                    GlOp::BindIndexBuffer(buffer) => gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(*buffer)),
                    GlOp::Draw { vertex_count } => gl.draw_arrays(primitive, 0, *vertex_count as i32),
                    GlOp::DrawIndexed { index_count } => {
                        gl.draw_elements(primitive, *index_count as i32, glow::UNSIGNED_INT, 0);
                    }
                    GlOp::DrawIndirect {
                        buffer,
                        draw_count,
                        stride,
                    } => {
                        gl.bind_buffer(glow::DRAW_INDIRECT_BUFFER, Some(*buffer));
                        for offset in Self::indirect_offsets(*draw_count, *stride) {
                            gl.draw_arrays_indirect_offset(primitive, offset);
                        }
                    }
                    GlOp::DrawIndexedIndirect {
                        buffer,
                        draw_count,
                        stride,
                    } => {
                        gl.bind_buffer(glow::DRAW_INDIRECT_BUFFER, Some(*buffer));
                        for offset in Self::indirect_offsets(*draw_count, *stride) {
                            gl.draw_elements_indirect_offset(primitive, glow::UNSIGNED_INT, offset);
                        }
                    }
                    GlOp::Dispatch(groups) => {
                        gl.dispatch_compute(groups.x, groups.y, groups.z);
                        // 结果需要对 host 与后续命令可见
                        gl.memory_barrier(glow::ALL_BARRIER_BITS);
                    }
                }
            }
        }
        unsafe { gl.bind_vertex_array(None) };
        Ok(())
    }

    /// 每条 indirect 命令在 `GL_DRAW_INDIRECT_BUFFER` 中的字节偏移
    fn indirect_offsets(draw_count: u32, stride: u32) -> impl Iterator<Item = i32> {
        (0..draw_count).map(move |i| (i * stride) as i32)
    }

    /// clear 不受 scissor 与 depth mask 以外的状态影响，先关闭 scissor 再打开
    unsafe fn begin_pass(
        gl: &glow::Context,
        framebuffer: Option<glow::NativeFramebuffer>,
        extent: UVec2,
        clear: &GlClear,
    ) {
        unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, framebuffer);
            gl.disable(glow::SCISSOR_TEST);
            gl.viewport(0, 0, extent.x as i32, extent.y as i32);
            if let Some(colour) = clear.colour {
                gl.color_mask(true, true, true, true);
                gl.clear_buffer_f32_slice(glow::COLOR, 0, &colour);
            }
            if clear.depth {
                gl.depth_mask(true);
                gl.clear_buffer_f32_slice(glow::DEPTH, 0, &[1.0]);
            }
            gl.enable(glow::SCISSOR_TEST);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_gfx::commands::command_list::{DRAW_INDEXED_INDIRECT_STRIDE, DRAW_INDIRECT_STRIDE};

    #[test]
    fn test_new_command_buffer_is_empty() {
        let command_buffer = GlCommandBuffer::new("frame-0");
        assert!(command_buffer.ops().is_empty());
        assert_eq!(command_buffer.name(), "frame-0");
    }

    #[test]
    fn test_indirect_offsets() {
        let offsets = GlCommandBuffer::indirect_offsets(3, DRAW_INDEXED_INDIRECT_STRIDE).collect::<Vec<_>>();
        assert_eq!(offsets, vec![0, 20, 40]);
        assert_eq!(GlCommandBuffer::indirect_offsets(0, DRAW_INDIRECT_STRIDE).count(), 0);
    }
}
