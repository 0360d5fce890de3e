use glam::{UVec2, UVec3, Vec4};

use crate::renderer::output::ScissorRegion;
use crate::resources::resource::ResourceHandle;

/// `VkDrawIndirectCommand` 的大小
pub const DRAW_INDIRECT_STRIDE: u32 = 16;
/// `VkDrawIndexedIndirectCommand` 的大小
pub const DRAW_INDEXED_INDIRECT_STRIDE: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindPoint {
    Graphics,
    Compute,
}

/// 与后端无关的命令
///
/// 资源通过 handle 引用，framebuffer 与 descriptor set 通过下标引用，
/// 由各个后端在录制时解析成具体的对象
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginLabel { name: String, colour: [f32; 4] },
    EndLabel,
    /// `clear_colour` 为 None 时保留 attachment 之前的内容
    BeginRenderPass {
        framebuffer: usize,
        extent: UVec2,
        clear_colour: Option<Vec4>,
    },
    EndRenderPass,
    BindPipeline { bind_point: BindPoint },
    BindDescriptorSet { bind_point: BindPoint, set: usize },
    SetViewport { extent: UVec2 },
    SetScissor { offset: UVec2, extent: UVec2 },
    BindIndexBuffer { buffer: ResourceHandle },
    Draw { vertex_count: u32 },
    DrawIndexed { index_count: u32 },
    DrawIndirect { buffer: ResourceHandle, draw_count: u32, stride: u32 },
    DrawIndexedIndirect { buffer: ResourceHandle, draw_count: u32, stride: u32 },
    Dispatch { groups: UVec3 },
}

/// 一个 command buffer 中录制的全部命令
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandList {
    commands: Vec<Command>,
}

impl CommandList {
    #[inline]
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    #[inline]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Command> {
        self.commands.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// 统计 draw 类命令的数量
    pub fn draw_call_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    Command::Draw { .. }
                        | Command::DrawIndexed { .. }
                        | Command::DrawIndirect { .. }
                        | Command::DrawIndexedIndirect { .. }
                )
            })
            .count()
    }
}

impl<'a> IntoIterator for &'a CommandList {
    type Item = &'a Command;
    type IntoIter = std::slice::Iter<'a, Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.iter()
    }
}

/// 录制一个 graphics command buffer 所需的参数
#[derive(Debug, Clone)]
pub struct GraphicsRecordParams<'a> {
    pub name: &'a str,
    pub framebuffer: usize,
    pub extent: UVec2,
    pub clear_colour: Option<Vec4>,
    pub descriptor_set: Option<usize>,
    pub scissor: Option<ScissorRegion>,
    pub index_buffer: Option<ResourceHandle>,
    /// indirect buffer 与它的字节大小
    pub draw_buffer: Option<(ResourceHandle, usize)>,
    pub tri_count: u32,
}

pub fn record_graphics(params: &GraphicsRecordParams) -> CommandList {
    let mut list = CommandList::default();
    list.push(Command::BeginLabel {
        name: format!("Render Pass: {}", params.name),
        colour: [0.0, 0.0, 1.0, 1.0],
    });
    list.push(Command::BeginRenderPass {
        framebuffer: params.framebuffer,
        extent: params.extent,
        clear_colour: params.clear_colour,
    });
    list.push(Command::BindPipeline {
        bind_point: BindPoint::Graphics,
    });
    if let Some(set) = params.descriptor_set {
        list.push(Command::BindDescriptorSet {
            bind_point: BindPoint::Graphics,
            set,
        });
    }

    list.push(Command::SetViewport { extent: params.extent });
    // 没有指定 scissor 时覆盖整个 output
    let scissor = params.scissor.unwrap_or(ScissorRegion {
        offset: UVec2::ZERO,
        extent: params.extent,
    });
    list.push(Command::SetScissor {
        offset: scissor.offset,
        extent: scissor.extent,
    });

    match (params.index_buffer, params.draw_buffer) {
        (None, None) => list.push(Command::Draw {
            vertex_count: 3 * params.tri_count,
        }),
        (None, Some((buffer, size))) => list.push(Command::DrawIndirect {
            buffer,
            draw_count: size as u32 / DRAW_INDIRECT_STRIDE,
            stride: DRAW_INDIRECT_STRIDE,
        }),
        (Some(index), None) => {
            list.push(Command::BindIndexBuffer { buffer: index });
            list.push(Command::DrawIndexed {
                index_count: 3 * params.tri_count,
            });
        }
        (Some(index), Some((buffer, size))) => {
            list.push(Command::BindIndexBuffer { buffer: index });
            list.push(Command::DrawIndexedIndirect {
                buffer,
                draw_count: size as u32 / DRAW_INDEXED_INDIRECT_STRIDE,
                stride: DRAW_INDEXED_INDIRECT_STRIDE,
            });
        }
    }

    list.push(Command::EndRenderPass);
    list.push(Command::EndLabel);
    list
}

pub fn record_compute(name: &str, descriptor_set: Option<usize>, kernel: UVec3) -> CommandList {
    let mut list = CommandList::default();
    list.push(Command::BeginLabel {
        name: format!("Compute Pass: {name}"),
        colour: [0.0, 0.0, 1.0, 1.0],
    });
    list.push(Command::BindPipeline {
        bind_point: BindPoint::Compute,
    });
    if let Some(set) = descriptor_set {
        list.push(Command::BindDescriptorSet {
            bind_point: BindPoint::Compute,
            set,
        });
    }
    list.push(Command::Dispatch { groups: kernel });
    list.push(Command::EndLabel);
    list
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> GraphicsRecordParams<'static> {
        GraphicsRecordParams {
            name: "test",
            framebuffer: 0,
            extent: UVec2::new(4, 4),
            clear_colour: Some(Vec4::ONE),
            descriptor_set: None,
            scissor: None,
            index_buffer: None,
            draw_buffer: None,
            tri_count: 2,
        }
    }

    fn last_draw(list: &CommandList) -> &Command {
        list.iter().rev().nth(2).unwrap()
    }

    #[test]
    fn test_plain_draw() {
        let list = record_graphics(&params());
        assert_eq!(last_draw(&list), &Command::Draw { vertex_count: 6 });
        assert_eq!(list.draw_call_count(), 1);
        // 默认 scissor 覆盖整个 output
        assert!(list.iter().any(|c| *c
            == Command::SetScissor {
                offset: UVec2::ZERO,
                extent: UVec2::new(4, 4)
            }));
    }

    #[test]
    fn test_draw_selection() {
        let index = ResourceHandle::from_index(0);
        let draw = ResourceHandle::from_index(1);

        let mut p = params();
        p.draw_buffer = Some((draw, 64));
        assert_eq!(
            last_draw(&record_graphics(&p)),
            &Command::DrawIndirect {
                buffer: draw,
                draw_count: 4,
                stride: 16
            }
        );

        let mut p = params();
        p.index_buffer = Some(index);
        let list = record_graphics(&p);
        assert_eq!(last_draw(&list), &Command::DrawIndexed { index_count: 6 });
        assert!(list.iter().any(|c| *c == Command::BindIndexBuffer { buffer: index }));

        let mut p = params();
        p.index_buffer = Some(index);
        p.draw_buffer = Some((draw, 60));
        assert_eq!(
            last_draw(&record_graphics(&p)),
            &Command::DrawIndexedIndirect {
                buffer: draw,
                draw_count: 3,
                stride: 20
            }
        );
    }

    #[test]
    fn test_compute_dispatch() {
        let list = record_compute("c", Some(1), UVec3::new(2, 1, 1));
        assert_eq!(
            list.commands()[2],
            Command::BindDescriptorSet {
                bind_point: BindPoint::Compute,
                set: 1
            }
        );
        assert_eq!(list.commands()[3], Command::Dispatch { groups: UVec3::new(2, 1, 1) });
    }
}
