use glam::{UVec2, UVec3, Vec4};

use crate::resources::reference::ResourceReference;
use crate::resources::resource::ResourceHandle;

/// 对一个已经构造好的 Renderer 的单项修改
#[derive(Debug, Clone, PartialEq)]
pub enum RendererEdit {
    /// 改变 buffer 的字节数，保留 min(旧, 新) 字节，新增部分为 0
    BufferResize { buffer_handle: ResourceHandle, size: usize },
    /// 改变 image 的尺寸，按行保留重叠区域
    ImageResize { image_handle: ResourceHandle, dimensions: UVec2 },
    /// 从 `offset` 开始写入数据
    ResourceWrite {
        resource: ResourceHandle,
        offset: usize,
        data: Vec<u8>,
    },
    /// 把 `resource` 改为借用另一个 Renderer 的资源，只能通过 `GfxContext::edit_renderer` 应用
    ResourceReference {
        resource: ResourceHandle,
        source: ResourceReference,
    },
    /// compute renderer 的 dispatch 大小
    ComputeConfig { kernel: UVec3 },
    RenderConfig { wireframe: bool },
    TriCount(u32),
    ClearColour(Vec4),
}

/// 一组按顺序生效的修改，构造之后不可变
///
/// 所有修改先整体校验，任意一项不合法时整个请求被拒绝，Renderer 保持原状态
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RendererEditRequest {
    edits: Vec<RendererEdit>,
}

impl RendererEditRequest {
    #[inline]
    pub fn edits(&self) -> &[RendererEdit] {
        &self.edits
    }

    /// 所有 `ResourceReference` 的来源，按照出现顺序
    pub fn reference_sources(&self) -> impl Iterator<Item = ResourceReference> + '_ {
        self.edits.iter().filter_map(|edit| match edit {
            RendererEdit::ResourceReference { source, .. } => Some(*source),
            _ => None,
        })
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RendererEditBuilder {
    edits: Vec<RendererEdit>,
}

impl RendererEditBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer_resize(mut self, buffer_handle: ResourceHandle, size: usize) -> Self {
        self.edits.push(RendererEdit::BufferResize { buffer_handle, size });
        self
    }

    pub fn image_resize(mut self, image_handle: ResourceHandle, dimensions: UVec2) -> Self {
        self.edits.push(RendererEdit::ImageResize {
            image_handle,
            dimensions,
        });
        self
    }

    pub fn write(mut self, resource: ResourceHandle, offset: usize, data: impl Into<Vec<u8>>) -> Self {
        self.edits.push(RendererEdit::ResourceWrite {
            resource,
            offset,
            data: data.into(),
        });
        self
    }

    pub fn reference(mut self, resource: ResourceHandle, source: ResourceReference) -> Self {
        self.edits.push(RendererEdit::ResourceReference { resource, source });
        self
    }

    pub fn compute(mut self, kernel: UVec3) -> Self {
        self.edits.push(RendererEdit::ComputeConfig { kernel });
        self
    }

    pub fn render_state(mut self, wireframe: bool) -> Self {
        self.edits.push(RendererEdit::RenderConfig { wireframe });
        self
    }

    pub fn tri_count(mut self, tri_count: u32) -> Self {
        self.edits.push(RendererEdit::TriCount(tri_count));
        self
    }

    pub fn clear_colour(mut self, colour: Vec4) -> Self {
        self.edits.push(RendererEdit::ClearColour(colour));
        self
    }

    pub fn build(self) -> RendererEditRequest {
        RendererEditRequest { edits: self.edits }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_keeps_order() {
        let handle = ResourceHandle::from_index(3);
        let request = RendererEditBuilder::new()
            .buffer_resize(handle, 128)
            .write(handle, 4, [1u8, 2, 3])
            .tri_count(7)
            .build();

        assert_eq!(request.edits().len(), 3);
        assert_eq!(
            request.edits()[0],
            RendererEdit::BufferResize {
                buffer_handle: handle,
                size: 128
            }
        );
        assert_eq!(
            request.edits()[1],
            RendererEdit::ResourceWrite {
                resource: handle,
                offset: 4,
                data: vec![1, 2, 3]
            }
        );
        assert_eq!(request.edits()[2], RendererEdit::TriCount(7));
    }

    #[test]
    fn test_empty_request() {
        assert!(RendererEditBuilder::new().build().is_empty());
        assert!(!RendererEditBuilder::new().clear_colour(Vec4::ONE).build().is_empty());
    }
}
