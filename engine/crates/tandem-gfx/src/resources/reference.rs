use crate::backend::GfxBackend;
use crate::context::RendererHandle;
use crate::resources::resource::{Resource, ResourceHandle};

/// 另一个 Renderer 中的一个资源
///
/// 通过 `RendererInfo::ref_resource` 或 `RendererEdit::ResourceReference` 借用，
/// 借用者与所有者共享同一块 GPU 内存，内存始终由所有者创建与销毁。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceReference {
    pub renderer: RendererHandle,
    pub resource: ResourceHandle,
}

impl ResourceReference {
    #[inline]
    pub fn new(renderer: RendererHandle, resource: ResourceHandle) -> Self {
        Self { renderer, resource }
    }
}

/// 与所有者共享内存的后端对象
pub(crate) enum AliasObject<B: GfxBackend> {
    Buffer(B::Buffer),
    Image(B::Image),
}

/// 由 GfxContext 解析好的引用
///
/// `source` 总是指向真正持有内存的 Renderer，引用的引用会被展开
pub(crate) struct ResolvedReference<B: GfxBackend> {
    pub source: ResourceReference,
    /// 所有者的资源描述，去掉了 `RENDERER_OUTPUT`
    pub resource: Resource,
    pub object: AliasObject<B>,
}
