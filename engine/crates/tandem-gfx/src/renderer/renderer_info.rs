use glam::UVec3;

use crate::error::{GfxError, GfxResult};
use crate::renderer::options::RendererOptions;
use crate::renderer::output::{Output, ScissorRegion};
use crate::renderer::render_state::{ComputeState, RenderState};
use crate::renderer::shader::{ShaderInfo, ShaderKind, ShaderStage};
use crate::resources::reference::ResourceReference;
use crate::resources::resource::{Resource, ResourceFlags, ResourceHandle, ResourceType};

/// RendererInfo 中一个资源位置的来源
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceSlot {
    Owned(Resource),
    /// 借用另一个 Renderer 的资源，只有通过 `GfxContext::create_renderer` 构造时才能解析
    Referenced(ResourceReference),
}

/// 构造一个 Renderer 所需的全部描述
///
/// 资源的 handle 在 `add_resource` 或 `ref_resource` 时分配，等于插入顺序，构造之后保持不变。
/// 带有 `INDEX_BUFFER` 或 `DRAW_INDIRECT_BUFFER` flag 的 buffer 会自动设置到 graphics 状态中。
#[derive(Debug, Clone, Default)]
pub struct RendererInfo {
    resources: Vec<ResourceSlot>,
    output: Option<Output>,
    options: RendererOptions,
    state: RenderState,
    shader: ShaderInfo,
    scissor: Option<ScissorRegion>,
    debug_name: Option<String>,
}

/// `RendererInfo` 拆开之后交给 Renderer 构造
pub(crate) struct RendererParts {
    pub resources: Vec<ResourceSlot>,
    pub output: Option<Output>,
    pub options: RendererOptions,
    pub state: RenderState,
    pub shader: ShaderInfo,
    pub scissor: Option<ScissorRegion>,
    pub debug_name: String,
}

// builder
impl RendererInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_resource(&mut self, resource: impl Into<Resource>) -> ResourceHandle {
        let resource = resource.into();
        let handle = ResourceHandle::from_index(self.resources.len());
        if resource.ty() == ResourceType::Buffer
            && let Some(graphics) = self.state.graphics_mut()
        {
            if resource.flags().contains(ResourceFlags::INDEX_BUFFER) && graphics.index_buffer.is_none() {
                graphics.index_buffer = Some(handle);
            }
            if resource.flags().contains(ResourceFlags::DRAW_INDIRECT_BUFFER) && graphics.draw_buffer.is_none() {
                graphics.draw_buffer = Some(handle);
            }
        }
        self.resources.push(ResourceSlot::Owned(resource));
        handle
    }

    /// 借用另一个 Renderer 的资源，两者共享同一块 GPU 内存
    ///
    /// 借用的 index/indirect buffer 在构造时才会自动设置到 graphics 状态中
    pub fn ref_resource(&mut self, reference: ResourceReference) -> ResourceHandle {
        let handle = ResourceHandle::from_index(self.resources.len());
        self.resources.push(ResourceSlot::Referenced(reference));
        handle
    }

    pub fn set_output(&mut self, output: Output) -> &mut Self {
        self.output = Some(output);
        self
    }

    pub fn set_options(&mut self, options: RendererOptions) -> &mut Self {
        self.options = options;
        self
    }

    /// 整体替换 RenderState；之前自动设置的 index/draw buffer 会被覆盖
    pub fn set_state(&mut self, state: RenderState) -> &mut Self {
        self.state = state;
        self
    }

    #[inline]
    pub fn state_mut(&mut self) -> &mut RenderState {
        &mut self.state
    }

    /// compute renderer 的 dispatch 大小
    pub fn set_compute_kernel(&mut self, kernel: UVec3) -> &mut Self {
        self.state = RenderState::Compute(ComputeState { kernel });
        self
    }

    #[inline]
    pub fn shader(&mut self) -> &mut ShaderInfo {
        &mut self.shader
    }

    pub fn set_scissor(&mut self, scissor: ScissorRegion) -> &mut Self {
        self.scissor = Some(scissor);
        self
    }

    pub fn set_debug_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.debug_name = Some(name.into());
        self
    }
}
// getters
impl RendererInfo {
    #[inline]
    pub fn slots(&self) -> &[ResourceSlot] {
        &self.resources
    }

    /// 所有借用的资源，按照 handle 顺序
    pub fn references(&self) -> impl Iterator<Item = (ResourceHandle, ResourceReference)> + '_ {
        self.resources.iter().enumerate().filter_map(|(index, slot)| match slot {
            ResourceSlot::Referenced(reference) => Some((ResourceHandle::from_index(index), *reference)),
            ResourceSlot::Owned(_) => None,
        })
    }

    #[inline]
    pub fn output(&self) -> Option<&Output> {
        self.output.as_ref()
    }

    #[inline]
    pub fn options(&self) -> RendererOptions {
        self.options
    }

    #[inline]
    pub fn state(&self) -> &RenderState {
        &self.state
    }

    /// 没有手动设置时，根据内容生成：`{C|R}{buffers}b{images}i{h|w}`
    ///
    /// C 表示 compute，R 表示 graphics；h 表示离屏，w 表示输出到窗口。借用的资源不计入。
    pub fn debug_name(&self) -> String {
        if let Some(name) = &self.debug_name {
            return name.clone();
        }
        let owned = self
            .resources
            .iter()
            .filter_map(|slot| match slot {
                ResourceSlot::Owned(resource) => Some(resource.ty()),
                ResourceSlot::Referenced(_) => None,
            })
            .collect::<Vec<_>>();
        let buffers = owned.iter().filter(|ty| **ty == ResourceType::Buffer).count();
        let images = owned.len() - buffers;
        format!(
            "{}{buffers}b{images}i{}",
            if self.shader.has_shader(ShaderStage::Compute) { 'C' } else { 'R' },
            if self.output.as_ref().is_some_and(Output::is_window) { 'w' } else { 'h' }
        )
    }
}
// 构造前的检查
impl RendererInfo {
    /// 检查描述是否自洽，并根据 shader 确定最终的 RenderState
    ///
    /// `referenced` 是借用资源解析之后的描述，按照 handle 顺序，数量必须与 `ref_resource` 的次数一致
    pub(crate) fn into_parts(mut self, referenced: &[Resource]) -> GfxResult<RendererParts> {
        let debug_name = self.debug_name();
        let fail = |reason: String| GfxError::construction(format!("Renderer::{debug_name}"), reason);

        let reference_count = self.references().count();
        if reference_count != referenced.len() {
            return Err(fail(format!(
                "{reference_count} resource reference(s) must be resolved through GfxContext::create_renderer"
            )));
        }
        let mut resolved = referenced.iter();
        let resources = self
            .resources
            .iter()
            .filter_map(|slot| match slot {
                ResourceSlot::Owned(resource) => Some(resource),
                ResourceSlot::Referenced(_) => resolved.next(),
            })
            .collect::<Vec<_>>();

        // 借用的资源在解析之后才知道 flag
        if let Some(graphics) = self.state.graphics_mut() {
            for (index, resource) in resources.iter().enumerate() {
                let referenced = matches!(self.resources[index], ResourceSlot::Referenced(_));
                if !referenced || resource.ty() != ResourceType::Buffer {
                    continue;
                }
                let handle = ResourceHandle::from_index(index);
                if resource.flags().contains(ResourceFlags::INDEX_BUFFER) && graphics.index_buffer.is_none() {
                    graphics.index_buffer = Some(handle);
                }
                if resource.flags().contains(ResourceFlags::DRAW_INDIRECT_BUFFER) && graphics.draw_buffer.is_none() {
                    graphics.draw_buffer = Some(handle);
                }
            }
        }

        let kind = self.shader.validate(&debug_name)?;
        let state = match (kind, self.state) {
            (ShaderKind::Compute, RenderState::Compute(state)) => RenderState::Compute(state),
            (ShaderKind::Graphics, RenderState::Graphics(state)) => RenderState::Graphics(state),
            // 只有默认的 graphics 状态可以被 compute shader 接管
            (ShaderKind::Compute, RenderState::Graphics(state))
                if state.index_buffer.is_none() && state.draw_buffer.is_none() =>
            {
                RenderState::Compute(ComputeState::default())
            }
            (kind, state) => {
                return Err(fail(format!("{kind:?} shader does not match render state {state:?}")));
            }
        };

        for flag in [ResourceFlags::INDEX_BUFFER, ResourceFlags::DRAW_INDIRECT_BUFFER] {
            let flagged = resources.iter().filter(|r| r.flags().contains(flag)).collect::<Vec<_>>();
            if flagged.len() > 1 {
                return Err(fail(format!("at most one resource may carry {flag:?}")));
            }
            if flagged.iter().any(|r| r.ty() != ResourceType::Buffer) {
                return Err(fail(format!("{flag:?} can only be set on a buffer")));
            }
        }

        if let RenderState::Graphics(graphics) = &state {
            let check = |handle: Option<ResourceHandle>, flag: ResourceFlags| -> GfxResult<()> {
                let Some(handle) = handle else {
                    return Ok(());
                };
                match resources.get(handle.index()) {
                    Some(r) if r.ty() == ResourceType::Buffer && r.flags().contains(flag) => Ok(()),
                    Some(_) => Err(fail(format!("resource {handle} is not a buffer flagged {flag:?}"))),
                    None => Err(fail(format!("resource {handle} does not exist"))),
                }
            };
            check(graphics.index_buffer, ResourceFlags::INDEX_BUFFER)?;
            check(graphics.draw_buffer, ResourceFlags::DRAW_INDIRECT_BUFFER)?;

            if self.output.is_none() {
                return Err(GfxError::InvalidOutputConfiguration(format!(
                    "Renderer::{debug_name}: a graphics renderer needs an output"
                )));
            }
        }

        let output = match (&state, self.output) {
            (RenderState::Compute(_), Some(_)) => {
                log::warn!("Renderer::{debug_name}: compute renderers ignore their output");
                None
            }
            (_, output) => output,
        };

        Ok(RendererParts {
            resources: self.resources,
            output,
            options: self.options,
            state,
            shader: self.shader,
            scissor: self.scissor,
            debug_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use glam::UVec2;

    use super::*;
    use crate::renderer::output::ImageOutput;
    use crate::resources::image_format::ImageFormat;
    use crate::resources::resource::{BufferResource, ImageResource, ResourceAccess};

    fn graphics_info() -> RendererInfo {
        let mut info = RendererInfo::new();
        info.shader()
            .set_shader(ShaderStage::Vertex, vec![0u8; 4])
            .set_shader(ShaderStage::Fragment, vec![0u8; 4]);
        info
    }

    #[test]
    fn test_default_debug_name() {
        let mut info = graphics_info();
        info.add_resource(BufferResource::from_one(1u32, ResourceAccess::StaticFixed));
        info.add_resource(BufferResource::from_one(2u32, ResourceAccess::DynamicFixed));
        let image = info.add_resource(
            ImageResource::from_uninitialised(ImageFormat::Rgba32, UVec2::new(4, 4), ResourceAccess::StaticFixed)
                .with_flags(ResourceFlags::RENDERER_OUTPUT),
        );
        info.set_output(Output::Image(ImageOutput::new([image])));
        assert_eq!(info.debug_name(), "R2b1ih");

        info.set_output(Output::Window);
        assert_eq!(info.debug_name(), "R2b1iw");

        info.set_debug_name("custom");
        assert_eq!(info.debug_name(), "custom");
    }

    #[test]
    fn test_index_buffer_is_tracked() {
        let mut info = graphics_info();
        info.add_resource(BufferResource::from_one(0u32, ResourceAccess::StaticFixed));
        let index = info.add_resource(
            BufferResource::from_many(&[0u32, 1, 2], ResourceAccess::StaticFixed).with_flags(ResourceFlags::INDEX_BUFFER),
        );
        assert_eq!(info.state().graphics().unwrap().index_buffer, Some(index));
        assert_eq!(index.index(), 1);
    }

    #[test]
    fn test_two_index_buffers_rejected() {
        let mut info = graphics_info();
        for _ in 0..2 {
            info.add_resource(
                BufferResource::from_many(&[0u32, 1, 2], ResourceAccess::StaticFixed)
                    .with_flags(ResourceFlags::INDEX_BUFFER),
            );
        }
        info.set_output(Output::Window);
        assert!(matches!(info.into_parts(&[]), Err(GfxError::ConstructionFailure { .. })));
    }

    #[test]
    fn test_compute_shader_takes_over_default_state() {
        let mut info = RendererInfo::new();
        info.shader().set_shader(ShaderStage::Compute, vec![1u8]);
        info.add_resource(BufferResource::from_uninitialised(256, ResourceAccess::DynamicFixed));
        assert_eq!(info.debug_name(), "C1b0ih");

        let parts = info.into_parts(&[]).unwrap();
        assert!(parts.state.is_compute());
        assert!(parts.output.is_none());
    }

    #[test]
    fn test_references_need_resolving() {
        let mut contexts = slotmap::SlotMap::<crate::context::RendererHandle, ()>::with_key();
        let owner = contexts.insert(());

        let mut info = graphics_info();
        info.add_resource(BufferResource::from_one(0u32, ResourceAccess::StaticFixed));
        let index = info.ref_resource(ResourceReference::new(owner, ResourceHandle::from_index(0)));
        info.set_output(Output::Window);
        assert_eq!(info.references().collect::<Vec<_>>().len(), 1);
        assert_eq!(info.debug_name(), "R1b0iw");
        assert!(matches!(info.clone().into_parts(&[]), Err(GfxError::ConstructionFailure { .. })));

        // 解析之后才知道借用的是 index buffer
        let resolved = BufferResource::from_many(&[0u32, 1, 2], ResourceAccess::StaticFixed)
            .with_flags(ResourceFlags::INDEX_BUFFER)
            .into();
        let parts = info.into_parts(&[resolved]).unwrap();
        assert_eq!(parts.state.graphics().unwrap().index_buffer, Some(index));
        assert!(matches!(parts.resources[1], ResourceSlot::Referenced(_)));
    }

    #[test]
    fn test_graphics_without_output_rejected() {
        let info = graphics_info();
        assert!(matches!(info.into_parts(&[]), Err(GfxError::InvalidOutputConfiguration(_))));
    }
}
