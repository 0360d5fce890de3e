use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::rc::Rc;

use glam::{UVec2, UVec3};
use scopeguard::ScopeGuard;

use crate::backend::{GfxBackend, RecordTargets, RenderWorkSubmitResult};
use crate::commands::command_list::CommandList;
use crate::commands::command_processor::CommandProcessor;
use crate::commands::deferred_release::DeferredRelease;
use crate::config::GfxConfig;
use crate::error::{GfxError, GfxResult};
use crate::renderer::edit::{RendererEdit, RendererEditRequest};
use crate::renderer::options::RendererOptions;
use crate::renderer::output::{AcquireInfo, AcquireOutcome, ScissorRegion};
use crate::renderer::output_manager::OutputManager;
use crate::renderer::pipeline_manager::PipelineManager;
use crate::renderer::render_state::RenderState;
use crate::renderer::renderer_info::{RendererInfo, RendererParts, ResourceSlot};
use crate::resources::component::{Backing, Component};
use crate::resources::reference::{ResolvedReference, ResourceReference};
use crate::resources::resource::{Resource, ResourceFlags, ResourceHandle, ResourceType};
use crate::resources::resource_storage::ResourceStorage;

/// Renderer 的生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RendererState {
    Constructing,
    Ready,
    Editing,
    Destroyed,
}

/// 一个 Renderer 持有的全部对象，销毁之后为 None
struct RendererInner<B: GfxBackend> {
    device: Rc<B>,
    storage: ResourceStorage<B>,
    /// compute renderer 没有 output
    output: Option<OutputManager<B>>,
    pipeline: PipelineManager<B>,
    processor: CommandProcessor<B>,
    release: DeferredRelease<B>,

    render_state: RenderState,
    options: RendererOptions,
    scissor: Option<ScissorRegion>,
}

/// 一组资源、一个 shader 与一个输出目标组成的渲染单元
///
/// 构造时录制好命令，每次 `render()` 重复提交；通过 `edit()` 原子地修改资源或状态。
pub struct Renderer<B: GfxBackend> {
    inner: Option<RendererInner<B>>,
    lifecycle: RendererState,
    /// 被其他 Renderer 借用的资源，以及借用者的数量
    lent: BTreeMap<ResourceHandle, usize>,
    debug_name: String,
}
// 创建与销毁
impl<B: GfxBackend> Renderer<B> {
    /// 不能包含借用的资源，借用需要通过 `GfxContext::create_renderer` 解析
    pub fn new(device: Rc<B>, config: &GfxConfig, info: RendererInfo) -> GfxResult<Self> {
        Self::with_references(device, config, info, Vec::new())
    }

    /// `references` 按照 handle 顺序对应 `info` 中的每一个 `ref_resource`
    pub(crate) fn with_references(
        device: Rc<B>,
        config: &GfxConfig,
        info: RendererInfo,
        references: Vec<ResolvedReference<B>>,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("Renderer::new");

        let descriptions = references.iter().map(|r| r.resource.clone()).collect::<Vec<_>>();
        let RendererParts {
            resources,
            output,
            options,
            state,
            shader,
            scissor,
            debug_name,
        } = info.into_parts(&descriptions)?;
        let frames_in_flight = config.frames_in_flight();
        log::info!(
            "Renderer::{debug_name}: constructing with {} resource(s), {frames_in_flight} frame(s) in flight",
            resources.len()
        );

        // 构造失败时按照依赖的逆序销毁已经创建的对象
        let mut storage = scopeguard::guard(
            ResourceStorage::new(device.clone(), frames_in_flight, &debug_name),
            ResourceStorage::destroy,
        );
        let mut references = references.into_iter();
        for slot in resources {
            match slot {
                ResourceSlot::Owned(resource) => storage.add_resource(resource)?,
                ResourceSlot::Referenced(source) => {
                    let reference = references.next().ok_or_else(|| {
                        GfxError::construction(format!("Renderer::{debug_name}"), format!("unresolved reference {source:?}"))
                    })?;
                    storage.add_reference(reference)?
                }
            };
        }
        storage.create_bindings()?;

        let output_manager = match output {
            Some(output) => Some(OutputManager::new(device.clone(), output, &storage, options, &debug_name)?),
            None => None,
        };
        let output_manager = scopeguard::guard(output_manager, |output| {
            if let Some(output) = output {
                output.destroy();
            }
        });

        let pipeline = PipelineManager::new(
            device.clone(),
            shader,
            storage.bindings(),
            output_manager.as_ref().map(OutputManager::get_render_pass),
            options,
            &debug_name,
        )?;
        let pipeline = scopeguard::guard(pipeline, PipelineManager::destroy);

        let processor = CommandProcessor::new(
            device.clone(),
            output_manager.as_ref().map_or(1, OutputManager::target_count),
            frames_in_flight,
            output_manager.as_ref().is_some_and(OutputManager::is_window),
            state.is_compute(),
            options,
            &debug_name,
        )?;
        let mut processor = scopeguard::guard(processor, CommandProcessor::destroy);

        processor.do_scratch_operations("static-upload", |recorder| {
            recorder.extend(storage.static_upload_ops());
        })?;
        storage.write_padded_image_data()?;

        processor.set_rendering_commands(
            &state,
            &RecordTargets {
                storage: &storage,
                output: output_manager.as_ref(),
                pipeline: &pipeline,
            },
            scissor,
        )?;

        let inner = RendererInner {
            device: device.clone(),
            storage: ScopeGuard::into_inner(storage),
            output: ScopeGuard::into_inner(output_manager),
            pipeline: ScopeGuard::into_inner(pipeline),
            processor: ScopeGuard::into_inner(processor),
            release: DeferredRelease::new(device),
            render_state: state,
            options,
            scissor,
        };
        log::info!("Renderer::{debug_name}: ready");

        Ok(Self {
            inner: Some(inner),
            lifecycle: RendererState::Ready,
            lent: BTreeMap::new(),
            debug_name,
        })
    }

    pub fn destroy(mut self) {
        self.destroy_mut();
    }

    /// 等待该 Renderer 所有在途的提交完成之后，按照依赖顺序销毁全部对象
    pub fn destroy_mut(&mut self) {
        let Some(inner) = self.inner.take() else {
            self.lifecycle = RendererState::Destroyed;
            return;
        };
        let _span = tracy_client::span!("Renderer::destroy");
        if !self.lent.is_empty() {
            log::error!(
                "Renderer::{}: destroyed while {} resource(s) are referenced by other renderers",
                self.debug_name,
                self.lent.len()
            );
        }

        let RendererInner {
            device,
            storage,
            output,
            pipeline,
            mut processor,
            release,
            ..
        } = inner;
        if let Err(e) = processor.wait_pending_commands_complete() {
            log::error!("Renderer::{}: failed to wait for in-flight work: {e}", self.debug_name);
            if let Err(e) = device.wait_idle() {
                log::error!("Renderer::{}: wait idle failed: {e}", self.debug_name);
            }
        }

        release.destroy();
        storage.destroy();
        if let Some(output) = output {
            output.destroy();
        }
        pipeline.destroy();
        processor.destroy();

        self.lifecycle = RendererState::Destroyed;
        log::info!("Renderer::{}: destroyed", self.debug_name);
    }
}
impl<B: GfxBackend> Drop for Renderer<B> {
    fn drop(&mut self) {
        self.destroy_mut();
    }
}
// getters
impl<B: GfxBackend> Renderer<B> {
    #[inline]
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    #[inline]
    pub fn state(&self) -> RendererState {
        self.lifecycle
    }

    pub fn get_component(&self, handle: ResourceHandle) -> GfxResult<&Component<B>> {
        self.inner
            .as_ref()
            .ok_or_else(|| self.torn_down(handle))?
            .storage
            .get_component(handle)
    }

    pub fn get_component_mut(&mut self, handle: ResourceHandle) -> GfxResult<&mut Component<B>> {
        let error = self.torn_down(handle);
        self.inner.as_mut().ok_or(error)?.storage.get_component_mut(handle)
    }

    #[inline]
    pub fn get_resource(&self, handle: ResourceHandle) -> GfxResult<&Resource> {
        self.get_component(handle).map(Component::resource)
    }

    pub fn resource_count(&self) -> usize {
        self.inner.as_ref().map_or(0, |inner| inner.storage.resource_count())
    }

    pub fn resource_count_of(&self, ty: ResourceType) -> usize {
        self.inner.as_ref().map_or(0, |inner| inner.storage.resource_count_of(ty))
    }

    pub fn options(&self) -> RendererOptions {
        self.inner.as_ref().map_or(RendererOptions::empty(), |inner| inner.options)
    }

    pub fn render_state(&self) -> Option<&RenderState> {
        self.inner.as_ref().map(|inner| &inner.render_state)
    }

    pub fn is_wireframe(&self) -> bool {
        self.inner.as_ref().is_some_and(|inner| inner.pipeline.is_wireframe())
    }

    /// 最近一次录制的命令，每个输出目标一份
    pub fn recorded_commands(&self) -> &[CommandList] {
        self.inner
            .as_ref()
            .map(|inner| inner.processor.recorded_commands())
            .unwrap_or_default()
    }

    pub fn record_generation(&self) -> u64 {
        self.inner.as_ref().map_or(0, |inner| inner.processor.record_generation())
    }

    pub fn output_dimensions(&self) -> Option<UVec2> {
        self.inner.as_ref()?.output.as_ref().map(OutputManager::get_output_dimensions)
    }

    pub fn is_window_output(&self) -> bool {
        self.inner
            .as_ref()
            .and_then(|inner| inner.output.as_ref())
            .is_some_and(OutputManager::is_window)
    }

    /// 当前帧在 frames in flight 中的下标
    pub fn current_frame(&self) -> usize {
        self.inner.as_ref().map_or(0, |inner| inner.processor.current_frame())
    }

    /// shader 可见资源的 descriptor，没有这类资源时为 None
    pub fn bindings(&self) -> Option<&B::Bindings> {
        self.inner.as_ref()?.storage.bindings()
    }

    /// 延迟销毁队列中等待 GPU 完成的对象数量
    pub fn pending_release_count(&self) -> usize {
        self.inner.as_ref().map_or(0, |inner| inner.release.pending_count())
    }

    /// 该资源是否被其他 Renderer 借用；借用期间不能 resize 或重新指向
    #[inline]
    pub fn is_lent(&self, handle: ResourceHandle) -> bool {
        self.lent.contains_key(&handle)
    }

    #[inline]
    pub fn has_lent_resources(&self) -> bool {
        !self.lent.is_empty()
    }

    /// 借用的所有资源的来源，销毁之后为空
    pub fn referenced_sources(&self) -> Vec<ResourceReference> {
        self.inner
            .as_ref()
            .map(|inner| inner.storage.referenced_sources().collect())
            .unwrap_or_default()
    }

    fn torn_down(&self, handle: ResourceHandle) -> GfxError {
        GfxError::InvalidHandle(format!("Renderer::{}: resource {handle} requested after teardown", self.debug_name))
    }
}
// 执行
impl<B: GfxBackend> Renderer<B> {
    /// 提交录制好的命令
    ///
    /// 输出到窗口时必须先调用 `acquire_output_image`
    pub fn render(&mut self) -> GfxResult<RenderWorkSubmitResult> {
        let _span = tracy_client::span!("Renderer::render");
        let result = self.with_inner("render", |inner| {
            let completed = inner.processor.poll_completed()?;
            inner.release.cleanup(completed);
            inner.storage.write_padded_image_data()?;

            let target = inner.output.as_ref().map_or(0, OutputManager::current_target);
            inner.processor.do_render_work(target, &mut inner.storage)
        })?;

        match result {
            RenderWorkSubmitResult::Success => {}
            RenderWorkSubmitResult::SuccessSuboptimal | RenderWorkSubmitResult::FailOutOfDate => {
                log::warn!("Renderer::{}: present returned {result:?}, surface should be recreated", self.debug_name);
            }
            _ => log::error!("Renderer::{}: present returned {result:?}", self.debug_name),
        }
        Ok(result)
    }

    /// 获取下一张 swapchain image，并把它设为下一次 render 的目标
    pub fn acquire_output_image(&mut self, info: AcquireInfo) -> GfxResult<AcquireOutcome> {
        let _span = tracy_client::span!("Renderer::acquire_output_image");
        self.with_inner("acquire_output_image", |inner| {
            let outcome = inner.processor.acquire(info)?;
            if let AcquireOutcome::Acquired { image_index, .. } = outcome
                && let Some(output) = inner.output.as_mut()
            {
                output.set_render_target(image_index as usize)?;
            }
            Ok(outcome)
        })
    }

    /// 离屏输出有多个 colour attachment 时，选择下一次 render 的目标
    pub fn set_output_target(&mut self, index: usize) -> GfxResult<()> {
        self.with_inner("set_output_target", |inner| match inner.output.as_mut() {
            Some(output) if !output.is_window() => output.set_render_target(index),
            _ => Err(GfxError::Unsupported(
                "only image outputs select their render target manually".to_string(),
            )),
        })
    }

    /// 窗口尺寸变化或 present 返回 out of date 之后调用：重建 swapchain 及依赖它的对象
    pub fn handle_surface_resized(&mut self) -> GfxResult<()> {
        let _span = tracy_client::span!("Renderer::handle_surface_resized");
        self.with_inner("handle_surface_resized", |inner| {
            if !inner.output.as_ref().is_some_and(OutputManager::is_window) {
                return Err(GfxError::Unsupported("only window outputs own a surface".to_string()));
            }
            inner.processor.wait_pending_commands_complete()?;
            inner.device.recreate_surface()?;
            inner.processor.reset_acquired();

            let serial = inner.processor.last_submitted_serial();
            if let Some(output) = inner.output.as_mut() {
                output.notify_image_recreated(&inner.storage, &mut inner.release, serial)?;
            }
            let completed = inner.processor.poll_completed()?;
            inner.release.cleanup(completed);
            Self::record(inner)
        })
    }

    /// 阻塞直到该 Renderer 所有已经提交的命令完成
    pub fn wait(&mut self) -> GfxResult<()> {
        self.with_inner("wait", |inner| inner.processor.wait_pending_commands_complete())
    }

    fn with_inner<T>(
        &mut self,
        operation: &str,
        f: impl FnOnce(&mut RendererInner<B>) -> GfxResult<T>,
    ) -> GfxResult<T> {
        self.ensure_ready(operation)?;
        let inner = self
            .inner
            .as_mut()
            .ok_or_else(|| GfxError::RendererDestroyed(format!("Renderer::{}", self.debug_name)))?;

        let result = f(inner);
        if let Err(e) = &result
            && e.is_fatal()
        {
            log::error!("Renderer::{}: fatal error during {operation}, terminating: {e}", self.debug_name);
            self.destroy_mut();
        }
        result
    }

    fn ensure_ready(&self, operation: &str) -> GfxResult<()> {
        match self.lifecycle {
            RendererState::Ready => Ok(()),
            RendererState::Destroyed => Err(GfxError::RendererDestroyed(format!(
                "Renderer::{}: {operation} after destruction",
                self.debug_name
            ))),
            state => Err(GfxError::Backend(format!(
                "Renderer::{}: {operation} while {state:?}",
                self.debug_name
            ))),
        }
    }

    /// 由 GfxContext 根据所有借用者重新计算
    pub(crate) fn set_loans(&mut self, lent: BTreeMap<ResourceHandle, usize>) {
        self.lent = lent;
    }

    /// 为借用者创建共享 `source.resource` 内存的对象
    pub(crate) fn resolve_reference(&self, source: ResourceReference) -> GfxResult<ResolvedReference<B>> {
        self.ensure_ready("resolve_reference")?;
        let inner = self
            .inner
            .as_ref()
            .ok_or_else(|| GfxError::RendererDestroyed(format!("Renderer::{}", self.debug_name)))?;
        let component = inner.storage.get_component(source.resource)?;
        let (resource, object) = inner.storage.share(source.resource)?;
        Ok(ResolvedReference {
            source: component.reference().unwrap_or(source),
            resource,
            object,
        })
    }

    fn record(inner: &mut RendererInner<B>) -> GfxResult<()> {
        let RendererInner {
            storage,
            output,
            pipeline,
            processor,
            render_state,
            scissor,
            ..
        } = inner;
        processor.set_rendering_commands(
            render_state,
            &RecordTargets {
                storage: &*storage,
                output: output.as_ref(),
                pipeline: &*pipeline,
            },
            *scissor,
        )
    }
}

/// edit 中被修改的资源：新的内容，以及是否需要新的后端对象
struct PlannedResource<B: GfxBackend> {
    resource: Resource,
    reallocate: bool,
    /// 改为借用另一个 Renderer 的资源
    reference: Option<ResolvedReference<B>>,
}

/// 分配阶段创建的后端对象，借用时带上来源
type NewBacking<B> = (Backing<B>, Option<ResourceReference>);

/// 校验通过的 edit，应用时不再做任何检查
struct EditPlan<B: GfxBackend> {
    resources: BTreeMap<ResourceHandle, PlannedResource<B>>,
    render_state: RenderState,
    wireframe: Option<bool>,
    rerecord: bool,
    output_resized: bool,
}

enum EditFailure {
    /// 还没有修改任何状态
    RolledBack(GfxError),
    /// 已经部分生效，Renderer 无法恢复
    Fatal(GfxError),
}

impl EditFailure {
    fn before_commit(error: GfxError, name: &str) -> Self {
        match error {
            GfxError::DeviceLost(_) => Self::Fatal(error),
            GfxError::EditRejected(_) | GfxError::InvalidHandle(_) => Self::RolledBack(error),
            other => Self::RolledBack(GfxError::rejected(format!("Renderer::{name}: {other}"))),
        }
    }
}
// edit
impl<B: GfxBackend> Renderer<B> {
    /// 原子地应用一组修改
    ///
    /// 任意一项不合法或者分配失败时返回错误，Renderer 保持之前的状态；
    /// 提交阶段失败是致命的，Renderer 被销毁。
    pub fn edit(&mut self, request: &RendererEditRequest) -> GfxResult<()> {
        self.edit_with_references(request, Vec::new())
    }

    /// `references` 按照顺序对应 `request` 中的每一个 `ResourceReference`
    pub(crate) fn edit_with_references(
        &mut self,
        request: &RendererEditRequest,
        references: Vec<ResolvedReference<B>>,
    ) -> GfxResult<()> {
        let _span = tracy_client::span!("Renderer::edit");
        self.ensure_ready("edit")?;
        let Some(inner) = self.inner.as_mut() else {
            return Err(GfxError::RendererDestroyed(format!("Renderer::{}", self.debug_name)));
        };
        if request.is_empty() {
            return Ok(());
        }

        let plan = Self::plan_edit(inner, request, references, &self.lent, &self.debug_name)?;
        log::debug!(
            "Renderer::{}: applying {} edit(s), {} resource(s) touched",
            self.debug_name,
            request.edits().len(),
            plan.resources.len()
        );

        self.lifecycle = RendererState::Editing;
        match Self::apply_edit(inner, plan, &self.debug_name) {
            Ok(()) => {
                self.lifecycle = RendererState::Ready;
                Ok(())
            }
            Err(EditFailure::RolledBack(e)) => {
                log::warn!("Renderer::{}: edit rolled back: {e}", self.debug_name);
                self.lifecycle = RendererState::Ready;
                Err(e)
            }
            Err(EditFailure::Fatal(e)) => {
                log::error!("Renderer::{}: edit failed after commit, terminating: {e}", self.debug_name);
                self.destroy_mut();
                Err(e)
            }
        }
    }

    /// 校验所有修改，并在 CPU 上准备好修改之后的资源内容，不产生任何副作用
    fn plan_edit(
        inner: &RendererInner<B>,
        request: &RendererEditRequest,
        references: Vec<ResolvedReference<B>>,
        lent: &BTreeMap<ResourceHandle, usize>,
        name: &str,
    ) -> GfxResult<EditPlan<B>> {
        let reject = |reason: String| GfxError::rejected(format!("Renderer::{name}: {reason}"));
        let graphics_only = |edit: &RendererEdit| reject(format!("{edit:?} requires a graphics renderer"));
        // 借用的内存由所有者分配，借出的内存必须保持不变
        let check_reallocate = |handle: ResourceHandle, planned: &PlannedResource<B>| -> GfxResult<()> {
            if lent.contains_key(&handle) {
                return Err(reject(format!("resource {handle} is referenced by another renderer")));
            }
            if planned.reference.is_some() || inner.storage.get_component(handle)?.is_referenced() {
                return Err(reject(format!("resource {handle} is owned by another renderer")));
            }
            Ok(())
        };
        let mut references = references.into_iter();

        let mut plan = EditPlan {
            resources: BTreeMap::new(),
            render_state: inner.render_state.clone(),
            wireframe: None,
            rerecord: false,
            output_resized: false,
        };

        for edit in request.edits() {
            match edit {
                RendererEdit::BufferResize { buffer_handle, size } => {
                    let planned = Self::working_copy(&mut plan.resources, &inner.storage, *buffer_handle)?;
                    if planned.resource.ty() != ResourceType::Buffer {
                        return Err(reject(format!("resource {buffer_handle} is not a buffer")));
                    }
                    if !planned.resource.access().is_resizable() {
                        return Err(reject(format!(
                            "buffer {buffer_handle} is {:?} and cannot be resized",
                            planned.resource.access()
                        )));
                    }
                    if *size == 0 {
                        return Err(reject(format!("buffer {buffer_handle} cannot be resized to 0 bytes")));
                    }
                    check_reallocate(*buffer_handle, planned)?;
                    planned.resource.resize_buffer(*size);
                    planned.reallocate = true;
                    // index 与 indirect buffer 直接录制在 command buffer 中
                    if planned
                        .resource
                        .flags()
                        .intersects(ResourceFlags::INDEX_BUFFER | ResourceFlags::DRAW_INDIRECT_BUFFER)
                    {
                        plan.rerecord = true;
                    }
                }
                RendererEdit::ImageResize {
                    image_handle,
                    dimensions,
                } => {
                    let planned = Self::working_copy(&mut plan.resources, &inner.storage, *image_handle)?;
                    if planned.resource.ty() != ResourceType::Image {
                        return Err(reject(format!("resource {image_handle} is not an image")));
                    }
                    if !planned.resource.access().is_resizable() {
                        return Err(reject(format!(
                            "image {image_handle} is {:?} and cannot be resized",
                            planned.resource.access()
                        )));
                    }
                    if dimensions.x == 0 || dimensions.y == 0 {
                        return Err(reject(format!("image {image_handle} cannot be resized to {dimensions}")));
                    }
                    check_reallocate(*image_handle, planned)?;
                    planned.resource.resize_image(*dimensions);
                    planned.reallocate = true;
                    if planned.resource.flags().contains(ResourceFlags::RENDERER_OUTPUT) {
                        plan.output_resized = true;
                        plan.rerecord = true;
                    }
                }
                RendererEdit::ResourceWrite { resource, offset, data } => {
                    let planned = Self::working_copy(&mut plan.resources, &inner.storage, *resource)?;
                    if planned.resource.access().is_static() {
                        return Err(reject(format!("resource {resource} is StaticFixed and cannot be written")));
                    }
                    if planned.reference.is_some() {
                        return Err(reject(format!("resource {resource} is written in the same edit that reseats it")));
                    }
                    if planned.resource.ty() == ResourceType::Image
                        && inner.storage.get_component(*resource)?.is_referenced()
                    {
                        return Err(reject(format!("image {resource} is owned by another renderer")));
                    }
                    let len = planned.resource.data().len();
                    let end = offset.checked_add(data.len()).filter(|end| *end <= len).ok_or_else(|| {
                        reject(format!(
                            "write of {} bytes at offset {offset} overflows resource {resource} ({len} bytes)",
                            data.len()
                        ))
                    })?;
                    planned.resource.data_mut()[*offset..end].copy_from_slice(data);
                }
                RendererEdit::ResourceReference { resource, source } => {
                    let reference = references.next().ok_or_else(|| {
                        reject(format!("reference to {source:?} must be applied through GfxContext::edit_renderer"))
                    })?;
                    if plan.resources.contains_key(resource) {
                        return Err(reject(format!("resource {resource} is edited more than once alongside a reference")));
                    }
                    if lent.contains_key(resource) {
                        return Err(reject(format!("resource {resource} is referenced by another renderer")));
                    }
                    let current = inner.storage.get_component(*resource)?.resource();
                    if current.flags().contains(ResourceFlags::RENDERER_OUTPUT) {
                        return Err(reject(format!("output attachment {resource} cannot reference another renderer")));
                    }
                    // descriptor 布局与录制的命令都依赖资源的类型与绑定方式
                    let bound_by = |r: &Resource| {
                        r.flags().intersection(ResourceFlags::INDEX_BUFFER | ResourceFlags::DRAW_INDIRECT_BUFFER)
                    };
                    if current.ty() != reference.resource.ty()
                        || current.is_shader_visible() != reference.resource.is_shader_visible()
                        || bound_by(current) != bound_by(&reference.resource)
                    {
                        return Err(reject(format!("resource {resource} cannot reference {source:?} of a different kind")));
                    }
                    if !bound_by(current).is_empty() {
                        plan.rerecord = true;
                    }
                    plan.resources.insert(
                        *resource,
                        PlannedResource {
                            resource: reference.resource.clone(),
                            reallocate: false,
                            reference: Some(reference),
                        },
                    );
                }
                RendererEdit::ComputeConfig { kernel } => {
                    let RenderState::Compute(compute) = &mut plan.render_state else {
                        return Err(reject("ComputeConfig requires a compute renderer".to_string()));
                    };
                    if kernel.cmpeq(UVec3::ZERO).any() {
                        return Err(reject(format!("kernel {kernel} has an empty dimension")));
                    }
                    compute.kernel = *kernel;
                    plan.rerecord = true;
                }
                RendererEdit::RenderConfig { wireframe } => {
                    if plan.render_state.is_compute() {
                        return Err(graphics_only(edit));
                    }
                    let current = plan.wireframe.unwrap_or(inner.pipeline.is_wireframe());
                    if current != *wireframe {
                        plan.wireframe = Some(*wireframe);
                        plan.rerecord = true;
                    }
                }
                RendererEdit::TriCount(tri_count) => {
                    let graphics = plan.render_state.graphics_mut().ok_or_else(|| graphics_only(edit))?;
                    graphics.tri_count = *tri_count;
                    plan.rerecord = true;
                }
                RendererEdit::ClearColour(colour) => {
                    let graphics = plan.render_state.graphics_mut().ok_or_else(|| graphics_only(edit))?;
                    graphics.clear_colour = *colour;
                    plan.rerecord = true;
                }
            }
        }

        // 所有 colour attachment 必须保持相同的尺寸
        if plan.output_resized
            && let Some(output) = inner.output.as_ref()
        {
            let mut dimensions = Vec::new();
            for handle in output.attachment_handles() {
                let planned = plan.resources.get(handle).and_then(|p| p.resource.as_image()).map(|i| i.dimensions());
                let current = inner.storage.get_component(*handle)?.dimensions();
                dimensions.extend(planned.or(current));
            }
            if dimensions.windows(2).any(|pair| pair[0] != pair[1]) {
                return Err(reject("output attachments must be resized together".to_string()));
            }
        }
        Ok(plan)
    }

    /// 取得资源在本次 edit 中的工作副本；host visible 的 buffer 以映射内存中的内容为准
    fn working_copy<'p>(
        resources: &'p mut BTreeMap<ResourceHandle, PlannedResource<B>>,
        storage: &ResourceStorage<B>,
        handle: ResourceHandle,
    ) -> GfxResult<&'p mut PlannedResource<B>> {
        match resources.entry(handle) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let component = storage.get_component(handle)?;
                let mut resource = component.resource().clone();
                if component.buffer().is_some()
                    && let Ok(mapped) = component.data()
                {
                    let data = resource.data_mut();
                    let len = data.len().min(mapped.len());
                    data[..len].copy_from_slice(&mapped[..len]);
                }
                Ok(entry.insert(PlannedResource {
                    resource,
                    reallocate: false,
                    reference: None,
                }))
            }
        }
    }

    fn apply_edit(inner: &mut RendererInner<B>, mut plan: EditPlan<B>, name: &str) -> Result<(), EditFailure> {
        let fatal = EditFailure::Fatal;

        // 被替换或重写的对象可能正在被 GPU 使用
        inner
            .processor
            .wait_pending_commands_complete()
            .map_err(|e| EditFailure::before_commit(e, name))?;

        // 分配阶段：先创建所有新对象，任何失败都回滚
        let rollback = |device: &B, backings: BTreeMap<ResourceHandle, NewBacking<B>>| {
            for (_, (backing, source)) in backings {
                for object in backing.into_objects(source.is_none()) {
                    device.destroy(object);
                }
            }
        };
        let mut backings: BTreeMap<ResourceHandle, NewBacking<B>> = BTreeMap::new();
        for (handle, planned) in plan.resources.iter_mut() {
            let created = match planned.reference.take() {
                Some(reference) => {
                    let source = reference.source;
                    inner.storage.alias_backing_for(*handle, reference).map(|backing| (backing, Some(source)))
                }
                None if planned.reallocate => {
                    inner.storage.create_backing_for(*handle, &planned.resource).map(|backing| (backing, None))
                }
                None => continue,
            };
            match created {
                Ok(created) => {
                    backings.insert(*handle, created);
                }
                Err(e) => {
                    rollback(inner.device.as_ref(), backings);
                    return Err(EditFailure::before_commit(e, name));
                }
            }
        }
        let pipeline = match plan.wireframe {
            Some(wireframe) => {
                let render_pass = inner.output.as_ref().map(OutputManager::get_render_pass);
                match inner.pipeline.prepare_recreate(inner.storage.bindings(), render_pass, wireframe) {
                    Ok(pipeline) => Some((pipeline, wireframe)),
                    Err(e) => {
                        rollback(inner.device.as_ref(), backings);
                        return Err(EditFailure::before_commit(e, name));
                    }
                }
            }
            None => None,
        };

        // 提交阶段
        let serial = inner.processor.last_submitted_serial();
        let mut buffers_replaced = false;
        let mut images_replaced = false;
        for (handle, planned) in plan.resources {
            let component = inner.storage.get_component_mut(handle).map_err(fatal)?;
            *component.resource_mut() = planned.resource;
            match backings.remove(&handle) {
                Some((backing, Some(source))) => {
                    inner.release.retire_all(component.reseat(backing, source), serial);
                    match component.ty() {
                        ResourceType::Buffer => buffers_replaced = true,
                        ResourceType::Image => images_replaced = true,
                    }
                }
                Some((backing, None)) => {
                    inner.release.retire_all(component.replace_backing(backing), serial);
                    match component.ty() {
                        ResourceType::Buffer => buffers_replaced = true,
                        ResourceType::Image => {
                            images_replaced = true;
                            if !component.flags().contains(ResourceFlags::RENDERER_OUTPUT) {
                                component.mark_dirty();
                            }
                        }
                    }
                }
                None => component.flush_resource_data(),
            }
        }

        if let Some((pipeline, wireframe)) = pipeline {
            inner.pipeline.commit_recreate(pipeline, wireframe, &mut inner.release, serial);
        }
        inner.render_state = plan.render_state;

        if plan.output_resized
            && let Some(output) = inner.output.as_mut()
        {
            output
                .notify_image_recreated(&inner.storage, &mut inner.release, serial)
                .map_err(fatal)?;
        }
        if buffers_replaced || images_replaced {
            inner.storage.sync_descriptors(images_replaced);
        }
        if plan.rerecord {
            Self::record(inner).map_err(fatal)?;
        }
        Ok(())
    }
}
