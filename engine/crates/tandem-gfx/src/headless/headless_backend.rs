use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use glam::{UVec2, UVec3};
use itertools::Itertools;

use crate::backend::{
    AttachmentRef, BindingLayout, BindingWrite, FramebufferDesc, GfxBackend, GfxBufferDesc, GfxImageDesc, GpuObject,
    LoadOp, PipelineDesc, RecordTargets, RenderPassDesc, RenderWorkSubmitResult, SubmitInfo, SurfaceInfo, TransferOp,
};
use crate::commands::command_list::{Command, CommandList};
use crate::error::{GfxError, GfxResult};
use crate::headless::objects::*;
use crate::renderer::options::RenderBackend;
use crate::renderer::output::AcquireOutcome;
use crate::renderer::shader::{ShaderKind, ShaderStage};
use crate::resources::image_format::ImageFormat;
use crate::resources::resource_storage::{ResourceStorage, pad_rows, unpad_rows};
use crate::resources::sampler::GfxSamplerDesc;

/// CPU kernel 的输入：dispatch 大小，以及按照 binding 顺序排列的 storage buffer
pub struct KernelInvocation<'a> {
    pub groups: UVec3,
    pub buffers: Vec<&'a mut [u8]>,
}

type Kernel = Rc<dyn Fn(&mut KernelInvocation<'_>)>;

/// 提交之后等待 `complete_pending` 的工作
struct PendingSubmission {
    fence: Option<ObjectId>,
    objects: Vec<ObjectId>,
}

struct HeadlessSurface {
    extent: UVec2,
    format: ImageFormat,
    images: Vec<Vec<u8>>,
    next_image: usize,
    /// `resize_surface` 之后，在 `recreate_surface` 之前 acquire 都返回 out of date
    pending_extent: Option<UVec2>,
    present_result: RenderWorkSubmitResult,
}

/// 执行过的工作的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    pub submits: usize,
    pub draws: usize,
    pub vertices: u64,
    pub dispatches: usize,
    pub clears: usize,
    pub presents: usize,
    pub transfers: usize,
}

/// 在 CPU 上模拟的后端，用于测试核心层
///
/// - 所有对象都有一个 id，销毁时检查是否仍被未完成的提交引用
/// - 可以让提交延迟完成，直到等待 fence 或调用 `complete_pending`
/// - clear 与 compute kernel 在提交时直接在 CPU 上执行，draw 只计数
pub struct HeadlessBackend {
    next_id: Cell<ObjectId>,
    live: RefCell<HashMap<ObjectId, &'static str>>,
    /// buffer 与 image 的内容，host visible 对象的映射指向这里
    memory: RefCell<HashMap<ObjectId, Vec<u8>>>,

    row_alignment: usize,
    deferred_completion: bool,
    delay_acquire_fences: Cell<bool>,
    fail_pipelines: Cell<bool>,

    fences: RefCell<HashMap<ObjectId, bool>>,
    delayed_acquire_fences: RefCell<Vec<ObjectId>>,
    pending: RefCell<VecDeque<PendingSubmission>>,

    kernels: RefCell<HashMap<Vec<u8>, Kernel>>,
    surface: RefCell<Option<HeadlessSurface>>,

    stats: Cell<HeadlessStats>,
    validation_errors: RefCell<Vec<String>>,
}
// new & init
impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}
impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(1),
            live: RefCell::new(HashMap::new()),
            memory: RefCell::new(HashMap::new()),
            row_alignment: 1,
            deferred_completion: false,
            delay_acquire_fences: Cell::new(false),
            fail_pipelines: Cell::new(false),
            fences: RefCell::new(HashMap::new()),
            delayed_acquire_fences: RefCell::new(Vec::new()),
            pending: RefCell::new(VecDeque::new()),
            kernels: RefCell::new(HashMap::new()),
            surface: RefCell::new(None),
            stats: Cell::new(HeadlessStats::default()),
            validation_errors: RefCell::new(Vec::new()),
        }
    }

    /// host visible image 每一行对齐到 `alignment` 字节
    pub fn with_row_alignment(mut self, alignment: usize) -> Self {
        self.row_alignment = alignment.max(1);
        self
    }

    /// 提交之后不立即完成，fence 保持未 signal
    pub fn with_deferred_completion(mut self) -> Self {
        self.deferred_completion = true;
        self
    }

    pub fn with_surface(self, extent: UVec2, image_count: u32, format: ImageFormat) -> Self {
        let images = (0..image_count)
            .map(|_| vec![0u8; format.pixel_size() * (extent.x * extent.y) as usize])
            .collect_vec();
        *self.surface.borrow_mut() = Some(HeadlessSurface {
            extent,
            format,
            images,
            next_image: 0,
            pending_extent: None,
            present_result: RenderWorkSubmitResult::Success,
        });
        self
    }
}
// 测试控制
impl HeadlessBackend {
    /// 注册 compute shader 字节对应的 CPU 实现
    pub fn register_kernel(&self, code: impl Into<Vec<u8>>, kernel: impl Fn(&mut KernelInvocation<'_>) + 'static) {
        self.kernels.borrow_mut().insert(code.into(), Rc::new(kernel));
    }

    /// acquire 的 fence 不再立即 signal，直到被等待或调用 `complete_pending`
    pub fn set_acquire_fence_delay(&self, delay: bool) {
        self.delay_acquire_fences.set(delay);
    }

    /// 之后的 `create_pipeline` 都返回 construction failure
    pub fn set_pipeline_failure(&self, fail: bool) {
        self.fail_pipelines.set(fail);
    }

    pub fn set_present_result(&self, result: RenderWorkSubmitResult) {
        if let Some(surface) = self.surface.borrow_mut().as_mut() {
            surface.present_result = result;
        }
    }

    /// 模拟窗口尺寸变化：在 `recreate_surface` 之前 acquire 返回 out of date
    pub fn resize_surface(&self, extent: UVec2) {
        if let Some(surface) = self.surface.borrow_mut().as_mut() {
            surface.pending_extent = Some(extent);
        }
    }

    /// 完成所有未完成的提交与 acquire
    pub fn complete_pending(&self) {
        let completed = self.pending.borrow_mut().drain(..).collect_vec();
        let mut fences = self.fences.borrow_mut();
        for submission in completed {
            if let Some(fence) = submission.fence {
                fences.insert(fence, true);
            }
        }
        for fence in self.delayed_acquire_fences.borrow_mut().drain(..) {
            fences.insert(fence, true);
        }
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    #[inline]
    pub fn live_object_count(&self) -> usize {
        self.live.borrow().len()
    }

    #[inline]
    pub fn is_live(&self, id: ObjectId) -> bool {
        self.live.borrow().contains_key(&id)
    }

    pub fn validation_errors(&self) -> Vec<String> {
        self.validation_errors.borrow().clone()
    }

    #[inline]
    pub fn stats(&self) -> HeadlessStats {
        self.stats.get()
    }

    /// 读取 image 紧密排列的像素
    pub fn read_pixels(&self, image: &HeadlessImage) -> Vec<u8> {
        let tight = image.format.pixel_size() * image.extent.x as usize;
        let rows = image.extent.y as usize;
        self.memory
            .borrow()
            .get(&image.id)
            .map(|data| unpad_rows(data, tight, image.row_pitch, rows))
            .unwrap_or_default()
    }

    /// 读取 swapchain image 的像素
    pub fn read_surface_pixels(&self, index: usize) -> Option<Vec<u8>> {
        self.surface.borrow().as_ref()?.images.get(index).cloned()
    }
}
// 内部工具
impl HeadlessBackend {
    fn allocate_id(&self, type_name: &'static str) -> ObjectId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.live.borrow_mut().insert(id, type_name);
        id
    }

    fn validation_error(&self, message: String) {
        log::error!("[headless validation] {message}");
        self.validation_errors.borrow_mut().push(message);
    }

    fn update_stats(&self, f: impl FnOnce(&mut HeadlessStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    fn row_pitch(&self, format: ImageFormat, width: u32) -> usize {
        let tight = format.pixel_size() * width as usize;
        tight.div_ceil(self.row_alignment) * self.row_alignment
    }

    fn is_in_use(&self, id: ObjectId) -> bool {
        self.pending.borrow().iter().any(|p| p.objects.contains(&id))
    }

    /// 完成直到 `fence` 为止的所有提交
    fn complete_until(&self, fence: ObjectId) -> bool {
        let mut pending = self.pending.borrow_mut();
        let Some(position) = pending.iter().position(|p| p.fence == Some(fence)) else {
            return false;
        };
        let mut fences = self.fences.borrow_mut();
        for submission in pending.drain(..=position) {
            if let Some(fence) = submission.fence {
                fences.insert(fence, true);
            }
        }
        true
    }

    fn fill_colour(data: &mut [u8], row_pitch: usize, extent: UVec2, pixel: &[u8]) {
        for row in data.chunks_mut(row_pitch).take(extent.y as usize) {
            for texel in row.chunks_exact_mut(pixel.len()).take(extent.x as usize) {
                texel.copy_from_slice(pixel);
            }
        }
    }

    /// 分配 `len` 字节的内存，host visible 时返回它的映射
    fn allocate_memory(&self, id: ObjectId, len: usize, host_visible: bool) -> Option<HostMapping> {
        let mut memory = self.memory.borrow_mut();
        let data = memory.entry(id).or_insert_with(|| vec![0; len]);
        host_visible.then(|| HostMapping {
            ptr: data.as_mut_ptr(),
            len: data.len(),
        })
    }

    fn execute_clear(
        &self,
        target: ColourTarget,
        format: ImageFormat,
        extent: UVec2,
        colour: glam::Vec4,
    ) {
        let pixel = format.encode_colour(colour);
        match target {
            ColourTarget::Surface(index) => {
                if let Some(surface) = self.surface.borrow_mut().as_mut()
                    && let Some(image) = surface.images.get_mut(index as usize)
                {
                    let pitch = format.pixel_size() * surface.extent.x as usize;
                    Self::fill_colour(image, pitch, surface.extent, &pixel);
                }
            }
            ColourTarget::Image(id) => {
                let row_pitch = self.row_pitch(format, extent.x);
                if let Some(data) = self.memory.borrow_mut().get_mut(&id) {
                    Self::fill_colour(data, row_pitch, extent, &pixel);
                }
            }
        }
        self.update_stats(|s| s.clears += 1);
    }

    fn execute_dispatch(
        &self,
        storage: &ResourceStorage<Self>,
        code: Option<&[u8]>,
        set: Option<usize>,
        groups: UVec3,
    ) {
        self.update_stats(|s| s.dispatches += 1);
        let Some(kernel) = code.and_then(|code| self.kernels.borrow().get(code).cloned()) else {
            log::warn!("[headless] dispatch {groups} without a registered kernel");
            return;
        };

        let ids = match (set, storage.bindings()) {
            (Some(set), Some(bindings)) => bindings
                .sets
                .get(set)
                .map(|s| s.buffers.iter().flatten().copied().collect_vec())
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        // 先从内存表中取出来，执行完再放回去；Vec 移动时堆内存不变，映射仍然有效
        let mut detached = ids
            .iter()
            .filter_map(|id| self.memory.borrow_mut().remove(id).map(|data| (*id, data)))
            .collect_vec();
        {
            let buffers = detached.iter_mut().map(|(_, data)| data.as_mut_slice()).collect_vec();
            kernel(&mut KernelInvocation { groups, buffers });
        }
        self.memory.borrow_mut().extend(detached);
    }
}

impl GfxBackend for HeadlessBackend {
    const KIND: RenderBackend = RenderBackend::Headless;

    type Buffer = HeadlessBuffer;
    type Image = HeadlessImage;
    type Sampler = HeadlessSampler;
    type Bindings = HeadlessBindings;
    type RenderPass = HeadlessRenderPass;
    type Framebuffer = HeadlessFramebuffer;
    type Pipeline = HeadlessPipeline;
    type CommandBuffer = HeadlessCommandBuffer;
    type Fence = HeadlessFence;
    type Semaphore = HeadlessSemaphore;

    fn create_buffer(&self, desc: &GfxBufferDesc) -> GfxResult<Self::Buffer> {
        let id = self.allocate_id("GfxBuffer");
        log::debug!("[headless] GfxBuffer::{} #{id} ({} bytes)", desc.name, desc.size);
        Ok(HeadlessBuffer {
            id,
            size: desc.size,
            mapping: self.allocate_memory(id, desc.size, desc.host_visible),
            alias: false,
        })
    }

    fn create_image(&self, desc: &GfxImageDesc) -> GfxResult<Self::Image> {
        if desc.extent.x == 0 || desc.extent.y == 0 {
            return Err(GfxError::construction(format!("GfxImage::{}", desc.name), "zero-sized image"));
        }
        let id = self.allocate_id("GfxImage");
        let row_pitch = self.row_pitch(desc.format, desc.extent.x);
        Ok(HeadlessImage {
            id,
            extent: desc.extent,
            format: desc.format,
            row_pitch,
            mapping: self.allocate_memory(id, row_pitch * desc.extent.y as usize, desc.host_visible),
            alias: false,
        })
    }

    fn alias_buffer(&self, buffer: &Self::Buffer) -> Self::Buffer {
        HeadlessBuffer {
            id: buffer.id,
            size: buffer.size,
            mapping: buffer.mapping,
            alias: true,
        }
    }

    fn alias_image(&self, image: &Self::Image) -> Self::Image {
        HeadlessImage {
            id: image.id,
            extent: image.extent,
            format: image.format,
            row_pitch: image.row_pitch,
            mapping: image.mapping,
            alias: true,
        }
    }

    fn create_sampler(&self, desc: &GfxSamplerDesc, _name: &str) -> GfxResult<Self::Sampler> {
        Ok(HeadlessSampler {
            id: self.allocate_id("GfxSampler"),
            desc: *desc,
        })
    }

    fn create_bindings(&self, layout: &BindingLayout, set_count: usize, _name: &str) -> GfxResult<Self::Bindings> {
        let set = HeadlessSet {
            buffers: vec![None; layout.buffer_count as usize],
            images: Vec::new(),
        };
        Ok(HeadlessBindings {
            id: self.allocate_id("GfxBindings"),
            layout: *layout,
            sets: vec![set; set_count],
        })
    }

    fn write_bindings(&self, bindings: &mut Self::Bindings, set: usize, writes: &[BindingWrite<'_, Self>]) {
        let Some(target) = bindings.sets.get_mut(set) else {
            self.validation_error(format!("descriptor set {set} does not exist"));
            return;
        };
        for write in writes {
            match write {
                BindingWrite::Buffer { binding, buffer } => match target.buffers.get_mut(*binding as usize) {
                    Some(slot) => *slot = Some(buffer.id),
                    None => self.validation_error(format!("binding {binding} out of range")),
                },
                BindingWrite::Images { images, .. } => {
                    target.images = images.iter().map(|(image, sampler)| (image.id, sampler.id)).collect();
                }
            }
        }
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> GfxResult<Self::RenderPass> {
        Ok(HeadlessRenderPass {
            id: self.allocate_id("GfxRenderPass"),
            colour_format: desc.colour_format,
            load: desc.load,
        })
    }

    fn create_framebuffer(&self, desc: &FramebufferDesc<'_, Self>) -> GfxResult<Self::Framebuffer> {
        let colour = match desc.colour {
            AttachmentRef::Image(image) => ColourTarget::Image(image.id),
            AttachmentRef::Surface(index) => ColourTarget::Surface(index),
        };
        Ok(HeadlessFramebuffer {
            id: self.allocate_id("GfxFramebuffer"),
            colour,
            depth: desc.depth.map(|depth| depth.id),
            format: desc.render_pass.colour_format,
            extent: desc.extent,
            load: desc.render_pass.load,
        })
    }

    fn create_pipeline(&self, desc: &PipelineDesc<'_, Self>) -> GfxResult<Self::Pipeline> {
        if self.fail_pipelines.get() {
            return Err(GfxError::construction(format!("GfxPipeline::{}", desc.name), "pipeline creation disabled"));
        }
        if desc.kind == ShaderKind::Graphics && desc.render_pass.is_none() {
            return Err(GfxError::construction(
                format!("GfxPipeline::{}", desc.name),
                "graphics pipeline without a render pass",
            ));
        }
        Ok(HeadlessPipeline {
            id: self.allocate_id("GfxPipeline"),
            kind: desc.kind,
            compute_code: desc.shader.get_shader(ShaderStage::Compute).map(<[u8]>::to_vec),
            wireframe: desc.wireframe,
        })
    }

    fn create_fence(&self, signalled: bool, _name: &str) -> GfxResult<Self::Fence> {
        let id = self.allocate_id("GfxFence");
        self.fences.borrow_mut().insert(id, signalled);
        Ok(HeadlessFence { id })
    }

    fn wait_fence(&self, fence: &Self::Fence, _timeout_ns: u64) -> GfxResult<()> {
        if self.fences.borrow().get(&fence.id).copied().unwrap_or(false) {
            return Ok(());
        }
        {
            let mut delayed = self.delayed_acquire_fences.borrow_mut();
            if let Some(position) = delayed.iter().position(|id| *id == fence.id) {
                delayed.remove(position);
                self.fences.borrow_mut().insert(fence.id, true);
                return Ok(());
            }
        }
        if self.complete_until(fence.id) {
            return Ok(());
        }
        Err(GfxError::Timeout(format!("fence #{} is never going to be signalled", fence.id)))
    }

    fn reset_fence(&self, fence: &Self::Fence) -> GfxResult<()> {
        if self.pending.borrow().iter().any(|p| p.fence == Some(fence.id)) {
            self.validation_error(format!("fence #{} reset while a submission still uses it", fence.id));
        }
        self.fences.borrow_mut().insert(fence.id, false);
        Ok(())
    }

    fn is_fence_signalled(&self, fence: &Self::Fence) -> GfxResult<bool> {
        Ok(self.fences.borrow().get(&fence.id).copied().unwrap_or(false))
    }

    fn create_semaphore(&self, _name: &str) -> GfxResult<Self::Semaphore> {
        Ok(HeadlessSemaphore {
            id: self.allocate_id("GfxSemaphore"),
        })
    }

    fn allocate_command_buffer(&self, _name: &str) -> GfxResult<Self::CommandBuffer> {
        Ok(HeadlessCommandBuffer {
            id: self.allocate_id("GfxCommandBuffer"),
            ..Default::default()
        })
    }

    fn record(
        &self,
        command_buffer: &mut Self::CommandBuffer,
        commands: &CommandList,
        targets: &RecordTargets<'_, Self>,
    ) -> GfxResult<()> {
        if self.is_in_use(command_buffer.id) {
            self.validation_error(format!("command buffer #{} re-recorded while in use", command_buffer.id));
        }

        let mut ops = Vec::new();
        let mut referenced = Vec::new();
        let mut compute_code = None;
        let mut bound_set = None;
        for command in commands {
            match command {
                Command::BeginRenderPass {
                    framebuffer,
                    clear_colour,
                    ..
                } => {
                    let framebuffer = targets.framebuffer(*framebuffer)?;
                    referenced.push(framebuffer.id);
                    referenced.extend(framebuffer.depth);
                    if let ColourTarget::Image(id) = framebuffer.colour {
                        referenced.push(id);
                    }
                    if let Some(colour) = clear_colour
                        && framebuffer.load == LoadOp::Clear
                    {
                        ops.push(HeadlessOp::Clear {
                            target: framebuffer.colour,
                            format: framebuffer.format,
                            extent: framebuffer.extent,
                            colour: *colour,
                        });
                    }
                }
                Command::BindPipeline { .. } => {
                    let pipeline = targets.pipeline();
                    referenced.push(pipeline.id);
                    if pipeline.kind == ShaderKind::Compute {
                        compute_code = pipeline.compute_code.clone();
                    }
                }
                Command::BindDescriptorSet { set, .. } => {
                    if let Some(bindings) = targets.bindings() {
                        referenced.push(bindings.id);
                    }
                    bound_set = Some(*set);
                }
                Command::BindIndexBuffer { buffer } => referenced.push(targets.buffer(*buffer)?.id),
                Command::Draw { vertex_count } | Command::DrawIndexed { index_count: vertex_count } => {
                    ops.push(HeadlessOp::Draw {
                        vertex_count: *vertex_count,
                    });
                }
                Command::DrawIndirect { buffer, .. } | Command::DrawIndexedIndirect { buffer, .. } => {
                    referenced.push(targets.buffer(*buffer)?.id);
                    ops.push(HeadlessOp::Draw { vertex_count: 0 });
                }
                Command::Dispatch { groups } => ops.push(HeadlessOp::Dispatch {
                    code: compute_code.clone(),
                    set: bound_set,
                    groups: *groups,
                }),
                Command::BeginLabel { .. }
                | Command::EndLabel
                | Command::EndRenderPass
                | Command::SetViewport { .. }
                | Command::SetScissor { .. } => {}
            }
        }

        command_buffer.commands = commands.clone();
        command_buffer.ops = ops;
        command_buffer.referenced = referenced;
        Ok(())
    }

    fn submit(
        &self,
        command_buffer: &Self::CommandBuffer,
        info: &SubmitInfo<'_, Self>,
        storage: &mut ResourceStorage<Self>,
    ) -> GfxResult<()> {
        if let Some(fence) = info.fence
            && !self.is_fence_signalled(fence)?
            && self.pending.borrow().iter().any(|p| p.fence == Some(fence.id))
        {
            return Err(GfxError::SubmissionFailure(format!("fence #{} is still pending", fence.id)));
        }

        for id in &command_buffer.referenced {
            if !self.is_live(*id) {
                self.validation_error(format!("object #{id} submitted after being destroyed"));
            }
        }

        for op in &command_buffer.ops {
            match op {
                HeadlessOp::Clear {
                    target,
                    format,
                    extent,
                    colour,
                } => self.execute_clear(*target, *format, *extent, *colour),
                HeadlessOp::Draw { vertex_count } => self.update_stats(|s| {
                    s.draws += 1;
                    s.vertices += *vertex_count as u64;
                }),
                HeadlessOp::Dispatch { code, set, groups } => {
                    self.execute_dispatch(storage, code.as_deref(), *set, *groups)
                }
            }
        }
        self.update_stats(|s| s.submits += 1);

        // descriptor 中绑定的对象在提交期间也被引用
        let mut objects = command_buffer.referenced.clone();
        objects.push(command_buffer.id);
        objects.extend(info.waits.iter().map(|(semaphore, _)| semaphore.id));
        objects.extend(info.signals.iter().map(|semaphore| semaphore.id));
        if let Some(bindings) = storage.bindings() {
            for set in &bindings.sets {
                objects.extend(set.buffers.iter().flatten());
                objects.extend(set.images.iter().flat_map(|(image, sampler)| [*image, *sampler]));
            }
        }

        if self.deferred_completion {
            self.pending.borrow_mut().push_back(PendingSubmission {
                fence: info.fence.map(|f| f.id),
                objects,
            });
        } else if let Some(fence) = info.fence {
            self.fences.borrow_mut().insert(fence.id, true);
        }
        Ok(())
    }

    fn execute_transfers(&self, ops: &[TransferOp<'_, Self>], name: &str) -> GfxResult<()> {
        let mut memory = self.memory.borrow_mut();
        for op in ops {
            match op {
                TransferOp::UploadBuffer { dst, data } => match memory.get_mut(&dst.id).filter(|_| dst.mapping.is_none()) {
                    Some(target) => {
                        let len = data.len().min(target.len());
                        target[..len].copy_from_slice(&data[..len]);
                    }
                    None => return Err(GfxError::Backend(format!("{name}: buffer #{} is not device local", dst.id))),
                },
                TransferOp::UploadImage { dst, data } => match memory.get_mut(&dst.id).filter(|_| dst.mapping.is_none()) {
                    Some(target) => {
                        let tight = dst.format.pixel_size() * dst.extent.x as usize;
                        pad_rows(data, target, tight, dst.row_pitch, dst.extent.y as usize);
                    }
                    None => return Err(GfxError::Backend(format!("{name}: image #{} is not device local", dst.id))),
                },
            }
        }
        self.update_stats(|s| s.transfers += 1);
        Ok(())
    }

    fn surface(&self) -> Option<SurfaceInfo> {
        self.surface.borrow().as_ref().map(|surface| SurfaceInfo {
            extent: surface.extent,
            image_count: surface.images.len() as u32,
            format: surface.format,
        })
    }

    fn acquire_next_image(
        &self,
        _signal_semaphore: Option<&Self::Semaphore>,
        signal_fence: Option<&Self::Fence>,
        _timeout_ns: u64,
    ) -> GfxResult<AcquireOutcome> {
        let mut surface = self.surface.borrow_mut();
        let surface = surface
            .as_mut()
            .ok_or_else(|| GfxError::InvalidOutputConfiguration("headless backend has no surface".to_string()))?;
        if surface.pending_extent.is_some() {
            return Ok(AcquireOutcome::OutOfDate);
        }

        let image_index = surface.next_image;
        surface.next_image = (surface.next_image + 1) % surface.images.len();
        if let Some(fence) = signal_fence {
            if self.delay_acquire_fences.get() {
                self.delayed_acquire_fences.borrow_mut().push(fence.id);
            } else {
                self.fences.borrow_mut().insert(fence.id, true);
            }
        }
        Ok(AcquireOutcome::Acquired {
            image_index: image_index as u32,
            suboptimal: false,
        })
    }

    fn present(&self, image_index: u32, _wait_semaphores: &[&Self::Semaphore]) -> GfxResult<RenderWorkSubmitResult> {
        let surface = self.surface.borrow();
        let surface = surface
            .as_ref()
            .ok_or_else(|| GfxError::InvalidOutputConfiguration("headless backend has no surface".to_string()))?;
        if image_index as usize >= surface.images.len() {
            return Err(GfxError::InvalidOutputConfiguration(format!("present of unknown image {image_index}")));
        }
        self.update_stats(|s| s.presents += 1);
        Ok(surface.present_result)
    }

    fn recreate_surface(&self) -> GfxResult<()> {
        let mut surface = self.surface.borrow_mut();
        let surface = surface
            .as_mut()
            .ok_or_else(|| GfxError::InvalidOutputConfiguration("headless backend has no surface".to_string()))?;
        if let Some(extent) = surface.pending_extent.take() {
            surface.extent = extent;
        }
        let bytes = surface.format.pixel_size() * (surface.extent.x * surface.extent.y) as usize;
        for image in &mut surface.images {
            *image = vec![0; bytes];
        }
        surface.next_image = 0;
        surface.present_result = RenderWorkSubmitResult::Success;
        Ok(())
    }

    fn destroy(&self, object: GpuObject<Self>) {
        let type_name = object.type_name();
        let alias = match &object {
            GpuObject::Buffer(o) => o.alias,
            GpuObject::Image(o) => o.alias,
            _ => false,
        };
        let id = match &object {
            GpuObject::Buffer(o) => o.id,
            GpuObject::Image(o) => o.id,
            GpuObject::Sampler(o) => o.id,
            GpuObject::Bindings(o) => o.id,
            GpuObject::RenderPass(o) => o.id,
            GpuObject::Framebuffer(o) => o.id,
            GpuObject::Pipeline(o) => o.id,
            GpuObject::CommandBuffer(o) => o.id,
            GpuObject::Fence(o) => o.id,
            GpuObject::Semaphore(o) => o.id,
        };

        if alias {
            self.validation_error(format!("alias of {type_name} #{id} destroyed by a borrower"));
            return;
        }
        if self.is_in_use(id) {
            self.validation_error(format!("{type_name} #{id} destroyed while in use"));
        }
        if self.live.borrow_mut().remove(&id).is_none() {
            self.validation_error(format!("{type_name} #{id} destroyed twice"));
        }
        self.memory.borrow_mut().remove(&id);
        self.fences.borrow_mut().remove(&id);
    }

    fn wait_idle(&self) -> GfxResult<()> {
        self.complete_pending();
        Ok(())
    }
}
