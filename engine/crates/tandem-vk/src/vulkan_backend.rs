use std::cell::{Cell, RefCell};
use std::mem::ManuallyDrop;

use ash::vk;
use glam::UVec2;
use itertools::Itertools;
use scopeguard::ScopeGuard;

use crate::commands::barrier::{GfxBufferBarrier, GfxImageBarrier};
use crate::commands::command_buffer::VulkanCommandBuffer;
use crate::commands::command_pool::VulkanCommandPool;
use crate::commands::submit_info::GfxSubmitInfo;
use crate::commands::sync::{VulkanFence, VulkanSemaphore};
use crate::foundation::debug_messenger::VulkanDebugMsger;
use crate::foundation::device::VulkanDevice;
use crate::foundation::instance::VulkanInstance;
use crate::foundation::mem_allocator::VulkanMemAllocator;
use crate::foundation::physical_device::VulkanPhysicalDevice;
use crate::pipelines::pipeline::VulkanPipeline;
use crate::pipelines::render_pass::{VulkanFramebuffer, VulkanRenderPass};
use crate::resources::buffer::VulkanBuffer;
use crate::resources::descriptors::VulkanBindings;
use crate::resources::format::VulkanFormatUtils;
use crate::resources::image::VulkanImage;
use crate::resources::sampler::VulkanSampler;
use crate::swapchain::render_swapchain::VulkanSwapchain;
use crate::swapchain::surface::VulkanSurface;
use tandem_gfx::backend::{
    AttachmentRef, BindingLayout, BindingWrite, BufferComponent, FramebufferDesc, GfxBackend, GfxBufferDesc,
    GfxImageDesc, GpuObject, ImageComponent, PipelineDesc, RecordTargets, RenderPassDesc, RenderWorkSubmitResult,
    SubmitInfo, SurfaceInfo, TransferOp,
};
use tandem_gfx::commands::command_list::CommandList;
use tandem_gfx::config::{GfxConfig, PresentMode};
use tandem_gfx::renderer::output::AcquireOutcome;
use tandem_gfx::resources::resource_storage::ResourceStorage;
use tandem_gfx::resources::sampler::GfxSamplerDesc;
use tandem_gfx::{GfxError, GfxResult, RenderBackend};

/// staging buffer 中每一段数据的对齐
const STAGING_ALIGNMENT: usize = 16;

/// 窗口系统提供的句柄以及窗口当前的物理像素尺寸
#[derive(Clone, Copy)]
pub struct WindowTarget {
    pub display: raw_window_handle::RawDisplayHandle,
    pub window: raw_window_handle::RawWindowHandle,
    pub extent: UVec2,
}

/// 创建之后生命周期与 backend 一致的对象
///
/// 销毁顺序与声明顺序相反，entry 最后 drop（卸载 vulkan 动态库）
struct VulkanCore {
    vk_entry: ash::Entry,
    instance: VulkanInstance,
    debug_msger: Option<VulkanDebugMsger>,
    surface: Option<VulkanSurface>,
    physical_device: VulkanPhysicalDevice,
    device: VulkanDevice,
    allocator: VulkanMemAllocator,

    /// graphics 与 compute 共用这一个 queue
    queue: vk::Queue,
    command_pool: VulkanCommandPool,
}
impl VulkanCore {
    fn new(config: &GfxConfig, window: Option<&WindowTarget>) -> GfxResult<Self> {
        let _span = tracy_client::span!("VulkanCore::new");

        let vk_entry = unsafe { ash::Entry::load() }
            .map_err(|e| GfxError::construction("VulkanEntry", format!("failed to load vulkan: {e}")))?;

        let surface_exts = match window {
            Some(window) => VulkanSurface::required_extensions(window.display)?,
            None => &[],
        };
        let instance = scopeguard::guard(
            VulkanInstance::new(&vk_entry, &config.app_name, surface_exts, config.enable_validation)?,
            VulkanInstance::destroy,
        );
        let debug_msger = scopeguard::guard(
            if config.enable_validation {
                Some(VulkanDebugMsger::new(&vk_entry, instance.ash_instance())?)
            } else {
                None
            },
            |msger| msger.into_iter().for_each(VulkanDebugMsger::destroy),
        );
        let surface = scopeguard::guard(
            window
                .map(|window| VulkanSurface::new(&vk_entry, instance.ash_instance(), window.display, window.window))
                .transpose()?,
            |surface| surface.into_iter().for_each(VulkanSurface::destroy),
        );

        let physical_device = VulkanPhysicalDevice::pick(
            instance.ash_instance(),
            surface.as_ref().map(|surface| (surface.loader(), surface.handle())),
        )?;
        log::info!("picked gpu: {}, discrete: {}", physical_device.name(), physical_device.is_discrete_gpu());

        let device = scopeguard::guard(
            VulkanDevice::new(instance.ash_instance(), &physical_device, surface.is_some())?,
            VulkanDevice::destroy,
        );
        let allocator = scopeguard::guard(
            VulkanMemAllocator::new(instance.ash_instance(), physical_device.vk_handle, &device)?,
            VulkanMemAllocator::destroy,
        );
        let queue = unsafe { device.get_device_queue(physical_device.queue_family_index, 0) };
        let command_pool = VulkanCommandPool::new(
            &device,
            physical_device.queue_family_index,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            "tandem-main",
        )?;

        // 在 device 以及 debug_utils 之前创建的 vk::Handle
        device.set_object_debug_name(instance.ash_instance().handle(), "GfxInstance");
        device.set_object_debug_name(physical_device.vk_handle, "GfxPhysicalDevice");
        device.set_object_debug_name(device.vk_handle(), "GfxDevice");
        device.set_object_debug_name(queue, "CommandQueue-gfx");

        Ok(Self {
            vk_entry,
            allocator: ScopeGuard::into_inner(allocator),
            device: ScopeGuard::into_inner(device),
            physical_device,
            surface: ScopeGuard::into_inner(surface),
            debug_msger: ScopeGuard::into_inner(debug_msger),
            instance: ScopeGuard::into_inner(instance),
            queue,
            command_pool,
        })
    }

    fn destroy(self) {
        self.command_pool.destroy(&self.device);
        self.allocator.destroy();
        self.device.destroy();
        self.physical_device.destroy();
        if let Some(surface) = self.surface {
            surface.destroy();
        }
        if let Some(debug_msger) = self.debug_msger {
            debug_msger.destroy();
        }
        self.instance.destroy();
        drop(self.vk_entry);
    }
}

/// Vulkan 实现的 [`GfxBackend`]
///
/// - 只使用一个同时支持 graphics 与 compute 的 queue
/// - 窗口尺寸变化时，调用者先通过 [`Self::set_window_extent`] 更新尺寸，再由 Renderer 重建 swapchain
pub struct VulkanBackend {
    core: ManuallyDrop<VulkanCore>,

    present_mode: PresentMode,
    window_extent: Cell<UVec2>,
    swapchain: RefCell<Option<VulkanSwapchain>>,
}
// new & init
impl VulkanBackend {
    pub fn new(config: &GfxConfig, window: Option<WindowTarget>) -> GfxResult<Self> {
        let _span = tracy_client::span!("VulkanBackend::new");
        if config.backend != RenderBackend::Vulkan {
            log::warn!("creating a vulkan backend with config for {:?}", config.backend);
        }

        let backend = Self {
            core: ManuallyDrop::new(VulkanCore::new(config, window.as_ref())?),
            present_mode: config.present_mode,
            window_extent: Cell::new(window.map(|w| w.extent).unwrap_or(UVec2::ZERO)),
            swapchain: RefCell::new(None),
        };
        if backend.core.surface.is_some() {
            backend.create_swapchain()?;
        }
        Ok(backend)
    }

    fn create_swapchain(&self) -> GfxResult<()> {
        let Some(surface) = self.core.surface.as_ref() else {
            return Err(GfxError::InvalidOutputConfiguration("backend was created without a window".to_string()));
        };
        let swapchain = VulkanSwapchain::new(
            &self.core.device,
            self.core.physical_device.vk_handle,
            surface,
            self.present_mode,
            self.window_extent.get(),
        )?;

        let barriers = swapchain.initial_transitions();
        let result = self.one_time_exec("swapchain-init", |cmd| cmd.image_memory_barrier(&self.core.device, &barriers));
        if let Err(e) = result {
            swapchain.destroy(&self.core.device);
            return Err(e);
        }
        *self.swapchain.borrow_mut() = Some(swapchain);
        Ok(())
    }
}
// getters
impl VulkanBackend {
    #[inline]
    pub fn device(&self) -> &VulkanDevice {
        &self.core.device
    }

    #[inline]
    pub fn physical_device(&self) -> &VulkanPhysicalDevice {
        &self.core.physical_device
    }

    #[inline]
    fn allocator(&self) -> &VulkanMemAllocator {
        &self.core.allocator
    }

    /// 下一次 `recreate_surface` 使用的窗口尺寸
    #[inline]
    pub fn set_window_extent(&self, extent: UVec2) {
        self.window_extent.set(extent);
    }
}
// tools
impl VulkanBackend {
    /// 录制一次性的命令，提交并阻塞等待完成
    pub fn one_time_exec(&self, name: &str, func: impl FnOnce(&VulkanCommandBuffer)) -> GfxResult<()> {
        let _span = tracy_client::span!("VulkanBackend::one_time_exec");
        let device = &self.core.device;

        let cmd = VulkanCommandBuffer::new(device, &self.core.command_pool, name)?;
        let cmd = scopeguard::guard(cmd, |cmd| {
            self.core.command_pool.free_command_buffers(device, std::slice::from_ref(&cmd))
        });
        let fence = scopeguard::guard(VulkanFence::new(device, false, name)?, |fence| fence.destroy(device));

        cmd.begin(device, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        cmd.begin_label(device, name, [0.6, 0.6, 0.6, 1.0]);
        func(&cmd);
        cmd.end_label(device);
        cmd.end(device)?;

        let submit_info = GfxSubmitInfo::new(&[cmd.vk_handle()]);
        unsafe { device.queue_submit2(self.core.queue, &[submit_info.submit_info()], fence.handle()) }
            .map_err(Self::submit_error)?;
        fence.wait(device, u64::MAX)
    }

    fn submit_error(e: vk::Result) -> GfxError {
        match e {
            vk::Result::ERROR_DEVICE_LOST => GfxError::DeviceLost("queue_submit".to_string()),
            other => GfxError::SubmissionFailure(format!("queue_submit: {other:?}")),
        }
    }

    /// 每一段数据在 staging buffer 中的偏移，以及总大小
    pub fn staging_layout(sizes: impl IntoIterator<Item = usize>) -> (Vec<usize>, usize) {
        let mut total = 0;
        let offsets = sizes
            .into_iter()
            .map(|size| {
                let offset = total;
                total = (offset + size).next_multiple_of(STAGING_ALIGNMENT);
                offset
            })
            .collect_vec();
        (offsets, total)
    }

    fn record_transfers(
        &self,
        cmd: &VulkanCommandBuffer,
        stage_buffer: vk::Buffer,
        ops: &[TransferOp<'_, Self>],
        offsets: &[usize],
    ) {
        let device = &self.core.device;

        // 上传会覆盖整个 image，之前的内容可以丢弃
        let pre_barriers = ops
            .iter()
            .filter_map(|op| match op {
                TransferOp::UploadImage { dst, .. } => Some(
                    GfxImageBarrier::new()
                        .image(dst.handle())
                        .src_mask(vk::PipelineStageFlags2::ALL_COMMANDS, vk::AccessFlags2::empty())
                        .dst_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)
                        .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                        .image_aspect_flag(VulkanFormatUtils::aspect(dst.format())),
                ),
                TransferOp::UploadBuffer { .. } => None,
            })
            .collect_vec();
        cmd.image_memory_barrier(device, &pre_barriers);

        for (op, offset) in ops.iter().zip(offsets) {
            match op {
                TransferOp::UploadBuffer { dst, data } => {
                    let region = vk::BufferCopy {
                        src_offset: *offset as vk::DeviceSize,
                        dst_offset: 0,
                        size: data.len().min(dst.size()) as vk::DeviceSize,
                    };
                    cmd.cmd_copy_buffer(device, stage_buffer, dst.vk_buffer(), std::slice::from_ref(&region));
                }
                TransferOp::UploadImage { dst, .. } => {
                    let extent = dst.extent();
                    let region = vk::BufferImageCopy2::default()
                        .buffer_offset(*offset as vk::DeviceSize)
                        // 0 表示数据紧密排列
                        .buffer_row_length(0)
                        .buffer_image_height(0)
                        .image_subresource(vk::ImageSubresourceLayers {
                            aspect_mask: VulkanFormatUtils::aspect(dst.format()),
                            mip_level: 0,
                            base_array_layer: 0,
                            layer_count: 1,
                        })
                        .image_extent(vk::Extent3D {
                            width: extent.x,
                            height: extent.y,
                            depth: 1,
                        });
                    let copy_info = vk::CopyBufferToImageInfo2::default()
                        .src_buffer(stage_buffer)
                        .dst_image(dst.handle())
                        .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                        .regions(std::slice::from_ref(&region));
                    cmd.cmd_copy_buffer_to_image(device, &copy_info);
                }
            }
        }

        let image_barriers = ops
            .iter()
            .filter_map(|op| match op {
                TransferOp::UploadImage { dst, .. } => Some(
                    GfxImageBarrier::new()
                        .image(dst.handle())
                        .src_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)
                        .dst_mask(vk::PipelineStageFlags2::ALL_COMMANDS, vk::AccessFlags2::SHADER_READ)
                        .layout_transfer(vk::ImageLayout::TRANSFER_DST_OPTIMAL, dst.steady_layout())
                        .image_aspect_flag(VulkanFormatUtils::aspect(dst.format())),
                ),
                TransferOp::UploadBuffer { .. } => None,
            })
            .collect_vec();
        let buffer_barriers = ops
            .iter()
            .filter_map(|op| match op {
                TransferOp::UploadBuffer { dst, .. } => Some(
                    GfxBufferBarrier::new()
                        .buffer(dst.vk_buffer())
                        .src_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)
                        .dst_mask(vk::PipelineStageFlags2::ALL_COMMANDS, vk::AccessFlags2::MEMORY_READ),
                ),
                TransferOp::UploadImage { .. } => None,
            })
            .collect_vec();
        cmd.image_memory_barrier(device, &image_barriers);
        cmd.buffer_memory_barrier(device, &buffer_barriers);
    }
}

impl GfxBackend for VulkanBackend {
    const KIND: RenderBackend = RenderBackend::Vulkan;

    type Buffer = VulkanBuffer;
    type Image = VulkanImage;
    type Sampler = VulkanSampler;
    type Bindings = VulkanBindings;
    type RenderPass = VulkanRenderPass;
    type Framebuffer = VulkanFramebuffer;
    type Pipeline = VulkanPipeline;
    type CommandBuffer = VulkanCommandBuffer;
    type Fence = VulkanFence;
    type Semaphore = VulkanSemaphore;

    fn create_buffer(&self, desc: &GfxBufferDesc) -> GfxResult<Self::Buffer> {
        VulkanBuffer::from_desc(self.device(), self.allocator(), desc)
    }

    fn create_image(&self, desc: &GfxImageDesc) -> GfxResult<Self::Image> {
        let image = VulkanImage::new(self.device(), self.allocator(), desc)?;
        if let Some(barrier) = image.initial_transition()
            && let Err(e) = self.one_time_exec(&format!("init-layout-{}", desc.name), |cmd| {
                cmd.image_memory_barrier(self.device(), std::slice::from_ref(&barrier))
            })
        {
            image.destroy(self.device(), self.allocator());
            return Err(e);
        }
        Ok(image)
    }

    fn alias_buffer(&self, buffer: &Self::Buffer) -> Self::Buffer {
        buffer.alias()
    }

    fn alias_image(&self, image: &Self::Image) -> Self::Image {
        image.alias()
    }

    fn create_sampler(&self, desc: &GfxSamplerDesc, name: &str) -> GfxResult<Self::Sampler> {
        VulkanSampler::new(self.device(), desc, name)
    }

    fn create_bindings(&self, layout: &BindingLayout, set_count: usize, name: &str) -> GfxResult<Self::Bindings> {
        VulkanBindings::new(self.device(), layout, set_count, name)
    }

    fn write_bindings(&self, bindings: &mut Self::Bindings, set: usize, writes: &[BindingWrite<'_, Self>]) {
        bindings.write(self.device(), set, writes);
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> GfxResult<Self::RenderPass> {
        VulkanRenderPass::new(self.device(), desc)
    }

    fn create_framebuffer(&self, desc: &FramebufferDesc<'_, Self>) -> GfxResult<Self::Framebuffer> {
        let colour_view = match desc.colour {
            AttachmentRef::Image(image) => image.view(),
            AttachmentRef::Surface(index) => self
                .swapchain
                .borrow()
                .as_ref()
                .and_then(|swapchain| swapchain.image_view(index))
                .ok_or_else(|| {
                    GfxError::InvalidOutputConfiguration(format!("swapchain image {index} does not exist"))
                })?,
        };
        VulkanFramebuffer::new(
            self.device(),
            desc.render_pass,
            colour_view,
            desc.depth.map(VulkanImage::view),
            desc.extent,
            desc.name,
        )
    }

    fn create_pipeline(&self, desc: &PipelineDesc<'_, Self>) -> GfxResult<Self::Pipeline> {
        VulkanPipeline::new(self.device(), desc)
    }

    fn create_fence(&self, signalled: bool, name: &str) -> GfxResult<Self::Fence> {
        VulkanFence::new(self.device(), signalled, name)
    }

    fn wait_fence(&self, fence: &Self::Fence, timeout_ns: u64) -> GfxResult<()> {
        fence.wait(self.device(), timeout_ns)
    }

    fn reset_fence(&self, fence: &Self::Fence) -> GfxResult<()> {
        fence.reset(self.device())
    }

    fn is_fence_signalled(&self, fence: &Self::Fence) -> GfxResult<bool> {
        fence.is_signalled(self.device())
    }

    fn create_semaphore(&self, name: &str) -> GfxResult<Self::Semaphore> {
        VulkanSemaphore::new(self.device(), name)
    }

    fn allocate_command_buffer(&self, name: &str) -> GfxResult<Self::CommandBuffer> {
        VulkanCommandBuffer::new(self.device(), &self.core.command_pool, name)
    }

    fn record(
        &self,
        command_buffer: &mut Self::CommandBuffer,
        commands: &CommandList,
        targets: &RecordTargets<'_, Self>,
    ) -> GfxResult<()> {
        command_buffer.record_list(self.device(), commands, targets)
    }

    /// host visible 的资源直接映射到 GPU 可见的内存，提交前不需要额外同步
    fn submit(
        &self,
        command_buffer: &Self::CommandBuffer,
        info: &SubmitInfo<'_, Self>,
        _storage: &mut ResourceStorage<Self>,
    ) -> GfxResult<()> {
        let _span = tracy_client::span!("VulkanBackend::submit");

        let submit_info = info.waits.iter().fold(
            GfxSubmitInfo::new(&[command_buffer.vk_handle()]),
            |submit_info, (semaphore, stage)| submit_info.wait(semaphore, *stage),
        );
        let submit_info = info.signals.iter().fold(submit_info, |submit_info, semaphore| submit_info.signal(semaphore));

        unsafe {
            self.device().queue_submit2(
                self.core.queue,
                &[submit_info.submit_info()],
                info.fence.map_or(vk::Fence::null(), VulkanFence::handle),
            )
        }
        .map_err(Self::submit_error)
    }

    fn execute_transfers(&self, ops: &[TransferOp<'_, Self>], name: &str) -> GfxResult<()> {
        let _span = tracy_client::span!("VulkanBackend::execute_transfers");
        if ops.is_empty() {
            return Ok(());
        }

        let (offsets, total) = Self::staging_layout(ops.iter().map(|op| match op {
            TransferOp::UploadBuffer { data, .. } | TransferOp::UploadImage { data, .. } => data.len(),
        }));
        let mut stage_buffer =
            VulkanBuffer::new_stage_buffer(self.device(), self.allocator(), total, &format!("{name}-stage"))?;
        if let Some(mapped) = stage_buffer.mapped_mut() {
            for (op, offset) in ops.iter().zip(&offsets) {
                let (TransferOp::UploadBuffer { data, .. } | TransferOp::UploadImage { data, .. }) = op;
                mapped[*offset..*offset + data.len()].copy_from_slice(data);
            }
        }

        let stage_handle = stage_buffer.vk_buffer();
        let result = self.one_time_exec(name, |cmd| self.record_transfers(cmd, stage_handle, ops, &offsets));
        stage_buffer.destroy(self.allocator());
        result
    }

    fn surface(&self) -> Option<SurfaceInfo> {
        self.swapchain.borrow().as_ref().map(VulkanSwapchain::surface_info)
    }

    fn acquire_next_image(
        &self,
        signal_semaphore: Option<&Self::Semaphore>,
        signal_fence: Option<&Self::Fence>,
        timeout_ns: u64,
    ) -> GfxResult<AcquireOutcome> {
        let swapchain = self.swapchain.borrow();
        let swapchain = swapchain
            .as_ref()
            .ok_or_else(|| GfxError::InvalidOutputConfiguration("backend has no swapchain".to_string()))?;
        swapchain.acquire_next_image(self.device(), signal_semaphore, signal_fence, timeout_ns)
    }

    fn present(&self, image_index: u32, wait_semaphores: &[&Self::Semaphore]) -> GfxResult<RenderWorkSubmitResult> {
        let _span = tracy_client::span!("VulkanBackend::present");
        let swapchain = self.swapchain.borrow();
        let swapchain = swapchain
            .as_ref()
            .ok_or_else(|| GfxError::InvalidOutputConfiguration("backend has no swapchain".to_string()))?;
        swapchain.present_image(self.device(), self.core.queue, image_index, wait_semaphores)
    }

    /// 旧的 framebuffer 仍然引用旧的 image view，只要不再被使用就可以稍后销毁
    fn recreate_surface(&self) -> GfxResult<()> {
        let _span = tracy_client::span!("VulkanBackend::recreate_surface");
        self.device().wait_idle()?;
        if let Some(old) = self.swapchain.borrow_mut().take() {
            old.destroy(self.device());
        }
        self.create_swapchain()
    }

    fn destroy(&self, object: GpuObject<Self>) {
        let device = self.device();
        match object {
            GpuObject::Buffer(buffer) => buffer.destroy(self.allocator()),
            GpuObject::Image(image) => image.destroy(device, self.allocator()),
            GpuObject::Sampler(sampler) => sampler.destroy(device),
            GpuObject::Bindings(bindings) => bindings.destroy(device),
            GpuObject::RenderPass(render_pass) => render_pass.destroy(device),
            GpuObject::Framebuffer(framebuffer) => framebuffer.destroy(device),
            GpuObject::Pipeline(pipeline) => pipeline.destroy(device),
            GpuObject::CommandBuffer(command_buffer) => {
                self.core.command_pool.free_command_buffers(device, std::slice::from_ref(&command_buffer))
            }
            GpuObject::Fence(fence) => fence.destroy(device),
            GpuObject::Semaphore(semaphore) => semaphore.destroy(device),
        }
    }

    fn wait_idle(&self) -> GfxResult<()> {
        self.device().wait_idle()
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        let _span = tracy_client::span!("VulkanBackend::drop");
        if let Err(e) = self.core.device.wait_idle() {
            log::error!("VulkanBackend: wait idle failed during shutdown: {e}");
        }
        if let Some(swapchain) = self.swapchain.get_mut().take() {
            swapchain.destroy(&self.core.device);
        }
        // core 只在这里被取出一次
        let core = unsafe { ManuallyDrop::take(&mut self.core) };
        core.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_gfx::resources::image_format::ImageFormat;

    /// 没有可用的 vulkan 驱动时跳过
    fn try_backend() -> Option<VulkanBackend> {
        tandem_crate_tools::init_log::init_test_log();
        let config = GfxConfig {
            enable_validation: false,
            ..GfxConfig::default()
        };
        match VulkanBackend::new(&config, None) {
            Ok(backend) => Some(backend),
            Err(e) => {
                log::warn!("no vulkan device, skipping: {e}");
                None
            }
        }
    }

    #[test]
    fn test_host_visible_buffer_is_mapped() {
        let Some(backend) = try_backend() else {
            return;
        };
        let mut buffer = backend
            .create_buffer(&GfxBufferDesc {
                size: 64,
                host_visible: true,
                index: false,
                indirect: false,
                name: "mapped",
            })
            .unwrap();
        buffer.mapped_mut().unwrap()[..4].copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(&buffer.mapped().unwrap()[..4], &[1, 2, 3, 4]);
        assert!(backend.surface().is_none());
        backend.destroy(GpuObject::Buffer(buffer));
    }

    #[test]
    fn test_upload_and_fences() {
        let Some(backend) = try_backend() else {
            return;
        };
        let buffer = backend
            .create_buffer(&GfxBufferDesc {
                size: 16,
                host_visible: false,
                index: true,
                indirect: false,
                name: "device-local",
            })
            .unwrap();
        let image = backend
            .create_image(&GfxImageDesc {
                extent: UVec2::new(4, 4),
                format: ImageFormat::Rgba32,
                host_visible: false,
                renderer_output: false,
                name: "texture",
            })
            .unwrap();
        let pixels = vec![255u8; 4 * 4 * 4];
        backend
            .execute_transfers(
                &[
                    TransferOp::UploadBuffer {
                        dst: &buffer,
                        data: &[0u8; 16],
                    },
                    TransferOp::UploadImage {
                        dst: &image,
                        data: &pixels,
                    },
                ],
                "upload",
            )
            .unwrap();

        let signalled = backend.create_fence(true, "signalled").unwrap();
        backend.wait_fence(&signalled, 0).unwrap();
        assert!(backend.is_fence_signalled(&signalled).unwrap());
        backend.reset_fence(&signalled).unwrap();
        assert!(matches!(backend.wait_fence(&signalled, 0), Err(GfxError::Timeout(_))));

        backend.destroy(GpuObject::Fence(signalled));
        backend.destroy(GpuObject::Image(image));
        backend.destroy(GpuObject::Buffer(buffer));
        backend.wait_idle().unwrap();
    }

    #[test]
    fn test_staging_layout_alignment() {
        let (offsets, total) = VulkanBackend::staging_layout([3, 16, 20]);
        assert_eq!(offsets, vec![0, 16, 32]);
        assert_eq!(total, 64);
    }

    #[test]
    fn test_staging_layout_empty() {
        let (offsets, total) = VulkanBackend::staging_layout([]);
        assert!(offsets.is_empty());
        assert_eq!(total, 0);
    }
}
