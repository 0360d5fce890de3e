use std::cell::Cell;

use glam::UVec2;
use glow::HasContext;

use crate::commands::command_buffer::GlCommandBuffer;
use crate::commands::sync::{GlFence, GlSemaphore};
use crate::error::construction_error;
use crate::foundation::debug_output::GlDebugOutput;
use crate::foundation::window::GlWindow;
use crate::pipelines::pipeline::GlPipeline;
use crate::pipelines::render_pass::{GlFramebuffer, GlRenderPass};
use crate::resources::bindings::GlBindings;
use crate::resources::buffer::GlBuffer;
use crate::resources::image::GlImage;
use crate::resources::sampler::GlSampler;
use tandem_gfx::backend::{
    AttachmentRef, BindingLayout, BindingWrite, FramebufferDesc, GfxBackend, GfxBufferDesc, GfxImageDesc, GpuObject,
    PipelineDesc, RecordTargets, RenderPassDesc, RenderWorkSubmitResult, SubmitInfo, SurfaceInfo, TransferOp,
};
use tandem_gfx::commands::command_list::CommandList;
use tandem_gfx::config::{GfxConfig, PresentMode};
use tandem_gfx::renderer::output::AcquireOutcome;
use tandem_gfx::resources::image_format::ImageFormat;
use tandem_gfx::resources::resource_storage::ResourceStorage;
use tandem_gfx::resources::sampler::GfxSamplerDesc;
use tandem_gfx::{GfxError, GfxResult, RenderBackend};

/// 需要 SSBO、compute、immutable storage、multi draw indirect
const MIN_GL_VERSION: (u32, u32) = (4, 5);

/// default framebuffer 的格式，由窗口系统决定，对外统一报告为 RGBA8
const SURFACE_FORMAT: ImageFormat = ImageFormat::Rgba32;

/// OpenGL 4.5 后端
///
/// GL context 必须已经在当前线程上 current，backend 不负责创建或销毁 context。
/// 呈现到窗口时 default framebuffer 就是唯一的 "swapchain image"。
pub struct GlBackend {
    gl: glow::Context,
    /// core profile 要求 draw 时绑定一个 VAO，顶点数据全部来自 storage buffer
    vertex_array: glow::NativeVertexArray,

    window: Option<Box<dyn GlWindow>>,
    /// 最近一次 recreate_surface 时窗口的尺寸
    surface_extent: Cell<UVec2>,
}
// new & init
impl GlBackend {
    pub fn new(mut gl: glow::Context, window: Option<Box<dyn GlWindow>>, config: &GfxConfig) -> GfxResult<Self> {
        let _span = tracy_client::span!("GlBackend::new");

        let version = gl.version();
        if !Self::supports_version(version.major, version.minor, version.is_embedded) {
            return Err(construction_error(
                "GlBackend",
                format!(
                    "OpenGL {}.{} is required, the context provides {}.{}{}",
                    MIN_GL_VERSION.0,
                    MIN_GL_VERSION.1,
                    version.major,
                    version.minor,
                    if version.is_embedded { " ES" } else { "" }
                ),
            ));
        }

        if config.enable_validation {
            GlDebugOutput::install(&mut gl);
        }
        if config.present_mode != PresentMode::Fifo {
            log::info!(
                "present mode {:?} is controlled by the swap interval of the GL window",
                config.present_mode
            );
        }

        let vertex_array = unsafe { gl.create_vertex_array() }.map_err(|e| construction_error("GlBackend::vao", e))?;
        unsafe {
            gl.enable(glow::FRAMEBUFFER_SRGB);
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 4);
            log::info!(
                "OpenGL device: {} ({})",
                gl.get_parameter_string(glow::RENDERER),
                gl.get_parameter_string(glow::VERSION)
            );
        }

        let surface_extent = window.as_ref().map_or(UVec2::ZERO, |w| w.extent());
        Ok(Self {
            gl,
            vertex_array,
            window,
            surface_extent: Cell::new(surface_extent),
        })
    }

    pub fn supports_version(major: u32, minor: u32, is_embedded: bool) -> bool {
        !is_embedded && (major, minor) >= MIN_GL_VERSION
    }
}
// getters
impl GlBackend {
    #[inline]
    pub fn gl(&self) -> &glow::Context {
        &self.gl
    }

    fn window(&self) -> GfxResult<&dyn GlWindow> {
        self.window
            .as_deref()
            .ok_or_else(|| GfxError::Unsupported("GlBackend was created without a window".to_string()))
    }
}
// tools
impl GlBackend {
    /// 窗口尺寸与 surface 不一致时 default framebuffer 需要重建，最小化的窗口也无法呈现
    pub fn acquire_outcome(window_extent: UVec2, surface_extent: UVec2) -> AcquireOutcome {
        if window_extent != surface_extent || window_extent.cmpeq(UVec2::ZERO).any() {
            AcquireOutcome::OutOfDate
        } else {
            AcquireOutcome::Acquired {
                image_index: 0,
                suboptimal: false,
            }
        }
    }

    pub fn present_result(swap: Result<(), String>, resized: bool) -> RenderWorkSubmitResult {
        match swap {
            Ok(()) if resized => RenderWorkSubmitResult::SuccessSuboptimal,
            Ok(()) => RenderWorkSubmitResult::Success,
            Err(e) => {
                log::error!("failed to swap buffers: {e}");
                RenderWorkSubmitResult::FailSurfaceLost
            }
        }
    }
}
impl Drop for GlBackend {
    fn drop(&mut self) {
        unsafe {
            self.gl.finish();
            self.gl.delete_vertex_array(self.vertex_array);
        }
    }
}

impl GfxBackend for GlBackend {
    const KIND: RenderBackend = RenderBackend::OpenGL;

    type Buffer = GlBuffer;
    type Image = GlImage;
    type Sampler = GlSampler;
    type Bindings = GlBindings;
    type RenderPass = GlRenderPass;
    type Framebuffer = GlFramebuffer;
    type Pipeline = GlPipeline;
    type CommandBuffer = GlCommandBuffer;
    type Fence = GlFence;
    type Semaphore = GlSemaphore;

    fn create_buffer(&self, desc: &GfxBufferDesc) -> GfxResult<Self::Buffer> {
        GlBuffer::from_desc(&self.gl, desc)
    }

    fn create_image(&self, desc: &GfxImageDesc) -> GfxResult<Self::Image> {
        GlImage::new(&self.gl, desc)
    }

    fn alias_buffer(&self, buffer: &Self::Buffer) -> Self::Buffer {
        buffer.alias()
    }

    fn alias_image(&self, image: &Self::Image) -> Self::Image {
        image.alias()
    }

    fn create_sampler(&self, desc: &GfxSamplerDesc, name: &str) -> GfxResult<Self::Sampler> {
        GlSampler::new(&self.gl, desc, name)
    }

    fn create_bindings(&self, layout: &BindingLayout, set_count: usize, name: &str) -> GfxResult<Self::Bindings> {
        Ok(GlBindings::new(layout, set_count, name))
    }

    fn write_bindings(&self, bindings: &mut Self::Bindings, set: usize, writes: &[BindingWrite<'_, Self>]) {
        bindings.write(set, writes);
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> GfxResult<Self::RenderPass> {
        Ok(GlRenderPass::new(desc))
    }

    fn create_framebuffer(&self, desc: &FramebufferDesc<'_, Self>) -> GfxResult<Self::Framebuffer> {
        match desc.colour {
            AttachmentRef::Surface(index) => {
                if self.window.is_none() || index != 0 {
                    return Err(GfxError::InvalidOutputConfiguration(format!(
                        "GfxFramebuffer::{}: surface image {index} does not exist",
                        desc.name
                    )));
                }
                Ok(GlFramebuffer::default_framebuffer(desc.extent))
            }
            AttachmentRef::Image(image) => GlFramebuffer::new(&self.gl, image, desc.depth, desc.extent, desc.name),
        }
    }

    fn create_pipeline(&self, desc: &PipelineDesc<'_, Self>) -> GfxResult<Self::Pipeline> {
        GlPipeline::new(&self.gl, desc)
    }

    fn create_fence(&self, signalled: bool, name: &str) -> GfxResult<Self::Fence> {
        Ok(GlFence::new(signalled, name))
    }

    fn wait_fence(&self, fence: &Self::Fence, timeout_ns: u64) -> GfxResult<()> {
        let _span = tracy_client::span!("GlBackend::wait_fence");
        fence.wait(&self.gl, timeout_ns)
    }

    fn reset_fence(&self, fence: &Self::Fence) -> GfxResult<()> {
        fence.reset(&self.gl);
        Ok(())
    }

    fn is_fence_signalled(&self, fence: &Self::Fence) -> GfxResult<bool> {
        Ok(fence.is_signalled(&self.gl))
    }

    fn create_semaphore(&self, name: &str) -> GfxResult<Self::Semaphore> {
        Ok(GlSemaphore::new(name))
    }

    fn allocate_command_buffer(&self, name: &str) -> GfxResult<Self::CommandBuffer> {
        Ok(GlCommandBuffer::new(name))
    }

    fn record(
        &self,
        command_buffer: &mut Self::CommandBuffer,
        commands: &CommandList,
        targets: &RecordTargets<'_, Self>,
    ) -> GfxResult<()> {
        command_buffer.record_list(commands, targets)
    }

    /// 单个 context 上的命令按顺序执行，wait 与 signal 的 semaphore 不需要任何操作
    fn submit(
        &self,
        command_buffer: &Self::CommandBuffer,
        info: &SubmitInfo<'_, Self>,
        storage: &mut ResourceStorage<Self>,
    ) -> GfxResult<()> {
        let _span = tracy_client::span!("GlBackend::submit");

        // host visible 的 image 在 CPU 端被修改过，需要先拷贝到 texture
        for handle in storage.handles() {
            if let Some(image) = storage.get_component(handle)?.image()
                && image.flush_pixel_buffer(&self.gl)
            {
                log::trace!("{}: uploaded pixel buffer of {}", command_buffer.name(), image.name());
            }
        }

        command_buffer.execute(&self.gl, self.vertex_array, storage.bindings())?;
        if let Some(fence) = info.fence {
            fence.signal_after_commands(&self.gl)?;
        }
        unsafe { self.gl.flush() };
        Ok(())
    }

    fn execute_transfers(&self, ops: &[TransferOp<'_, Self>], name: &str) -> GfxResult<()> {
        let _span = tracy_client::span!("GlBackend::execute_transfers");
        if ops.is_empty() {
            return Ok(());
        }

        for op in ops {
            match op {
                TransferOp::UploadBuffer { dst, data } => dst.upload(&self.gl, data)?,
                TransferOp::UploadImage { dst, data } => dst.upload(&self.gl, data)?,
            }
        }
        log::debug!("{name}: {} transfers executed", ops.len());
        unsafe { self.gl.finish() };
        Ok(())
    }

    fn surface(&self) -> Option<SurfaceInfo> {
        self.window.as_ref().map(|_| SurfaceInfo {
            extent: self.surface_extent.get(),
            image_count: 1,
            format: SURFACE_FORMAT,
        })
    }

    /// default framebuffer 总是可用，fence 立即进入 signalled
    fn acquire_next_image(
        &self,
        _signal_semaphore: Option<&Self::Semaphore>,
        signal_fence: Option<&Self::Fence>,
        _timeout_ns: u64,
    ) -> GfxResult<AcquireOutcome> {
        let window = self.window()?;
        let outcome = Self::acquire_outcome(window.extent(), self.surface_extent.get());
        if let (AcquireOutcome::Acquired { .. }, Some(fence)) = (outcome, signal_fence) {
            fence.signal_now(&self.gl);
        }
        Ok(outcome)
    }

    fn present(&self, image_index: u32, _wait_semaphores: &[&Self::Semaphore]) -> GfxResult<RenderWorkSubmitResult> {
        let _span = tracy_client::span!("GlBackend::present");
        let window = self.window()?;
        if image_index != 0 {
            return Err(GfxError::NoAcquiredImage(format!("surface image {image_index} does not exist")));
        }
        let resized = window.extent() != self.surface_extent.get();
        Ok(Self::present_result(window.swap_buffers(), resized))
    }

    fn recreate_surface(&self) -> GfxResult<()> {
        let extent = self.window()?.extent();
        log::info!("GL surface resized to {}x{}", extent.x, extent.y);
        self.surface_extent.set(extent);
        Ok(())
    }

    fn destroy(&self, object: GpuObject<Self>) {
        let gl = &self.gl;
        match object {
            GpuObject::Buffer(buffer) => buffer.destroy(gl),
            GpuObject::Image(image) => image.destroy(gl),
            GpuObject::Sampler(sampler) => sampler.destroy(gl),
            GpuObject::Framebuffer(framebuffer) => framebuffer.destroy(gl),
            GpuObject::Pipeline(pipeline) => pipeline.destroy(gl),
            GpuObject::Fence(fence) => fence.destroy(gl),
            // 只存在于 CPU 端
            GpuObject::Bindings(_) | GpuObject::RenderPass(_) | GpuObject::CommandBuffer(_) | GpuObject::Semaphore(_) => {}
        }
    }

    fn wait_idle(&self) -> GfxResult<()> {
        unsafe { self.gl.finish() };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_requirement() {
        assert!(GlBackend::supports_version(4, 5, false));
        assert!(GlBackend::supports_version(4, 6, false));
        assert!(!GlBackend::supports_version(4, 3, false));
        assert!(!GlBackend::supports_version(3, 3, false));
        // ES 3.2 没有 immutable buffer storage
        assert!(!GlBackend::supports_version(3, 2, true));
    }

    #[test]
    fn test_acquire_after_resize() {
        let extent = UVec2::new(800, 600);
        assert_eq!(
            GlBackend::acquire_outcome(extent, extent),
            AcquireOutcome::Acquired {
                image_index: 0,
                suboptimal: false
            }
        );
        assert_eq!(GlBackend::acquire_outcome(UVec2::new(1024, 768), extent), AcquireOutcome::OutOfDate);
        // 最小化
        assert_eq!(GlBackend::acquire_outcome(UVec2::ZERO, UVec2::ZERO), AcquireOutcome::OutOfDate);
    }

    #[test]
    fn test_present_result() {
        tandem_crate_tools::init_log::init_test_log();
        assert_eq!(GlBackend::present_result(Ok(()), false), RenderWorkSubmitResult::Success);
        assert_eq!(GlBackend::present_result(Ok(()), true), RenderWorkSubmitResult::SuccessSuboptimal);
        assert_eq!(
            GlBackend::present_result(Err("surface destroyed".to_string()), false),
            RenderWorkSubmitResult::FailSurfaceLost
        );
    }
}
