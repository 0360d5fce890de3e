//! 后端抽象
//!
//! 核心层对 Vulkan 与 OpenGL 一视同仁：所有 GPU 对象都通过 [`GfxBackend`] 的关联类型表示，
//! 核心层的类型以后端作为泛型参数，在编译期静态分发。同一个进程只会使用一种后端。

use glam::UVec2;

use crate::commands::command_list::CommandList;
use crate::error::{GfxError, GfxResult};
use crate::renderer::options::RenderBackend;
use crate::renderer::output::AcquireOutcome;
use crate::renderer::output_manager::OutputManager;
use crate::renderer::pipeline_manager::PipelineManager;
use crate::renderer::shader::{ShaderInfo, ShaderKind};
use crate::resources::image_format::ImageFormat;
use crate::resources::resource::ResourceHandle;
use crate::resources::resource_storage::ResourceStorage;
use crate::resources::sampler::GfxSamplerDesc;

/// 后端 buffer 对象需要提供的能力
pub trait BufferComponent {
    fn size(&self) -> usize;
    /// host visible 的 buffer 返回持久映射的内存
    fn mapped(&self) -> Option<&[u8]>;
    fn mapped_mut(&mut self) -> Option<&mut [u8]>;
}

/// 后端 image 对象需要提供的能力
pub trait ImageComponent {
    fn extent(&self) -> UVec2;
    fn format(&self) -> ImageFormat;
    /// host visible 的 image 在映射内存中每一行的字节数（可能包含对齐）
    fn row_pitch(&self) -> Option<usize>;
    fn mapped_mut(&mut self) -> Option<&mut [u8]>;
}

#[derive(Debug, Clone)]
pub struct GfxBufferDesc<'a> {
    pub size: usize,
    /// CPU 持久映射；否则只存在于 GPU，数据通过 transfer 上传
    pub host_visible: bool,
    pub index: bool,
    pub indirect: bool,
    pub name: &'a str,
}

#[derive(Debug, Clone)]
pub struct GfxImageDesc<'a> {
    pub extent: UVec2,
    pub format: ImageFormat,
    pub host_visible: bool,
    /// 可以作为 color attachment
    pub renderer_output: bool,
    pub name: &'a str,
}

/// descriptor 布局：先是 `buffer_count` 个 storage buffer binding，
/// 然后是一个长度为 `image_count` 的 combined image sampler 数组（binding = buffer_count）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BindingLayout {
    pub buffer_count: u32,
    pub image_count: u32,
}

impl BindingLayout {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer_count == 0 && self.image_count == 0
    }

    #[inline]
    pub fn image_binding(&self) -> u32 {
        self.buffer_count
    }
}

pub enum BindingWrite<'a, B: GfxBackend> {
    Buffer {
        binding: u32,
        buffer: &'a B::Buffer,
    },
    Images {
        binding: u32,
        images: Vec<(&'a B::Image, &'a B::Sampler)>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOp {
    Clear,
    Load,
}

/// render pass 结束之后 colour attachment 所处的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalLayout {
    Present,
    ShaderRead,
}

#[derive(Debug, Clone)]
pub struct RenderPassDesc<'a> {
    pub colour_format: ImageFormat,
    pub depth_format: Option<ImageFormat>,
    pub load: LoadOp,
    pub final_layout: FinalLayout,
    /// depth 的内容只有在不 present 时才需要保留
    pub store_depth: bool,
    pub name: &'a str,
}

pub enum AttachmentRef<'a, B: GfxBackend> {
    Image(&'a B::Image),
    /// 第 n 个 swapchain image
    Surface(u32),
}

pub struct FramebufferDesc<'a, B: GfxBackend> {
    pub render_pass: &'a B::RenderPass,
    pub colour: AttachmentRef<'a, B>,
    pub depth: Option<&'a B::Image>,
    pub extent: UVec2,
    pub name: &'a str,
}

pub struct PipelineDesc<'a, B: GfxBackend> {
    pub shader: &'a ShaderInfo,
    pub kind: ShaderKind,
    pub bindings: Option<&'a B::Bindings>,
    /// compute pipeline 没有 render pass
    pub render_pass: Option<&'a B::RenderPass>,
    pub depth_test: bool,
    pub alpha_blending: bool,
    pub wireframe: bool,
    pub name: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    TopOfPipe,
    ColourAttachmentOutput,
    ComputeShader,
    Transfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Graphics,
    Compute,
}

pub struct SubmitInfo<'a, B: GfxBackend> {
    pub queue: QueueKind,
    pub waits: Vec<(&'a B::Semaphore, PipelineStage)>,
    pub signals: Vec<&'a B::Semaphore>,
    pub fence: Option<&'a B::Fence>,
}

/// 一次性 transfer 命令，数据总是紧密排列
pub enum TransferOp<'a, B: GfxBackend> {
    UploadBuffer { dst: &'a B::Buffer, data: &'a [u8] },
    UploadImage { dst: &'a B::Image, data: &'a [u8] },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub extent: UVec2,
    pub image_count: u32,
    pub format: ImageFormat,
}

/// 一次提交与呈现的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderWorkSubmitResult {
    Success,
    /// 呈现成功，但 swapchain 与表面不再完全匹配，建议重建
    SuccessSuboptimal,
    /// swapchain 失效，需要重建
    FailOutOfDate,
    FailAccessDenied,
    FailSurfaceLost,
    FailFatalError,
}

impl RenderWorkSubmitResult {
    #[inline]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::SuccessSuboptimal)
    }
}

/// 任意一种后端对象，用于统一的延迟销毁
pub enum GpuObject<B: GfxBackend> {
    Buffer(B::Buffer),
    Image(B::Image),
    Sampler(B::Sampler),
    Bindings(B::Bindings),
    RenderPass(B::RenderPass),
    Framebuffer(B::Framebuffer),
    Pipeline(B::Pipeline),
    CommandBuffer(B::CommandBuffer),
    Fence(B::Fence),
    Semaphore(B::Semaphore),
}

impl<B: GfxBackend> GpuObject<B> {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Buffer(_) => "GfxBuffer",
            Self::Image(_) => "GfxImage",
            Self::Sampler(_) => "GfxSampler",
            Self::Bindings(_) => "GfxBindings",
            Self::RenderPass(_) => "GfxRenderPass",
            Self::Framebuffer(_) => "GfxFramebuffer",
            Self::Pipeline(_) => "GfxPipeline",
            Self::CommandBuffer(_) => "GfxCommandBuffer",
            Self::Fence(_) => "GfxFence",
            Self::Semaphore(_) => "GfxSemaphore",
        }
    }
}

/// 录制命令时，后端通过它把命令中的 handle 与下标解析成具体对象
pub struct RecordTargets<'a, B: GfxBackend> {
    pub storage: &'a ResourceStorage<B>,
    pub output: Option<&'a OutputManager<B>>,
    pub pipeline: &'a PipelineManager<B>,
}

impl<'a, B: GfxBackend> RecordTargets<'a, B> {
    pub fn buffer(&self, handle: ResourceHandle) -> GfxResult<&'a B::Buffer> {
        self.storage.get_component(handle)?.buffer().ok_or_else(|| {
            GfxError::InvalidHandle(format!("resource {handle} is not a buffer"))
        })
    }

    #[inline]
    pub fn bindings(&self) -> Option<&'a B::Bindings> {
        self.storage.bindings()
    }

    #[inline]
    pub fn pipeline(&self) -> &'a B::Pipeline {
        self.pipeline.get_pipeline()
    }

    pub fn output(&self) -> GfxResult<&'a OutputManager<B>> {
        self.output
            .ok_or_else(|| GfxError::InvalidOutputConfiguration("compute renderer has no output".to_string()))
    }

    pub fn framebuffer(&self, index: usize) -> GfxResult<&'a B::Framebuffer> {
        self.output()?.get_output_framebuffers().get(index).ok_or_else(|| {
            GfxError::InvalidOutputConfiguration(format!("framebuffer {index} does not exist"))
        })
    }

    pub fn render_pass(&self) -> GfxResult<&'a B::RenderPass> {
        Ok(self.output()?.get_render_pass())
    }
}

/// 图形后端需要实现的能力集合
///
/// 所有方法都只需要 `&self`：后端内部自己管理 queue、command pool 等需要修改的状态。
/// 创建出来的对象最终都必须交还给 `destroy`。
pub trait GfxBackend: Sized + 'static {
    const KIND: RenderBackend;

    type Buffer: BufferComponent;
    type Image: ImageComponent;
    type Sampler;
    /// descriptor set layout + pool + sets
    type Bindings;
    type RenderPass;
    type Framebuffer;
    /// 包含 pipeline layout
    type Pipeline;
    type CommandBuffer;
    type Fence;
    type Semaphore;

    // 资源
    fn create_buffer(&self, desc: &GfxBufferDesc) -> GfxResult<Self::Buffer>;
    fn create_image(&self, desc: &GfxImageDesc) -> GfxResult<Self::Image>;
    fn create_sampler(&self, desc: &GfxSamplerDesc, name: &str) -> GfxResult<Self::Sampler>;
    /// 与 `buffer` 共享同一块内存的对象，交给 `destroy` 时不会释放任何东西
    fn alias_buffer(&self, buffer: &Self::Buffer) -> Self::Buffer;
    fn alias_image(&self, image: &Self::Image) -> Self::Image;

    // descriptor
    fn create_bindings(&self, layout: &BindingLayout, set_count: usize, name: &str) -> GfxResult<Self::Bindings>;
    fn write_bindings(&self, bindings: &mut Self::Bindings, set: usize, writes: &[BindingWrite<'_, Self>]);

    // output 与 pipeline
    fn create_render_pass(&self, desc: &RenderPassDesc) -> GfxResult<Self::RenderPass>;
    fn create_framebuffer(&self, desc: &FramebufferDesc<'_, Self>) -> GfxResult<Self::Framebuffer>;
    fn create_pipeline(&self, desc: &PipelineDesc<'_, Self>) -> GfxResult<Self::Pipeline>;

    // 同步
    fn create_fence(&self, signalled: bool, name: &str) -> GfxResult<Self::Fence>;
    /// 超时返回 `GfxError::Timeout`
    fn wait_fence(&self, fence: &Self::Fence, timeout_ns: u64) -> GfxResult<()>;
    fn reset_fence(&self, fence: &Self::Fence) -> GfxResult<()>;
    /// 不阻塞地查询 fence 状态
    fn is_fence_signalled(&self, fence: &Self::Fence) -> GfxResult<bool>;
    fn create_semaphore(&self, name: &str) -> GfxResult<Self::Semaphore>;

    // 命令
    fn allocate_command_buffer(&self, name: &str) -> GfxResult<Self::CommandBuffer>;
    /// 重新录制 command buffer，调用者保证它不在 GPU 上执行
    fn record(
        &self,
        command_buffer: &mut Self::CommandBuffer,
        commands: &CommandList,
        targets: &RecordTargets<'_, Self>,
    ) -> GfxResult<()>;
    fn submit(
        &self,
        command_buffer: &Self::CommandBuffer,
        info: &SubmitInfo<'_, Self>,
        storage: &mut ResourceStorage<Self>,
    ) -> GfxResult<()>;
    /// 一次性提交 transfer 命令并等待完成
    fn execute_transfers(&self, ops: &[TransferOp<'_, Self>], name: &str) -> GfxResult<()>;

    // 窗口表面
    fn surface(&self) -> Option<SurfaceInfo>;
    fn acquire_next_image(
        &self,
        signal_semaphore: Option<&Self::Semaphore>,
        signal_fence: Option<&Self::Fence>,
        timeout_ns: u64,
    ) -> GfxResult<AcquireOutcome>;
    fn present(&self, image_index: u32, wait_semaphores: &[&Self::Semaphore]) -> GfxResult<RenderWorkSubmitResult>;
    /// 使用表面的当前尺寸重建 swapchain，调用者保证 GPU 空闲
    fn recreate_surface(&self) -> GfxResult<()>;

    fn destroy(&self, object: GpuObject<Self>);
    fn wait_idle(&self) -> GfxResult<()>;
}
