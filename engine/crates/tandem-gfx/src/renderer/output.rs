use glam::UVec2;

use crate::resources::resource::ResourceHandle;

/// Renderer 绘制的目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// 离屏渲染到同一个 Renderer 内带有 `RENDERER_OUTPUT` flag 的 image 资源
    Image(ImageOutput),
    /// 渲染到窗口表面的 swapchain image
    Window,
}

/// 离屏输出
///
/// 多个 colour attachment 用于双缓冲或三缓冲，每个 attachment 对应一个 framebuffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOutput {
    pub colour_attachments: Vec<ResourceHandle>,
}

impl ImageOutput {
    pub fn new(colour_attachments: impl IntoIterator<Item = ResourceHandle>) -> Self {
        Self {
            colour_attachments: colour_attachments.into_iter().collect(),
        }
    }
}

impl Output {
    #[inline]
    pub fn is_window(&self) -> bool {
        matches!(self, Self::Window)
    }
}

/// 裁剪矩形，像素单位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScissorRegion {
    pub offset: UVec2,
    pub extent: UVec2,
}

/// 获取 swapchain image 时需要 signal 的同步对象
///
/// 同步对象由 Renderer 持有，这里只选择是否使用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireInfo {
    /// GPU 侧等待：提交的命令会等待该 semaphore
    pub signal_semaphore: bool,
    /// CPU 侧可见：render() 会检查该 fence 是否已经 signal
    pub signal_fence: bool,
    pub timeout_ns: u64,
}

impl Default for AcquireInfo {
    fn default() -> Self {
        Self {
            signal_semaphore: true,
            signal_fence: false,
            timeout_ns: u64::MAX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { image_index: u32, suboptimal: bool },
    /// swapchain 已经失效，需要调用 `handle_surface_resized`
    OutOfDate,
}
