bitflags::bitflags! {
    /// Renderer 构造时读取的选项
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RendererOptions: u32 {
        /// 不创建 depth attachment，也不做深度测试
        const NO_DEPTH_TESTING = 1 << 0;
        const ALPHA_BLENDING = 1 << 1;
        /// render() 阻塞直到 GPU 完成本帧
        const RENDER_WAIT = 1 << 2;
        /// 保留 output 之前的内容，不做 clear
        const NO_CLEAR_OUTPUT = 1 << 3;
        /// 渲染到 swapchain image 但是不 present
        const NO_PRESENT = 1 << 4;
        /// compute renderer 的 render() 阻塞直到 GPU 完成
        const BLOCKING_COMPUTE = 1 << 5;
    }
}

impl RendererOptions {
    /// 提交之后是否需要在 CPU 上等待 fence
    #[inline]
    pub fn waits_on_submit(self) -> bool {
        self.intersects(Self::RENDER_WAIT | Self::BLOCKING_COMPUTE)
    }
}

/// 进程启动时选定的图形后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum RenderBackend {
    #[default]
    Vulkan,
    OpenGL,
    /// CPU 上模拟的后端，用于测试
    Headless,
}
