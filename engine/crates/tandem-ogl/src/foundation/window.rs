use glam::UVec2;

/// 持有 GL context 的窗口
///
/// GL 的 default framebuffer 由窗口系统管理，后端只需要知道它的尺寸并在呈现时交换缓冲区
pub trait GlWindow {
    /// default framebuffer 当前的像素尺寸
    fn extent(&self) -> UVec2;

    /// 窗口系统失败时返回错误描述，呈现结果视为表面丢失
    fn swap_buffers(&self) -> Result<(), String>;
}
