use glam::{UVec3, Vec4};

use crate::resources::resource::ResourceHandle;

/// Renderer 当前执行的图形或计算配置
///
/// 种类在构造时确定，之后只能修改其中的参数
#[derive(Debug, Clone, PartialEq)]
pub enum RenderState {
    Graphics(GraphicsState),
    Compute(ComputeState),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsState {
    pub clear_colour: Vec4,
    /// indirect draw 命令所在的 buffer
    pub draw_buffer: Option<ResourceHandle>,
    pub index_buffer: Option<ResourceHandle>,
    /// 没有 draw buffer 时，每帧绘制的三角形数量
    pub tri_count: u32,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            clear_colour: Vec4::new(0.0, 0.0, 0.0, 1.0),
            draw_buffer: None,
            index_buffer: None,
            tri_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeState {
    /// dispatch 的 work group 数量
    pub kernel: UVec3,
}

impl Default for ComputeState {
    fn default() -> Self {
        Self { kernel: UVec3::ONE }
    }
}

impl Default for RenderState {
    fn default() -> Self {
        Self::Graphics(GraphicsState::default())
    }
}

impl RenderState {
    #[inline]
    pub fn is_compute(&self) -> bool {
        matches!(self, Self::Compute(_))
    }

    #[inline]
    pub fn graphics(&self) -> Option<&GraphicsState> {
        match self {
            Self::Graphics(state) => Some(state),
            Self::Compute(_) => None,
        }
    }

    #[inline]
    pub fn graphics_mut(&mut self) -> Option<&mut GraphicsState> {
        match self {
            Self::Graphics(state) => Some(state),
            Self::Compute(_) => None,
        }
    }

    #[inline]
    pub fn compute(&self) -> Option<&ComputeState> {
        match self {
            Self::Compute(state) => Some(state),
            Self::Graphics(_) => None,
        }
    }
}
