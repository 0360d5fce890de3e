use glam::{UVec2, UVec3, Vec4};

use crate::backend::{BindingLayout, BufferComponent, ImageComponent, LoadOp};
use crate::commands::command_list::CommandList;
use crate::renderer::shader::ShaderKind;
use crate::resources::image_format::ImageFormat;
use crate::resources::sampler::GfxSamplerDesc;

/// 所有 headless 对象共享的 id 空间，用于生命周期追踪
pub type ObjectId = u64;

/// host visible 对象的映射，内存本身由后端的内存表持有，销毁对象时释放
#[derive(Debug, Clone, Copy)]
pub(crate) struct HostMapping {
    pub ptr: *mut u8,
    pub len: usize,
}

impl HostMapping {
    fn slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    #[allow(clippy::mut_from_ref)]
    fn slice_mut(&self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

/// 数据保存在后端的内存表中；host visible 的 buffer 额外持有一个映射
///
/// alias 与原对象共享 id 与内存
#[derive(Debug)]
pub struct HeadlessBuffer {
    pub(crate) id: ObjectId,
    pub(crate) size: usize,
    pub(crate) mapping: Option<HostMapping>,
    pub(crate) alias: bool,
}

impl HeadlessBuffer {
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[inline]
    pub fn is_alias(&self) -> bool {
        self.alias
    }
}

impl BufferComponent for HeadlessBuffer {
    #[inline]
    fn size(&self) -> usize {
        self.size
    }

    fn mapped(&self) -> Option<&[u8]> {
        self.mapping.as_ref().map(HostMapping::slice)
    }

    fn mapped_mut(&mut self) -> Option<&mut [u8]> {
        self.mapping.as_ref().map(HostMapping::slice_mut)
    }
}

#[derive(Debug)]
pub struct HeadlessImage {
    pub(crate) id: ObjectId,
    pub(crate) extent: UVec2,
    pub(crate) format: ImageFormat,
    pub(crate) row_pitch: usize,
    pub(crate) mapping: Option<HostMapping>,
    pub(crate) alias: bool,
}

impl HeadlessImage {
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[inline]
    pub fn is_alias(&self) -> bool {
        self.alias
    }
}

impl ImageComponent for HeadlessImage {
    #[inline]
    fn extent(&self) -> UVec2 {
        self.extent
    }

    #[inline]
    fn format(&self) -> ImageFormat {
        self.format
    }

    fn row_pitch(&self) -> Option<usize> {
        self.mapping.is_some().then_some(self.row_pitch)
    }

    fn mapped_mut(&mut self) -> Option<&mut [u8]> {
        self.mapping.as_ref().map(HostMapping::slice_mut)
    }
}

#[derive(Debug)]
pub struct HeadlessSampler {
    pub(crate) id: ObjectId,
    pub(crate) desc: GfxSamplerDesc,
}

impl HeadlessSampler {
    #[inline]
    pub fn desc(&self) -> GfxSamplerDesc {
        self.desc
    }
}

/// 一个 descriptor set：storage buffer binding 与 image 数组
#[derive(Debug, Clone, Default)]
pub(crate) struct HeadlessSet {
    pub buffers: Vec<Option<ObjectId>>,
    pub images: Vec<(ObjectId, ObjectId)>,
}

#[derive(Debug)]
pub struct HeadlessBindings {
    pub(crate) id: ObjectId,
    pub(crate) layout: BindingLayout,
    pub(crate) sets: Vec<HeadlessSet>,
}

impl HeadlessBindings {
    /// 第 `set` 个 descriptor set 中 `binding` 上的 buffer
    pub fn bound_buffer(&self, set: usize, binding: usize) -> Option<ObjectId> {
        self.sets.get(set)?.buffers.get(binding).copied().flatten()
    }

    /// 第 `set` 个 descriptor set 中 image 数组的内容：(image, sampler)
    pub fn bound_images(&self, set: usize) -> &[(ObjectId, ObjectId)] {
        self.sets.get(set).map_or(&[], |s| s.images.as_slice())
    }

    #[inline]
    pub fn set_count(&self) -> usize {
        self.sets.len()
    }

    #[inline]
    pub fn layout(&self) -> BindingLayout {
        self.layout
    }
}

#[derive(Debug)]
pub struct HeadlessRenderPass {
    pub(crate) id: ObjectId,
    pub(crate) colour_format: ImageFormat,
    pub(crate) load: LoadOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColourTarget {
    Image(ObjectId),
    Surface(u32),
}

#[derive(Debug)]
pub struct HeadlessFramebuffer {
    pub(crate) id: ObjectId,
    pub(crate) colour: ColourTarget,
    pub(crate) depth: Option<ObjectId>,
    pub(crate) format: ImageFormat,
    pub(crate) extent: UVec2,
    pub(crate) load: LoadOp,
}

#[derive(Debug)]
pub struct HeadlessPipeline {
    pub(crate) id: ObjectId,
    pub(crate) kind: ShaderKind,
    /// compute shader 的字节，用来查找注册的 CPU kernel
    pub(crate) compute_code: Option<Vec<u8>>,
    pub(crate) wireframe: bool,
}

impl HeadlessPipeline {
    #[inline]
    pub fn is_wireframe(&self) -> bool {
        self.wireframe
    }
}

/// 录制时解析好的操作，提交时在 CPU 上执行
#[derive(Debug, Clone)]
pub(crate) enum HeadlessOp {
    Clear {
        target: ColourTarget,
        format: ImageFormat,
        extent: UVec2,
        colour: Vec4,
    },
    Draw {
        vertex_count: u32,
    },
    Dispatch {
        code: Option<Vec<u8>>,
        set: Option<usize>,
        groups: UVec3,
    },
}

#[derive(Debug, Default)]
pub struct HeadlessCommandBuffer {
    pub(crate) id: ObjectId,
    pub(crate) commands: CommandList,
    pub(crate) ops: Vec<HeadlessOp>,
    /// 录制时引用到的对象
    pub(crate) referenced: Vec<ObjectId>,
}

impl HeadlessCommandBuffer {
    #[inline]
    pub fn commands(&self) -> &CommandList {
        &self.commands
    }
}

#[derive(Debug)]
pub struct HeadlessFence {
    pub(crate) id: ObjectId,
}

#[derive(Debug)]
pub struct HeadlessSemaphore {
    pub(crate) id: ObjectId,
}
