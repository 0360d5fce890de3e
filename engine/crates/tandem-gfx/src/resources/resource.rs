use glam::UVec2;

use crate::resources::image_format::ImageFormat;

/// 指向 Renderer 内某个资源的 handle
///
/// 值等于资源在 `RendererInfo` 中的插入顺序，在 Renderer 的整个生命周期内保持有效
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceHandle(u32);

impl ResourceHandle {
    #[inline]
    pub(crate) const fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Buffer,
    Image,
}

/// 资源在 Renderer 构造之后允许的修改方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceAccess {
    /// 不允许任何修改，数据只在构造时上传一次
    #[default]
    StaticFixed,
    /// 允许相同大小的重写
    DynamicFixed,
    /// 允许 resize
    DynamicVariable,
}

impl ResourceAccess {
    #[inline]
    pub const fn is_static(self) -> bool {
        matches!(self, Self::StaticFixed)
    }

    #[inline]
    pub const fn is_resizable(self) -> bool {
        matches!(self, Self::DynamicVariable)
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceFlags: u32 {
        const INDEX_BUFFER = 1 << 0;
        const DRAW_INDIRECT_BUFFER = 1 << 1;
        const RENDERER_OUTPUT = 1 << 2;

        const IMAGE_FILTER_NEAREST = 1 << 3;
        const IMAGE_FILTER_LINEAR = 1 << 4;

        const IMAGE_MIP_NEAREST = 1 << 5;
        const IMAGE_MIP_LINEAR = 1 << 6;

        const IMAGE_WRAP_CLAMP_EDGE = 1 << 7;
        const IMAGE_WRAP_REPEAT = 1 << 8;
        const IMAGE_WRAP_MIRRORED_REPEAT = 1 << 9;
    }
}

/// 客户端提供的 buffer 数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferResource {
    access: ResourceAccess,
    flags: ResourceFlags,
    data: Vec<u8>,
}
// new & init
impl BufferResource {
    pub fn from_bytes(access: ResourceAccess, data: Vec<u8>) -> Self {
        Self {
            access,
            flags: ResourceFlags::empty(),
            data,
        }
    }

    /// 由单个 POD 值构造
    pub fn from_one<T: bytemuck::Pod>(value: T, access: ResourceAccess) -> Self {
        Self::from_bytes(access, bytemuck::bytes_of(&value).to_vec())
    }

    /// 由一组 POD 值构造，例如 index 数组
    pub fn from_many<T: bytemuck::Pod>(values: &[T], access: ResourceAccess) -> Self {
        Self::from_bytes(access, bytemuck::cast_slice(values).to_vec())
    }

    /// 数据全部为 0
    pub fn from_uninitialised(size: usize, access: ResourceAccess) -> Self {
        Self::from_bytes(access, vec![0; size])
    }

    /// 占位用的 buffer：只有一个值为 255 的字节
    pub fn null() -> Self {
        Self::from_bytes(ResourceAccess::StaticFixed, vec![255])
    }

    #[inline]
    pub fn with_flags(mut self, flags: ResourceFlags) -> Self {
        self.flags |= flags;
        self
    }
}

/// 客户端提供的 image 数据，总是紧密排列（没有行对齐）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResource {
    access: ResourceAccess,
    flags: ResourceFlags,
    format: ImageFormat,
    dimensions: UVec2,
    data: Vec<u8>,
}
// new & init
impl ImageResource {
    /// # Panic
    /// 数据长度与尺寸不匹配时
    pub fn from_memory(data: Vec<u8>, format: ImageFormat, dimensions: UVec2, access: ResourceAccess) -> Self {
        assert_eq!(
            data.len(),
            Self::byte_size(format, dimensions),
            "image data length does not match {dimensions} {format:?}"
        );
        Self {
            access,
            flags: ResourceFlags::empty(),
            format,
            dimensions,
            data,
        }
    }

    /// 像素全部为 0
    pub fn from_uninitialised(format: ImageFormat, dimensions: UVec2, access: ResourceAccess) -> Self {
        Self::from_memory(vec![0; Self::byte_size(format, dimensions)], format, dimensions, access)
    }

    /// 占位用的 2x2 图像：紫黑相间的棋盘格
    pub fn null() -> Self {
        let purple = [255u8, 0, 255, 255];
        let black = [0u8, 0, 0, 255];
        let data = [purple, black, black, purple].concat();
        Self::from_memory(data, ImageFormat::Rgba32, UVec2::new(2, 2), ResourceAccess::StaticFixed)
    }

    #[inline]
    pub fn with_flags(mut self, flags: ResourceFlags) -> Self {
        self.flags |= flags;
        self
    }

    #[inline]
    pub const fn byte_size(format: ImageFormat, dimensions: UVec2) -> usize {
        format.pixel_size() * dimensions.x as usize * dimensions.y as usize
    }
}
// getters
impl ImageResource {
    #[inline]
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    #[inline]
    pub fn dimensions(&self) -> UVec2 {
        self.dimensions
    }

    /// 一行像素紧密排列时的字节数
    #[inline]
    pub fn tight_row_pitch(&self) -> usize {
        self.format.pixel_size() * self.dimensions.x as usize
    }
}

/// 一个 Buffer 或 Image 资源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Buffer(BufferResource),
    Image(ImageResource),
}

impl From<BufferResource> for Resource {
    fn from(value: BufferResource) -> Self {
        Self::Buffer(value)
    }
}

impl From<ImageResource> for Resource {
    fn from(value: ImageResource) -> Self {
        Self::Image(value)
    }
}

// getters
impl Resource {
    #[inline]
    pub fn ty(&self) -> ResourceType {
        match self {
            Self::Buffer(_) => ResourceType::Buffer,
            Self::Image(_) => ResourceType::Image,
        }
    }

    #[inline]
    pub fn access(&self) -> ResourceAccess {
        match self {
            Self::Buffer(buffer) => buffer.access,
            Self::Image(image) => image.access,
        }
    }

    #[inline]
    pub fn flags(&self) -> ResourceFlags {
        match self {
            Self::Buffer(buffer) => buffer.flags,
            Self::Image(image) => image.flags,
        }
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        match self {
            Self::Buffer(buffer) => &buffer.data,
            Self::Image(image) => &image.data,
        }
    }

    #[inline]
    pub fn as_image(&self) -> Option<&ImageResource> {
        match self {
            Self::Image(image) => Some(image),
            Self::Buffer(_) => None,
        }
    }

    /// 是否需要出现在 descriptor 中
    ///
    /// index buffer、indirect buffer 与 renderer output 通过其他方式绑定
    #[inline]
    pub fn is_shader_visible(&self) -> bool {
        !self
            .flags()
            .intersects(ResourceFlags::INDEX_BUFFER | ResourceFlags::DRAW_INDIRECT_BUFFER | ResourceFlags::RENDERER_OUTPUT)
    }
}
// 内部修改，只通过 Renderer 的 edit 调用
impl Resource {
    #[inline]
    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        match self {
            Self::Buffer(buffer) => &mut buffer.data,
            Self::Image(image) => &mut image.data,
        }
    }

    pub(crate) fn remove_flags(&mut self, flags: ResourceFlags) {
        match self {
            Self::Buffer(buffer) => buffer.flags.remove(flags),
            Self::Image(image) => image.flags.remove(flags),
        }
    }

    /// 改变 buffer 大小：保留 min(old, new) 字节，新增部分为 0
    pub(crate) fn resize_buffer(&mut self, size: usize) {
        if let Self::Buffer(buffer) = self {
            buffer.data.resize(size, 0);
        }
    }

    /// 改变 image 尺寸：按行保留重叠区域，新增部分为 0
    pub(crate) fn resize_image(&mut self, dimensions: UVec2) {
        if let Self::Image(image) = self {
            let pixel = image.format.pixel_size();
            let old_row = image.tight_row_pitch();
            let new_row = pixel * dimensions.x as usize;
            let mut data = vec![0u8; ImageResource::byte_size(image.format, dimensions)];
            let rows = image.dimensions.y.min(dimensions.y) as usize;
            let copy = old_row.min(new_row);
            for row in 0..rows {
                data[row * new_row..row * new_row + copy]
                    .copy_from_slice(&image.data[row * old_row..row * old_row + copy]);
            }
            image.data = data;
            image.dimensions = dimensions;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_resources() {
        let buffer = Resource::from(BufferResource::null());
        assert_eq!(buffer.data(), &[255]);
        assert_eq!(buffer.access(), ResourceAccess::StaticFixed);

        let image = ImageResource::null();
        assert_eq!(image.dimensions(), UVec2::new(2, 2));
        let image = Resource::from(image);
        assert_eq!(&image.data()[0..4], &[255, 0, 255, 255]);
        assert_eq!(&image.data()[4..8], &[0, 0, 0, 255]);
        assert_eq!(&image.data()[12..16], &[255, 0, 255, 255]);
    }

    #[test]
    fn test_from_many_and_uninitialised() {
        let indices = Resource::from(BufferResource::from_many(&[0u32, 1, 2], ResourceAccess::StaticFixed));
        assert_eq!(indices.data().len(), 12);

        let image = ImageResource::from_uninitialised(ImageFormat::Rgba32, UVec2::new(3, 2), ResourceAccess::DynamicFixed);
        assert_eq!(Resource::from(image).data(), &[0u8; 24][..]);
    }

    #[test]
    fn test_shader_visibility() {
        let index = Resource::from(BufferResource::null().with_flags(ResourceFlags::INDEX_BUFFER));
        assert!(!index.is_shader_visible());
        let sampled = Resource::from(ImageResource::null().with_flags(ResourceFlags::IMAGE_FILTER_LINEAR));
        assert!(sampled.is_shader_visible());
    }

    #[test]
    fn test_resize_image_keeps_overlap() {
        // 2x2 -> 3x1：保留第一行的两个像素，第三个像素为 0
        let mut image = Resource::from(ImageResource::null());
        image.resize_image(UVec2::new(3, 1));
        assert_eq!(image.data(), &[255, 0, 255, 255, 0, 0, 0, 255, 0, 0, 0, 0]);
    }

    #[test]
    fn test_resize_buffer_zero_fills() {
        let mut buffer = Resource::from(BufferResource::from_bytes(ResourceAccess::DynamicVariable, vec![1, 2]));
        buffer.resize_buffer(4);
        assert_eq!(buffer.data(), &[1, 2, 0, 0]);
        buffer.resize_buffer(1);
        assert_eq!(buffer.data(), &[1]);
    }
}
