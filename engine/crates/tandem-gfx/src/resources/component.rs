use glam::UVec2;

use crate::backend::{BufferComponent, GfxBackend, GpuObject};
use crate::error::{GfxError, GfxResult};
use crate::resources::image_format::ImageFormat;
use crate::resources::reference::ResourceReference;
use crate::resources::resource::{Resource, ResourceAccess, ResourceFlags, ResourceType};

/// 后端对象
pub(crate) enum Backing<B: GfxBackend> {
    Buffer(B::Buffer),
    Image {
        image: B::Image,
        sampler: B::Sampler,
        /// CPU 端的像素数据被修改过，需要在下一次 render 之前写入 GPU
        dirty: bool,
    },
}

/// 一个 Resource 在某个后端上的实现，由 ResourceStorage 独占
///
/// image 在 CPU 端保留一份紧密排列的像素数据，写入 GPU 时再按照后端的行对齐重新排列。
/// 引用另一个 Renderer 的资源时，buffer 或 image 是共享内存的 alias，只有 sampler 属于自己。
pub struct Component<B: GfxBackend> {
    pub(crate) resource: Resource,
    pub(crate) backing: Backing<B>,
    reference: Option<ResourceReference>,
}
// new & init
impl<B: GfxBackend> Component<B> {
    pub(crate) fn new(resource: Resource, backing: Backing<B>) -> Self {
        Self {
            resource,
            backing,
            reference: None,
        }
    }

    pub(crate) fn referenced(resource: Resource, backing: Backing<B>, source: ResourceReference) -> Self {
        Self {
            resource,
            backing,
            reference: Some(source),
        }
    }
}
// getters
impl<B: GfxBackend> Component<B> {
    /// 客户端描述的资源；对于 image 也是 CPU 端的像素数据
    #[inline]
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    #[inline]
    pub fn ty(&self) -> ResourceType {
        self.resource.ty()
    }

    #[inline]
    pub fn access(&self) -> ResourceAccess {
        self.resource.access()
    }

    #[inline]
    pub fn flags(&self) -> ResourceFlags {
        self.resource.flags()
    }

    /// buffer 的字节数，或 image 紧密排列时的字节数
    pub fn size(&self) -> usize {
        match &self.backing {
            Backing::Buffer(buffer) => buffer.size(),
            Backing::Image { .. } => self.resource.data().len(),
        }
    }

    /// image 的像素尺寸，buffer 返回 None
    pub fn dimensions(&self) -> Option<UVec2> {
        self.resource.as_image().map(|image| image.dimensions())
    }

    pub fn format(&self) -> Option<ImageFormat> {
        self.resource.as_image().map(|image| image.format())
    }

    #[inline]
    pub fn buffer(&self) -> Option<&B::Buffer> {
        match &self.backing {
            Backing::Buffer(buffer) => Some(buffer),
            Backing::Image { .. } => None,
        }
    }

    #[inline]
    pub fn image(&self) -> Option<&B::Image> {
        match &self.backing {
            Backing::Image { image, .. } => Some(image),
            Backing::Buffer(_) => None,
        }
    }

    #[inline]
    pub fn sampler(&self) -> Option<&B::Sampler> {
        match &self.backing {
            Backing::Image { sampler, .. } => Some(sampler),
            Backing::Buffer(_) => None,
        }
    }

    /// 借用的资源所在的 Renderer 与 handle
    #[inline]
    pub fn reference(&self) -> Option<ResourceReference> {
        self.reference
    }

    #[inline]
    pub fn is_referenced(&self) -> bool {
        self.reference.is_some()
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        matches!(self.backing, Backing::Image { dirty: true, .. })
    }
}
// 数据访问
impl<B: GfxBackend> Component<B> {
    /// 读取数据
    ///
    /// buffer 返回映射内存（GPU 写入之后的内容），只存在于 GPU 的 buffer 无法读取。
    /// image 返回 CPU 端的像素数据；renderer output 与借用的 image 的内容只在 GPU 上，无法读取。
    pub fn data(&self) -> GfxResult<&[u8]> {
        match &self.backing {
            Backing::Buffer(buffer) => buffer
                .mapped()
                .ok_or_else(|| GfxError::NotHostVisible("buffer component lives in GPU memory".to_string())),
            Backing::Image { .. } => {
                self.ensure_image_on_host()?;
                Ok(self.resource.data())
            }
        }
    }

    /// 修改数据，StaticFixed 的资源不允许修改
    ///
    /// image 的修改会在下一次 render 时写入 GPU
    pub fn data_mut(&mut self) -> GfxResult<&mut [u8]> {
        if self.access().is_static() {
            return Err(GfxError::rejected("StaticFixed resources are read-only after construction"));
        }
        match &mut self.backing {
            Backing::Buffer(buffer) => buffer
                .mapped_mut()
                .ok_or_else(|| GfxError::NotHostVisible("buffer component lives in GPU memory".to_string())),
            Backing::Image { .. } if self.reference.is_some() => {
                Err(GfxError::NotHostVisible("image is owned by another renderer".to_string()))
            }
            Backing::Image { dirty, .. } => {
                *dirty = true;
                Ok(self.resource.data_mut())
            }
        }
    }

    fn ensure_image_on_host(&self) -> GfxResult<()> {
        if self.flags().contains(ResourceFlags::RENDERER_OUTPUT) {
            return Err(GfxError::NotHostVisible("renderer output is only written by the GPU".to_string()));
        }
        if self.reference.is_some() {
            return Err(GfxError::NotHostVisible("image is owned by another renderer".to_string()));
        }
        Ok(())
    }
}
// 内部修改
impl<B: GfxBackend> Component<B> {
    #[inline]
    pub(crate) fn resource_mut(&mut self) -> &mut Resource {
        &mut self.resource
    }

    #[inline]
    pub(crate) fn mark_dirty(&mut self) {
        if let Backing::Image { dirty, .. } = &mut self.backing {
            *dirty = true;
        }
    }

    /// 把 CPU 端的数据写入后端对象：buffer 写入映射内存，image 在下一次 render 时上传
    pub(crate) fn flush_resource_data(&mut self) {
        match &mut self.backing {
            Backing::Buffer(buffer) => {
                if let Some(mapped) = buffer.mapped_mut() {
                    let data = self.resource.data();
                    let len = data.len().min(mapped.len());
                    mapped[..len].copy_from_slice(&data[..len]);
                }
            }
            Backing::Image { dirty, .. } => *dirty = true,
        }
    }

    /// 替换后端对象，返回旧的对象交给调用者延迟销毁
    pub(crate) fn replace_backing(&mut self, backing: Backing<B>) -> Vec<GpuObject<B>> {
        let old = std::mem::replace(&mut self.backing, backing);
        old.into_objects(self.reference.is_none())
    }

    /// 改为借用 `source` 的内存；旧的对象中属于自己的部分交给调用者延迟销毁
    pub(crate) fn reseat(&mut self, backing: Backing<B>, source: ResourceReference) -> Vec<GpuObject<B>> {
        let old = self.replace_backing(backing);
        self.reference = Some(source);
        old
    }

    pub(crate) fn into_objects(self) -> Vec<GpuObject<B>> {
        self.backing.into_objects(self.reference.is_none())
    }
}

impl<B: GfxBackend> Backing<B> {
    /// `owns_memory` 为 false 时 buffer 与 image 是 alias，不交给 `destroy`
    pub(crate) fn into_objects(self, owns_memory: bool) -> Vec<GpuObject<B>> {
        match self {
            Self::Buffer(buffer) if owns_memory => vec![GpuObject::Buffer(buffer)],
            Self::Buffer(_) => Vec::new(),
            Self::Image { image, sampler, .. } if owns_memory => {
                vec![GpuObject::Image(image), GpuObject::Sampler(sampler)]
            }
            Self::Image { sampler, .. } => vec![GpuObject::Sampler(sampler)],
        }
    }
}
