use std::rc::Rc;

use itertools::Itertools;

use crate::backend::{
    BindingLayout, BindingWrite, BufferComponent, GfxBackend, GfxBufferDesc, GfxImageDesc, GpuObject, ImageComponent,
    TransferOp,
};
use crate::error::{GfxError, GfxResult};
use crate::resources::component::{Backing, Component};
use crate::resources::reference::{AliasObject, ResolvedReference, ResourceReference};
use crate::resources::resource::{Resource, ResourceFlags, ResourceHandle, ResourceType};
use crate::resources::sampler::GfxSamplerDesc;

/// 持有一个 Renderer 的全部 Component，并负责把它们绑定到 descriptor
///
/// binding 顺序等于资源的插入顺序：先是所有 shader 可见的 buffer，然后是 image 数组。
/// index buffer、indirect buffer 与 renderer output 不出现在 descriptor 中。
pub struct ResourceStorage<B: GfxBackend> {
    device: Rc<B>,
    components: Vec<Component<B>>,

    /// 每个 storage buffer binding 对应的资源
    buffer_slots: Vec<ResourceHandle>,
    /// image 数组中每个元素对应的资源
    image_slots: Vec<ResourceHandle>,

    layout: BindingLayout,
    /// 没有任何 descriptor 时为 None
    bindings: Option<B::Bindings>,
    /// 每个 frame in flight 一个 descriptor set
    set_count: usize,
    bindings_created: bool,

    name: String,
    destroyed: bool,
}
// 创建与销毁
impl<B: GfxBackend> ResourceStorage<B> {
    pub fn new(device: Rc<B>, set_count: usize, name: impl Into<String>) -> Self {
        Self {
            device,
            components: Vec::new(),
            buffer_slots: Vec::new(),
            image_slots: Vec::new(),
            layout: BindingLayout::default(),
            bindings: None,
            set_count,
            bindings_created: false,
            name: name.into(),
            destroyed: false,
        }
    }

    /// 注册一个资源，创建对应的后端对象
    ///
    /// 只能在 `create_bindings` 之前调用
    pub fn add_resource(&mut self, resource: Resource) -> GfxResult<ResourceHandle> {
        let handle = ResourceHandle::from_index(self.components.len());
        let object_name = format!("{}::{}", self.name, handle);
        if self.bindings_created {
            return Err(GfxError::construction(object_name, "resources must be added before descriptors are created"));
        }

        let backing = create_backing(self.device.as_ref(), &resource, &object_name)?;
        if resource.is_shader_visible() {
            match resource.ty() {
                ResourceType::Buffer => self.buffer_slots.push(handle),
                ResourceType::Image => self.image_slots.push(handle),
            }
        }
        self.components.push(Component::new(resource, backing));
        Ok(handle)
    }

    /// 注册一个借用的资源，只为它创建 sampler
    ///
    /// 只能在 `create_bindings` 之前调用
    pub(crate) fn add_reference(&mut self, reference: ResolvedReference<B>) -> GfxResult<ResourceHandle> {
        let handle = ResourceHandle::from_index(self.components.len());
        let object_name = format!("{}::{}", self.name, handle);
        if self.bindings_created {
            return Err(GfxError::construction(object_name, "resources must be added before descriptors are created"));
        }

        let source = reference.source;
        let resource = reference.resource.clone();
        let backing = alias_backing(self.device.as_ref(), reference, &object_name)?;
        if resource.is_shader_visible() {
            match resource.ty() {
                ResourceType::Buffer => self.buffer_slots.push(handle),
                ResourceType::Image => self.image_slots.push(handle),
            }
        }
        log::debug!("{object_name}: references {source:?}");
        self.components.push(Component::referenced(resource, backing, source));
        Ok(handle)
    }

    /// 根据已经注册的资源创建 descriptor，并写入所有 binding
    pub fn create_bindings(&mut self) -> GfxResult<()> {
        let _span = tracy_client::span!("ResourceStorage::create_bindings");

        self.layout = BindingLayout {
            buffer_count: self.buffer_slots.len() as u32,
            image_count: self.image_slots.len() as u32,
        };
        self.bindings_created = true;
        if self.layout.is_empty() {
            log::debug!("{}: no descriptors, skip descriptor pool", self.name);
            return Ok(());
        }

        self.bindings = Some(self.device.create_bindings(&self.layout, self.set_count, &self.name)?);
        self.sync_descriptors(true);
        Ok(())
    }

    pub fn destroy(mut self) {
        self.destroy_mut();
    }

    /// 调用者保证 GPU 已经不再使用这些对象
    pub fn destroy_mut(&mut self) {
        if self.destroyed {
            return;
        }
        let _span = tracy_client::span!("ResourceStorage::destroy");

        if let Some(bindings) = self.bindings.take() {
            self.device.destroy(GpuObject::Bindings(bindings));
        }
        for component in self.components.drain(..) {
            for object in component.into_objects() {
                self.device.destroy(object);
            }
        }
        self.buffer_slots.clear();
        self.image_slots.clear();
        self.destroyed = true;
    }
}
impl<B: GfxBackend> Drop for ResourceStorage<B> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        if !std::thread::panicking() {
            assert!(self.destroyed, "ResourceStorage must be destroyed manually before drop.");
        }
    }
}
// getters
impl<B: GfxBackend> ResourceStorage<B> {
    pub fn get_component(&self, handle: ResourceHandle) -> GfxResult<&Component<B>> {
        if self.destroyed {
            return Err(GfxError::InvalidHandle(format!("{}: storage has been torn down", self.name)));
        }
        self.components
            .get(handle.index())
            .ok_or_else(|| GfxError::InvalidHandle(format!("{}: unknown resource {handle}", self.name)))
    }

    pub fn get_component_mut(&mut self, handle: ResourceHandle) -> GfxResult<&mut Component<B>> {
        if self.destroyed {
            return Err(GfxError::InvalidHandle(format!("{}: storage has been torn down", self.name)));
        }
        let name = &self.name;
        self.components
            .get_mut(handle.index())
            .ok_or_else(|| GfxError::InvalidHandle(format!("{name}: unknown resource {handle}")))
    }

    #[inline]
    pub fn resource_count(&self) -> usize {
        self.components.len()
    }

    pub fn resource_count_of(&self, ty: ResourceType) -> usize {
        self.components.iter().filter(|c| c.ty() == ty).count()
    }

    #[inline]
    pub fn handles(&self) -> impl Iterator<Item = ResourceHandle> + use<B> {
        (0..self.components.len()).map(ResourceHandle::from_index)
    }

    #[inline]
    pub fn bindings(&self) -> Option<&B::Bindings> {
        self.bindings.as_ref()
    }

    #[inline]
    pub fn binding_layout(&self) -> BindingLayout {
        self.layout
    }

    #[inline]
    pub fn descriptor_set_count(&self) -> usize {
        if self.bindings.is_some() { self.set_count } else { 0 }
    }

    /// 第 `binding` 个 storage buffer binding 对应的资源
    #[inline]
    pub fn buffer_slot(&self, binding: usize) -> Option<ResourceHandle> {
        self.buffer_slots.get(binding).copied()
    }

    #[inline]
    pub fn image_slots(&self) -> &[ResourceHandle] {
        &self.image_slots
    }

    /// 借用的所有资源的来源
    pub fn referenced_sources(&self) -> impl Iterator<Item = ResourceReference> + '_ {
        self.components.iter().filter_map(Component::reference)
    }
}
// descriptor 同步
impl<B: GfxBackend> ResourceStorage<B> {
    /// 重写 descriptor 中的 binding
    ///
    /// buffer 总是全部重写；`write_everything` 为 true 时 image 数组也重写。
    /// 只影响之后录制或提交的命令，调用者保证没有正在执行的命令引用这些 descriptor set。
    pub fn sync_descriptors(&mut self, write_everything: bool) {
        let _span = tracy_client::span!("ResourceStorage::sync_descriptors");
        let Some(bindings) = self.bindings.as_mut() else {
            return;
        };

        let mut writes: Vec<BindingWrite<'_, B>> = self
            .buffer_slots
            .iter()
            .enumerate()
            .filter_map(|(binding, handle)| {
                self.components[handle.index()].buffer().map(|buffer| BindingWrite::Buffer {
                    binding: binding as u32,
                    buffer,
                })
            })
            .collect_vec();

        if write_everything && !self.image_slots.is_empty() {
            let images = self
                .image_slots
                .iter()
                .filter_map(|handle| {
                    let component = &self.components[handle.index()];
                    Some((component.image()?, component.sampler()?))
                })
                .collect_vec();
            writes.push(BindingWrite::Images {
                binding: self.layout.image_binding(),
                images,
            });
        }

        for set in 0..self.set_count {
            self.device.write_bindings(bindings, set, &writes);
        }
        log::debug!(
            "{}: synced {} descriptor writes across {} sets (full = {})",
            self.name,
            writes.len(),
            self.set_count,
            write_everything
        );
    }
}
// 数据上传
impl<B: GfxBackend> ResourceStorage<B> {
    /// StaticFixed 资源的初始数据，通过 scratch 命令上传
    pub fn static_upload_ops(&self) -> Vec<TransferOp<'_, B>> {
        self.components
            .iter()
            .filter(|c| c.access().is_static() && !c.is_referenced())
            .filter_map(|c| match &c.backing {
                Backing::Buffer(buffer) => Some(TransferOp::UploadBuffer {
                    dst: buffer,
                    data: c.resource().data(),
                }),
                Backing::Image { image, .. } => Some(TransferOp::UploadImage {
                    dst: image,
                    data: c.resource().data(),
                }),
            })
            .collect_vec()
    }

    /// 把被修改过的 image 像素写入 GPU
    ///
    /// host visible 的 image 按照后端的行对齐直接写入映射内存，其余的通过 transfer 上传
    pub fn write_padded_image_data(&mut self) -> GfxResult<()> {
        let _span = tracy_client::span!("ResourceStorage::write_padded_image_data");

        let mut uploads = Vec::new();
        for (index, component) in self.components.iter_mut().enumerate() {
            if component.access().is_static() || component.is_referenced() || !component.is_dirty() {
                continue;
            }
            let Some(tight_pitch) = component.resource().as_image().map(|image| image.tight_row_pitch()) else {
                continue;
            };
            let rows = component.dimensions().map_or(0, |d| d.y as usize);

            let (resource, backing) = (&component.resource, &mut component.backing);
            if let Backing::Image { image, dirty, .. } = backing {
                match image.row_pitch() {
                    Some(row_pitch) => {
                        let mapped = image.mapped_mut().ok_or_else(|| {
                            GfxError::NotHostVisible(format!("{}::#{index}: image has a row pitch but no mapping", self.name))
                        })?;
                        pad_rows(resource.data(), mapped, tight_pitch, row_pitch, rows);
                    }
                    None => uploads.push(index),
                }
                *dirty = false;
            }
        }

        if !uploads.is_empty() {
            let ops = uploads
                .iter()
                .filter_map(|index| {
                    let component = &self.components[*index];
                    Some(TransferOp::UploadImage {
                        dst: component.image()?,
                        data: component.resource().data(),
                    })
                })
                .collect_vec();
            self.device.execute_transfers(&ops, &format!("{}::image-upload", self.name))?;
        }
        Ok(())
    }
}
// edit 时替换 component
impl<B: GfxBackend> ResourceStorage<B> {
    /// 为 `resource` 创建新的后端对象，不修改 storage
    pub(crate) fn create_backing_for(&self, handle: ResourceHandle, resource: &Resource) -> GfxResult<Backing<B>> {
        create_backing(self.device.as_ref(), resource, &format!("{}::{}", self.name, handle))
    }

    /// 为借用的资源创建 sampler，不修改 storage
    pub(crate) fn alias_backing_for(
        &self,
        handle: ResourceHandle,
        reference: ResolvedReference<B>,
    ) -> GfxResult<Backing<B>> {
        alias_backing(self.device.as_ref(), reference, &format!("{}::{}", self.name, handle))
    }

    /// 与 `handle` 共享内存的对象，以及借用者看到的资源描述
    pub(crate) fn share(&self, handle: ResourceHandle) -> GfxResult<(Resource, AliasObject<B>)> {
        let component = self.get_component(handle)?;
        let mut resource = component.resource().clone();
        resource.remove_flags(ResourceFlags::RENDERER_OUTPUT);
        let object = match &component.backing {
            Backing::Buffer(buffer) => AliasObject::Buffer(self.device.alias_buffer(buffer)),
            Backing::Image { image, .. } => AliasObject::Image(self.device.alias_image(image)),
        };
        Ok((resource, object))
    }
}

/// 借用的资源：buffer 直接使用 alias，image 额外按照自己的 flag 创建 sampler
fn alias_backing<B: GfxBackend>(device: &B, reference: ResolvedReference<B>, name: &str) -> GfxResult<Backing<B>> {
    match reference.object {
        AliasObject::Buffer(buffer) => Ok(Backing::Buffer(buffer)),
        AliasObject::Image(image) => {
            let sampler_desc = GfxSamplerDesc::from_flags(reference.resource.flags(), name)?;
            let sampler = device.create_sampler(&sampler_desc, name)?;
            Ok(Backing::Image {
                image,
                sampler,
                dirty: false,
            })
        }
    }
}

/// 按照资源描述创建后端对象，并写入 host visible 的初始数据
pub(crate) fn create_backing<B: GfxBackend>(device: &B, resource: &Resource, name: &str) -> GfxResult<Backing<B>> {
    let host_visible = !resource.access().is_static();
    let flags = resource.flags();
    match resource {
        Resource::Buffer(_) => {
            let mut buffer = device.create_buffer(&GfxBufferDesc {
                // 零长度的 buffer 在所有后端上都不合法
                size: resource.data().len().max(1),
                host_visible,
                index: flags.contains(ResourceFlags::INDEX_BUFFER),
                indirect: flags.contains(ResourceFlags::DRAW_INDIRECT_BUFFER),
                name,
            })?;
            if let Some(mapped) = buffer.mapped_mut() {
                let len = resource.data().len().min(mapped.len());
                mapped[..len].copy_from_slice(&resource.data()[..len]);
            }
            Ok(Backing::Buffer(buffer))
        }
        Resource::Image(image_resource) => {
            let renderer_output = flags.contains(ResourceFlags::RENDERER_OUTPUT);
            if renderer_output && !image_resource.format().is_colour_attachment() {
                return Err(GfxError::construction(
                    name,
                    format!("{:?} cannot be used as a renderer output", image_resource.format()),
                ));
            }
            let sampler_desc = GfxSamplerDesc::from_flags(flags, name)?;

            let image = device.create_image(&GfxImageDesc {
                extent: image_resource.dimensions(),
                format: image_resource.format(),
                host_visible: host_visible && !renderer_output,
                renderer_output,
                name,
            })?;
            let sampler = match device.create_sampler(&sampler_desc, name) {
                Ok(sampler) => sampler,
                Err(e) => {
                    device.destroy(GpuObject::Image(image));
                    return Err(e);
                }
            };
            Ok(Backing::Image {
                image,
                sampler,
                dirty: host_visible,
            })
        }
    }
}

/// 把紧密排列的行复制到带行对齐的目标内存中
///
/// 目标内存中每行多出来的 padding 字节保持不变
pub fn pad_rows(src: &[u8], dst: &mut [u8], tight_pitch: usize, padded_pitch: usize, rows: usize) {
    debug_assert!(padded_pitch >= tight_pitch);
    if tight_pitch == padded_pitch {
        let len = (tight_pitch * rows).min(src.len()).min(dst.len());
        dst[..len].copy_from_slice(&src[..len]);
        return;
    }
    for (src_row, dst_row) in src.chunks_exact(tight_pitch).zip(dst.chunks_mut(padded_pitch)).take(rows) {
        dst_row[..tight_pitch].copy_from_slice(src_row);
    }
}

/// `pad_rows` 的逆操作
pub fn unpad_rows(src: &[u8], tight_pitch: usize, padded_pitch: usize, rows: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(tight_pitch * rows);
    for row in src.chunks(padded_pitch).take(rows) {
        out.extend_from_slice(&row[..tight_pitch]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_rows() {
        // 2x2 的 RGBA 图像，行对齐到 12 字节
        let src: Vec<u8> = (0..16).collect();
        let mut dst = vec![0xAAu8; 24];
        pad_rows(&src, &mut dst, 8, 12, 2);

        assert_eq!(&dst[0..8], &src[0..8]);
        assert_eq!(&dst[8..12], &[0xAA; 4]);
        assert_eq!(&dst[12..20], &src[8..16]);
        assert_eq!(unpad_rows(&dst, 8, 12, 2), src);
    }

    #[test]
    fn test_pad_rows_tight() {
        let src = [1u8, 2, 3, 4];
        let mut dst = [0u8; 4];
        pad_rows(&src, &mut dst, 2, 2, 2);
        assert_eq!(dst, src);
    }
}
