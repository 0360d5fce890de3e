use ash::vk;
use glam::UVec2;
use vk_mem::Alloc;

use crate::commands::barrier::GfxImageBarrier;
use crate::error::construction_error;
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::VulkanDevice;
use crate::foundation::mem_allocator::VulkanMemAllocator;
use crate::resources::format::VulkanFormatUtils;
use tandem_gfx::GfxResult;
use tandem_gfx::backend::{GfxImageDesc, ImageComponent};
use tandem_gfx::resources::image_format::ImageFormat;

/// host visible image 的映射信息
#[derive(Clone, Copy)]
struct ImageMapping {
    ptr: *mut u8,
    len: usize,
    row_pitch: usize,
}

/// 2D image 以及它的 view
///
/// 每个 image 在创建之后都处于一个固定的 layout（`steady_layout`）：
/// - host visible：linear tiling，`GENERAL`
/// - depth attachment：`UNDEFINED`，每次 render pass 都会 clear
/// - 其余：`SHADER_READ_ONLY_OPTIMAL`，render pass 与 transfer 结束之后都会回到这个 layout
pub struct VulkanImage {
    handle: vk::Image,
    /// alias 不持有 image、view 以及内存，为 `None`
    allocation: Option<vk_mem::Allocation>,
    view: vk::ImageView,

    extent: UVec2,
    format: ImageFormat,
    steady_layout: vk::ImageLayout,

    mapping: Option<ImageMapping>,

    name: String,
}
impl DebugType for VulkanImage {
    fn debug_type_name() -> &'static str {
        "GfxImage2D"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
// new & init
impl VulkanImage {
    pub fn new(device: &VulkanDevice, allocator: &VulkanMemAllocator, desc: &GfxImageDesc) -> GfxResult<Self> {
        let _span = tracy_client::span!("VulkanImage::new");
        let object_name = format!("{}::{}", Self::debug_type_name(), desc.name);

        let (usage, steady_layout) = Self::usage_and_layout(desc);
        let mut image_ci = Self::new_image_2d_info(
            vk::Extent2D {
                width: desc.extent.x.max(1),
                height: desc.extent.y.max(1),
            },
            VulkanFormatUtils::to_vk(desc.format),
            usage,
        );
        let alloc_ci = if desc.host_visible {
            image_ci.tiling = vk::ImageTiling::LINEAR;
            // linear image 的内容需要在 layout 转换时保留
            image_ci.initial_layout = vk::ImageLayout::PREINITIALIZED;
            vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferDevice,
                flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM,
                required_flags: vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                ..Default::default()
            }
        } else {
            vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferDevice,
                ..Default::default()
            }
        };

        let (handle, mut allocation) = unsafe { allocator.create_image(&image_ci, &alloc_ci) }
            .map_err(|e| construction_error(&object_name, e))?;

        let mapping = if desc.host_visible {
            match Self::map(device, allocator, handle, &mut allocation) {
                Ok(mapping) => Some(mapping),
                Err(e) => {
                    unsafe { allocator.destroy_image(handle, &mut allocation) };
                    return Err(construction_error(&object_name, e));
                }
            }
        } else {
            None
        };

        let view_ci = vk::ImageViewCreateInfo::default()
            .image(handle)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(image_ci.format)
            .subresource_range(Self::subresource_range(desc.format));
        let view = match unsafe { device.create_image_view(&view_ci, None) } {
            Ok(view) => view,
            Err(e) => {
                unsafe {
                    if mapping.is_some() {
                        allocator.unmap_memory(&mut allocation);
                    }
                    allocator.destroy_image(handle, &mut allocation);
                }
                return Err(construction_error(&object_name, e));
            }
        };

        let image = Self {
            handle,
            allocation: Some(allocation),
            view,
            extent: desc.extent,
            format: desc.format,
            steady_layout,
            mapping,
            name: desc.name.to_string(),
        };
        device.set_debug_name(&image, desc.name);
        device.set_object_debug_name(view, format!("GfxImageView::{}", desc.name));
        Ok(image)
    }

    #[inline]
    fn new_image_2d_info(
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> vk::ImageCreateInfo<'static> {
        vk::ImageCreateInfo {
            image_type: vk::ImageType::TYPE_2D,
            format,
            extent: extent.into(),
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            // 这里只能是 UNDEFINED 或者 PREINITIALIZED
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        }
    }

    fn usage_and_layout(desc: &GfxImageDesc) -> (vk::ImageUsageFlags, vk::ImageLayout) {
        if desc.format.is_depth() {
            (vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT, vk::ImageLayout::UNDEFINED)
        } else if desc.host_visible {
            (vk::ImageUsageFlags::SAMPLED, vk::ImageLayout::GENERAL)
        } else if desc.renderer_output {
            (
                vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::SAMPLED
                    | vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::TRANSFER_SRC,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
        } else {
            (
                vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
        }
    }

    /// linear image 的内存布局由驱动决定，行之间可能有 padding
    fn map(
        device: &VulkanDevice,
        allocator: &VulkanMemAllocator,
        handle: vk::Image,
        allocation: &mut vk_mem::Allocation,
    ) -> Result<ImageMapping, vk::Result> {
        let layout = unsafe {
            device.get_image_subresource_layout(
                handle,
                vk::ImageSubresource {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    array_layer: 0,
                },
            )
        };
        let base = unsafe { allocator.map_memory(allocation) }?;
        Ok(ImageMapping {
            ptr: unsafe { base.add(layout.offset as usize) },
            len: layout.size as usize,
            row_pitch: layout.row_pitch as usize,
        })
    }

    #[inline]
    pub fn subresource_range(format: ImageFormat) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: VulkanFormatUtils::aspect(format),
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        }
    }
}
// destroy
impl VulkanImage {
    pub fn destroy(mut self, device: &VulkanDevice, allocator: &VulkanMemAllocator) {
        let Some(mut allocation) = self.allocation.take() else {
            log::debug!("dropping GfxImage alias: {}", self.name);
            return;
        };
        log::debug!("destroying GfxImage: {}", self.name);
        unsafe {
            device.destroy_image_view(self.view, None);
            if self.mapping.take().is_some() {
                allocator.unmap_memory(&mut allocation);
            }
            allocator.destroy_image(self.handle, &mut allocation);
        }
    }

    /// 与 `self` 共享 image、view 与内存的对象
    pub fn alias(&self) -> Self {
        Self {
            handle: self.handle,
            allocation: None,
            view: self.view,
            extent: self.extent,
            format: self.format,
            steady_layout: self.steady_layout,
            mapping: self.mapping,
            name: format!("{}(alias)", self.name),
        }
    }
}
// getters
impl VulkanImage {
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn steady_layout(&self) -> vk::ImageLayout {
        self.steady_layout
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}
// tools
impl VulkanImage {
    /// 从创建时的 layout 转换到 `steady_layout`，depth image 不需要转换
    pub fn initial_transition(&self) -> Option<GfxImageBarrier> {
        if self.steady_layout == vk::ImageLayout::UNDEFINED {
            return None;
        }
        let old_layout =
            if self.mapping.is_some() { vk::ImageLayout::PREINITIALIZED } else { vk::ImageLayout::UNDEFINED };
        Some(
            GfxImageBarrier::new()
                .image(self.handle)
                .src_mask(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::empty())
                .dst_mask(vk::PipelineStageFlags2::ALL_COMMANDS, vk::AccessFlags2::SHADER_READ)
                .layout_transfer(old_layout, self.steady_layout)
                .image_aspect_flag(VulkanFormatUtils::aspect(self.format)),
        )
    }
}
impl ImageComponent for VulkanImage {
    #[inline]
    fn extent(&self) -> UVec2 {
        self.extent
    }

    #[inline]
    fn format(&self) -> ImageFormat {
        self.format
    }

    fn row_pitch(&self) -> Option<usize> {
        self.mapping.as_ref().map(|m| m.row_pitch)
    }

    fn mapped_mut(&mut self) -> Option<&mut [u8]> {
        self.mapping.as_ref().map(|m| unsafe { std::slice::from_raw_parts_mut(m.ptr, m.len) })
    }
}
