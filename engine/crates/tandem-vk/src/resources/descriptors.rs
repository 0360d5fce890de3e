use ash::vk;
use itertools::Itertools;

use crate::error::construction_error;
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::VulkanDevice;
use crate::vulkan_backend::VulkanBackend;
use tandem_gfx::GfxResult;
use tandem_gfx::backend::{BindingLayout, BindingWrite};

/// 一个 Renderer 私有的 descriptor：layout、pool 以及每个 frame 一个 set
///
/// binding 0..buffer_count 为 storage buffer，之后是一个 combined image sampler 数组
pub struct VulkanBindings {
    set_layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    sets: Vec<vk::DescriptorSet>,
    layout: BindingLayout,
}
// 创建与销毁
impl VulkanBindings {
    pub fn new(device: &VulkanDevice, layout: &BindingLayout, set_count: usize, name: &str) -> GfxResult<Self> {
        let _span = tracy_client::span!("VulkanBindings::new");

        let set_layout = Self::create_set_layout(device, layout, name)?;
        let pool = match Self::create_pool(device, layout, set_count, name) {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { device.destroy_descriptor_set_layout(set_layout, None) };
                return Err(e);
            }
        };

        let set_layouts = vec![set_layout; set_count];
        let alloc_info = vk::DescriptorSetAllocateInfo::default().descriptor_pool(pool).set_layouts(&set_layouts);
        // pool 耗尽属于分配错误
        let sets = match unsafe { device.allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => sets,
            Err(e) => {
                unsafe {
                    device.destroy_descriptor_pool(pool, None);
                    device.destroy_descriptor_set_layout(set_layout, None);
                }
                return Err(construction_error(&format!("GfxDescriptorSet::{name}"), e));
            }
        };
        for (index, set) in sets.iter().enumerate() {
            device.set_object_debug_name(*set, format!("GfxDescriptorSet::{name}-{index}"));
        }

        let bindings = Self {
            set_layout,
            pool,
            sets,
            layout: *layout,
        };
        device.set_debug_name(&bindings, name);
        Ok(bindings)
    }

    fn create_set_layout(
        device: &VulkanDevice,
        layout: &BindingLayout,
        name: &str,
    ) -> GfxResult<vk::DescriptorSetLayout> {
        let mut bindings = (0..layout.buffer_count)
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::ALL)
            })
            .collect_vec();
        if layout.image_count > 0 {
            bindings.push(
                vk::DescriptorSetLayoutBinding::default()
                    .binding(layout.image_binding())
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .descriptor_count(layout.image_count)
                    .stage_flags(vk::ShaderStageFlags::ALL),
            );
        }

        // 绑定之后依然可以更新；image 数组允许存在未写入的元素
        let binding_flags = vec![
            vk::DescriptorBindingFlags::UPDATE_AFTER_BIND | vk::DescriptorBindingFlags::PARTIALLY_BOUND;
            bindings.len()
        ];
        let mut binding_flags_ci = vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&binding_flags);
        let create_info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(&bindings)
            .flags(vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL)
            .push_next(&mut binding_flags_ci);

        let set_layout = unsafe { device.create_descriptor_set_layout(&create_info, None) }
            .map_err(|e| construction_error(&format!("GfxDescriptorSetLayout::{name}"), e))?;
        device.set_object_debug_name(set_layout, format!("GfxDescriptorSetLayout::{name}"));
        Ok(set_layout)
    }

    fn create_pool(
        device: &VulkanDevice,
        layout: &BindingLayout,
        set_count: usize,
        name: &str,
    ) -> GfxResult<vk::DescriptorPool> {
        let pool_sizes = Self::pool_sizes(layout, set_count);
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND)
            .max_sets(set_count as u32)
            .pool_sizes(&pool_sizes);

        let pool = unsafe { device.create_descriptor_pool(&create_info, None) }
            .map_err(|e| construction_error(&format!("GfxDescriptorPool::{name}"), e))?;
        device.set_object_debug_name(pool, format!("GfxDescriptorPool::{name}"));
        Ok(pool)
    }

    /// 每种 descriptor 的数量，数量为 0 的类型不出现
    pub fn pool_sizes(layout: &BindingLayout, set_count: usize) -> Vec<vk::DescriptorPoolSize> {
        [
            (vk::DescriptorType::STORAGE_BUFFER, layout.buffer_count),
            (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, layout.image_count),
        ]
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(ty, count)| vk::DescriptorPoolSize {
            ty,
            descriptor_count: count * set_count as u32,
        })
        .collect_vec()
    }

    /// 从 pool 中分配的 set 随 pool 一起释放
    pub fn destroy(self, device: &VulkanDevice) {
        unsafe {
            device.destroy_descriptor_pool(self.pool, None);
            device.destroy_descriptor_set_layout(self.set_layout, None);
        }
    }
}
// getters
impl VulkanBindings {
    #[inline]
    pub fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.set_layout
    }

    #[inline]
    pub fn set(&self, index: usize) -> Option<vk::DescriptorSet> {
        self.sets.get(index).copied()
    }

    #[inline]
    pub fn layout(&self) -> BindingLayout {
        self.layout
    }
}
// update
impl VulkanBindings {
    pub fn write(&self, device: &VulkanDevice, set: usize, writes: &[BindingWrite<'_, VulkanBackend>]) {
        let Some(dst_set) = self.set(set) else {
            log::error!("descriptor set {set} does not exist, {} allocated", self.sets.len());
            return;
        };

        // descriptor write 引用这些 info，需要先全部收集
        let buffer_infos = writes
            .iter()
            .map(|write| match write {
                BindingWrite::Buffer { buffer, .. } => vec![
                    vk::DescriptorBufferInfo::default().buffer(buffer.vk_buffer()).offset(0).range(vk::WHOLE_SIZE),
                ],
                BindingWrite::Images { .. } => Vec::new(),
            })
            .collect_vec();
        let image_infos = writes
            .iter()
            .map(|write| match write {
                BindingWrite::Buffer { .. } => Vec::new(),
                BindingWrite::Images { images, .. } => images
                    .iter()
                    .map(|(image, sampler)| {
                        vk::DescriptorImageInfo::default()
                            .sampler(sampler.handle())
                            .image_view(image.view())
                            .image_layout(image.steady_layout())
                    })
                    .collect_vec(),
            })
            .collect_vec();

        let descriptor_writes = writes
            .iter()
            .zip(buffer_infos.iter().zip(&image_infos))
            .filter_map(|(write, (buffer_info, image_info))| match write {
                BindingWrite::Buffer { binding, .. } => Some(
                    vk::WriteDescriptorSet::default()
                        .dst_set(dst_set)
                        .dst_binding(*binding)
                        .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                        .buffer_info(buffer_info),
                ),
                BindingWrite::Images { binding, .. } if !image_info.is_empty() => Some(
                    vk::WriteDescriptorSet::default()
                        .dst_set(dst_set)
                        .dst_binding(*binding)
                        .dst_array_element(0)
                        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                        .image_info(image_info),
                ),
                BindingWrite::Images { .. } => None,
            })
            .collect_vec();

        unsafe {
            device.update_descriptor_sets(&descriptor_writes, &[]);
        }
    }
}
impl DebugType for VulkanBindings {
    fn debug_type_name() -> &'static str {
        "GfxDescriptorSetLayout"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.set_layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_sizes_skip_empty_types() {
        let layout = BindingLayout {
            buffer_count: 2,
            image_count: 0,
        };
        let sizes = VulkanBindings::pool_sizes(&layout, 3);
        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes[0].ty, vk::DescriptorType::STORAGE_BUFFER);
        assert_eq!(sizes[0].descriptor_count, 6);
    }

    #[test]
    fn test_pool_sizes_images_per_set() {
        let layout = BindingLayout {
            buffer_count: 1,
            image_count: 4,
        };
        let sizes = VulkanBindings::pool_sizes(&layout, 2);
        assert_eq!(sizes[1].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(sizes[1].descriptor_count, 8);
    }
}
