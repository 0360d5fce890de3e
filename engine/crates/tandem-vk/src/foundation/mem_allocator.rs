use std::ops::Deref;

use ash::vk;

use crate::error::construction_error;
use tandem_gfx::GfxResult;

pub struct VulkanMemAllocator {
    inner: vk_mem::Allocator,
}

impl VulkanMemAllocator {
    /// vma 需要引用 Instance 以及 Device，必须在两者之后创建，并在两者之前销毁
    pub fn new(instance: &ash::Instance, pdevice: vk::PhysicalDevice, device: &ash::Device) -> GfxResult<Self> {
        let mut vma_ci = vk_mem::AllocatorCreateInfo::new(instance, device, pdevice);
        vma_ci.vulkan_api_version = vk::API_VERSION_1_3;

        let inner = unsafe { vk_mem::Allocator::new(vma_ci) }.map_err(|e| construction_error("VulkanMemAllocator", e))?;
        Ok(Self { inner })
    }

    pub fn destroy(self) {
        log::info!("destroying VulkanMemAllocator");
        // 通过 drop 触发销毁
    }
}

impl Deref for VulkanMemAllocator {
    type Target = vk_mem::Allocator;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
