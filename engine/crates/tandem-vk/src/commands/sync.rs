use ash::vk;

use crate::error::{construction_error, vk_check, vk_error};
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::VulkanDevice;
use tandem_gfx::{GfxError, GfxResult};

/// # Destroy
/// 需要手动交给 `GfxBackend::destroy`
pub struct VulkanFence {
    fence: vk::Fence,
}

impl DebugType for VulkanFence {
    fn debug_type_name() -> &'static str {
        "GfxFence"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.fence
    }
}

// 创建与销毁
impl VulkanFence {
    /// # param
    /// * signaled - 是否创建时就 signaled
    pub fn new(device: &VulkanDevice, signaled: bool, debug_name: &str) -> GfxResult<Self> {
        let fence_flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let fence = unsafe { device.create_fence(&vk::FenceCreateInfo::default().flags(fence_flags), None) }
            .map_err(|e| construction_error(&format!("GfxFence::{debug_name}"), e))?;

        let fence = Self { fence };
        device.set_debug_name(&fence, debug_name);
        Ok(fence)
    }

    #[inline]
    pub fn destroy(self, device: &VulkanDevice) {
        unsafe {
            device.destroy_fence(self.fence, None);
        }
    }
}

// getters
impl VulkanFence {
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

// tools
impl VulkanFence {
    /// 阻塞等待 fence，超时返回 `GfxError::Timeout`
    pub fn wait(&self, device: &VulkanDevice, timeout_ns: u64) -> GfxResult<()> {
        match unsafe { device.wait_for_fences(std::slice::from_ref(&self.fence), true, timeout_ns) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(GfxError::Timeout(format!("fence not signalled within {timeout_ns} ns"))),
            Err(e) => Err(vk_error("wait_for_fences", e)),
        }
    }

    #[inline]
    pub fn reset(&self, device: &VulkanDevice) -> GfxResult<()> {
        vk_check("reset_fences", unsafe { device.reset_fences(std::slice::from_ref(&self.fence)) })
    }

    #[inline]
    pub fn is_signalled(&self, device: &VulkanDevice) -> GfxResult<bool> {
        vk_check("get_fence_status", unsafe { device.get_fence_status(self.fence) })
    }
}

/// # Destroy
/// 需要手动交给 `GfxBackend::destroy`
pub struct VulkanSemaphore {
    semaphore: vk::Semaphore,
}

// 创建与销毁
impl VulkanSemaphore {
    pub fn new(device: &VulkanDevice, debug_name: &str) -> GfxResult<Self> {
        let semaphore = unsafe { device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
            .map_err(|e| construction_error(&format!("GfxSemaphore::{debug_name}"), e))?;

        let semaphore = Self { semaphore };
        device.set_debug_name(&semaphore, debug_name);
        Ok(semaphore)
    }

    #[inline]
    pub fn destroy(self, device: &VulkanDevice) {
        unsafe {
            device.destroy_semaphore(self.semaphore, None);
        }
    }
}

// getters
impl VulkanSemaphore {
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl DebugType for VulkanSemaphore {
    fn debug_type_name() -> &'static str {
        "GfxSemaphore"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.semaphore
    }
}
