use ash::vk;

use crate::commands::command_buffer::VulkanCommandBuffer;
use crate::error::construction_error;
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::VulkanDevice;
use tandem_gfx::GfxResult;

/// command pool 是和 queue family 绑定的，而不是和 queue 绑定的
///
/// 使用 `RESET_COMMAND_BUFFER`，每个 command buffer 可以单独重新录制
pub struct VulkanCommandPool {
    handle: vk::CommandPool,
    _debug_name: String,
}
// init & destroy
impl VulkanCommandPool {
    pub fn new(
        device: &VulkanDevice,
        queue_family_index: u32,
        flags: vk::CommandPoolCreateFlags,
        debug_name: &str,
    ) -> GfxResult<Self> {
        let pool = unsafe {
            device.create_command_pool(
                &vk::CommandPoolCreateInfo::default().queue_family_index(queue_family_index).flags(flags),
                None,
            )
        }
        .map_err(|e| construction_error(&format!("GfxCommandPool::{debug_name}"), e))?;

        let command_pool = Self {
            handle: pool,
            _debug_name: debug_name.to_string(),
        };
        device.set_debug_name(&command_pool, debug_name);
        Ok(command_pool)
    }

    /// pool 中分配的 command buffer 随 pool 一起释放
    pub fn destroy(self, device: &VulkanDevice) {
        log::info!("destroying CommandPool: {}", self._debug_name);
        unsafe {
            device.destroy_command_pool(self.handle, None);
        }
    }
}
// getters
impl VulkanCommandPool {
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }
}
// tools
impl VulkanCommandPool {
    /// 释放之后，command buffer 不能再被使用
    pub fn free_command_buffers(&self, device: &VulkanDevice, command_buffers: &[VulkanCommandBuffer]) {
        let handles = command_buffers.iter().map(|cmd| cmd.vk_handle()).collect::<Vec<_>>();
        unsafe {
            device.free_command_buffers(self.handle, &handles);
        }
    }
}

impl DebugType for VulkanCommandPool {
    fn debug_type_name() -> &'static str {
        "GfxCommandPool"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
