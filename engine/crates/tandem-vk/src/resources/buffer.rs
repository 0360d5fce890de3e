use ash::vk;
use vk_mem::Alloc;

use crate::error::construction_error;
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::VulkanDevice;
use crate::foundation::mem_allocator::VulkanMemAllocator;
use tandem_gfx::GfxResult;
use tandem_gfx::backend::{BufferComponent, GfxBufferDesc};

pub struct VulkanBuffer {
    handle: vk::Buffer,
    /// alias 不持有内存，为 `None`
    allocation: Option<vk_mem::Allocation>,

    size: usize,

    /// 在初始化阶段写死，host visible 的 buffer 持久映射
    map_ptr: Option<*mut u8>,

    name: String,
}
impl DebugType for VulkanBuffer {
    fn debug_type_name() -> &'static str {
        "GfxBuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
// init & destroy
impl VulkanBuffer {
    /// - 优先使用 device memory
    /// - `mem_map` 的 buffer 要求 host coherent，写入后不需要 flush
    pub fn new(
        device: &VulkanDevice,
        allocator: &VulkanMemAllocator,
        size: usize,
        usage: vk::BufferUsageFlags,
        mem_map: bool,
        name: &str,
    ) -> GfxResult<Self> {
        let object_name = format!("{}::{name}", Self::debug_type_name());

        // vulkan 不允许大小为 0 的 buffer
        let buffer_ci = vk::BufferCreateInfo::default().size(size.max(4) as vk::DeviceSize).usage(usage);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            flags: if mem_map {
                vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM
            } else {
                vk_mem::AllocationCreateFlags::empty()
            },
            required_flags: if mem_map {
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            } else {
                vk::MemoryPropertyFlags::empty()
            },
            ..Default::default()
        };

        let (handle, mut allocation) = unsafe { allocator.create_buffer_with_alignment(&buffer_ci, &alloc_ci, 8) }
            .map_err(|e| construction_error(&object_name, e))?;

        let mut map_ptr = None;
        if mem_map {
            match unsafe { allocator.map_memory(&mut allocation) } {
                Ok(ptr) => map_ptr = Some(ptr),
                Err(e) => {
                    unsafe { allocator.destroy_buffer(handle, &mut allocation) };
                    return Err(construction_error(&object_name, e));
                }
            }
        }

        let buffer = Self {
            handle,
            allocation: Some(allocation),
            size,
            map_ptr,
            name: name.to_string(),
        };
        device.set_debug_name(&buffer, name);
        Ok(buffer)
    }

    #[inline]
    pub fn from_desc(device: &VulkanDevice, allocator: &VulkanMemAllocator, desc: &GfxBufferDesc) -> GfxResult<Self> {
        let mut usage =
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::TRANSFER_SRC;
        if desc.index {
            usage |= vk::BufferUsageFlags::INDEX_BUFFER;
        }
        if desc.indirect {
            usage |= vk::BufferUsageFlags::INDIRECT_BUFFER;
        }
        Self::new(device, allocator, desc.size, usage, desc.host_visible, desc.name)
    }

    #[inline]
    pub fn new_stage_buffer(
        device: &VulkanDevice,
        allocator: &VulkanMemAllocator,
        size: usize,
        name: &str,
    ) -> GfxResult<Self> {
        Self::new(device, allocator, size, vk::BufferUsageFlags::TRANSFER_SRC, true, name)
    }

    /// 与 `self` 共享 `vk::Buffer` 与内存的对象，destroy 时什么也不做
    pub fn alias(&self) -> Self {
        Self {
            handle: self.handle,
            allocation: None,
            size: self.size,
            map_ptr: self.map_ptr,
            name: format!("{}(alias)", self.name),
        }
    }

    pub fn destroy(mut self, allocator: &VulkanMemAllocator) {
        let Some(mut allocation) = self.allocation.take() else {
            log::debug!("dropping GfxBuffer alias: {}", self.name);
            return;
        };
        log::debug!("destroying GfxBuffer: {}", self.name);
        unsafe {
            if self.map_ptr.take().is_some() {
                allocator.unmap_memory(&mut allocation);
            }
            allocator.destroy_buffer(self.handle, &mut allocation);
        }
    }
}
// getters
impl VulkanBuffer {
    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}
impl BufferComponent for VulkanBuffer {
    #[inline]
    fn size(&self) -> usize {
        self.size
    }

    fn mapped(&self) -> Option<&[u8]> {
        self.map_ptr.map(|ptr| unsafe { std::slice::from_raw_parts(ptr, self.size) })
    }

    fn mapped_mut(&mut self) -> Option<&mut [u8]> {
        self.map_ptr.map(|ptr| unsafe { std::slice::from_raw_parts_mut(ptr, self.size) })
    }
}
