use std::ffi::{CStr, CString};
use std::ops::Deref;

use ash::vk;
use itertools::Itertools;

use crate::error::{construction_error, vk_check};
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::physical_device::VulkanPhysicalDevice;
use tandem_gfx::GfxResult;

/// Vulkan 逻辑设备封装
///
/// 包含核心设备 API 以及用到的扩展函数指针。这些函数指针在应用生命周期中保持不变。
///
/// # 扩展支持
/// - Debug Utils (EXT)
/// - Swapchain (KHR)，只在有窗口时启用
pub struct VulkanDevice {
    /// 核心 Vulkan 设备 API
    pub(crate) device: ash::Device,
    /// 调试工具扩展 API
    pub(crate) debug_utils: ash::ext::debug_utils::Device,
    /// 交换链扩展 API
    pub(crate) swapchain: Option<ash::khr::swapchain::Device>,
}

// 创建与销毁
impl VulkanDevice {
    pub fn new(instance: &ash::Instance, pdevice: &VulkanPhysicalDevice, with_swapchain: bool) -> GfxResult<Self> {
        let _span = tracy_client::span!("VulkanDevice::new");

        // device 所需的所有 extension
        let device_exts = Self::basic_device_exts(with_swapchain).iter().map(|e| e.as_ptr()).collect_vec();
        let exts_str = device_exts.iter().map(|ext| format!("\n\t{:?}", unsafe { CStr::from_ptr(*ext) })).join("");
        log::info!("device exts: {}", exts_str);

        // device 所需的所有 features
        let supported = unsafe { instance.get_physical_device_features(pdevice.vk_handle) };
        let mut sync2_features = vk::PhysicalDeviceSynchronization2Features::default().synchronization2(true);
        let mut descriptor_indexing_features = Self::descriptor_indexing_features();
        let mut all_features = vk::PhysicalDeviceFeatures2::default()
            .features(Self::physical_device_basic_features(&supported))
            .push_next(&mut sync2_features)
            .push_next(&mut descriptor_indexing_features);

        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(pdevice.queue_family_index)
            .queue_priorities(&[1.0])];
        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&device_exts)
            .push_next(&mut all_features);

        let device = unsafe { instance.create_device(pdevice.vk_handle, &device_create_info, None) }
            .map_err(|e| construction_error("VulkanDevice", e))?;

        let debug_utils = ash::ext::debug_utils::Device::new(instance, &device);
        let swapchain = with_swapchain.then(|| ash::khr::swapchain::Device::new(instance, &device));

        Ok(Self {
            device,
            debug_utils,
            swapchain,
        })
    }

    pub fn destroy(self) {
        log::info!("destroying device");
        unsafe {
            self.device.destroy_device(None);
        }
    }
}

// 创建过程的辅助函数
impl VulkanDevice {
    /// 必要的 physical device core features
    ///
    /// wireframe 与 tessellation 只在设备支持时开启
    fn physical_device_basic_features(supported: &vk::PhysicalDeviceFeatures) -> vk::PhysicalDeviceFeatures {
        if supported.fill_mode_non_solid == vk::FALSE {
            log::warn!("device does not support fillModeNonSolid, wireframe pipelines will fail");
        }
        vk::PhysicalDeviceFeatures::default()
            .fill_mode_non_solid(supported.fill_mode_non_solid == vk::TRUE)
            .tessellation_shader(supported.tessellation_shader == vk::TRUE)
            .multi_draw_indirect(supported.multi_draw_indirect == vk::TRUE)
    }

    /// descriptor 在绑定之后仍然可以更新，数组中可以有未写入的元素
    fn descriptor_indexing_features() -> vk::PhysicalDeviceDescriptorIndexingFeatures<'static> {
        vk::PhysicalDeviceDescriptorIndexingFeatures::default()
            .descriptor_binding_partially_bound(true)
            .runtime_descriptor_array(true)
            .descriptor_binding_sampled_image_update_after_bind(true)
            .descriptor_binding_storage_buffer_update_after_bind(true)
    }

    /// 必要的 device extensions
    fn basic_device_exts(with_swapchain: bool) -> Vec<&'static CStr> {
        let mut exts = vec![];
        if with_swapchain {
            exts.push(ash::khr::swapchain::NAME);
        }
        exts
    }
}

// getters
impl VulkanDevice {
    #[inline]
    pub fn vk_handle(&self) -> vk::Device {
        self.device.handle()
    }

    #[inline]
    pub fn debug_utils(&self) -> &ash::ext::debug_utils::Device {
        &self.debug_utils
    }

    #[inline]
    pub fn swapchain(&self) -> Option<&ash::khr::swapchain::Device> {
        self.swapchain.as_ref()
    }
}

// tools
impl VulkanDevice {
    /// 名称为 `"{Type}::{name}"`，设置失败只记录日志
    pub fn set_debug_name<T: DebugType>(&self, handle: &T, name: impl AsRef<str>) {
        let debug_name = format!("{}::{}", T::debug_type_name(), name.as_ref());
        self.set_object_debug_name(handle.vk_handle(), debug_name);
    }

    pub fn set_object_debug_name<T: vk::Handle>(&self, handle: T, name: impl AsRef<str>) {
        let Ok(name) = CString::new(name.as_ref()) else {
            return;
        };
        let result = unsafe {
            self.debug_utils.set_debug_utils_object_name(
                &vk::DebugUtilsObjectNameInfoEXT::default().object_name(name.as_c_str()).object_handle(handle),
            )
        };
        if let Err(e) = result {
            log::warn!("failed to set debug name {:?}: {:?}", name, e);
        }
    }

    #[inline]
    pub fn wait_idle(&self) -> GfxResult<()> {
        vk_check("device_wait_idle", unsafe { self.device.device_wait_idle() })
    }
}

impl Deref for VulkanDevice {
    type Target = ash::Device;
    fn deref(&self) -> &Self::Target {
        &self.device
    }
}

impl DebugType for VulkanDevice {
    fn debug_type_name() -> &'static str {
        "GfxDevice"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.device.handle()
    }
}
