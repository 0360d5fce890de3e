use std::ffi::CStr;

use ash::vk;
use itertools::Itertools;

use crate::error::vk_check;
use crate::foundation::debug_messenger::DebugType;
use tandem_gfx::{GfxError, GfxResult};

/// 表示一张物理显卡
pub struct VulkanPhysicalDevice {
    pub(crate) vk_handle: vk::PhysicalDevice,

    /// 当前 gpu 的基础属性
    pub(crate) basic_props: vk::PhysicalDeviceProperties,

    /// graphics 与 compute 共用的 queue family
    pub(crate) queue_family_index: u32,
}

impl VulkanPhysicalDevice {
    /// 优先选择独立显卡，如果没有则选择第一个可用的显卡
    ///
    /// `surface` 不为空时，queue family 还必须支持 present
    pub fn pick(
        instance: &ash::Instance,
        surface: Option<(&ash::khr::surface::Instance, vk::SurfaceKHR)>,
    ) -> GfxResult<Self> {
        let pdevices = vk_check("enumerate_physical_devices", unsafe { instance.enumerate_physical_devices() })?;
        pdevices
            .into_iter()
            .filter_map(|pdevice| Self::new(pdevice, instance, surface))
            .find_or_first(Self::is_discrete_gpu)
            .ok_or_else(|| GfxError::construction("VulkanPhysicalDevice", "no gpu with a graphics + compute queue"))
    }

    fn new(
        pdevice: vk::PhysicalDevice,
        instance: &ash::Instance,
        surface: Option<(&ash::khr::surface::Instance, vk::SurfaceKHR)>,
    ) -> Option<Self> {
        let basic_props = unsafe { instance.get_physical_device_properties(pdevice) };
        let physical_device_name = unsafe { CStr::from_ptr(basic_props.device_name.as_ptr()) };
        log::info!("found gpu: {:?}", physical_device_name);

        let queue_family_props = unsafe { instance.get_physical_device_queue_family_properties(pdevice) };
        log::debug!("physical device: queue family props:\n{:#?}", queue_family_props);

        // 全能的 Queue：graphics, compute, transfer
        let queue_family_index = queue_family_props
            .iter()
            .enumerate()
            .filter(|(_, props)| props.queue_flags.contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE))
            .map(|(index, _)| index as u32)
            .find(|index| match surface {
                Some((loader, surface)) => unsafe {
                    loader.get_physical_device_surface_support(pdevice, *index, surface).unwrap_or(false)
                },
                None => true,
            })?;

        Some(Self {
            vk_handle: pdevice,
            basic_props,
            queue_family_index,
        })
    }

    pub fn destroy(self) {
        // 无需销毁
    }

    /// 当前 gpu 是否是独立显卡
    #[inline]
    pub fn is_discrete_gpu(&self) -> bool {
        self.basic_props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
    }

    #[inline]
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.basic_props.device_name.as_ptr()) }.to_string_lossy().into_owned()
    }
}

impl DebugType for VulkanPhysicalDevice {
    fn debug_type_name() -> &'static str {
        "GfxPhysicalDevice"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}
