use ash::vk;

use crate::error::{construction_error, vk_check};
use crate::foundation::debug_messenger::DebugType;
use tandem_gfx::GfxResult;

/// 窗口表面，生命周期长于 swapchain
pub struct VulkanSurface {
    pub(crate) handle: vk::SurfaceKHR,
    pub(crate) pf: ash::khr::surface::Instance,
}
// new & destroy
impl VulkanSurface {
    pub fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        raw_display_handle: raw_window_handle::RawDisplayHandle,
        raw_window_handle: raw_window_handle::RawWindowHandle,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("VulkanSurface::new");
        let surface_pf = ash::khr::surface::Instance::new(entry, instance);

        let handle =
            unsafe { ash_window::create_surface(entry, instance, raw_display_handle, raw_window_handle, None) }
                .map_err(|e| construction_error("GfxSurface::main", e))?;

        Ok(Self { handle, pf: surface_pf })
    }

    /// `ash_window::create_surface` 所需的 instance extension
    pub fn required_extensions(
        raw_display_handle: raw_window_handle::RawDisplayHandle,
    ) -> GfxResult<&'static [*const std::ffi::c_char]> {
        ash_window::enumerate_required_extensions(raw_display_handle)
            .map_err(|e| construction_error("GfxSurface::extensions", e))
    }

    pub fn destroy(self) {
        unsafe { self.pf.destroy_surface(self.handle, None) }
    }
}
// getters
impl VulkanSurface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.pf
    }

    /// 窗口尺寸变化之后 capabilities 也会变化，因此每次实时获取
    pub fn get_capabilities(&self, pdevice: vk::PhysicalDevice) -> GfxResult<vk::SurfaceCapabilitiesKHR> {
        vk_check("get_physical_device_surface_capabilities", unsafe {
            self.pf.get_physical_device_surface_capabilities(pdevice, self.handle)
        })
    }

    pub fn get_formats(&self, pdevice: vk::PhysicalDevice) -> GfxResult<Vec<vk::SurfaceFormatKHR>> {
        vk_check("get_physical_device_surface_formats", unsafe {
            self.pf.get_physical_device_surface_formats(pdevice, self.handle)
        })
    }

    pub fn get_present_modes(&self, pdevice: vk::PhysicalDevice) -> GfxResult<Vec<vk::PresentModeKHR>> {
        vk_check("get_physical_device_surface_present_modes", unsafe {
            self.pf.get_physical_device_surface_present_modes(pdevice, self.handle)
        })
    }
}

impl DebugType for VulkanSurface {
    fn debug_type_name() -> &'static str {
        "GfxSurface"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
