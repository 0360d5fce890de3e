use ash::vk;
use glam::UVec2;
use itertools::Itertools;

use crate::commands::barrier::GfxImageBarrier;
use crate::commands::sync::{VulkanFence, VulkanSemaphore};
use crate::error::{construction_error, vk_error};
use crate::foundation::device::VulkanDevice;
use crate::resources::format::VulkanFormatUtils;
use crate::swapchain::surface::VulkanSurface;
use tandem_gfx::backend::{RenderWorkSubmitResult, SurfaceInfo};
use tandem_gfx::config::PresentMode;
use tandem_gfx::renderer::output::AcquireOutcome;
use tandem_gfx::resources::image_format::ImageFormat;
use tandem_gfx::{GfxError, GfxResult};

pub struct VulkanSwapchain {
    swapchain_handle: vk::SwapchainKHR,

    /// 这里的 image 并非手动创建的，因此无法使用 VulkanImage 类型
    swapchain_images: Vec<vk::Image>,
    swapchain_image_views: Vec<vk::ImageView>,

    surface_format: vk::SurfaceFormatKHR,
    swapchain_extent: vk::Extent2D,
}

// new & init
impl VulkanSwapchain {
    pub fn new(
        device: &VulkanDevice,
        pdevice: vk::PhysicalDevice,
        surface: &VulkanSurface,
        present_mode: PresentMode,
        window_physical_extent: UVec2,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("VulkanSwapchain::new");
        let swapchain_loader = Self::loader(device)?;

        let surface_capabilities = surface.get_capabilities(pdevice)?;
        let surface_format = Self::choose_surface_format(&surface.get_formats(pdevice)?)
            .ok_or_else(|| GfxError::construction("GfxSwapchain::main", "surface has no supported colour format"))?;
        let present_mode = Self::choose_present_mode(present_mode, &surface.get_present_modes(pdevice)?);

        // 确定 window 的 extent 尺寸
        let extent = Self::calculate_swapchain_extent(
            &surface_capabilities,
            vk::Extent2D {
                width: window_physical_extent.x,
                height: window_physical_extent.y,
            },
        );
        log::info!(
            "create swapchain:
            surface current extent: {}x{}, min extent: {}x{}, max extent: {}x{}
            window physical extent: {}x{}
            final swapchain extent: {}x{}, format: {:?}, present mode: {:?}",
            surface_capabilities.current_extent.width,
            surface_capabilities.current_extent.height,
            surface_capabilities.min_image_extent.width,
            surface_capabilities.min_image_extent.height,
            surface_capabilities.max_image_extent.width,
            surface_capabilities.max_image_extent.height,
            window_physical_extent.x,
            window_physical_extent.y,
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
        );

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle())
            .min_image_count(Self::image_count(&surface_capabilities))
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            // TRANSFER_DST 用于 Nsight 分析
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .pre_transform(surface_capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .clipped(true);

        let swapchain_handle = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(|e| construction_error("GfxSwapchain::main", e))?;
        device.set_object_debug_name(swapchain_handle, "GfxSwapchain::main");

        let mut swapchain = Self {
            swapchain_handle,
            swapchain_images: Vec::new(),
            swapchain_image_views: Vec::new(),
            surface_format,
            swapchain_extent: extent,
        };
        // 失败时已经创建的部分由 destroy 统一释放
        if let Err(e) = swapchain.create_image_views(device) {
            swapchain.destroy(device);
            return Err(e);
        }
        Ok(swapchain)
    }

    fn create_image_views(&mut self, device: &VulkanDevice) -> GfxResult<()> {
        let swapchain_loader = Self::loader(device)?;
        self.swapchain_images = unsafe { swapchain_loader.get_swapchain_images(self.swapchain_handle) }
            .map_err(|e| construction_error("GfxSwapchain::images", e))?;

        for (img_idx, img) in self.swapchain_images.iter().enumerate() {
            device.set_object_debug_name(*img, format!("swapchain-image-{img_idx}"));

            let view_ci = vk::ImageViewCreateInfo::default()
                .image(*img)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.surface_format.format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = unsafe { device.create_image_view(&view_ci, None) }
                .map_err(|e| construction_error(&format!("GfxImageView::swapchain-{img_idx}"), e))?;
            device.set_object_debug_name(view, format!("GfxImageView::swapchain-{img_idx}"));
            self.swapchain_image_views.push(view);
        }
        Ok(())
    }

    #[inline]
    fn loader(device: &VulkanDevice) -> GfxResult<&ash::khr::swapchain::Device> {
        device.swapchain().ok_or_else(|| GfxError::Unsupported("device was created without swapchain".to_string()))
    }
}

// tools
impl VulkanSwapchain {
    /// 优先选择 8bit BGRA，其次是任意一个可以作为 render target 的格式
    pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
        const PREFERRED: [vk::Format; 3] =
            [vk::Format::B8G8R8A8_UNORM, vk::Format::B8G8R8A8_SRGB, vk::Format::R8G8B8A8_UNORM];

        PREFERRED
            .iter()
            .find_map(|preferred| {
                formats.iter().find(|f| f.format == *preferred && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            })
            .or_else(|| formats.iter().find(|f| VulkanFormatUtils::from_vk(f.format).is_some()))
            .copied()
    }

    /// 设备不支持时退回 FIFO，FIFO 总是可用
    pub fn choose_present_mode(requested: PresentMode, available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
        let requested = match requested {
            PresentMode::Fifo => vk::PresentModeKHR::FIFO,
            PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
            PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
        };
        if available.contains(&requested) {
            requested
        } else {
            log::warn!("present mode {requested:?} is not supported, fallback to FIFO");
            vk::PresentModeKHR::FIFO
        }
    }

    /// max_image_count == 0，表示不限制 image 数量
    pub fn image_count(surface_capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
        if surface_capabilities.max_image_count == 0 {
            surface_capabilities.min_image_count + 1
        } else {
            u32::min(surface_capabilities.max_image_count, surface_capabilities.min_image_count + 1)
        }
    }

    /// 确定 window 的 extent 尺寸
    ///
    /// 如果 surface_capabilities.current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
    pub fn calculate_swapchain_extent(
        surface_capabilities: &vk::SurfaceCapabilitiesKHR,
        window_physical_extent: vk::Extent2D,
    ) -> vk::Extent2D {
        let surface_extent = surface_capabilities.current_extent;
        if surface_extent.width == 0xFFFFFFFF || surface_extent.height == 0xFFFFFFFF {
            let width = window_physical_extent
                .width
                .clamp(surface_capabilities.min_image_extent.width, surface_capabilities.max_image_extent.width);
            let height = window_physical_extent
                .height
                .clamp(surface_capabilities.min_image_extent.height, surface_capabilities.max_image_extent.height);
            vk::Extent2D { width, height }
        } else {
            surface_extent
        }
    }

    pub fn acquire_outcome(result: Result<(u32, bool), vk::Result>) -> GfxResult<AcquireOutcome> {
        match result {
            Ok((image_index, suboptimal)) => {
                if suboptimal {
                    log::warn!("swapchain acquire image index {} is not optimal", image_index);
                }
                Ok(AcquireOutcome::Acquired { image_index, suboptimal })
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("swapchain is out of date when acquire next image");
                Ok(AcquireOutcome::OutOfDate)
            }
            Err(e) => Err(vk_error("acquire_next_image", e)),
        }
    }

    /// device lost 是唯一以 `Err` 返回的情况
    pub fn present_result(result: Result<bool, vk::Result>) -> GfxResult<RenderWorkSubmitResult> {
        match result {
            Ok(false) => Ok(RenderWorkSubmitResult::Success),
            Ok(true) => Ok(RenderWorkSubmitResult::SuccessSuboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(RenderWorkSubmitResult::FailOutOfDate),
            Err(vk::Result::ERROR_SURFACE_LOST_KHR) => Ok(RenderWorkSubmitResult::FailSurfaceLost),
            Err(vk::Result::ERROR_FULL_SCREEN_EXCLUSIVE_MODE_LOST_EXT) => Ok(RenderWorkSubmitResult::FailAccessDenied),
            Err(vk::Result::ERROR_DEVICE_LOST) => Err(GfxError::DeviceLost("queue_present".to_string())),
            Err(e) => {
                log::error!("failed to present swapchain image: {:?}", e);
                Ok(RenderWorkSubmitResult::FailFatalError)
            }
        }
    }

    /// 新创建的 image 处于 UNDEFINED，转换到 present 之后与 render pass 的 load 约定一致
    pub fn initial_transitions(&self) -> Vec<GfxImageBarrier> {
        self.swapchain_images
            .iter()
            .map(|image| {
                GfxImageBarrier::new()
                    .image(*image)
                    .src_mask(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::empty())
                    .dst_mask(vk::PipelineStageFlags2::BOTTOM_OF_PIPE, vk::AccessFlags2::empty())
                    .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::PRESENT_SRC_KHR)
            })
            .collect_vec()
    }
}

// update
impl VulkanSwapchain {
    /// timeout: nano seconds
    pub fn acquire_next_image(
        &self,
        device: &VulkanDevice,
        semaphore: Option<&VulkanSemaphore>,
        fence: Option<&VulkanFence>,
        timeout: u64,
    ) -> GfxResult<AcquireOutcome> {
        let swapchain_loader = Self::loader(device)?;
        let result = unsafe {
            swapchain_loader.acquire_next_image(
                self.swapchain_handle,
                timeout,
                semaphore.map_or(vk::Semaphore::null(), |s| s.handle()),
                fence.map_or(vk::Fence::null(), |f| f.handle()),
            )
        };
        Self::acquire_outcome(result)
    }

    pub fn present_image(
        &self,
        device: &VulkanDevice,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[&VulkanSemaphore],
    ) -> GfxResult<RenderWorkSubmitResult> {
        let swapchain_loader = Self::loader(device)?;
        let wait_semaphores = wait_semaphores.iter().map(|s| s.handle()).collect_vec();
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .image_indices(&image_indices)
            .swapchains(std::slice::from_ref(&self.swapchain_handle));

        Self::present_result(unsafe { swapchain_loader.queue_present(queue, &present_info) })
    }
}

// getters
impl VulkanSwapchain {
    #[inline]
    pub fn image_view(&self, index: u32) -> Option<vk::ImageView> {
        self.swapchain_image_views.get(index as usize).copied()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain_extent
    }

    pub fn surface_info(&self) -> SurfaceInfo {
        SurfaceInfo {
            extent: UVec2::new(self.swapchain_extent.width, self.swapchain_extent.height),
            image_count: self.swapchain_images.len() as u32,
            // choose_surface_format 保证可以转换
            format: VulkanFormatUtils::from_vk(self.surface_format.format).unwrap_or(ImageFormat::Bgra32),
        }
    }
}

// destroy
impl VulkanSwapchain {
    pub fn destroy(self, device: &VulkanDevice) {
        unsafe {
            for view in &self.swapchain_image_views {
                device.destroy_image_view(*view, None);
            }
            if let Some(swapchain_loader) = device.swapchain() {
                swapchain_loader.destroy_swapchain(self.swapchain_handle, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_extent_follows_surface() {
        let extent =
            VulkanSwapchain::calculate_swapchain_extent(&capabilities((800, 600)), vk::Extent2D { width: 1, height: 1 });
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_extent_clamps_window() {
        let extent = VulkanSwapchain::calculate_swapchain_extent(
            &capabilities((0xFFFFFFFF, 0xFFFFFFFF)),
            vk::Extent2D {
                width: 8000,
                height: 720,
            },
        );
        assert_eq!((extent.width, extent.height), (4096, 720));
    }

    #[test]
    fn test_image_count() {
        assert_eq!(VulkanSwapchain::image_count(&capabilities((1, 1))), 3);
        let unlimited = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(VulkanSwapchain::image_count(&unlimited), 4);
    }

    #[test]
    fn test_choose_surface_format() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R16G16B16A16_SFLOAT,
                color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        let chosen = VulkanSwapchain::choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);

        let chosen = VulkanSwapchain::choose_surface_format(&formats[..1]).unwrap();
        assert_eq!(chosen.format, vk::Format::R16G16B16A16_SFLOAT);

        assert!(VulkanSwapchain::choose_surface_format(&[]).is_none());
    }

    #[test]
    fn test_present_mode_fallback() {
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(VulkanSwapchain::choose_present_mode(PresentMode::Mailbox, &available), vk::PresentModeKHR::MAILBOX);
        assert_eq!(VulkanSwapchain::choose_present_mode(PresentMode::Immediate, &available), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_acquire_outcome() {
        assert_eq!(
            VulkanSwapchain::acquire_outcome(Ok((2, false))).unwrap(),
            AcquireOutcome::Acquired {
                image_index: 2,
                suboptimal: false
            }
        );
        assert_eq!(
            VulkanSwapchain::acquire_outcome(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            AcquireOutcome::OutOfDate
        );
        assert!(matches!(VulkanSwapchain::acquire_outcome(Err(vk::Result::TIMEOUT)), Err(GfxError::Timeout(_))));
    }

    #[test]
    fn test_present_result() {
        assert_eq!(VulkanSwapchain::present_result(Ok(false)).unwrap(), RenderWorkSubmitResult::Success);
        assert_eq!(VulkanSwapchain::present_result(Ok(true)).unwrap(), RenderWorkSubmitResult::SuccessSuboptimal);
        assert_eq!(
            VulkanSwapchain::present_result(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            RenderWorkSubmitResult::FailOutOfDate
        );
        assert_eq!(
            VulkanSwapchain::present_result(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).unwrap(),
            RenderWorkSubmitResult::FailSurfaceLost
        );
        assert_eq!(
            VulkanSwapchain::present_result(Err(vk::Result::ERROR_FULL_SCREEN_EXCLUSIVE_MODE_LOST_EXT)).unwrap(),
            RenderWorkSubmitResult::FailAccessDenied
        );
        assert_eq!(
            VulkanSwapchain::present_result(Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY)).unwrap(),
            RenderWorkSubmitResult::FailFatalError
        );
        assert!(matches!(
            VulkanSwapchain::present_result(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(GfxError::DeviceLost(_))
        ));
    }
}
