use ash::vk;

use tandem_gfx::resources::image_format::ImageFormat;

/// Vulkan 格式相关的工具类
pub struct VulkanFormatUtils;
impl VulkanFormatUtils {
    pub fn to_vk(format: ImageFormat) -> vk::Format {
        match format {
            ImageFormat::R8 => vk::Format::R8_UINT,
            ImageFormat::R8Unorm => vk::Format::R8_UNORM,
            ImageFormat::Rg16 => vk::Format::R8G8_UNORM,
            ImageFormat::Rgba32 => vk::Format::R8G8B8A8_UNORM,
            ImageFormat::Rgba32Srgb => vk::Format::R8G8B8A8_SRGB,
            ImageFormat::Bgra32 => vk::Format::B8G8R8A8_UNORM,
            ImageFormat::Bgra32Srgb => vk::Format::B8G8R8A8_SRGB,
            ImageFormat::Rgba64F => vk::Format::R16G16B16A16_SFLOAT,
            ImageFormat::Rgba128F => vk::Format::R32G32B32A32_SFLOAT,
            ImageFormat::Depth16 => vk::Format::D16_UNORM,
            ImageFormat::Depth32F => vk::Format::D32_SFLOAT,
        }
    }

    /// 只有 swapchain 可能出现的格式需要反向转换
    pub fn from_vk(format: vk::Format) -> Option<ImageFormat> {
        match format {
            vk::Format::R8G8B8A8_UNORM => Some(ImageFormat::Rgba32),
            vk::Format::R8G8B8A8_SRGB => Some(ImageFormat::Rgba32Srgb),
            vk::Format::B8G8R8A8_UNORM => Some(ImageFormat::Bgra32),
            vk::Format::B8G8R8A8_SRGB => Some(ImageFormat::Bgra32Srgb),
            vk::Format::R16G16B16A16_SFLOAT => Some(ImageFormat::Rgba64F),
            _ => None,
        }
    }

    #[inline]
    pub fn aspect(format: ImageFormat) -> vk::ImageAspectFlags {
        if format.is_depth() { vk::ImageAspectFlags::DEPTH } else { vk::ImageAspectFlags::COLOR }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swapchain_formats_round_trip() {
        for format in [ImageFormat::Rgba32, ImageFormat::Bgra32, ImageFormat::Bgra32Srgb] {
            assert_eq!(VulkanFormatUtils::from_vk(VulkanFormatUtils::to_vk(format)), Some(format));
        }
        assert_eq!(VulkanFormatUtils::from_vk(vk::Format::A2B10G10R10_UNORM_PACK32), None);
    }

    #[test]
    fn test_depth_aspect() {
        assert_eq!(VulkanFormatUtils::aspect(ImageFormat::Depth32F), vk::ImageAspectFlags::DEPTH);
        assert_eq!(VulkanFormatUtils::aspect(ImageFormat::Rgba128F), vk::ImageAspectFlags::COLOR);
    }
}
