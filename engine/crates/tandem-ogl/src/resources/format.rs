use tandem_gfx::resources::image_format::ImageFormat;

/// `glTexStorage2D` 与 `glTexSubImage2D` 需要的三个枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlFormat {
    pub internal_format: u32,
    pub format: u32,
    pub ty: u32,
}

/// OpenGL 格式相关的工具类
pub struct GlFormatUtils;
impl GlFormatUtils {
    pub fn to_gl(format: ImageFormat) -> GlFormat {
        let (internal_format, format, ty) = match format {
            ImageFormat::R8 => (glow::R8UI, glow::RED_INTEGER, glow::UNSIGNED_BYTE),
            ImageFormat::R8Unorm => (glow::R8, glow::RED, glow::UNSIGNED_BYTE),
            ImageFormat::Rg16 => (glow::RG8, glow::RG, glow::UNSIGNED_BYTE),
            ImageFormat::Rgba32 => (glow::RGBA8, glow::RGBA, glow::UNSIGNED_BYTE),
            ImageFormat::Rgba32Srgb => (glow::SRGB8_ALPHA8, glow::RGBA, glow::UNSIGNED_BYTE),
            // GL 没有 BGRA 的 internal format，只在上传时交换通道
            ImageFormat::Bgra32 => (glow::RGBA8, glow::BGRA, glow::UNSIGNED_BYTE),
            ImageFormat::Bgra32Srgb => (glow::SRGB8_ALPHA8, glow::BGRA, glow::UNSIGNED_BYTE),
            ImageFormat::Rgba64F => (glow::RGBA16F, glow::RGBA, glow::HALF_FLOAT),
            ImageFormat::Rgba128F => (glow::RGBA32F, glow::RGBA, glow::FLOAT),
            ImageFormat::Depth16 => (glow::DEPTH_COMPONENT16, glow::DEPTH_COMPONENT, glow::UNSIGNED_SHORT),
            ImageFormat::Depth32F => (glow::DEPTH_COMPONENT32F, glow::DEPTH_COMPONENT, glow::FLOAT),
        };
        GlFormat {
            internal_format,
            format,
            ty,
        }
    }

    #[inline]
    pub fn attachment(format: ImageFormat) -> u32 {
        if format.is_depth() { glow::DEPTH_ATTACHMENT } else { glow::COLOR_ATTACHMENT0 }
    }

    /// pixel buffer 中每一行按 `GL_UNPACK_ALIGNMENT` (4) 对齐
    #[inline]
    pub fn aligned_row_pitch(format: ImageFormat, width: u32) -> usize {
        (format.pixel_size() * width as usize).next_multiple_of(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgra_swaps_on_upload() {
        let bgra = GlFormatUtils::to_gl(ImageFormat::Bgra32);
        let rgba = GlFormatUtils::to_gl(ImageFormat::Rgba32);
        assert_eq!(bgra.internal_format, rgba.internal_format);
        assert_eq!(bgra.format, glow::BGRA);
    }

    #[test]
    fn test_depth_formats() {
        let depth = GlFormatUtils::to_gl(ImageFormat::Depth32F);
        assert_eq!(depth.internal_format, glow::DEPTH_COMPONENT32F);
        assert_eq!(GlFormatUtils::attachment(ImageFormat::Depth16), glow::DEPTH_ATTACHMENT);
        assert_eq!(GlFormatUtils::attachment(ImageFormat::Rgba128F), glow::COLOR_ATTACHMENT0);
    }

    #[test]
    fn test_row_pitch_alignment() {
        assert_eq!(GlFormatUtils::aligned_row_pitch(ImageFormat::R8Unorm, 3), 4);
        assert_eq!(GlFormatUtils::aligned_row_pitch(ImageFormat::Rg16, 5), 12);
        assert_eq!(GlFormatUtils::aligned_row_pitch(ImageFormat::Rgba32, 3), 12);
    }
}
