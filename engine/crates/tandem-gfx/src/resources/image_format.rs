/// 与后端无关的图像格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ImageFormat {
    R8,
    R8Unorm,
    Rg16,
    Rgba32,
    Rgba32Srgb,
    Bgra32,
    Bgra32Srgb,
    Rgba64F,
    Rgba128F,
    Depth16,
    Depth32F,
}

impl ImageFormat {
    /// 单个像素占用的字节数
    #[inline]
    pub const fn pixel_size(self) -> usize {
        match self {
            Self::R8 | Self::R8Unorm => 1,
            Self::Rg16 | Self::Depth16 => 2,
            Self::Rgba32 | Self::Rgba32Srgb | Self::Bgra32 | Self::Bgra32Srgb | Self::Depth32F => 4,
            Self::Rgba64F => 8,
            Self::Rgba128F => 16,
        }
    }

    #[inline]
    pub const fn is_depth(self) -> bool {
        matches!(self, Self::Depth16 | Self::Depth32F)
    }

    /// 所有后端都保证可以作为 color attachment 的格式
    #[inline]
    pub const fn is_colour_attachment(self) -> bool {
        matches!(
            self,
            Self::R8Unorm
                | Self::Rgba32
                | Self::Rgba32Srgb
                | Self::Bgra32
                | Self::Bgra32Srgb
                | Self::Rgba64F
                | Self::Rgba128F
        )
    }

    /// 将归一化的颜色编码为该格式的一个像素
    ///
    /// depth 格式编码为 1.0 的深度
    pub fn encode_colour(self, colour: glam::Vec4) -> Vec<u8> {
        let unorm = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        match self {
            Self::R8 | Self::R8Unorm => vec![unorm(colour.x)],
            Self::Rg16 => vec![unorm(colour.x), unorm(colour.y)],
            Self::Rgba32 | Self::Rgba32Srgb => {
                vec![unorm(colour.x), unorm(colour.y), unorm(colour.z), unorm(colour.w)]
            }
            Self::Bgra32 | Self::Bgra32Srgb => {
                vec![unorm(colour.z), unorm(colour.y), unorm(colour.x), unorm(colour.w)]
            }
            Self::Rgba64F => [colour.x, colour.y, colour.z, colour.w]
                .iter()
                .flat_map(|c| f16_bits(*c).to_le_bytes())
                .collect(),
            Self::Rgba128F => bytemuck::bytes_of(&colour.to_array()).to_vec(),
            Self::Depth16 => u16::MAX.to_le_bytes().to_vec(),
            Self::Depth32F => 1.0f32.to_le_bytes().to_vec(),
        }
    }
}

/// 简化的 f32 -> f16 转换，只处理规格化数与零
fn f16_bits(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xff) as i32 - 127 + 15;
    let mantissa = bits & 0x007f_ffff;
    if exp <= 0 {
        sign
    } else if exp >= 0x1f {
        sign | 0x7c00
    } else {
        sign | ((exp as u16) << 10) | (mantissa >> 13) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_size() {
        assert_eq!(ImageFormat::R8.pixel_size(), 1);
        assert_eq!(ImageFormat::Rgba32.pixel_size(), 4);
        assert_eq!(ImageFormat::Rgba128F.pixel_size(), 16);
    }

    #[test]
    fn test_encode_colour() {
        let colour = glam::Vec4::new(1.0, 0.0, 0.5, 1.0);
        assert_eq!(ImageFormat::Rgba32.encode_colour(colour), vec![255, 0, 128, 255]);
        // bgra 交换 r 与 b
        assert_eq!(ImageFormat::Bgra32.encode_colour(colour), vec![128, 0, 255, 255]);
        assert_eq!(ImageFormat::Rgba128F.encode_colour(colour).len(), 16);
        // f16(1.0) = 0x3c00
        assert_eq!(&ImageFormat::Rgba64F.encode_colour(colour)[0..2], &0x3c00u16.to_le_bytes());
    }
}
