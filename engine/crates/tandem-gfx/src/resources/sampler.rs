use crate::error::{GfxError, GfxResult};
use crate::resources::resource::ResourceFlags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerFilter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerMipMode {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerWrap {
    ClampToEdge,
    Repeat,
    MirroredRepeat,
}

/// 与后端无关的采样器描述
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GfxSamplerDesc {
    pub filter: SamplerFilter,
    pub mip_mode: SamplerMipMode,
    pub wrap: SamplerWrap,
}

impl Default for GfxSamplerDesc {
    fn default() -> Self {
        Self {
            filter: SamplerFilter::Nearest,
            mip_mode: SamplerMipMode::Nearest,
            wrap: SamplerWrap::ClampToEdge,
        }
    }
}

impl GfxSamplerDesc {
    /// 根据 image 资源的 flags 得到合适的采样器
    ///
    /// 未指定的部分使用默认值：nearest 过滤，nearest mip，clamp to edge。
    /// 同时指定互斥的 filter flags，或三种 wrap flags 全部指定，都是错误。
    pub fn from_flags(flags: ResourceFlags, name: &str) -> GfxResult<Self> {
        let mut desc = Self::default();

        if flags.contains(ResourceFlags::IMAGE_FILTER_NEAREST | ResourceFlags::IMAGE_FILTER_LINEAR) {
            return Err(GfxError::construction(
                format!("GfxSampler::{name}"),
                "ImageFilterNearest and ImageFilterLinear are mutually exclusive",
            ));
        }
        if flags.contains(ResourceFlags::IMAGE_FILTER_LINEAR) {
            desc.filter = SamplerFilter::Linear;
        }

        if flags.contains(ResourceFlags::IMAGE_MIP_LINEAR) {
            desc.mip_mode = SamplerMipMode::Linear;
        }

        let all_wraps = ResourceFlags::IMAGE_WRAP_CLAMP_EDGE
            | ResourceFlags::IMAGE_WRAP_REPEAT
            | ResourceFlags::IMAGE_WRAP_MIRRORED_REPEAT;
        if flags.contains(all_wraps) {
            return Err(GfxError::construction(
                format!("GfxSampler::{name}"),
                "at most two image wrap flags may be specified",
            ));
        }
        // 后出现的 flag 覆盖前面的：mirrored repeat > repeat > clamp
        if flags.contains(ResourceFlags::IMAGE_WRAP_MIRRORED_REPEAT) {
            desc.wrap = SamplerWrap::MirroredRepeat;
        } else if flags.contains(ResourceFlags::IMAGE_WRAP_REPEAT) {
            desc.wrap = SamplerWrap::Repeat;
        }

        Ok(desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sampler() {
        let desc = GfxSamplerDesc::from_flags(ResourceFlags::empty(), "t").unwrap();
        assert_eq!(desc, GfxSamplerDesc::default());
    }

    #[test]
    fn test_filter_conflict() {
        let flags = ResourceFlags::IMAGE_FILTER_NEAREST | ResourceFlags::IMAGE_FILTER_LINEAR;
        assert!(matches!(
            GfxSamplerDesc::from_flags(flags, "t"),
            Err(GfxError::ConstructionFailure { .. })
        ));
    }

    #[test]
    fn test_wrap_priority() {
        let flags = ResourceFlags::IMAGE_WRAP_CLAMP_EDGE | ResourceFlags::IMAGE_WRAP_REPEAT;
        assert_eq!(GfxSamplerDesc::from_flags(flags, "t").unwrap().wrap, SamplerWrap::Repeat);

        let flags = ResourceFlags::IMAGE_WRAP_REPEAT | ResourceFlags::IMAGE_WRAP_MIRRORED_REPEAT;
        assert_eq!(GfxSamplerDesc::from_flags(flags, "t").unwrap().wrap, SamplerWrap::MirroredRepeat);

        let flags = ResourceFlags::IMAGE_WRAP_CLAMP_EDGE
            | ResourceFlags::IMAGE_WRAP_REPEAT
            | ResourceFlags::IMAGE_WRAP_MIRRORED_REPEAT;
        assert!(GfxSamplerDesc::from_flags(flags, "t").is_err());
    }

    #[test]
    fn test_linear_filter_and_mip() {
        let flags = ResourceFlags::IMAGE_FILTER_LINEAR | ResourceFlags::IMAGE_MIP_LINEAR;
        let desc = GfxSamplerDesc::from_flags(flags, "t").unwrap();
        assert_eq!(desc.filter, SamplerFilter::Linear);
        assert_eq!(desc.mip_mode, SamplerMipMode::Linear);
    }
}
