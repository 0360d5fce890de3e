use ash::vk;

use crate::error::construction_error;
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::VulkanDevice;
use tandem_gfx::GfxResult;
use tandem_gfx::resources::sampler::{GfxSamplerDesc, SamplerFilter, SamplerMipMode, SamplerWrap};

pub struct VulkanSampler {
    handle: vk::Sampler,
}
// new & init
impl VulkanSampler {
    pub fn new(device: &VulkanDevice, desc: &GfxSamplerDesc, name: &str) -> GfxResult<Self> {
        let create_info = Self::create_info(desc);
        let handle = unsafe { device.create_sampler(&create_info, None) }
            .map_err(|e| construction_error(&format!("GfxSampler::{name}"), e))?;

        let sampler = Self { handle };
        device.set_debug_name(&sampler, name);
        Ok(sampler)
    }

    /// 只有一个 mip level，但 mipmap mode 仍然按照 flags 设置
    pub fn create_info(desc: &GfxSamplerDesc) -> vk::SamplerCreateInfo<'static> {
        let filter = match desc.filter {
            SamplerFilter::Nearest => vk::Filter::NEAREST,
            SamplerFilter::Linear => vk::Filter::LINEAR,
        };
        let mipmap_mode = match desc.mip_mode {
            SamplerMipMode::Nearest => vk::SamplerMipmapMode::NEAREST,
            SamplerMipMode::Linear => vk::SamplerMipmapMode::LINEAR,
        };
        let address_mode = match desc.wrap {
            SamplerWrap::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
            SamplerWrap::Repeat => vk::SamplerAddressMode::REPEAT,
            SamplerWrap::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        };

        vk::SamplerCreateInfo::default()
            .mag_filter(filter)
            .min_filter(filter)
            .address_mode_u(address_mode)
            .address_mode_v(address_mode)
            .address_mode_w(address_mode)
            .mipmap_mode(mipmap_mode)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE)
            .anisotropy_enable(false)
            .compare_enable(false)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
    }

    pub fn destroy(self, device: &VulkanDevice) {
        unsafe {
            device.destroy_sampler(self.handle, None);
        }
    }
}
// getters
impl VulkanSampler {
    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.handle
    }
}
impl DebugType for VulkanSampler {
    fn debug_type_name() -> &'static str {
        "GfxSampler"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sampler_info() {
        let info = VulkanSampler::create_info(&GfxSamplerDesc::default());
        assert_eq!(info.mag_filter, vk::Filter::NEAREST);
        assert_eq!(info.mipmap_mode, vk::SamplerMipmapMode::NEAREST);
        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::CLAMP_TO_EDGE);
    }

    #[test]
    fn test_linear_mirrored_sampler_info() {
        let desc = GfxSamplerDesc {
            filter: SamplerFilter::Linear,
            mip_mode: SamplerMipMode::Linear,
            wrap: SamplerWrap::MirroredRepeat,
        };
        let info = VulkanSampler::create_info(&desc);
        assert_eq!(info.min_filter, vk::Filter::LINEAR);
        assert_eq!(info.mipmap_mode, vk::SamplerMipmapMode::LINEAR);
        assert_eq!(info.address_mode_w, vk::SamplerAddressMode::MIRRORED_REPEAT);
    }
}
