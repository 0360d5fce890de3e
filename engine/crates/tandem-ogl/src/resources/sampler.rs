use glow::HasContext;

use crate::error::construction_error;
use crate::foundation::debug_output::{GlDebugOutput, GlDebugType};
use tandem_gfx::GfxResult;
use tandem_gfx::resources::sampler::{GfxSamplerDesc, SamplerFilter, SamplerMipMode, SamplerWrap};

pub struct GlSampler {
    handle: glow::NativeSampler,
}
impl GlSampler {
    pub fn new(gl: &glow::Context, desc: &GfxSamplerDesc, name: &str) -> GfxResult<Self> {
        let handle = unsafe { gl.create_sampler() }
            .map_err(|e| construction_error(&format!("{}::{name}", Self::debug_type_name()), e))?;
        for (parameter, value) in Self::parameters(desc) {
            unsafe { gl.sampler_parameter_i32(handle, parameter, value) };
        }

        let sampler = Self { handle };
        GlDebugOutput::set_debug_name(gl, &sampler, name);
        Ok(sampler)
    }

    /// texture 只有一层 mip，mip 模式只影响 min filter 的选择
    pub fn parameters(desc: &GfxSamplerDesc) -> [(u32, i32); 5] {
        let min_filter = match (desc.filter, desc.mip_mode) {
            (SamplerFilter::Nearest, SamplerMipMode::Nearest) => glow::NEAREST_MIPMAP_NEAREST,
            (SamplerFilter::Nearest, SamplerMipMode::Linear) => glow::NEAREST_MIPMAP_LINEAR,
            (SamplerFilter::Linear, SamplerMipMode::Nearest) => glow::LINEAR_MIPMAP_NEAREST,
            (SamplerFilter::Linear, SamplerMipMode::Linear) => glow::LINEAR_MIPMAP_LINEAR,
        };
        let mag_filter = match desc.filter {
            SamplerFilter::Nearest => glow::NEAREST,
            SamplerFilter::Linear => glow::LINEAR,
        };
        let wrap = match desc.wrap {
            SamplerWrap::ClampToEdge => glow::CLAMP_TO_EDGE,
            SamplerWrap::Repeat => glow::REPEAT,
            SamplerWrap::MirroredRepeat => glow::MIRRORED_REPEAT,
        } as i32;

        [
            (glow::TEXTURE_MIN_FILTER, min_filter as i32),
            (glow::TEXTURE_MAG_FILTER, mag_filter as i32),
            (glow::TEXTURE_WRAP_S, wrap),
            (glow::TEXTURE_WRAP_T, wrap),
            (glow::TEXTURE_WRAP_R, wrap),
        ]
    }

    pub fn destroy(self, gl: &glow::Context) {
        unsafe {
            gl.delete_sampler(self.handle);
        }
    }
}
impl GlSampler {
    #[inline]
    pub fn handle(&self) -> glow::NativeSampler {
        self.handle
    }
}
impl GlDebugType for GlSampler {
    fn debug_type_name() -> &'static str {
        "GfxSampler"
    }

    fn gl_identifier() -> u32 {
        glow::SAMPLER
    }

    fn gl_name(&self) -> u32 {
        self.handle.0.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_parameters() {
        let parameters = GlSampler::parameters(&GfxSamplerDesc::default());
        assert_eq!(parameters[0], (glow::TEXTURE_MIN_FILTER, glow::NEAREST_MIPMAP_NEAREST as i32));
        assert_eq!(parameters[1], (glow::TEXTURE_MAG_FILTER, glow::NEAREST as i32));
        assert!(parameters[2..].iter().all(|(_, v)| *v == glow::CLAMP_TO_EDGE as i32));
    }

    #[test]
    fn test_linear_repeat() {
        let desc = GfxSamplerDesc {
            filter: SamplerFilter::Linear,
            mip_mode: SamplerMipMode::Linear,
            wrap: SamplerWrap::Repeat,
        };
        let parameters = GlSampler::parameters(&desc);
        assert_eq!(parameters[0].1, glow::LINEAR_MIPMAP_LINEAR as i32);
        assert_eq!(parameters[1].1, glow::LINEAR as i32);
        assert_eq!(parameters[4], (glow::TEXTURE_WRAP_R, glow::REPEAT as i32));
    }
}
