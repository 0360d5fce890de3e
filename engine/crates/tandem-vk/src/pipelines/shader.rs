use ash::vk;

use crate::error::construction_error;
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::VulkanDevice;
use tandem_gfx::renderer::shader::ShaderStage;
use tandem_gfx::{GfxError, GfxResult};

/// # Destroy
///
/// 只在创建 pipeline 期间存在，需要手动调用 `destroy`
pub struct VulkanShaderModule {
    handle: vk::ShaderModule,
    stage: vk::ShaderStageFlags,
}
impl VulkanShaderModule {
    /// `code` 是 SPIR-V 二进制，长度必须是 4 的倍数
    pub fn new(device: &VulkanDevice, stage: ShaderStage, code: &[u8], name: &str) -> GfxResult<Self> {
        let object_name = format!("{}::{name}-{stage:?}", Self::debug_type_name());
        let words = ash::util::read_spv(&mut std::io::Cursor::new(code))
            .map_err(|e| GfxError::construction(&object_name, format!("invalid SPIR-V: {e}")))?;

        let shader_module_info = vk::ShaderModuleCreateInfo::default().code(&words);
        let handle = unsafe { device.create_shader_module(&shader_module_info, None) }
            .map_err(|e| construction_error(&object_name, e))?;

        let module = Self {
            handle,
            stage: Self::stage_flags(stage),
        };
        device.set_debug_name(&module, format!("{name}-{stage:?}"));
        Ok(module)
    }

    pub fn stage_flags(stage: ShaderStage) -> vk::ShaderStageFlags {
        match stage {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::TessellationControl => vk::ShaderStageFlags::TESSELLATION_CONTROL,
            ShaderStage::TessellationEvaluation => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
        }
    }

    /// 入口函数固定为 `main`
    #[inline]
    pub fn stage_info(&self) -> vk::PipelineShaderStageCreateInfo<'static> {
        vk::PipelineShaderStageCreateInfo::default().stage(self.stage).module(self.handle).name(c"main")
    }

    #[inline]
    pub fn destroy(self, device: &VulkanDevice) {
        unsafe {
            device.destroy_shader_module(self.handle, None);
        }
    }
}
impl DebugType for VulkanShaderModule {
    fn debug_type_name() -> &'static str {
        "GfxShaderModule"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_flags() {
        assert_eq!(VulkanShaderModule::stage_flags(ShaderStage::Vertex), vk::ShaderStageFlags::VERTEX);
        assert_eq!(
            VulkanShaderModule::stage_flags(ShaderStage::TessellationEvaluation),
            vk::ShaderStageFlags::TESSELLATION_EVALUATION
        );
        assert_eq!(VulkanShaderModule::stage_flags(ShaderStage::Compute), vk::ShaderStageFlags::COMPUTE);
    }

    #[test]
    fn test_spirv_must_be_word_aligned() {
        // 不需要 device 就能验证：read_spv 拒绝长度不是 4 的倍数的输入
        assert!(ash::util::read_spv(&mut std::io::Cursor::new(&[0x03u8, 0x02, 0x23][..])).is_err());
    }
}
