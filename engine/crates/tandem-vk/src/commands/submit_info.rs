use ash::vk;
use itertools::Itertools;

use crate::commands::sync::VulkanSemaphore;
use tandem_gfx::backend::PipelineStage;

/// 关于 SubmitInfo2 的封装，更易用
#[derive(Default)]
pub struct GfxSubmitInfo {
    command_buffers: Vec<vk::CommandBufferSubmitInfo<'static>>,
    wait_infos: Vec<vk::SemaphoreSubmitInfo<'static>>,
    signal_infos: Vec<vk::SemaphoreSubmitInfo<'static>>,
}

impl GfxSubmitInfo {
    pub fn new(commands: &[vk::CommandBuffer]) -> Self {
        Self {
            command_buffers: commands
                .iter()
                .map(|cmd| vk::CommandBufferSubmitInfo::default().command_buffer(*cmd))
                .collect_vec(),
            ..Default::default()
        }
    }

    #[inline]
    pub fn submit_info(&self) -> vk::SubmitInfo2<'_> {
        vk::SubmitInfo2::default()
            .command_buffer_infos(&self.command_buffers)
            .wait_semaphore_infos(&self.wait_infos)
            .signal_semaphore_infos(&self.signal_infos)
    }

    #[inline]
    pub fn wait(mut self, semaphore: &VulkanSemaphore, stage: PipelineStage) -> Self {
        self.wait_infos.push(
            vk::SemaphoreSubmitInfo::default().semaphore(semaphore.handle()).stage_mask(Self::stage_flags(stage)),
        );
        self
    }

    /// binary semaphore 在所有命令完成之后 signal
    #[inline]
    pub fn signal(mut self, semaphore: &VulkanSemaphore) -> Self {
        self.signal_infos.push(
            vk::SemaphoreSubmitInfo::default()
                .semaphore(semaphore.handle())
                .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS),
        );
        self
    }

    pub fn stage_flags(stage: PipelineStage) -> vk::PipelineStageFlags2 {
        match stage {
            PipelineStage::TopOfPipe => vk::PipelineStageFlags2::TOP_OF_PIPE,
            PipelineStage::ColourAttachmentOutput => vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            PipelineStage::ComputeShader => vk::PipelineStageFlags2::COMPUTE_SHADER,
            PipelineStage::Transfer => vk::PipelineStageFlags2::TRANSFER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_flags() {
        assert_eq!(
            GfxSubmitInfo::stage_flags(PipelineStage::ColourAttachmentOutput),
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT
        );
        assert_eq!(GfxSubmitInfo::stage_flags(PipelineStage::ComputeShader), vk::PipelineStageFlags2::COMPUTE_SHADER);
    }

    #[test]
    fn test_submit_info_counts() {
        let info = GfxSubmitInfo::new(&[vk::CommandBuffer::null()]);
        let submit = info.submit_info();
        assert_eq!(submit.command_buffer_info_count, 1);
        assert_eq!(submit.wait_semaphore_info_count, 0);
    }
}
