use ash::vk;
use glam::{UVec2, UVec3};
use itertools::Itertools;

use crate::commands::barrier::{GfxBarriers, GfxBufferBarrier, GfxImageBarrier};
use crate::commands::command_pool::VulkanCommandPool;
use crate::error::{construction_error, vk_check};
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::VulkanDevice;
use crate::vulkan_backend::VulkanBackend;
use tandem_gfx::backend::RecordTargets;
use tandem_gfx::commands::command_list::{BindPoint, Command, CommandList};
use tandem_gfx::{GfxError, GfxResult};

/// 命令缓冲封装
///
/// 所有命令都需要显式传入 device。录制后端无关的 [`CommandList`] 见 [`Self::record_list`]
pub struct VulkanCommandBuffer {
    vk_handle: vk::CommandBuffer,
    name: String,
}
// new & init
impl VulkanCommandBuffer {
    pub fn new(device: &VulkanDevice, command_pool: &VulkanCommandPool, debug_name: &str) -> GfxResult<Self> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool.handle())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffers = unsafe { device.allocate_command_buffers(&info) }
            .map_err(|e| construction_error(&format!("GfxCommandBuffer::{debug_name}"), e))?;
        let Some(vk_handle) = command_buffers.first().copied() else {
            return Err(GfxError::construction(
                format!("GfxCommandBuffer::{debug_name}"),
                "driver returned no command buffer",
            ));
        };

        let cmd_buffer = Self {
            vk_handle,
            name: debug_name.to_string(),
        };
        device.set_debug_name(&cmd_buffer, debug_name);
        Ok(cmd_buffer)
    }
}
// Basic 命令
impl VulkanCommandBuffer {
    /// 开始录制 command，会隐式 reset 之前录制的内容
    #[inline]
    pub fn begin(&self, device: &VulkanDevice, usage_flag: vk::CommandBufferUsageFlags) -> GfxResult<()> {
        vk_check("begin_command_buffer", unsafe {
            device.begin_command_buffer(self.vk_handle, &vk::CommandBufferBeginInfo::default().flags(usage_flag))
        })
    }

    #[inline]
    pub fn end(&self, device: &VulkanDevice) -> GfxResult<()> {
        vk_check("end_command_buffer", unsafe { device.end_command_buffer(self.vk_handle) })
    }
}
// getters
impl VulkanCommandBuffer {
    #[inline]
    pub fn vk_handle(&self) -> vk::CommandBuffer {
        self.vk_handle
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}
// 数据传输类型
impl VulkanCommandBuffer {
    /// - command type: action
    /// - 支持的 queue：transfer，graphics，compute
    #[inline]
    pub fn cmd_copy_buffer(&self, device: &VulkanDevice, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        unsafe {
            device.cmd_copy_buffer(self.vk_handle, src, dst, regions);
        }
    }

    /// - command type: action
    /// - 支持的 queue：transfer，graphics，compute
    #[inline]
    pub fn cmd_copy_buffer_to_image(&self, device: &VulkanDevice, copy_info: &vk::CopyBufferToImageInfo2) {
        unsafe { device.cmd_copy_buffer_to_image2(self.vk_handle, copy_info) }
    }
}
// 绘制类型的命令
impl VulkanCommandBuffer {
    /// - command type: action, state
    /// - supported queue types: graphics
    #[inline]
    pub fn cmd_begin_render_pass(&self, device: &VulkanDevice, begin_info: &vk::RenderPassBeginInfo) {
        unsafe {
            device.cmd_begin_render_pass(self.vk_handle, begin_info, vk::SubpassContents::INLINE);
        }
    }

    #[inline]
    pub fn cmd_end_render_pass(&self, device: &VulkanDevice) {
        unsafe {
            device.cmd_end_render_pass(self.vk_handle);
        }
    }

    /// - command type: state
    /// - supported queue types: graphics, compute
    #[inline]
    pub fn cmd_bind_pipeline(&self, device: &VulkanDevice, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe {
            device.cmd_bind_pipeline(self.vk_handle, bind_point, pipeline);
        }
    }

    /// - command type: state
    /// - supported queue types: graphics, compute
    #[inline]
    pub fn bind_descriptor_set(
        &self,
        device: &VulkanDevice,
        bind_point: vk::PipelineBindPoint,
        pipeline_layout: vk::PipelineLayout,
        descriptor_set: vk::DescriptorSet,
    ) {
        unsafe {
            device.cmd_bind_descriptor_sets(
                self.vk_handle,
                bind_point,
                pipeline_layout,
                0,
                std::slice::from_ref(&descriptor_set),
                &[],
            );
        }
    }

    /// index 总是 u32
    /// - command type: state
    /// - supported queue types: graphics
    #[inline]
    pub fn cmd_bind_index_buffer(&self, device: &VulkanDevice, buffer: vk::Buffer) {
        unsafe {
            device.cmd_bind_index_buffer(self.vk_handle, buffer, 0, vk::IndexType::UINT32);
        }
    }

    #[inline]
    pub fn cmd_set_viewport(&self, device: &VulkanDevice, extent: UVec2) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.x as f32,
            height: extent.y as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        unsafe {
            device.cmd_set_viewport(self.vk_handle, 0, std::slice::from_ref(&viewport));
        }
    }

    #[inline]
    pub fn cmd_set_scissor(&self, device: &VulkanDevice, offset: UVec2, extent: UVec2) {
        unsafe {
            device.cmd_set_scissor(self.vk_handle, 0, std::slice::from_ref(&Self::scissor_rect(offset, extent)));
        }
    }

    /// - command type: action
    /// - supported queue types: graphics
    #[inline]
    pub fn cmd_draw(&self, device: &VulkanDevice, vertex_count: u32) {
        unsafe {
            device.cmd_draw(self.vk_handle, vertex_count, 1, 0, 0);
        }
    }

    #[inline]
    pub fn cmd_draw_indexed(&self, device: &VulkanDevice, index_count: u32) {
        unsafe {
            device.cmd_draw_indexed(self.vk_handle, index_count, 1, 0, 0, 0);
        }
    }

    #[inline]
    pub fn cmd_draw_indirect(&self, device: &VulkanDevice, buffer: vk::Buffer, draw_count: u32, stride: u32) {
        unsafe {
            device.cmd_draw_indirect(self.vk_handle, buffer, 0, draw_count, stride);
        }
    }

    #[inline]
    pub fn cmd_draw_indexed_indirect(&self, device: &VulkanDevice, buffer: vk::Buffer, draw_count: u32, stride: u32) {
        unsafe {
            device.cmd_draw_indexed_indirect(self.vk_handle, buffer, 0, draw_count, stride);
        }
    }
}
// 计算着色器相关命令
impl VulkanCommandBuffer {
    #[inline]
    pub fn cmd_dispatch(&self, device: &VulkanDevice, group_cnt: UVec3) {
        unsafe {
            device.cmd_dispatch(self.vk_handle, group_cnt.x, group_cnt.y, group_cnt.z);
        }
    }
}
// 同步相关命令
impl VulkanCommandBuffer {
    /// - command type: synchronize
    /// - supported queue types: graphics, compute, transfer
    #[inline]
    pub fn memory_barrier(&self, device: &VulkanDevice, barriers: &[vk::MemoryBarrier2]) {
        let dependency_info = vk::DependencyInfo::default().memory_barriers(barriers);
        unsafe {
            device.cmd_pipeline_barrier2(self.vk_handle, &dependency_info);
        }
    }

    #[inline]
    pub fn image_memory_barrier(&self, device: &VulkanDevice, barriers: &[GfxImageBarrier]) {
        if barriers.is_empty() {
            return;
        }
        let barriers = barriers.iter().map(|b| *b.inner()).collect_vec();
        let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&barriers);
        unsafe {
            device.cmd_pipeline_barrier2(self.vk_handle, &dependency_info);
        }
    }

    #[inline]
    pub fn buffer_memory_barrier(&self, device: &VulkanDevice, barriers: &[GfxBufferBarrier]) {
        if barriers.is_empty() {
            return;
        }
        let barriers = barriers.iter().map(|b| *b.inner()).collect_vec();
        let dependency_info = vk::DependencyInfo::default().buffer_memory_barriers(&barriers);
        unsafe {
            device.cmd_pipeline_barrier2(self.vk_handle, &dependency_info);
        }
    }
}
// debug 相关命令
impl VulkanCommandBuffer {
    /// 名字中包含 `\0` 时不插入 label
    #[inline]
    pub fn begin_label(&self, device: &VulkanDevice, label_name: &str, label_color: [f32; 4]) {
        let Ok(name) = std::ffi::CString::new(label_name) else {
            log::warn!("label name contains nul byte: {label_name:?}");
            return;
        };
        unsafe {
            device.debug_utils.cmd_begin_debug_utils_label(
                self.vk_handle,
                &vk::DebugUtilsLabelEXT::default().label_name(name.as_c_str()).color(label_color),
            );
        }
    }

    #[inline]
    pub fn end_label(&self, device: &VulkanDevice) {
        unsafe {
            device.debug_utils.cmd_end_debug_utils_label(self.vk_handle);
        }
    }
}
// 录制 CommandList
impl VulkanCommandBuffer {
    /// 把后端无关的命令翻译成 vulkan 命令
    ///
    /// 中途出错时依然会结束录制，command buffer 下次 begin 时会被隐式 reset
    pub fn record_list(
        &self,
        device: &VulkanDevice,
        commands: &CommandList,
        targets: &RecordTargets<'_, VulkanBackend>,
    ) -> GfxResult<()> {
        let _span = tracy_client::span!("VulkanCommandBuffer::record_list");

        // 命令会被重复提交，不能使用 ONE_TIME_SUBMIT
        self.begin(device, vk::CommandBufferUsageFlags::empty())?;
        let result = commands.iter().try_for_each(|command| self.record_command(device, command, targets));
        let end_result = self.end(device);
        result.and(end_result)
    }

    fn record_command(
        &self,
        device: &VulkanDevice,
        command: &Command,
        targets: &RecordTargets<'_, VulkanBackend>,
    ) -> GfxResult<()> {
        match command {
            Command::BeginLabel { name, colour } => self.begin_label(device, name, *colour),
            Command::EndLabel => self.end_label(device),
            Command::BeginRenderPass {
                framebuffer,
                extent,
                clear_colour,
            } => {
                let render_pass = targets.render_pass()?;
                let framebuffer = targets.framebuffer(*framebuffer)?;
                let clear_values = Self::clear_values(clear_colour.map(|c| c.to_array()), render_pass.has_depth());
                let begin_info = vk::RenderPassBeginInfo::default()
                    .render_pass(render_pass.handle())
                    .framebuffer(framebuffer.handle())
                    .render_area(Self::scissor_rect(UVec2::ZERO, *extent))
                    .clear_values(&clear_values);
                self.cmd_begin_render_pass(device, &begin_info);
            }
            Command::EndRenderPass => self.cmd_end_render_pass(device),
            Command::BindPipeline { bind_point } => {
                let pipeline = targets.pipeline();
                self.cmd_bind_pipeline(device, Self::bind_point(*bind_point), pipeline.handle());
            }
            Command::BindDescriptorSet { bind_point, set } => {
                let bindings = targets
                    .bindings()
                    .ok_or_else(|| GfxError::InvalidHandle("renderer has no descriptor bindings".to_string()))?;
                let descriptor_set = bindings
                    .set(*set)
                    .ok_or_else(|| GfxError::InvalidHandle(format!("descriptor set {set} does not exist")))?;
                self.bind_descriptor_set(
                    device,
                    Self::bind_point(*bind_point),
                    targets.pipeline().layout(),
                    descriptor_set,
                );
            }
            Command::SetViewport { extent } => self.cmd_set_viewport(device, *extent),
            Command::SetScissor { offset, extent } => self.cmd_set_scissor(device, *offset, *extent),
            Command::BindIndexBuffer { buffer } => {
                self.cmd_bind_index_buffer(device, targets.buffer(*buffer)?.vk_buffer());
            }
            Command::Draw { vertex_count } => self.cmd_draw(device, *vertex_count),
            Command::DrawIndexed { index_count } => self.cmd_draw_indexed(device, *index_count),
            Command::DrawIndirect {
                buffer,
                draw_count,
                stride,
            } => {
                self.cmd_draw_indirect(device, targets.buffer(*buffer)?.vk_buffer(), *draw_count, *stride);
            }
            Command::DrawIndexedIndirect {
                buffer,
                draw_count,
                stride,
            } => {
                self.cmd_draw_indexed_indirect(device, targets.buffer(*buffer)?.vk_buffer(), *draw_count, *stride);
            }
            Command::Dispatch { groups } => {
                self.cmd_dispatch(device, *groups);
                // 结果需要对 host 与后续命令可见
                self.memory_barrier(device, &[GfxBarriers::compute_to_host()]);
            }
        }
        Ok(())
    }

    /// 第一个 attachment 是 colour，第二个（如果有）是 depth，depth 总是 clear 为 1.0
    pub fn clear_values(clear_colour: Option<[f32; 4]>, has_depth: bool) -> Vec<vk::ClearValue> {
        let mut clear_values = vec![vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear_colour.unwrap_or([0.0; 4]),
            },
        }];
        if has_depth {
            clear_values.push(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            });
        }
        clear_values
    }

    #[inline]
    pub fn bind_point(bind_point: BindPoint) -> vk::PipelineBindPoint {
        match bind_point {
            BindPoint::Graphics => vk::PipelineBindPoint::GRAPHICS,
            BindPoint::Compute => vk::PipelineBindPoint::COMPUTE,
        }
    }

    #[inline]
    pub fn scissor_rect(offset: UVec2, extent: UVec2) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D {
                x: offset.x as i32,
                y: offset.y as i32,
            },
            extent: vk::Extent2D {
                width: extent.x,
                height: extent.y,
            },
        }
    }
}
impl DebugType for VulkanCommandBuffer {
    fn debug_type_name() -> &'static str {
        "GfxCommandBuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_values_with_depth() {
        let values = VulkanCommandBuffer::clear_values(Some([0.1, 0.2, 0.3, 1.0]), true);
        assert_eq!(values.len(), 2);
        unsafe {
            assert_eq!(values[0].color.float32, [0.1, 0.2, 0.3, 1.0]);
            assert_eq!(values[1].depth_stencil.depth, 1.0);
        }
    }

    #[test]
    fn test_clear_values_default_colour() {
        let values = VulkanCommandBuffer::clear_values(None, false);
        assert_eq!(values.len(), 1);
        unsafe {
            assert_eq!(values[0].color.float32, [0.0; 4]);
        }
    }

    #[test]
    fn test_scissor_rect() {
        let rect = VulkanCommandBuffer::scissor_rect(UVec2::new(4, 8), UVec2::new(100, 50));
        assert_eq!(rect.offset.x, 4);
        assert_eq!(rect.offset.y, 8);
        assert_eq!(rect.extent.width, 100);
        assert_eq!(rect.extent.height, 50);
    }

    #[test]
    fn test_bind_point() {
        assert_eq!(VulkanCommandBuffer::bind_point(BindPoint::Compute), vk::PipelineBindPoint::COMPUTE);
        assert_eq!(VulkanCommandBuffer::bind_point(BindPoint::Graphics), vk::PipelineBindPoint::GRAPHICS);
    }
}
