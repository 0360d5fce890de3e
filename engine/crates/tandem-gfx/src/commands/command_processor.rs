use std::rc::Rc;

use glam::Vec4;
use itertools::Itertools;

use crate::backend::{
    GfxBackend, GpuObject, PipelineStage, QueueKind, RecordTargets, RenderWorkSubmitResult, SubmitInfo, TransferOp,
};
use crate::commands::command_list::{CommandList, GraphicsRecordParams, record_compute, record_graphics};
use crate::error::{GfxError, GfxResult};
use crate::renderer::options::RendererOptions;
use crate::renderer::output::{AcquireInfo, AcquireOutcome, ScissorRegion};
use crate::renderer::render_state::RenderState;
use crate::resources::resource_storage::ResourceStorage;

/// 当前已经 acquire 的 swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AcquiredImage {
    image_index: usize,
    /// acquire 时使用的 frame in flight 下标
    frame: usize,
    wait_semaphore: bool,
    check_fence: bool,
}

/// 收集一次性 transfer 命令
pub struct ScratchRecorder<'a, B: GfxBackend> {
    ops: Vec<TransferOp<'a, B>>,
}

impl<'a, B: GfxBackend> ScratchRecorder<'a, B> {
    #[inline]
    pub fn upload_buffer(&mut self, dst: &'a B::Buffer, data: &'a [u8]) -> &mut Self {
        self.ops.push(TransferOp::UploadBuffer { dst, data });
        self
    }

    #[inline]
    pub fn upload_image(&mut self, dst: &'a B::Image, data: &'a [u8]) -> &mut Self {
        self.ops.push(TransferOp::UploadImage { dst, data });
        self
    }

    #[inline]
    pub fn extend(&mut self, ops: impl IntoIterator<Item = TransferOp<'a, B>>) -> &mut Self {
        self.ops.extend(ops);
        self
    }
}

/// 录制并提交 Renderer 的命令
///
/// 每个输出目标一个 command buffer，构造或 edit 时录制一次，之后每次 render 重复提交。
/// 每个 frame in flight 拥有一个 fence 与两个 semaphore（image available、render finished）。
/// 每次提交分配一个递增的序号，fence signal 之后对应的序号即视为完成，延迟销毁依赖这个序号。
pub struct CommandProcessor<B: GfxBackend> {
    device: Rc<B>,
    options: RendererOptions,
    queue: QueueKind,
    /// 输出目标是 swapchain，需要 acquire 与 present
    present: bool,
    frames_in_flight: usize,

    command_buffers: Vec<B::CommandBuffer>,
    recorded: Vec<CommandList>,
    record_generation: u64,

    frame_fences: Vec<B::Fence>,
    image_available: Vec<B::Semaphore>,
    render_finished: Vec<B::Semaphore>,
    acquire_fences: Vec<B::Fence>,
    acquire_fence_used: Vec<bool>,
    /// 每个输出目标最后一次被哪个 frame 使用
    images_in_flight: Vec<Option<usize>>,
    current_frame: usize,
    acquired: Option<AcquiredImage>,

    frame_serials: Vec<u64>,
    submitted_serial: u64,
    completed_serial: u64,

    name: String,
}
// 创建与销毁
impl<B: GfxBackend> CommandProcessor<B> {
    pub fn new(
        device: Rc<B>,
        target_count: usize,
        frames_in_flight: usize,
        present: bool,
        compute: bool,
        options: RendererOptions,
        name: impl Into<String>,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("CommandProcessor::new");
        let name = name.into();
        let frames_in_flight = frames_in_flight.max(1);
        let target_count = target_count.max(1);

        let mut processor = Self {
            device,
            options,
            queue: if compute { QueueKind::Compute } else { QueueKind::Graphics },
            present,
            frames_in_flight,
            command_buffers: Vec::with_capacity(target_count),
            recorded: vec![CommandList::default(); target_count],
            record_generation: 0,
            frame_fences: Vec::with_capacity(frames_in_flight),
            image_available: Vec::new(),
            render_finished: Vec::new(),
            acquire_fences: Vec::new(),
            acquire_fence_used: vec![false; frames_in_flight],
            images_in_flight: vec![None; target_count],
            current_frame: 0,
            acquired: None,
            frame_serials: vec![0; frames_in_flight],
            submitted_serial: 0,
            completed_serial: 0,
            name,
        };

        if let Err(e) = processor.create_objects(target_count) {
            processor.destroy();
            return Err(e);
        }
        log::info!(
            "{}: {} command buffer(s), {} frame(s) in flight, present = {}",
            processor.name,
            target_count,
            frames_in_flight,
            present
        );
        Ok(processor)
    }

    fn create_objects(&mut self, target_count: usize) -> GfxResult<()> {
        for index in 0..target_count {
            let command_buffer = self.device.allocate_command_buffer(&format!("{}::cmd{index}", self.name))?;
            self.command_buffers.push(command_buffer);
        }
        for frame in 0..self.frames_in_flight {
            // 初始为 signal 状态，第一帧不需要等待
            let fence = self.device.create_fence(true, &format!("{}::frame-fence{frame}", self.name))?;
            self.frame_fences.push(fence);
            if self.present {
                let semaphore = self.device.create_semaphore(&format!("{}::image-available{frame}", self.name))?;
                self.image_available.push(semaphore);
                let semaphore = self.device.create_semaphore(&format!("{}::render-finished{frame}", self.name))?;
                self.render_finished.push(semaphore);
                let fence = self.device.create_fence(false, &format!("{}::acquire-fence{frame}", self.name))?;
                self.acquire_fences.push(fence);
            }
        }
        Ok(())
    }

    /// 调用者保证已经调用过 `wait_pending_commands_complete`
    pub fn destroy(self) {
        let Self {
            device,
            command_buffers,
            frame_fences,
            image_available,
            render_finished,
            acquire_fences,
            ..
        } = self;
        let objects = command_buffers
            .into_iter()
            .map(GpuObject::CommandBuffer)
            .chain(frame_fences.into_iter().map(GpuObject::Fence))
            .chain(acquire_fences.into_iter().map(GpuObject::Fence))
            .chain(image_available.into_iter().map(GpuObject::Semaphore))
            .chain(render_finished.into_iter().map(GpuObject::Semaphore));
        for object in objects {
            device.destroy(object);
        }
    }
}
// getters
impl<B: GfxBackend> CommandProcessor<B> {
    /// 最近一次录制的命令，每个输出目标一份
    #[inline]
    pub fn recorded_commands(&self) -> &[CommandList] {
        &self.recorded
    }

    /// 每次重新录制加一
    #[inline]
    pub fn record_generation(&self) -> u64 {
        self.record_generation
    }

    #[inline]
    pub fn last_submitted_serial(&self) -> u64 {
        self.submitted_serial
    }

    #[inline]
    pub fn completed_serial(&self) -> u64 {
        self.completed_serial
    }

    #[inline]
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    #[inline]
    pub fn acquired_image(&self) -> Option<usize> {
        self.acquired.map(|a| a.image_index)
    }

    #[inline]
    pub fn command_buffer_count(&self) -> usize {
        self.command_buffers.len()
    }
}
// 录制
impl<B: GfxBackend> CommandProcessor<B> {
    /// 根据 RenderState 与当前的 binding 录制每个输出目标的 command buffer（不提交）
    ///
    /// 先等待所有在途的命令完成，保证被重新录制的 command buffer 不在 GPU 上执行
    pub fn set_rendering_commands(
        &mut self,
        state: &RenderState,
        targets: &RecordTargets<'_, B>,
        scissor: Option<ScissorRegion>,
    ) -> GfxResult<()> {
        let _span = tracy_client::span!("CommandProcessor::set_rendering_commands");
        self.wait_pending_commands_complete()?;

        let set_count = targets.storage.descriptor_set_count();
        let lists = match state {
            RenderState::Compute(compute) => {
                let set = (set_count > 0).then_some(0);
                vec![record_compute(&self.name, set, compute.kernel)]
            }
            RenderState::Graphics(graphics) => {
                let output = targets.output()?;
                let draw_buffer = match graphics.draw_buffer {
                    Some(handle) => Some((handle, targets.storage.get_component(handle)?.size())),
                    None => None,
                };
                let clear_colour: Option<Vec4> =
                    (!self.options.contains(RendererOptions::NO_CLEAR_OUTPUT)).then_some(graphics.clear_colour);
                (0..self.command_buffers.len())
                    .map(|index| {
                        record_graphics(&GraphicsRecordParams {
                            name: &self.name,
                            framebuffer: index,
                            extent: output.get_output_dimensions(),
                            clear_colour,
                            descriptor_set: (set_count > 0).then(|| index % set_count),
                            scissor,
                            index_buffer: graphics.index_buffer,
                            draw_buffer,
                            tri_count: graphics.tri_count,
                        })
                    })
                    .collect_vec()
            }
        };

        for (command_buffer, list) in self.command_buffers.iter_mut().zip(&lists) {
            self.device.record(command_buffer, list, targets)?;
        }
        self.recorded = lists;
        self.record_generation += 1;
        log::debug!("{}: recorded generation {}", self.name, self.record_generation);
        Ok(())
    }

    /// 一次性的 command buffer：录制、提交、等待完成。只用于初始化与 edit 等非每帧路径
    pub fn do_scratch_operations<'a>(
        &self,
        name: &str,
        record: impl FnOnce(&mut ScratchRecorder<'a, B>),
    ) -> GfxResult<()> {
        let _span = tracy_client::span!("CommandProcessor::do_scratch_operations");
        let mut recorder = ScratchRecorder { ops: Vec::new() };
        record(&mut recorder);
        if recorder.ops.is_empty() {
            return Ok(());
        }
        self.device.execute_transfers(&recorder.ops, &format!("{}::{name}", self.name))
    }
}
// 提交
impl<B: GfxBackend> CommandProcessor<B> {
    /// 获取下一张 swapchain image，并把它设为当前的输出目标
    ///
    /// 已经获取过但还没有提交时直接复用
    pub fn acquire(&mut self, info: AcquireInfo) -> GfxResult<AcquireOutcome> {
        let _span = tracy_client::span!("CommandProcessor::acquire");
        if !self.present {
            return Err(GfxError::Unsupported(format!("{}: only window outputs acquire images", self.name)));
        }
        if let Some(acquired) = self.acquired {
            return Ok(AcquireOutcome::Acquired {
                image_index: acquired.image_index as u32,
                suboptimal: false,
            });
        }

        let frame = self.current_frame;
        // image available semaphore 上一次被使用的提交必须已经完成
        self.device.wait_fence(&self.frame_fences[frame], u64::MAX)?;
        self.mark_frame_complete(frame);

        if info.signal_fence {
            if self.acquire_fence_used[frame] {
                self.device.wait_fence(&self.acquire_fences[frame], info.timeout_ns)?;
            }
            self.device.reset_fence(&self.acquire_fences[frame])?;
        }

        let outcome = self.device.acquire_next_image(
            info.signal_semaphore.then(|| &self.image_available[frame]),
            info.signal_fence.then(|| &self.acquire_fences[frame]),
            info.timeout_ns,
        )?;
        if let AcquireOutcome::Acquired { image_index, .. } = outcome {
            if image_index as usize >= self.command_buffers.len() {
                return Err(GfxError::InvalidOutputConfiguration(format!(
                    "{}: acquired image {image_index} but only {} targets exist",
                    self.name,
                    self.command_buffers.len()
                )));
            }
            self.acquire_fence_used[frame] = info.signal_fence;
            self.acquired = Some(AcquiredImage {
                image_index: image_index as usize,
                frame,
                wait_semaphore: info.signal_semaphore,
                check_fence: info.signal_fence,
            });
        }
        Ok(outcome)
    }

    /// 提交当前输出目标的 command buffer
    ///
    /// swapchain 输出等待 image available，signal render finished 并 present；
    /// 设置了 `RENDER_WAIT` 或 `BLOCKING_COMPUTE` 时阻塞直到 fence signal。
    pub fn do_render_work(
        &mut self,
        target: usize,
        storage: &mut ResourceStorage<B>,
    ) -> GfxResult<RenderWorkSubmitResult> {
        let _span = tracy_client::span!("CommandProcessor::do_render_work");

        let (frame, target, acquired) = if self.present {
            let acquired = self.acquired.ok_or_else(|| {
                GfxError::NoAcquiredImage(format!("{}: render() without an acquired swapchain image", self.name))
            })?;
            if acquired.check_fence && !self.device.is_fence_signalled(&self.acquire_fences[acquired.frame])? {
                return Err(GfxError::NoAcquiredImage(format!(
                    "{}: swapchain image {} has not been signalled as acquired yet",
                    self.name, acquired.image_index
                )));
            }
            (acquired.frame, acquired.image_index, Some(acquired))
        } else {
            (self.current_frame, target.min(self.command_buffers.len() - 1), None)
        };

        // 等待该 frame 上一次的提交完成
        self.device.wait_fence(&self.frame_fences[frame], u64::MAX)?;
        self.mark_frame_complete(frame);
        // 等待上一次使用同一个输出目标的提交完成
        if let Some(previous) = self.images_in_flight[target]
            && previous != frame
        {
            self.device.wait_fence(&self.frame_fences[previous], u64::MAX)?;
            self.mark_frame_complete(previous);
        }
        self.device.reset_fence(&self.frame_fences[frame])?;

        let present_after = self.present && !self.options.contains(RendererOptions::NO_PRESENT);
        let submit_result = {
            let mut waits = Vec::new();
            if let Some(acquired) = acquired
                && acquired.wait_semaphore
            {
                waits.push((&self.image_available[frame], PipelineStage::ColourAttachmentOutput));
            }
            let signals = if present_after {
                vec![&self.render_finished[frame]]
            } else {
                vec![]
            };
            let info = SubmitInfo {
                queue: self.queue,
                waits,
                signals,
                fence: Some(&self.frame_fences[frame]),
            };
            self.device.submit(&self.command_buffers[target], &info, storage)
        };
        if let Err(e) = submit_result {
            log::error!("{}: queue submit failed: {e}", self.name);
            // 提交失败时 fence 永远不会 signal，换成一个已经 signal 的 fence
            let fence = self.device.create_fence(true, &format!("{}::frame-fence{frame}", self.name))?;
            let old = std::mem::replace(&mut self.frame_fences[frame], fence);
            self.device.destroy(GpuObject::Fence(old));
            return Err(e);
        }

        self.submitted_serial += 1;
        self.frame_serials[frame] = self.submitted_serial;
        self.images_in_flight[target] = Some(frame);

        if self.options.waits_on_submit() {
            self.device.wait_fence(&self.frame_fences[frame], u64::MAX)?;
            self.mark_frame_complete(frame);
        }

        let result = if acquired.is_some() {
            self.acquired = None;
            if present_after {
                self.device.present(target as u32, &[&self.render_finished[frame]])?
            } else {
                RenderWorkSubmitResult::Success
            }
        } else {
            RenderWorkSubmitResult::Success
        };

        self.current_frame = (frame + 1) % self.frames_in_flight;
        Ok(result)
    }

    /// 阻塞直到该 Renderer 的所有提交完成
    pub fn wait_pending_commands_complete(&mut self) -> GfxResult<()> {
        let _span = tracy_client::span!("CommandProcessor::wait_pending_commands_complete");
        for frame in 0..self.frames_in_flight {
            self.device.wait_fence(&self.frame_fences[frame], u64::MAX)?;
            self.mark_frame_complete(frame);
        }
        // 已经 acquire 但还没有提交的 image，其 fence 也需要等待
        if let Some(acquired) = self.acquired
            && acquired.check_fence
        {
            self.device.wait_fence(&self.acquire_fences[acquired.frame], u64::MAX)?;
        }
        Ok(())
    }

    /// 不阻塞地查询已经完成的提交，返回最新的完成序号
    pub fn poll_completed(&mut self) -> GfxResult<u64> {
        for frame in 0..self.frames_in_flight {
            if self.frame_serials[frame] > self.completed_serial && self.device.is_fence_signalled(&self.frame_fences[frame])? {
                self.mark_frame_complete(frame);
            }
        }
        Ok(self.completed_serial)
    }

    #[inline]
    fn mark_frame_complete(&mut self, frame: usize) {
        self.completed_serial = self.completed_serial.max(self.frame_serials[frame]);
    }

    /// swapchain 重建之后，之前获取的 image 已经失效
    pub fn reset_acquired(&mut self) {
        self.acquired = None;
        self.images_in_flight.iter_mut().for_each(|i| *i = None);
    }
}
