use std::rc::Rc;

use glam::UVec2;
use itertools::Itertools;

use crate::backend::{
    AttachmentRef, FinalLayout, FramebufferDesc, GfxBackend, GfxImageDesc, GpuObject, LoadOp, RenderPassDesc,
};
use crate::commands::deferred_release::DeferredRelease;
use crate::error::{GfxError, GfxResult};
use crate::renderer::options::RendererOptions;
use crate::renderer::output::Output;
use crate::resources::image_format::ImageFormat;
use crate::resources::resource::{ResourceFlags, ResourceHandle};
use crate::resources::resource_storage::ResourceStorage;

/// 输出目标的尺寸、格式与数量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TargetInfo {
    dimensions: UVec2,
    format: ImageFormat,
    count: usize,
}

/// 管理 Renderer 绘制的目标：render pass、每个输出 image 一个 framebuffer，以及共享的 depth image
pub struct OutputManager<B: GfxBackend> {
    device: Rc<B>,
    output: Output,
    options: RendererOptions,

    render_pass: B::RenderPass,
    framebuffers: Vec<B::Framebuffer>,
    depth: Option<B::Image>,

    info: TargetInfo,
    /// 下一次提交使用的 framebuffer
    current_target: usize,

    name: String,
}
// 创建与销毁
impl<B: GfxBackend> OutputManager<B> {
    pub fn new(
        device: Rc<B>,
        output: Output,
        storage: &ResourceStorage<B>,
        options: RendererOptions,
        name: impl Into<String>,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("OutputManager::new");
        let name = name.into();

        let info = Self::target_info(device.as_ref(), &output, storage, &name)?;
        let render_pass = device.create_render_pass(&RenderPassDesc {
            colour_format: info.format,
            depth_format: Self::depth_format(options),
            load: if options.contains(RendererOptions::NO_CLEAR_OUTPUT) {
                LoadOp::Load
            } else {
                LoadOp::Clear
            },
            final_layout: if output.is_window() {
                FinalLayout::Present
            } else {
                FinalLayout::ShaderRead
            },
            store_depth: options.contains(RendererOptions::NO_PRESENT),
            name: &name,
        })?;

        let targets =
            Self::create_targets(device.as_ref(), &output, storage, &render_pass, options, info, &name);
        let (depth, framebuffers) = match targets {
            Ok(targets) => targets,
            Err(e) => {
                device.destroy(GpuObject::RenderPass(render_pass));
                return Err(e);
            }
        };

        log::info!(
            "{name}: output {}x{} {:?} with {} framebuffer(s), depth = {}",
            info.dimensions.x,
            info.dimensions.y,
            info.format,
            framebuffers.len(),
            depth.is_some()
        );

        Ok(Self {
            device,
            output,
            options,
            render_pass,
            framebuffers,
            depth,
            info,
            current_target: 0,
            name,
        })
    }

    /// 调用者保证 GPU 已经不再使用这些对象
    pub fn destroy(self) {
        let Self {
            device,
            render_pass,
            framebuffers,
            depth,
            ..
        } = self;
        for framebuffer in framebuffers {
            device.destroy(GpuObject::Framebuffer(framebuffer));
        }
        if let Some(depth) = depth {
            device.destroy(GpuObject::Image(depth));
        }
        device.destroy(GpuObject::RenderPass(render_pass));
    }
}
// 创建过程的辅助函数
impl<B: GfxBackend> OutputManager<B> {
    #[inline]
    fn depth_format(options: RendererOptions) -> Option<ImageFormat> {
        (!options.contains(RendererOptions::NO_DEPTH_TESTING)).then_some(ImageFormat::Depth32F)
    }

    /// 检查输出目标，所有 attachment 必须具有相同的尺寸与格式
    fn target_info(device: &B, output: &Output, storage: &ResourceStorage<B>, name: &str) -> GfxResult<TargetInfo> {
        match output {
            Output::Window => {
                let surface = device.surface().ok_or_else(|| {
                    GfxError::InvalidOutputConfiguration(format!("{name}: window output without a presentation surface"))
                })?;
                Ok(TargetInfo {
                    dimensions: surface.extent,
                    format: surface.format,
                    count: surface.image_count as usize,
                })
            }
            Output::Image(image_output) => {
                let attachments = &image_output.colour_attachments;
                if attachments.is_empty() {
                    return Err(GfxError::InvalidOutputConfiguration(format!(
                        "{name}: image output has no colour attachments"
                    )));
                }

                let mut info: Option<TargetInfo> = None;
                for handle in attachments {
                    let component = storage.get_component(*handle)?;
                    if !component.flags().contains(ResourceFlags::RENDERER_OUTPUT) {
                        return Err(GfxError::InvalidOutputConfiguration(format!(
                            "{name}: resource {handle} is not flagged as a renderer output"
                        )));
                    }
                    let (Some(dimensions), Some(format)) = (component.dimensions(), component.format()) else {
                        return Err(GfxError::InvalidOutputConfiguration(format!(
                            "{name}: resource {handle} is not an image"
                        )));
                    };
                    let this = TargetInfo {
                        dimensions,
                        format,
                        count: attachments.len(),
                    };
                    match info {
                        None => info = Some(this),
                        Some(first) if first != this => {
                            return Err(GfxError::InvalidOutputConfiguration(format!(
                                "{name}: output attachments disagree: {:?} vs {:?}",
                                first, this
                            )));
                        }
                        Some(_) => {}
                    }
                }
                info.ok_or_else(|| GfxError::InvalidOutputConfiguration(format!("{name}: empty output")))
            }
        }
    }

    /// 创建 depth image 与每个输出 image 的 framebuffer
    fn create_targets(
        device: &B,
        output: &Output,
        storage: &ResourceStorage<B>,
        render_pass: &B::RenderPass,
        options: RendererOptions,
        info: TargetInfo,
        name: &str,
    ) -> GfxResult<(Option<B::Image>, Vec<B::Framebuffer>)> {
        let depth = match Self::depth_format(options) {
            Some(format) => Some(device.create_image(&GfxImageDesc {
                extent: info.dimensions,
                format,
                host_visible: false,
                renderer_output: true,
                name: &format!("{name}::depth"),
            })?),
            None => None,
        };

        let mut framebuffers = Vec::with_capacity(info.count);
        for index in 0..info.count {
            let colour = match output {
                Output::Window => Ok(AttachmentRef::Surface(index as u32)),
                Output::Image(image_output) => storage
                    .get_component(image_output.colour_attachments[index])
                    .and_then(|c| {
                        c.image()
                            .map(AttachmentRef::Image)
                            .ok_or_else(|| GfxError::InvalidOutputConfiguration(format!("{name}: attachment is not an image")))
                    }),
            };
            let framebuffer = colour.and_then(|colour| {
                device.create_framebuffer(&FramebufferDesc {
                    render_pass,
                    colour,
                    depth: depth.as_ref(),
                    extent: info.dimensions,
                    name: &format!("{name}::framebuffer{index}"),
                })
            });

            match framebuffer {
                Ok(framebuffer) => framebuffers.push(framebuffer),
                Err(e) => {
                    for framebuffer in framebuffers {
                        device.destroy(GpuObject::Framebuffer(framebuffer));
                    }
                    if let Some(depth) = depth {
                        device.destroy(GpuObject::Image(depth));
                    }
                    return Err(e);
                }
            }
        }
        Ok((depth, framebuffers))
    }
}
// getters
impl<B: GfxBackend> OutputManager<B> {
    #[inline]
    pub fn get_output_framebuffers(&self) -> &[B::Framebuffer] {
        &self.framebuffers
    }

    #[inline]
    pub fn get_render_pass(&self) -> &B::RenderPass {
        &self.render_pass
    }

    #[inline]
    pub fn get_output_dimensions(&self) -> UVec2 {
        self.info.dimensions
    }

    #[inline]
    pub fn format(&self) -> ImageFormat {
        self.info.format
    }

    #[inline]
    pub fn output(&self) -> &Output {
        &self.output
    }

    #[inline]
    pub fn is_window(&self) -> bool {
        self.output.is_window()
    }

    #[inline]
    pub fn target_count(&self) -> usize {
        self.framebuffers.len()
    }

    #[inline]
    pub fn current_target(&self) -> usize {
        self.current_target
    }

    #[inline]
    pub fn has_depth(&self) -> bool {
        self.depth.is_some()
    }

    /// image output 的 colour attachment 资源
    pub fn attachment_handles(&self) -> &[ResourceHandle] {
        match &self.output {
            Output::Image(image_output) => &image_output.colour_attachments,
            Output::Window => &[],
        }
    }
}
// update
impl<B: GfxBackend> OutputManager<B> {
    /// 选择下一次提交使用的 framebuffer
    ///
    /// swapchain 的目标下标只有在 acquire 之后才知道
    pub fn set_render_target(&mut self, index: usize) -> GfxResult<()> {
        if index >= self.framebuffers.len() {
            return Err(GfxError::InvalidHandle(format!(
                "{}: render target {index} out of range ({} targets)",
                self.name,
                self.framebuffers.len()
            )));
        }
        self.current_target = index;
        Ok(())
    }

    /// 输出 image 被重建之后（resize 或 swapchain 重建），重建依赖它们的 framebuffer
    ///
    /// 不会补全缺失的 attachment：数量、尺寸或格式不一致时返回 `InvalidOutputConfiguration`。
    /// 旧的对象交给延迟销毁队列。
    pub fn notify_image_recreated(
        &mut self,
        storage: &ResourceStorage<B>,
        release: &mut DeferredRelease<B>,
        serial: u64,
    ) -> GfxResult<()> {
        let _span = tracy_client::span!("OutputManager::notify_image_recreated");

        let info = Self::target_info(self.device.as_ref(), &self.output, storage, &self.name)?;
        if info.count != self.framebuffers.len() {
            return Err(GfxError::InvalidOutputConfiguration(format!(
                "{}: output attachment count changed from {} to {}",
                self.name,
                self.framebuffers.len(),
                info.count
            )));
        }
        if info.format != self.info.format {
            return Err(GfxError::InvalidOutputConfiguration(format!(
                "{}: output format changed from {:?} to {:?}",
                self.name, self.info.format, info.format
            )));
        }

        let (depth, framebuffers) = Self::create_targets(
            self.device.as_ref(),
            &self.output,
            storage,
            &self.render_pass,
            self.options,
            info,
            &self.name,
        )?;

        let old_framebuffers = std::mem::replace(&mut self.framebuffers, framebuffers);
        let old_depth = std::mem::replace(&mut self.depth, depth);
        release.retire_all(old_framebuffers.into_iter().map(GpuObject::Framebuffer).collect_vec(), serial);
        if let Some(old_depth) = old_depth {
            release.retire(GpuObject::Image(old_depth), serial);
        }

        log::info!(
            "{}: output rebuilt {}x{} -> {}x{}",
            self.name,
            self.info.dimensions.x,
            self.info.dimensions.y,
            info.dimensions.x,
            info.dimensions.y
        );
        self.info = info;
        self.current_target = self.current_target.min(self.framebuffers.len().saturating_sub(1));
        Ok(())
    }
}
