use std::rc::Rc;

use crate::backend::{GfxBackend, GpuObject, PipelineDesc};
use crate::commands::deferred_release::DeferredRelease;
use crate::error::GfxResult;
use crate::renderer::options::RendererOptions;
use crate::renderer::shader::{ShaderInfo, ShaderKind};

/// 持有 Renderer 的 pipeline 及重建它所需的全部参数
///
/// viewport 与 scissor 都是动态状态，所以 output 尺寸变化不需要重建 pipeline
pub struct PipelineManager<B: GfxBackend> {
    device: Rc<B>,
    pipeline: B::Pipeline,

    shader: ShaderInfo,
    kind: ShaderKind,
    options: RendererOptions,
    wireframe: bool,

    name: String,
}
// 创建与销毁
impl<B: GfxBackend> PipelineManager<B> {
    pub fn new(
        device: Rc<B>,
        shader: ShaderInfo,
        bindings: Option<&B::Bindings>,
        render_pass: Option<&B::RenderPass>,
        options: RendererOptions,
        name: impl Into<String>,
    ) -> GfxResult<Self> {
        let name = name.into();
        let kind = shader.validate(&name)?;
        let pipeline = Self::create(device.as_ref(), &shader, kind, bindings, render_pass, options, false, &name)?;
        Ok(Self {
            device,
            pipeline,
            shader,
            kind,
            options,
            wireframe: false,
            name,
        })
    }

    pub fn destroy(self) {
        self.device.destroy(GpuObject::Pipeline(self.pipeline));
    }

    #[allow(clippy::too_many_arguments)]
    fn create(
        device: &B,
        shader: &ShaderInfo,
        kind: ShaderKind,
        bindings: Option<&B::Bindings>,
        render_pass: Option<&B::RenderPass>,
        options: RendererOptions,
        wireframe: bool,
        name: &str,
    ) -> GfxResult<B::Pipeline> {
        let _span = tracy_client::span!("PipelineManager::create");
        let pipeline = device.create_pipeline(&PipelineDesc {
            shader,
            kind,
            bindings,
            render_pass: match kind {
                ShaderKind::Graphics => render_pass,
                ShaderKind::Compute => None,
            },
            depth_test: !options.contains(RendererOptions::NO_DEPTH_TESTING),
            alpha_blending: options.contains(RendererOptions::ALPHA_BLENDING),
            wireframe,
            name,
        })?;
        log::info!("{name}: created {kind:?} pipeline (wireframe = {wireframe})");
        Ok(pipeline)
    }
}
// getters
impl<B: GfxBackend> PipelineManager<B> {
    #[inline]
    pub fn get_pipeline(&self) -> &B::Pipeline {
        &self.pipeline
    }

    #[inline]
    pub fn kind(&self) -> ShaderKind {
        self.kind
    }

    #[inline]
    pub fn is_wireframe(&self) -> bool {
        self.wireframe
    }
}
// update
impl<B: GfxBackend> PipelineManager<B> {
    /// 创建新的 pipeline，但是不替换当前的
    pub fn prepare_recreate(
        &self,
        bindings: Option<&B::Bindings>,
        render_pass: Option<&B::RenderPass>,
        wireframe: bool,
    ) -> GfxResult<B::Pipeline> {
        Self::create(
            self.device.as_ref(),
            &self.shader,
            self.kind,
            bindings,
            render_pass,
            self.options,
            wireframe,
            &self.name,
        )
    }

    /// 替换为 `prepare_recreate` 创建的 pipeline，旧的交给延迟销毁队列
    pub fn commit_recreate(
        &mut self,
        pipeline: B::Pipeline,
        wireframe: bool,
        release: &mut DeferredRelease<B>,
        serial: u64,
    ) {
        let old = std::mem::replace(&mut self.pipeline, pipeline);
        release.retire(GpuObject::Pipeline(old), serial);
        self.wireframe = wireframe;
    }
}
