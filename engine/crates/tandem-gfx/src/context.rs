use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use slotmap::SlotMap;

use crate::backend::GfxBackend;
use crate::config::GfxConfig;
use crate::error::{GfxError, GfxResult};
use crate::renderer::Renderer;
use crate::renderer::edit::RendererEditRequest;
use crate::renderer::output::Output;
use crate::renderer::renderer_info::RendererInfo;
use crate::resources::reference::{ResolvedReference, ResourceReference};
use crate::resources::resource::ResourceHandle;

slotmap::new_key_type! {
    pub struct RendererHandle;
}

/// 进程内唯一的图形上下文：持有后端设备、配置以及所有 Renderer
///
/// 同一时间只有一个 Renderer 可以输出到窗口。
/// Renderer 之间借用资源需要通过这里解析，所有者在资源被借用期间不能销毁。
pub struct GfxContext<B: GfxBackend> {
    device: Rc<B>,
    config: GfxConfig,
    renderers: SlotMap<RendererHandle, Renderer<B>>,
    presenting: Option<RendererHandle>,
}
// 创建与销毁
impl<B: GfxBackend> GfxContext<B> {
    pub fn new(device: B, config: GfxConfig) -> GfxResult<Self> {
        if config.backend != B::KIND {
            return Err(GfxError::construction(
                "GfxContext",
                format!("configured for {:?} but created with a {:?} device", config.backend, B::KIND),
            ));
        }
        log::info!(
            "GfxContext: {} on {:?}, {} frame(s) in flight",
            config.app_name,
            B::KIND,
            config.frames_in_flight()
        );
        Ok(Self {
            device: Rc::new(device),
            config,
            renderers: SlotMap::with_key(),
            presenting: None,
        })
    }
}
impl<B: GfxBackend> Drop for GfxContext<B> {
    fn drop(&mut self) {
        let _span = tracy_client::span!("GfxContext::drop");
        // 借用者的提交可能引用所有者的内存，先等待所有工作完成
        if let Err(e) = self.device.wait_idle() {
            log::error!("GfxContext: wait idle failed during shutdown: {e}");
        }
        for (_, mut renderer) in self.renderers.drain() {
            renderer.set_loans(BTreeMap::new());
            renderer.destroy();
        }
    }
}
// getters
impl<B: GfxBackend> GfxContext<B> {
    #[inline]
    pub fn device(&self) -> &B {
        &self.device
    }

    #[inline]
    pub fn config(&self) -> &GfxConfig {
        &self.config
    }

    #[inline]
    pub fn renderer_count(&self) -> usize {
        self.renderers.len()
    }

    /// 当前输出到窗口的 Renderer
    #[inline]
    pub fn presenting_renderer(&self) -> Option<RendererHandle> {
        self.presenting
    }

    pub fn get_renderer(&self, handle: RendererHandle) -> GfxResult<&Renderer<B>> {
        self.renderers
            .get(handle)
            .ok_or_else(|| GfxError::InvalidHandle(format!("unknown renderer {handle:?}")))
    }

    pub fn get_renderer_mut(&mut self, handle: RendererHandle) -> GfxResult<&mut Renderer<B>> {
        self.renderers
            .get_mut(handle)
            .ok_or_else(|| GfxError::InvalidHandle(format!("unknown renderer {handle:?}")))
    }
}
// Renderer API
impl<B: GfxBackend> GfxContext<B> {
    pub fn create_renderer(&mut self, info: RendererInfo) -> GfxResult<RendererHandle> {
        let _span = tracy_client::span!("GfxContext::create_renderer");

        let window = info.output().is_some_and(Output::is_window);
        if window && let Some(owner) = self.presenting {
            let owner = self.renderers.get(owner).map_or("<unknown>", Renderer::debug_name);
            return Err(GfxError::construction(
                format!("Renderer::{}", info.debug_name()),
                format!("the window output is already owned by renderer {owner}"),
            ));
        }

        let references = info
            .references()
            .map(|(_, source)| self.resolve_reference(source))
            .collect::<GfxResult<Vec<_>>>()
            .map_err(|e| GfxError::construction(format!("Renderer::{}", info.debug_name()), e))?;

        let renderer = Renderer::with_references(self.device.clone(), &self.config, info, references)?;
        let window = renderer.is_window_output();
        let handle = self.renderers.insert(renderer);
        if window {
            self.presenting = Some(handle);
        }
        self.refresh_loans();
        Ok(handle)
    }

    /// 应用一组修改；`ResourceReference` 只能通过这里应用
    pub fn edit_renderer(&mut self, handle: RendererHandle, request: &RendererEditRequest) -> GfxResult<()> {
        let _span = tracy_client::span!("GfxContext::edit_renderer");
        let mut references = Vec::new();
        for source in request.reference_sources() {
            if source.renderer == handle {
                return Err(GfxError::rejected(format!("renderer {handle:?} cannot reference its own resources")));
            }
            let reference = self
                .resolve_reference(source)
                .map_err(|e| GfxError::rejected(format!("cannot reference {source:?}: {e}")))?;
            references.push(reference);
        }

        let result = self.get_renderer_mut(handle)?.edit_with_references(request, references);
        self.refresh_loans();
        result
    }

    /// 等待该 Renderer 的在途命令完成之后销毁
    ///
    /// 资源仍被其他 Renderer 借用时返回 `ResourceInUse`，不做任何修改
    pub fn destroy_renderer(&mut self, handle: RendererHandle) -> GfxResult<()> {
        self.refresh_loans();
        let renderer = self.get_renderer(handle)?;
        if renderer.has_lent_resources() {
            return Err(GfxError::ResourceInUse(format!(
                "Renderer::{}: resources are still referenced by other renderers",
                renderer.debug_name()
            )));
        }

        let renderer = self
            .renderers
            .remove(handle)
            .ok_or_else(|| GfxError::InvalidHandle(format!("unknown renderer {handle:?}")))?;
        if self.presenting == Some(handle) {
            self.presenting = None;
        }
        renderer.destroy();
        self.refresh_loans();
        Ok(())
    }
}
// 资源借用
impl<B: GfxBackend> GfxContext<B> {
    fn resolve_reference(&self, source: ResourceReference) -> GfxResult<ResolvedReference<B>> {
        self.get_renderer(source.renderer)?.resolve_reference(source)
    }

    /// 根据所有借用者重新计算每个所有者被借出的资源
    ///
    /// 因致命错误而销毁的借用者不再借用任何资源
    fn refresh_loans(&mut self) {
        let mut loans: HashMap<RendererHandle, BTreeMap<ResourceHandle, usize>> = HashMap::new();
        for (_, renderer) in &self.renderers {
            for source in renderer.referenced_sources() {
                *loans.entry(source.renderer).or_default().entry(source.resource).or_default() += 1;
            }
        }
        for (handle, renderer) in &mut self.renderers {
            renderer.set_loans(loans.remove(&handle).unwrap_or_default());
        }
    }
}
