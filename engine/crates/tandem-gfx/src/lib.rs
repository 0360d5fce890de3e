pub mod backend;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod renderer;
pub mod resources;

#[cfg(any(test, feature = "testing"))]
pub mod headless;

pub use backend::GfxBackend;
pub use config::GfxConfig;
pub use context::{GfxContext, RendererHandle};
pub use error::{GfxError, GfxResult};
pub use renderer::edit::{RendererEdit, RendererEditBuilder, RendererEditRequest};
pub use renderer::options::{RenderBackend, RendererOptions};
pub use renderer::output::{AcquireInfo, ImageOutput, Output, ScissorRegion};
pub use renderer::renderer_info::{RendererInfo, ResourceSlot};
pub use renderer::{Renderer, RendererState};
pub use resources::reference::ResourceReference;
pub use resources::resource::{Resource, ResourceAccess, ResourceFlags, ResourceHandle, ResourceType};
