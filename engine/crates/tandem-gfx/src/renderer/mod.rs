pub mod edit;
pub mod options;
pub mod output;
pub mod output_manager;
pub mod pipeline_manager;
pub mod render_state;
pub mod renderer_info;
pub mod shader;

mod gfx_renderer;

pub use gfx_renderer::{Renderer, RendererState};

#[cfg(test)]
mod tests;
