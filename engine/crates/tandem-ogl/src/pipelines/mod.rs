pub mod pipeline;
pub mod program;
pub mod render_pass;
