pub mod debug_output;
pub mod window;
