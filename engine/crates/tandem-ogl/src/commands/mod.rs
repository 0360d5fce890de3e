pub mod command_buffer;
pub mod gl_op;
pub mod sync;
