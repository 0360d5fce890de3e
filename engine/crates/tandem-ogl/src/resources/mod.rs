pub mod bindings;
pub mod buffer;
pub mod format;
pub mod image;
pub mod sampler;
