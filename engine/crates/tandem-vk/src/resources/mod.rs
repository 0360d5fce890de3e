pub mod buffer;
pub mod descriptors;
pub mod format;
pub mod image;
pub mod sampler;
