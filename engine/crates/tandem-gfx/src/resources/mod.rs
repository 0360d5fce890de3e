pub mod component;
pub mod image_format;
pub mod reference;
pub mod resource;
pub mod resource_storage;
pub mod sampler;
