//! Tandem 的 OpenGL 后端
//!
//! 入口是 [`GlBackend`]。GL context 由调用者创建并设为 current，
//! 之后所有调用都必须发生在这个线程上。

pub mod commands;
pub mod error;
pub mod foundation;
pub mod gl_backend;
pub mod pipelines;
pub mod resources;

pub use foundation::window::GlWindow;
pub use gl_backend::GlBackend;
