//! Tandem 的 Vulkan 后端
//!
//! 入口是 [`VulkanBackend`]，它实现了 `tandem_gfx::GfxBackend`，交给 `GfxContext` 使用。

pub mod commands;
pub mod error;
pub mod foundation;
pub mod pipelines;
pub mod resources;
pub mod swapchain;
pub mod vulkan_backend;

pub use vulkan_backend::{VulkanBackend, WindowTarget};
