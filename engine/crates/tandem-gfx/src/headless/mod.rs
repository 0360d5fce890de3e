//! 在 CPU 上模拟的后端
//!
//! 不依赖任何驱动，用于测试核心层的资源生命周期、同步与命令录制

pub mod objects;

mod headless_backend;

pub use headless_backend::{HeadlessBackend, HeadlessStats, KernelInvocation};
