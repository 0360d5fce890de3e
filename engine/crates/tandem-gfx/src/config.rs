use std::path::Path;

use crate::error::{GfxError, GfxResult};
use crate::renderer::options::RenderBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum PresentMode {
    /// 垂直同步，所有设备都支持
    #[default]
    Fifo,
    Mailbox,
    Immediate,
}

/// 进程级别的图形配置，在创建 `GfxContext` 时读取一次
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GfxConfig {
    pub app_name: String,
    pub backend: RenderBackend,
    /// 合法范围为 1..=3，读取时会被截断
    pub frames_in_flight: usize,
    pub enable_validation: bool,
    pub present_mode: PresentMode,
    pub acquire_timeout_ns: u64,
}

impl Default for GfxConfig {
    fn default() -> Self {
        Self {
            app_name: "tandem".to_string(),
            backend: RenderBackend::default(),
            frames_in_flight: Self::DEFAULT_FRAMES_IN_FLIGHT,
            enable_validation: cfg!(debug_assertions),
            present_mode: PresentMode::default(),
            acquire_timeout_ns: u64::MAX,
        }
    }
}

impl GfxConfig {
    pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;
    pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

    pub fn from_toml_str(text: &str) -> GfxResult<Self> {
        toml::from_str(text).map_err(|e| GfxError::construction("GfxConfig", e))
    }

    pub fn load(path: impl AsRef<Path>) -> GfxResult<Self> {
        tandem_crate_tools::config::load_toml(path).map_err(|e| GfxError::construction("GfxConfig", format!("{e:#}")))
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight.clamp(1, Self::MAX_FRAMES_IN_FLIGHT)
    }

    /// 测试使用的 headless 配置
    pub fn headless() -> Self {
        Self {
            app_name: "tandem-headless".to_string(),
            backend: RenderBackend::Headless,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_toml() {
        let config = GfxConfig::from_toml_str(
            r#"
            app_name = "demo"
            backend = "OpenGL"
            frames_in_flight = 8
            present_mode = "Mailbox"
            "#,
        )
        .unwrap();

        assert_eq!(config.app_name, "demo");
        assert_eq!(config.backend, RenderBackend::OpenGL);
        assert_eq!(config.present_mode, PresentMode::Mailbox);
        // 超出范围的值被截断
        assert_eq!(config.frames_in_flight(), 3);
        assert_eq!(config.acquire_timeout_ns, u64::MAX);
    }

    #[test]
    fn test_bad_toml_is_construction_failure() {
        let err = GfxConfig::from_toml_str("frames_in_flight = \"two\"").unwrap_err();
        assert!(matches!(err, GfxError::ConstructionFailure { .. }));
    }

    #[test]
    fn test_zero_frames_clamped() {
        let config = GfxConfig {
            frames_in_flight: 0,
            ..GfxConfig::headless()
        };
        assert_eq!(config.frames_in_flight(), 1);
    }
}
