use ash::vk;

use tandem_gfx::{GfxError, GfxResult};

/// 把 vulkan 调用的结果转换为 `GfxError`，`call` 用于诊断信息
pub fn vk_check<T>(call: &str, result: Result<T, vk::Result>) -> GfxResult<T> {
    result.map_err(|e| vk_error(call, e))
}

pub fn vk_error(call: &str, result: vk::Result) -> GfxError {
    match result {
        vk::Result::ERROR_DEVICE_LOST => GfxError::DeviceLost(format!("{call}: {result:?}")),
        vk::Result::TIMEOUT | vk::Result::NOT_READY => GfxError::Timeout(format!("{call}: {result:?}")),
        _ => GfxError::Backend(format!("{call}: {result:?}")),
    }
}

/// 对象创建失败是致命的，`object` 是对象的 debug name
pub fn construction_error(object: &str, result: vk::Result) -> GfxError {
    match result {
        vk::Result::ERROR_DEVICE_LOST => GfxError::DeviceLost(format!("{object}: {result:?}")),
        _ => GfxError::construction(object, format!("{result:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        assert!(matches!(vk_error("wait_for_fences", vk::Result::TIMEOUT), GfxError::Timeout(_)));
        assert!(matches!(
            vk_error("queue_submit2", vk::Result::ERROR_DEVICE_LOST),
            GfxError::DeviceLost(_)
        ));
        assert!(matches!(
            vk_error("reset_fences", vk::Result::ERROR_OUT_OF_HOST_MEMORY),
            GfxError::Backend(_)
        ));
    }

    #[test]
    fn test_construction_error_is_fatal() {
        let err = construction_error("GfxBuffer::vertices", vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        assert!(err.is_fatal());
        assert!(err.to_string().contains("GfxBuffer::vertices"));
    }
}
