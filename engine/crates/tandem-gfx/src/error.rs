/// 核心层所有可失败操作的错误类型
///
/// 每个错误都带有一段诊断信息，用于定位出错的 GPU 对象（renderer 名称、资源 handle 或后端调用）。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GfxError {
    /// 设备或驱动拒绝创建对象，对所属的 Renderer 是致命的
    #[error("construction failure: {object}: {reason}")]
    ConstructionFailure { object: String, reason: String },

    /// edit 违反了资源的访问限定或 output 的约束，Renderer 保持原状态
    #[error("edit rejected: {0}")]
    EditRejected(String),

    /// queue submit 返回错误，可以在下一帧重试
    #[error("submission failure: {0}")]
    SubmissionFailure(String),

    /// 设备丢失，不可恢复
    #[error("device lost: {0}")]
    DeviceLost(String),

    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    /// 呈现到窗口的 Renderer 在没有可用的 swapchain image 时调用了 render
    #[error("no acquired image: {0}")]
    NoAcquiredImage(String),

    #[error("invalid output configuration: {0}")]
    InvalidOutputConfiguration(String),

    #[error("renderer destroyed: {0}")]
    RendererDestroyed(String),

    #[error("resource is not host visible: {0}")]
    NotHostVisible(String),

    /// 资源仍然被其他 Renderer 借用
    #[error("resource in use: {0}")]
    ResourceInUse(String),

    /// 该 Renderer 的输出类型不支持这个操作
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("backend error: {0}")]
    Backend(String),
}

pub type GfxResult<T> = Result<T, GfxError>;

impl GfxError {
    #[inline]
    pub fn construction(object: impl Into<String>, reason: impl ToString) -> Self {
        Self::ConstructionFailure {
            object: object.into(),
            reason: reason.to_string(),
        }
    }

    #[inline]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::EditRejected(reason.into())
    }

    /// 致命错误会终止所属的 Renderer
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConstructionFailure { .. } | Self::DeviceLost(_) | Self::InvalidOutputConfiguration(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(GfxError::construction("GfxBuffer::index", "out of memory").is_fatal());
        assert!(GfxError::DeviceLost("queue submit".to_string()).is_fatal());
        assert!(!GfxError::rejected("static resource").is_fatal());
        assert!(!GfxError::SubmissionFailure("timeout".to_string()).is_fatal());
        assert!(!GfxError::ResourceInUse("lent buffer".to_string()).is_fatal());
    }

    #[test]
    fn test_diagnostic_names_object() {
        let err = GfxError::construction("GfxImage::albedo", "format unsupported");
        assert_eq!(err.to_string(), "construction failure: GfxImage::albedo: format unsupported");
    }
}
