use glow::HasContext;

use tandem_gfx::{GfxError, GfxResult};

/// 对象创建失败是致命的，`object` 是对象的 debug name
pub fn construction_error(object: &str, reason: impl ToString) -> GfxError {
    GfxError::construction(object, reason)
}

/// `glGetError` 的错误码
pub fn error_name(code: u32) -> &'static str {
    match code {
        glow::INVALID_ENUM => "GL_INVALID_ENUM",
        glow::INVALID_VALUE => "GL_INVALID_VALUE",
        glow::INVALID_OPERATION => "GL_INVALID_OPERATION",
        glow::INVALID_FRAMEBUFFER_OPERATION => "GL_INVALID_FRAMEBUFFER_OPERATION",
        glow::OUT_OF_MEMORY => "GL_OUT_OF_MEMORY",
        glow::STACK_OVERFLOW => "GL_STACK_OVERFLOW",
        glow::STACK_UNDERFLOW => "GL_STACK_UNDERFLOW",
        _ => "GL_UNKNOWN_ERROR",
    }
}

/// 取出 GL 的错误队列，存在错误时转换为 `GfxError`
///
/// GL 的错误是延迟报告的，只在对象创建这类不频繁的调用之后检查
pub fn gl_check(gl: &glow::Context, object: &str) -> GfxResult<()> {
    let mut errors = Vec::new();
    loop {
        let code = unsafe { gl.get_error() };
        if code == glow::NO_ERROR {
            break;
        }
        errors.push(code);
    }
    classify_errors(object, &errors)
}

fn classify_errors(object: &str, errors: &[u32]) -> GfxResult<()> {
    if errors.is_empty() {
        return Ok(());
    }
    let names = errors.iter().map(|code| error_name(*code)).collect::<Vec<_>>().join(", ");
    if errors.contains(&glow::CONTEXT_LOST) {
        return Err(GfxError::DeviceLost(format!("{object}: GL_CONTEXT_LOST")));
    }
    Err(construction_error(object, names))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(classify_errors("GfxBuffer::a", &[]).is_ok());

        let err = classify_errors("GfxBuffer::a", &[glow::OUT_OF_MEMORY, glow::INVALID_VALUE]).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "construction failure: GfxBuffer::a: GL_OUT_OF_MEMORY, GL_INVALID_VALUE"
        );

        assert!(matches!(
            classify_errors("GfxImage::b", &[glow::CONTEXT_LOST]),
            Err(GfxError::DeviceLost(_))
        ));
    }
}
