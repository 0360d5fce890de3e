use glow::HasContext;

/// 可以设置 debug label 的 GL 对象
pub trait GlDebugType {
    fn debug_type_name() -> &'static str;

    /// `glObjectLabel` 的 identifier，例如 `GL_BUFFER`
    fn gl_identifier() -> u32;

    fn gl_name(&self) -> u32;
}

/// 把 `KHR_debug` 的消息转发到 log
pub struct GlDebugOutput;
impl GlDebugOutput {
    /// 需要 `&mut glow::Context`，因此只能在构造后端时调用
    pub fn install(gl: &mut glow::Context) {
        if !gl.supports_debug() {
            log::warn!("KHR_debug is not supported, GL debug output disabled");
            return;
        }
        unsafe {
            gl.enable(glow::DEBUG_OUTPUT);
            gl.enable(glow::DEBUG_OUTPUT_SYNCHRONOUS);
            gl.debug_message_callback(|source, ty, id, severity, message| {
                let text = format_debug_message(source, ty, id, message);
                match severity {
                    glow::DEBUG_SEVERITY_HIGH => log::error!("{text}"),
                    glow::DEBUG_SEVERITY_MEDIUM => log::warn!("{text}"),
                    glow::DEBUG_SEVERITY_LOW => log::info!("{text}"),
                    _ => log::trace!("{text}"),
                }
            });
        }
    }

    pub fn set_debug_name<T: GlDebugType>(gl: &glow::Context, object: &T, name: &str) {
        if !gl.supports_debug() {
            return;
        }
        let label = format!("{}::{}", T::debug_type_name(), name);
        unsafe {
            gl.object_label(T::gl_identifier(), object.gl_name(), Some(label.as_str()));
        }
    }
}

pub fn format_debug_message(source: u32, ty: u32, id: u32, message: &str) -> String {
    let source = match source {
        glow::DEBUG_SOURCE_API => "api",
        glow::DEBUG_SOURCE_WINDOW_SYSTEM => "window-system",
        glow::DEBUG_SOURCE_SHADER_COMPILER => "shader-compiler",
        glow::DEBUG_SOURCE_THIRD_PARTY => "third-party",
        glow::DEBUG_SOURCE_APPLICATION => "application",
        _ => "other",
    };
    let ty = match ty {
        glow::DEBUG_TYPE_ERROR => "error",
        glow::DEBUG_TYPE_DEPRECATED_BEHAVIOR => "deprecated",
        glow::DEBUG_TYPE_UNDEFINED_BEHAVIOR => "undefined-behavior",
        glow::DEBUG_TYPE_PORTABILITY => "portability",
        glow::DEBUG_TYPE_PERFORMANCE => "performance",
        glow::DEBUG_TYPE_MARKER => "marker",
        _ => "other",
    };
    format!("[GL {source}/{ty} #{id}] {}", message.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_debug_message() {
        let text = format_debug_message(glow::DEBUG_SOURCE_API, glow::DEBUG_TYPE_PERFORMANCE, 131218, "slow path\n");
        assert_eq!(text, "[GL api/performance #131218] slow path");

        let text = format_debug_message(0, 0, 1, "x");
        assert_eq!(text, "[GL other/other #1] x");
    }
}
