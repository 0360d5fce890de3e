use std::ffi::CStr;

use ash::vk;

use crate::error::vk_check;
use tandem_gfx::GfxResult;

/// 把 validation layer 的消息转发到 log
pub struct VulkanDebugMsger {
    loader: ash::ext::debug_utils::Instance,
    handle: vk::DebugUtilsMessengerEXT,
}

// 创建与销毁
impl VulkanDebugMsger {
    pub fn new(vk_entry: &ash::Entry, instance: &ash::Instance) -> GfxResult<Self> {
        let loader = ash::ext::debug_utils::Instance::new(vk_entry, instance);

        let create_info = Self::debug_utils_messenger_ci();
        let handle = vk_check("create_debug_utils_messenger", unsafe {
            loader.create_debug_utils_messenger(&create_info, None)
        })?;

        Ok(Self { loader, handle })
    }

    pub fn destroy(self) {
        log::info!("destroying VulkanDebugMsger");
        unsafe {
            self.loader.destroy_debug_utils_messenger(self.handle, None);
        }
    }
}

// 构造过程辅助函数
impl VulkanDebugMsger {
    pub fn debug_msg_type() -> vk::DebugUtilsMessageTypeFlagsEXT {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
    }

    pub fn debug_msg_severity() -> vk::DebugUtilsMessageSeverityFlagsEXT {
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
    }

    /// instance 创建时也会用到，用来捕获 instance 创建过程中的消息
    pub fn debug_utils_messenger_ci() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
        vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(Self::debug_msg_severity())
            .message_type(Self::debug_msg_type())
            .pfn_user_callback(Some(vk_debug_callback))
    }
}

/// 格式化一条 validation 消息
///
/// 消息是 json 时，`MainMessage` 字段里面有换行符，单独放在最后输出；其余字段 pretty print
pub fn format_validation_message(message_type: &str, message: &str) -> String {
    let mut json_value = serde_json::from_str::<serde_json::Value>(message);
    let mut json_obj = json_value.as_mut().ok().and_then(|v| v.as_object_mut());
    let main_msg_value = json_obj.as_mut().and_then(|obj| obj.remove("MainMessage"));
    let main_msg_str = main_msg_value.as_ref().and_then(|value| value.as_str()).unwrap_or_default();
    let total_msg_str =
        json_obj.and_then(|obj| serde_json::to_string_pretty(&obj).ok()).unwrap_or_else(|| message.to_string());

    format!("[{message_type}]\n{total_msg_str}\n{main_msg_str}\n")
}

/// debug messenger 的回调函数
/// # Safety
/// 由 validation layer 调用，`p_callback_data` 总是有效的
unsafe extern "system" fn vk_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    let callback_data = unsafe { *p_callback_data };

    let msg = if callback_data.p_message.is_null() {
        std::borrow::Cow::from("")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };
    let format_msg = format_validation_message(&format!("{message_type:?}"), msg.as_ref());

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("{}", format_msg),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("{}", format_msg),
        _ => log::info!("{}", format_msg),
    };

    // 只有 layer developer 才需要返回 True
    vk::FALSE
}

pub trait DebugType {
    fn debug_type_name() -> &'static str;
    fn vk_handle(&self) -> impl vk::Handle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_message_is_kept() {
        let text = format_validation_message("VALIDATION", "vkCreateBuffer: size is zero");
        assert_eq!(text, "[VALIDATION]\nvkCreateBuffer: size is zero\n\n");
    }

    #[test]
    fn test_json_main_message_goes_last() {
        let raw = r#"{"MainMessage": "line one\nline two", "MessageID": 42}"#;
        let text = format_validation_message("VALIDATION", raw);

        assert!(text.starts_with("[VALIDATION]\n{"));
        assert!(text.contains("\"MessageID\": 42"));
        assert!(!text.contains("MainMessage"));
        assert!(text.ends_with("line one\nline two\n"));
    }
}
