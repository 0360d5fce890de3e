use std::collections::HashSet;
use std::ffi::{CStr, CString, c_char};

use ash::vk;
use itertools::Itertools;

use crate::error::{construction_error, vk_check};
use crate::foundation::debug_messenger::VulkanDebugMsger;
use tandem_gfx::{GfxError, GfxResult};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

pub struct VulkanInstance {
    pub(crate) ash_instance: ash::Instance,
}

// 创建与销毁
impl VulkanInstance {
    /// 设置所需的 layers 和 extensions，创建 vk instance
    ///
    /// `surface_exts` 是窗口系统需要的 extensions，没有窗口时为空
    pub fn new(
        vk_entry: &ash::Entry,
        app_name: &str,
        surface_exts: &[*const c_char],
        enable_validation: bool,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("VulkanInstance::new");

        let app_name = CString::new(app_name).map_err(|e| GfxError::construction("VulkanInstance", e))?;
        let app_info = vk::ApplicationInfo::default()
            .api_version(vk::API_VERSION_1_3) // 版本过低时，有些函数无法正确加载
            .application_name(app_name.as_c_str())
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"tandem")
            .engine_version(vk::make_api_version(0, 1, 0, 0));

        let mut required_exts = Self::basic_instance_exts();
        required_exts.extend(surface_exts.iter().map(|ext| unsafe { CStr::from_ptr(*ext) }));
        let enabled_extensions = Self::get_extensions(vk_entry, &required_exts)?;
        let enabled_extensions_str =
            enabled_extensions.iter().map(|ext| format!("\n\t{:?}", unsafe { CStr::from_ptr(*ext) })).join("");
        log::info!("instance extensions: {}", enabled_extensions_str);

        let enabled_layers = Self::get_layers(vk_entry, enable_validation)?;
        log::info!("instance layers: {:?}", enabled_layers.iter().map(|l| unsafe { CStr::from_ptr(*l) }).collect_vec());

        // 为 instance info 添加 debug messenger
        let mut debug_utils_messenger_ci = VulkanDebugMsger::debug_utils_messenger_ci();
        let instance_ci = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&enabled_extensions)
            .enabled_layer_names(&enabled_layers)
            .push_next(&mut debug_utils_messenger_ci);

        let ash_instance = unsafe { vk_entry.create_instance(&instance_ci, None) }
            .map_err(|e| construction_error("VulkanInstance", e))?;

        Ok(Self { ash_instance })
    }

    pub fn destroy(self) {
        log::info!("destroying VulkanInstance");
        unsafe {
            self.ash_instance.destroy_instance(None);
        }
    }
}

// getters
impl VulkanInstance {
    #[inline]
    pub fn ash_instance(&self) -> &ash::Instance {
        &self.ash_instance
    }
}

// 构造过程
impl VulkanInstance {
    /// 检查需要的 extension 是否都受支持
    fn get_extensions(vk_entry: &ash::Entry, required: &[&CStr]) -> GfxResult<Vec<*const c_char>> {
        let all_ext_props = vk_check("enumerate_instance_extension_properties", unsafe {
            vk_entry.enumerate_instance_extension_properties(None)
        })?;

        let mut enabled: HashSet<&CStr> = HashSet::new();
        for ext in required {
            let supported = all_ext_props
                .iter()
                .any(|props| *ext == unsafe { CStr::from_ptr(props.extension_name.as_ptr()) });
            if !supported {
                return Err(GfxError::construction(
                    "VulkanInstance",
                    format!("required instance extension {ext:?} is missing"),
                ));
            }
            enabled.insert(ext);
        }

        Ok(enabled.iter().map(|ext| ext.as_ptr()).collect_vec())
    }

    /// validation layer 不可用时只给出警告
    fn get_layers(vk_entry: &ash::Entry, enable_validation: bool) -> GfxResult<Vec<*const c_char>> {
        if !enable_validation {
            return Ok(Vec::new());
        }

        let all_layer_props =
            vk_check("enumerate_instance_layer_properties", unsafe { vk_entry.enumerate_instance_layer_properties() })?;
        let supported = all_layer_props
            .iter()
            .any(|props| VALIDATION_LAYER == unsafe { CStr::from_ptr(props.layer_name.as_ptr()) });
        if supported {
            Ok(vec![VALIDATION_LAYER.as_ptr()])
        } else {
            log::warn!("validation requested but {:?} is not installed", VALIDATION_LAYER);
            Ok(Vec::new())
        }
    }

    /// 必须要开启的 instance extensions
    fn basic_instance_exts() -> Vec<&'static CStr> {
        vec![
            // 1. debug messenger
            // 2. 为 vulkan object 设置 debug name
            // 3. 使用 label 标记 command buffer 中的 section
            ash::ext::debug_utils::NAME,
        ]
    }
}
