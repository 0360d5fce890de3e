use glow::HasContext;

use crate::error::{construction_error, gl_check};
use crate::foundation::debug_output::{GlDebugOutput, GlDebugType};
use tandem_gfx::GfxResult;
use tandem_gfx::backend::{BufferComponent, GfxBufferDesc};

/// immutable storage 的 buffer
///
/// host visible 的 buffer 使用 persistent + coherent 映射，GPU 写入在 fence 之后对 CPU 可见；
/// 其余的 buffer 通过临时 buffer 的 `glCopyBufferSubData` 更新
pub struct GlBuffer {
    handle: glow::NativeBuffer,
    size: usize,

    map_ptr: Option<*mut u8>,
    /// alias 与其他 buffer 共享同一个 GL 对象，不负责删除
    owned: bool,

    name: String,
}
impl GlDebugType for GlBuffer {
    fn debug_type_name() -> &'static str {
        "GfxBuffer"
    }

    fn gl_identifier() -> u32 {
        glow::BUFFER
    }

    fn gl_name(&self) -> u32 {
        self.handle.0.get()
    }
}
// init & destroy
impl GlBuffer {
    pub fn new(gl: &glow::Context, size: usize, host_visible: bool, name: &str) -> GfxResult<Self> {
        let _span = tracy_client::span!("GlBuffer::new");
        let object_name = format!("{}::{name}", Self::debug_type_name());

        let handle = unsafe { gl.create_buffer() }.map_err(|e| construction_error(&object_name, e))?;
        let flags = Self::storage_flags(host_visible);
        // 与 vulkan 一样不允许大小为 0 的 buffer
        let storage_size = size.max(4) as i32;

        let map_ptr = unsafe {
            gl.bind_buffer(glow::COPY_WRITE_BUFFER, Some(handle));
            gl.buffer_storage(glow::COPY_WRITE_BUFFER, storage_size, None, flags);
            let ptr = host_visible
                .then(|| gl.map_buffer_range(glow::COPY_WRITE_BUFFER, 0, storage_size, Self::map_flags()));
            gl.bind_buffer(glow::COPY_WRITE_BUFFER, None);
            ptr
        };

        let buffer = Self {
            handle,
            size,
            map_ptr: map_ptr.filter(|ptr| !ptr.is_null()),
            owned: true,
            name: name.to_string(),
        };
        if let Err(e) = gl_check(gl, &object_name) {
            buffer.destroy(gl);
            return Err(e);
        }
        if host_visible && buffer.map_ptr.is_none() {
            buffer.destroy(gl);
            return Err(construction_error(&object_name, "glMapBufferRange returned null"));
        }

        GlDebugOutput::set_debug_name(gl, &buffer, name);
        Ok(buffer)
    }

    #[inline]
    pub fn from_desc(gl: &glow::Context, desc: &GfxBufferDesc) -> GfxResult<Self> {
        // GL 的 buffer 对象没有 usage 的区分，index 与 indirect 在绑定时决定
        Self::new(gl, desc.size, desc.host_visible, desc.name)
    }

    /// host visible 的 buffer 持久映射，写入立刻对 GPU 可见；其余的只存在于 GPU
    pub fn storage_flags(host_visible: bool) -> u32 {
        if host_visible { Self::map_flags() } else { 0 }
    }

    #[inline]
    pub fn map_flags() -> u32 {
        glow::MAP_READ_BIT | glow::MAP_WRITE_BIT | glow::MAP_PERSISTENT_BIT | glow::MAP_COHERENT_BIT
    }

    pub fn alias(&self) -> Self {
        Self {
            handle: self.handle,
            size: self.size,
            map_ptr: self.map_ptr,
            owned: false,
            name: format!("{}(alias)", self.name),
        }
    }

    /// 删除 buffer 时映射会被隐式解除
    pub fn destroy(self, gl: &glow::Context) {
        if !self.owned {
            log::debug!("dropping GfxBuffer alias: {}", self.name);
            return;
        }
        log::debug!("destroying GfxBuffer: {}", self.name);
        unsafe {
            gl.delete_buffer(self.handle);
        }
    }
}
// tools
impl GlBuffer {
    /// 经过临时 buffer 拷贝，immutable storage 不允许直接 `glBufferSubData`
    ///
    /// 超出大小的部分被截断
    pub fn upload(&self, gl: &glow::Context, data: &[u8]) -> GfxResult<()> {
        let len = data.len().min(self.size);
        if len == 0 {
            return Ok(());
        }
        let staging = unsafe { gl.create_buffer() }
            .map_err(|e| construction_error(&format!("{}::{}-stage", Self::debug_type_name(), self.name), e))?;
        unsafe {
            gl.bind_buffer(glow::COPY_READ_BUFFER, Some(staging));
            gl.buffer_data_u8_slice(glow::COPY_READ_BUFFER, &data[..len], glow::STREAM_COPY);
            gl.bind_buffer(glow::COPY_WRITE_BUFFER, Some(self.handle));
            gl.copy_buffer_sub_data(glow::COPY_READ_BUFFER, glow::COPY_WRITE_BUFFER, 0, 0, len as i32);
            gl.bind_buffer(glow::COPY_WRITE_BUFFER, None);
            gl.bind_buffer(glow::COPY_READ_BUFFER, None);
            gl.delete_buffer(staging);
        }
        Ok(())
    }
}
// getters
impl GlBuffer {
    #[inline]
    pub fn handle(&self) -> glow::NativeBuffer {
        self.handle
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}
impl BufferComponent for GlBuffer {
    #[inline]
    fn size(&self) -> usize {
        self.size
    }

    fn mapped(&self) -> Option<&[u8]> {
        self.map_ptr.map(|ptr| unsafe { std::slice::from_raw_parts(ptr, self.size) })
    }

    fn mapped_mut(&mut self) -> Option<&mut [u8]> {
        self.map_ptr.map(|ptr| unsafe { std::slice::from_raw_parts_mut(ptr, self.size) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_flags() {
        let mapped = GlBuffer::storage_flags(true);
        assert_ne!(mapped & glow::MAP_PERSISTENT_BIT, 0);
        assert_ne!(mapped & glow::MAP_COHERENT_BIT, 0);

        // 持久映射要求 storage 与 map 的 flags 一致
        assert_eq!(mapped, GlBuffer::map_flags());
        assert_eq!(GlBuffer::storage_flags(false), 0);
    }
}
