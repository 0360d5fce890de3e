use std::cell::Cell;

use glam::UVec2;
use glow::HasContext;

use crate::error::{construction_error, gl_check};
use crate::foundation::debug_output::{GlDebugOutput, GlDebugType};
use crate::resources::format::{GlFormat, GlFormatUtils};
use tandem_gfx::GfxResult;
use tandem_gfx::backend::{GfxImageDesc, ImageComponent};
use tandem_gfx::resources::image_format::ImageFormat;

/// host visible 的 image 背后的 pixel unpack buffer
///
/// CPU 写入映射内存，提交命令前再由 `glTexSubImage2D` 拷贝到 texture
struct GlPixelBuffer {
    handle: glow::NativeBuffer,
    map_ptr: *mut u8,
    len: usize,
    row_pitch: usize,
    /// 映射内存被借出之后置为 true
    dirty: Cell<bool>,
}

/// 单层 mip 的 2D texture
pub struct GlImage {
    texture: glow::NativeTexture,
    extent: UVec2,
    format: ImageFormat,
    pixel_buffer: Option<GlPixelBuffer>,
    /// alias 只共享 texture，不负责删除
    owned: bool,

    name: String,
}
impl GlDebugType for GlImage {
    fn debug_type_name() -> &'static str {
        "GfxImage"
    }

    fn gl_identifier() -> u32 {
        glow::TEXTURE
    }

    fn gl_name(&self) -> u32 {
        self.texture.0.get()
    }
}
// 创建与销毁
impl GlImage {
    pub fn new(gl: &glow::Context, desc: &GfxImageDesc) -> GfxResult<Self> {
        let _span = tracy_client::span!("GlImage::new");
        let object_name = format!("{}::{}", Self::debug_type_name(), desc.name);
        let GlFormat { internal_format, .. } = GlFormatUtils::to_gl(desc.format);

        let texture = unsafe { gl.create_texture() }.map_err(|e| construction_error(&object_name, e))?;
        unsafe {
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.tex_storage_2d(
                glow::TEXTURE_2D,
                1,
                internal_format,
                desc.extent.x.max(1) as i32,
                desc.extent.y.max(1) as i32,
            );
            gl.bind_texture(glow::TEXTURE_2D, None);
        }

        let mut image = Self {
            texture,
            extent: desc.extent,
            format: desc.format,
            pixel_buffer: None,
            owned: true,
            name: desc.name.to_string(),
        };
        if desc.host_visible {
            match Self::create_pixel_buffer(gl, desc.format, desc.extent, &object_name) {
                Ok(pixel_buffer) => image.pixel_buffer = Some(pixel_buffer),
                Err(e) => {
                    image.destroy(gl);
                    return Err(e);
                }
            }
        }
        if let Err(e) = gl_check(gl, &object_name) {
            image.destroy(gl);
            return Err(e);
        }

        GlDebugOutput::set_debug_name(gl, &image, desc.name);
        Ok(image)
    }

    fn create_pixel_buffer(
        gl: &glow::Context,
        format: ImageFormat,
        extent: UVec2,
        object_name: &str,
    ) -> GfxResult<GlPixelBuffer> {
        let row_pitch = GlFormatUtils::aligned_row_pitch(format, extent.x);
        let len = (row_pitch * extent.y as usize).max(4);
        let flags = glow::MAP_WRITE_BIT | glow::MAP_PERSISTENT_BIT | glow::MAP_COHERENT_BIT;

        let handle = unsafe { gl.create_buffer() }.map_err(|e| construction_error(object_name, e))?;
        let map_ptr = unsafe {
            gl.bind_buffer(glow::PIXEL_UNPACK_BUFFER, Some(handle));
            gl.buffer_storage(glow::PIXEL_UNPACK_BUFFER, len as i32, None, flags);
            let ptr = gl.map_buffer_range(glow::PIXEL_UNPACK_BUFFER, 0, len as i32, flags);
            gl.bind_buffer(glow::PIXEL_UNPACK_BUFFER, None);
            ptr
        };
        if map_ptr.is_null() {
            unsafe { gl.delete_buffer(handle) };
            return Err(construction_error(object_name, "glMapBufferRange returned null"));
        }

        Ok(GlPixelBuffer {
            handle,
            map_ptr,
            len,
            row_pitch,
            dirty: Cell::new(false),
        })
    }

    /// alias 只用于采样，映射内存仍然由原 image 写入与 flush
    pub fn alias(&self) -> Self {
        Self {
            texture: self.texture,
            extent: self.extent,
            format: self.format,
            pixel_buffer: None,
            owned: false,
            name: format!("{}(alias)", self.name),
        }
    }

    pub fn destroy(self, gl: &glow::Context) {
        if !self.owned {
            log::debug!("dropping GfxImage alias: {}", self.name);
            return;
        }
        log::debug!("destroying GfxImage: {}", self.name);
        unsafe {
            if let Some(pixel_buffer) = &self.pixel_buffer {
                gl.delete_buffer(pixel_buffer.handle);
            }
            gl.delete_texture(self.texture);
        }
    }
}
// 上传
impl GlImage {
    /// 上传紧密排列的像素数据
    pub fn upload(&self, gl: &glow::Context, data: &[u8]) -> GfxResult<()> {
        let object_name = format!("{}::{}", Self::debug_type_name(), self.name);
        let len = data.len().min(Self::tight_size(self.format, self.extent));
        if len == 0 {
            return Ok(());
        }

        let staging = unsafe { gl.create_buffer() }.map_err(|e| construction_error(&object_name, e))?;
        unsafe {
            gl.bind_buffer(glow::PIXEL_UNPACK_BUFFER, Some(staging));
            gl.buffer_data_u8_slice(glow::PIXEL_UNPACK_BUFFER, &data[..len], glow::STREAM_DRAW);
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            self.sub_image_from_bound_buffer(gl);
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 4);
            gl.bind_buffer(glow::PIXEL_UNPACK_BUFFER, None);
            gl.delete_buffer(staging);
        }
        Ok(())
    }

    /// host visible 的 image 在映射内存被修改过时，把它拷贝到 texture
    ///
    /// 返回是否发生了拷贝
    pub fn flush_pixel_buffer(&self, gl: &glow::Context) -> bool {
        let Some(pixel_buffer) = self.pixel_buffer.as_ref().filter(|p| p.dirty.get()) else {
            return false;
        };
        unsafe {
            gl.bind_buffer(glow::PIXEL_UNPACK_BUFFER, Some(pixel_buffer.handle));
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 4);
            self.sub_image_from_bound_buffer(gl);
            gl.bind_buffer(glow::PIXEL_UNPACK_BUFFER, None);
        }
        pixel_buffer.dirty.set(false);
        true
    }

    /// 数据来源是当前绑定的 `GL_PIXEL_UNPACK_BUFFER`，偏移为 0
    unsafe fn sub_image_from_bound_buffer(&self, gl: &glow::Context) {
        let GlFormat { format, ty, .. } = GlFormatUtils::to_gl(self.format);
        unsafe {
            gl.bind_texture(glow::TEXTURE_2D, Some(self.texture));
            gl.tex_sub_image_2d(
                glow::TEXTURE_2D,
                0,
                0,
                0,
                self.extent.x as i32,
                self.extent.y as i32,
                format,
                ty,
                glow::PixelUnpackData::BufferOffset(0),
            );
            gl.bind_texture(glow::TEXTURE_2D, None);
        }
    }

    #[inline]
    pub fn tight_size(format: ImageFormat, extent: UVec2) -> usize {
        format.pixel_size() * extent.x as usize * extent.y as usize
    }
}
// getters
impl GlImage {
    #[inline]
    pub fn texture(&self) -> glow::NativeTexture {
        self.texture
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn is_host_visible(&self) -> bool {
        self.pixel_buffer.is_some()
    }
}
impl ImageComponent for GlImage {
    #[inline]
    fn extent(&self) -> UVec2 {
        self.extent
    }

    #[inline]
    fn format(&self) -> ImageFormat {
        self.format
    }

    fn row_pitch(&self) -> Option<usize> {
        self.pixel_buffer.as_ref().map(|p| p.row_pitch)
    }

    fn mapped_mut(&mut self) -> Option<&mut [u8]> {
        self.pixel_buffer.as_ref().map(|p| {
            p.dirty.set(true);
            unsafe { std::slice::from_raw_parts_mut(p.map_ptr, p.len) }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tight_size() {
        assert_eq!(GlImage::tight_size(ImageFormat::Rgba32, UVec2::new(3, 2)), 24);
        assert_eq!(GlImage::tight_size(ImageFormat::R8Unorm, UVec2::new(3, 3)), 9);
        assert_eq!(GlImage::tight_size(ImageFormat::Rgba128F, UVec2::ZERO), 0);
    }
}
