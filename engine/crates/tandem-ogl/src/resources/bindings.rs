use glow::HasContext;

use crate::gl_backend::GlBackend;
use tandem_gfx::backend::{BindingLayout, BindingWrite};
use tandem_gfx::{GfxError, GfxResult};

/// 一个 descriptor set 在 GL 中的等价物：每个 binding 对应的对象
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlBindingSet {
    buffers: Vec<Option<glow::NativeBuffer>>,
    images: Vec<(glow::NativeTexture, glow::NativeSampler)>,
}

/// GL 没有 descriptor 对象，binding 表保存在 CPU 端，提交时才绑定到 context
///
/// - storage buffer i 绑定到 `GL_SHADER_STORAGE_BUFFER` 的 index i
/// - image 数组的第 i 个元素绑定到 texture unit `image_binding + i`
pub struct GlBindings {
    layout: BindingLayout,
    sets: Vec<GlBindingSet>,
    name: String,
}
// 创建
impl GlBindings {
    pub fn new(layout: &BindingLayout, set_count: usize, name: &str) -> Self {
        let set = GlBindingSet {
            buffers: vec![None; layout.buffer_count as usize],
            images: Vec::new(),
        };
        Self {
            layout: *layout,
            sets: vec![set; set_count],
            name: name.to_string(),
        }
    }
}
// update
impl GlBindings {
    pub fn write(&mut self, set: usize, writes: &[BindingWrite<'_, GlBackend>]) {
        for write in writes {
            match write {
                BindingWrite::Buffer { binding, buffer } => self.set_buffer(set, *binding, buffer.handle()),
                BindingWrite::Images { images, .. } => self.set_images(
                    set,
                    images.iter().map(|(image, sampler)| (image.texture(), sampler.handle())).collect(),
                ),
            }
        }
    }

    pub fn set_buffer(&mut self, set: usize, binding: u32, buffer: glow::NativeBuffer) {
        let set_count = self.sets.len();
        let Some(slot) = self.sets.get_mut(set).and_then(|s| s.buffers.get_mut(binding as usize)) else {
            log::error!("{}: buffer binding {binding} of set {set} does not exist, {set_count} sets", self.name);
            return;
        };
        *slot = Some(buffer);
    }

    pub fn set_images(&mut self, set: usize, images: Vec<(glow::NativeTexture, glow::NativeSampler)>) {
        let Some(entry) = self.sets.get_mut(set) else {
            log::error!("{}: descriptor set {set} does not exist", self.name);
            return;
        };
        if images.len() > self.layout.image_count as usize {
            log::warn!(
                "{}: {} images written, the layout only has {}",
                self.name,
                images.len(),
                self.layout.image_count
            );
        }
        entry.images = images.into_iter().take(self.layout.image_count as usize).collect();
    }
}
// bind
impl GlBindings {
    /// 在提交时调用，读取的总是最新写入的对象
    pub fn bind(&self, gl: &glow::Context, set: usize) -> GfxResult<()> {
        let entry = self
            .set(set)
            .ok_or_else(|| GfxError::InvalidHandle(format!("{}: descriptor set {set} does not exist", self.name)))?;
        let image_binding = self.layout.image_binding();
        unsafe {
            for (index, buffer) in entry.buffers.iter().enumerate() {
                if let Some(buffer) = buffer {
                    gl.bind_buffer_base(glow::SHADER_STORAGE_BUFFER, index as u32, Some(*buffer));
                }
            }
            for (index, (texture, sampler)) in entry.images.iter().enumerate() {
                let unit = image_binding + index as u32;
                gl.active_texture(glow::TEXTURE0 + unit);
                gl.bind_texture(glow::TEXTURE_2D, Some(*texture));
                gl.bind_sampler(unit, Some(*sampler));
            }
            gl.active_texture(glow::TEXTURE0);
        }
        Ok(())
    }
}
// getters
impl GlBindings {
    #[inline]
    pub fn set(&self, index: usize) -> Option<&GlBindingSet> {
        self.sets.get(index)
    }

    #[inline]
    pub fn set_count(&self) -> usize {
        self.sets.len()
    }

    #[inline]
    pub fn layout(&self) -> BindingLayout {
        self.layout
    }
}
impl GlBindingSet {
    #[inline]
    pub fn buffer(&self, binding: u32) -> Option<glow::NativeBuffer> {
        self.buffers.get(binding as usize).copied().flatten()
    }

    #[inline]
    pub fn images(&self) -> &[(glow::NativeTexture, glow::NativeSampler)] {
        &self.images
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use super::*;

    fn id(value: u32) -> NonZeroU32 {
        NonZeroU32::new(value).unwrap()
    }

    fn bindings() -> GlBindings {
        GlBindings::new(
            &BindingLayout {
                buffer_count: 2,
                image_count: 2,
            },
            3,
            "test",
        )
    }

    #[test]
    fn test_writes_update_only_their_set() {
        let mut bindings = bindings();
        bindings.set_buffer(1, 0, glow::NativeBuffer(id(7)));

        assert_eq!(bindings.set(1).unwrap().buffer(0), Some(glow::NativeBuffer(id(7))));
        assert_eq!(bindings.set(0).unwrap().buffer(0), None);
        assert_eq!(bindings.set(2).unwrap().buffer(0), None);

        // 覆盖写入
        bindings.set_buffer(1, 0, glow::NativeBuffer(id(9)));
        assert_eq!(bindings.set(1).unwrap().buffer(0), Some(glow::NativeBuffer(id(9))));
    }

    #[test]
    fn test_out_of_range_writes_are_ignored() {
        let mut bindings = bindings();
        bindings.set_buffer(5, 0, glow::NativeBuffer(id(1)));
        bindings.set_buffer(0, 4, glow::NativeBuffer(id(1)));
        assert!((0..3).all(|set| bindings.set(set).unwrap().buffer(0).is_none()));

        let images = (1..=3).map(|i| (glow::NativeTexture(id(i)), glow::NativeSampler(id(i)))).collect();
        bindings.set_images(0, images);
        assert_eq!(bindings.set(0).unwrap().images().len(), 2);
    }
}
