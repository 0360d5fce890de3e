use std::rc::Rc;

use crate::backend::{GfxBackend, GpuObject};

/// 延迟销毁队列
///
/// 被 edit 替换掉的对象可能仍然被 GPU 上的命令引用。入队时记录当时最后一次提交的序号，
/// 只有当这个序号对应的 fence 已经 signal 之后才真正销毁。
pub struct DeferredRelease<B: GfxBackend> {
    device: Rc<B>,
    /// (object, submission serial)
    pending: Vec<(GpuObject<B>, u64)>,
    destroyed: bool,
}
// new & init
impl<B: GfxBackend> DeferredRelease<B> {
    pub fn new(device: Rc<B>) -> Self {
        Self {
            device,
            pending: Vec::new(),
            destroyed: false,
        }
    }
}
// destroy
impl<B: GfxBackend> DeferredRelease<B> {
    pub fn destroy(mut self) {
        self.destroy_mut();
    }

    /// 立即销毁所有对象，调用者保证 GPU 已经空闲
    pub fn destroy_mut(&mut self) {
        self.flush();
        self.destroyed = true;
    }
}
impl<B: GfxBackend> Drop for DeferredRelease<B> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        if !std::thread::panicking() {
            assert!(self.destroyed, "DeferredRelease must be destroyed manually before drop.");
        }
    }
}
// Subsystem API
impl<B: GfxBackend> DeferredRelease<B> {
    /// 对象在序号为 `serial` 的提交完成之后才能销毁
    pub fn retire(&mut self, object: GpuObject<B>, serial: u64) {
        log::debug!("retire {} until submission #{serial}", object.type_name());
        self.pending.push((object, serial));
    }

    pub fn retire_all(&mut self, objects: impl IntoIterator<Item = GpuObject<B>>, serial: u64) {
        for object in objects {
            self.retire(object, serial);
        }
    }

    /// 销毁所有 `serial <= completed_serial` 的对象，返回销毁的数量
    pub fn cleanup(&mut self, completed_serial: u64) -> usize {
        let _span = tracy_client::span!("DeferredRelease::cleanup");

        let mut to_destroy = Vec::new();
        let mut still_pending = Vec::with_capacity(self.pending.len());
        for (object, serial) in self.pending.drain(..) {
            if serial <= completed_serial {
                to_destroy.push(object);
            } else {
                still_pending.push((object, serial));
            }
        }
        self.pending = still_pending;

        let count = to_destroy.len();
        for object in to_destroy {
            self.device.destroy(object);
        }
        count
    }

    /// 销毁全部对象
    pub fn flush(&mut self) {
        for (object, _) in self.pending.drain(..) {
            self.device.destroy(object);
        }
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
