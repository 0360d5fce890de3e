use std::cell::Cell;

use glow::HasContext;

use tandem_gfx::{GfxError, GfxResult};

/// 基于 `glFenceSync` 的 fence
///
/// GL 的 sync 对象不能 reset，每次提交都会创建一个新的，旧的在 reset 或 destroy 时删除。
/// 没有提交过、也不处于 signalled 状态的 fence 永远不会被 signal。
///
/// # Destroy
/// 需要手动交给 `GfxBackend::destroy`
pub struct GlFence {
    sync: Cell<Option<glow::NativeFence>>,
    signalled: Cell<bool>,
    name: String,
}
// 创建与销毁
impl GlFence {
    pub fn new(signalled: bool, name: &str) -> Self {
        Self {
            sync: Cell::new(None),
            signalled: Cell::new(signalled),
            name: name.to_string(),
        }
    }

    pub fn destroy(self, gl: &glow::Context) {
        self.release_sync(gl);
    }
}
// tools
impl GlFence {
    /// 在刚刚提交的命令之后插入 sync 对象
    pub fn signal_after_commands(&self, gl: &glow::Context) -> GfxResult<()> {
        self.release_sync(gl);
        let sync = unsafe { gl.fence_sync(glow::SYNC_GPU_COMMANDS_COMPLETE, 0) }
            .map_err(|e| GfxError::SubmissionFailure(format!("GfxFence::{}: {e}", self.name)))?;
        self.sync.set(Some(sync));
        self.signalled.set(false);
        Ok(())
    }

    /// 没有 GPU 工作需要等待时直接进入 signalled 状态
    pub fn signal_now(&self, gl: &glow::Context) {
        self.release_sync(gl);
        self.signalled.set(true);
    }

    /// 阻塞等待，超时返回 `GfxError::Timeout`
    pub fn wait(&self, gl: &glow::Context, timeout_ns: u64) -> GfxResult<()> {
        if self.signalled.get() {
            return Ok(());
        }
        let Some(sync) = self.sync.get() else {
            return Err(GfxError::Timeout(format!("GfxFence::{} was never submitted", self.name)));
        };

        let mut remaining = timeout_ns;
        loop {
            let slice = Self::wait_slice(remaining);
            match unsafe { gl.client_wait_sync(sync, glow::SYNC_FLUSH_COMMANDS_BIT, slice) } {
                glow::ALREADY_SIGNALED | glow::CONDITION_SATISFIED => {
                    self.signal_now(gl);
                    return Ok(());
                }
                glow::TIMEOUT_EXPIRED if remaining > slice as u64 => remaining -= slice as u64,
                glow::TIMEOUT_EXPIRED => {
                    return Err(GfxError::Timeout(format!(
                        "GfxFence::{} not signalled within {timeout_ns} ns",
                        self.name
                    )));
                }
                status => {
                    return Err(GfxError::Backend(format!(
                        "GfxFence::{}: glClientWaitSync returned {status:#x}",
                        self.name
                    )));
                }
            }
        }
    }

    pub fn reset(&self, gl: &glow::Context) {
        self.release_sync(gl);
        self.signalled.set(false);
    }

    pub fn is_signalled(&self, gl: &glow::Context) -> bool {
        if self.signalled.get() {
            return true;
        }
        let Some(sync) = self.sync.get() else {
            return false;
        };
        if unsafe { gl.get_sync_status(sync) } == glow::SIGNALED {
            self.signal_now(gl);
            return true;
        }
        false
    }

    /// `glClientWaitSync` 的超时参数在 glow 中是 i32，更长的等待需要分段
    #[inline]
    pub fn wait_slice(remaining_ns: u64) -> i32 {
        remaining_ns.min(i32::MAX as u64) as i32
    }

    fn release_sync(&self, gl: &glow::Context) {
        if let Some(sync) = self.sync.take() {
            unsafe { gl.delete_sync(sync) };
        }
    }
}

/// GL 的命令在单个 context 上按顺序执行，semaphore 只用来保持接口一致
pub struct GlSemaphore {
    name: String,
}
impl GlSemaphore {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string() }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_slice() {
        assert_eq!(GlFence::wait_slice(0), 0);
        assert_eq!(GlFence::wait_slice(1_000), 1_000);
        assert_eq!(GlFence::wait_slice(u64::MAX), i32::MAX);
    }

    #[test]
    fn test_initial_state() {
        let fence = GlFence::new(true, "signalled");
        assert!(fence.signalled.get());
        assert!(fence.sync.get().is_none());

        let fence = GlFence::new(false, "pending");
        assert!(!fence.signalled.get());
    }
}
