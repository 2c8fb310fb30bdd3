//! 原始自旋锁实现
//!
//! 基于原子操作实现自旋锁机制，并实现 [`lock_api::RawMutex`]，
//! 使其可以直接作为 [`lock_api::Mutex`] 的底层锁使用。

use core::{
    hint,
    sync::atomic::{AtomicBool, Ordering},
};
use lock_api::{GuardSend, RawMutex};

/// 原始自旋锁。
///
/// 不可重入 (即不能在持有时再次调用 `lock()`)。
/// 仅适用于很短的叶子临界区：持有期间不得睡眠，也不得获取其它锁。
///
/// # 示例
/// ```ignore
/// let lock = SpinLock::new(0);
/// {
///     let mut guard = lock.lock(); // 获取锁
///     *guard += 1;
/// } // 离开作用域，自动释放锁
/// ```
#[derive(Debug)]
pub struct RawSpinLock {
    lock: AtomicBool,
}

impl RawSpinLock {
    /// 创建一个新的 RawSpinLock 实例。
    pub const fn new() -> Self {
        RawSpinLock {
            lock: AtomicBool::new(false),
        }
    }

    /// 检查锁是否被占用 (仅用于调试/测试)
    ///
    /// # 返回值
    /// 锁是否被占用
    pub fn is_held(&self) -> bool {
        self.lock.load(Ordering::Relaxed)
    }
}

impl Default for RawSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: lock() 只有在成功把标志从 false 置为 true 之后才返回，
// 因此同一时刻至多一个持有者；unlock() 只由持有者调用。
unsafe impl RawMutex for RawSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawSpinLock::new();

    type GuardMarker = GuardSend;

    fn lock(&self) {
        while self
            .lock
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            // 先只读等待，减少缓存行争用
            while self.lock.load(Ordering::Relaxed) {
                hint::spin_loop();
            }
        }
    }

    fn try_lock(&self) -> bool {
        self.lock
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock(&self) {
        self.lock.store(false, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.is_held()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_lock_unlock() {
        let raw = RawSpinLock::new();
        assert!(!raw.is_held());
        raw.lock();
        assert!(raw.is_held());
        assert!(!raw.try_lock());
        unsafe { raw.unlock() };
        assert!(!raw.is_held());
        assert!(raw.try_lock());
        unsafe { raw.unlock() };
    }
}
