//! 条件变量
//!
//! 与 [`Lock`] 配合使用：`sleep` 原子地释放锁并睡眠，被唤醒后重新获取锁再返回。
//! 唤醒可能是虚假的，调用方必须在循环中重新检查条件。

use crate::sleep_lock::LockGuard;
use std::time::Duration;

/// 条件变量
#[derive(Debug, Default)]
pub struct Condition {
    cv: parking_lot::Condvar,
}

impl Condition {
    /// 创建一个新的条件变量
    pub const fn new() -> Self {
        Condition {
            cv: parking_lot::Condvar::new(),
        }
    }

    /// 释放 `guard` 对应的锁并睡眠，直到被唤醒后重新获取锁。
    ///
    /// # Panics
    /// 当前上下文未持有该锁时 panic。
    pub fn sleep<T>(&self, guard: &mut LockGuard<'_, T>) {
        assert!(
            guard.lock().is_held_by_current_thread(),
            "sync: Condition::sleep without holding the lock"
        );
        guard.release_owner();
        self.cv.wait(&mut guard.guard);
        guard.reclaim_owner();
    }

    /// 与 [`Condition::sleep`] 相同，但最多等待 `timeout`。
    ///
    /// # 返回值
    /// 是否因超时而返回
    pub fn sleep_for<T>(&self, guard: &mut LockGuard<'_, T>, timeout: Duration) -> bool {
        assert!(
            guard.lock().is_held_by_current_thread(),
            "sync: Condition::sleep_for without holding the lock"
        );
        guard.release_owner();
        let result = self.cv.wait_for(&mut guard.guard, timeout);
        guard.reclaim_owner();
        result.timed_out()
    }

    /// 唤醒一个等待者，返回是否确实唤醒了某个上下文
    pub fn wake(&self) -> bool {
        self.cv.notify_one()
    }

    /// 唤醒所有等待者，返回被唤醒的数量
    pub fn wake_all(&self) -> usize {
        self.cv.notify_all()
    }
}
