//! 可睡眠互斥锁
//!
//! 与自旋锁不同，[`Lock`] 在竞争时让出 CPU 并睡眠，适合保护可能持有较久的临界区
//! （例如一次完整的缺页处理，其中包含同步交换区 I/O）。
//!
//! 锁记录当前持有者的上下文 ID，用于：
//! - 检测重入：持有者再次 `acquire` 会直接 panic，而不是悄悄死锁；
//! - 断言：[`Lock::is_held_by_current_thread`] 供调用方检查锁前置条件。

use crate::context::current_context_id;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicUsize, Ordering};

/// 表示"无持有者"的上下文 ID
const NO_OWNER: usize = 0;

/// 可睡眠的互斥锁，带持有者跟踪。
///
/// # 示例
/// ```ignore
/// let lock = Lock::new(Vec::new());
/// {
///     let mut guard = lock.acquire();
///     guard.push(1);
/// } // 离开作用域，自动释放
/// ```
#[derive(Debug)]
pub struct Lock<T> {
    owner: AtomicUsize,
    inner: parking_lot::Mutex<T>,
}

impl<T> Lock<T> {
    /// 创建一个新的锁，初始化内部数据。
    pub fn new(data: T) -> Self {
        Lock {
            owner: AtomicUsize::new(NO_OWNER),
            inner: parking_lot::Mutex::new(data),
        }
    }

    /// 获取锁，必要时睡眠等待。
    ///
    /// # Panics
    /// 当前上下文已经持有该锁时 panic（重入）。
    pub fn acquire(&self) -> LockGuard<'_, T> {
        let me = current_context_id();
        assert_ne!(
            self.owner.load(Ordering::Relaxed),
            me,
            "sync: reentrant Lock::acquire"
        );
        let guard = self.inner.lock();
        self.owner.store(me, Ordering::Relaxed);
        LockGuard { lock: self, guard }
    }

    /// 尝试获取锁，失败时立即返回 None。
    pub fn try_acquire(&self) -> Option<LockGuard<'_, T>> {
        let guard = self.inner.try_lock()?;
        self.owner.store(current_context_id(), Ordering::Relaxed);
        Some(LockGuard { lock: self, guard })
    }

    /// 当前上下文是否持有该锁
    pub fn is_held_by_current_thread(&self) -> bool {
        self.owner.load(Ordering::Relaxed) == current_context_id()
    }

    /// 消耗锁并返回内部数据
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T: Default> Default for Lock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// [`Lock`] 的 RAII 保护器，离开作用域时释放锁并清除持有者记录。
pub struct LockGuard<'a, T> {
    lock: &'a Lock<T>,
    pub(crate) guard: parking_lot::MutexGuard<'a, T>,
}

impl<T> LockGuard<'_, T> {
    /// 睡眠前调用：放弃持有者身份（底层互斥锁由条件变量释放）
    pub(crate) fn release_owner(&self) {
        self.lock.owner.store(NO_OWNER, Ordering::Relaxed);
    }

    /// 被唤醒并重新拿到底层互斥锁后调用
    pub(crate) fn reclaim_owner(&self) {
        self.lock
            .owner
            .store(current_context_id(), Ordering::Relaxed);
    }

    /// 该保护器所属的锁
    pub fn lock(&self) -> &Lock<T> {
        self.lock
    }
}

impl<T> Deref for LockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl<T> DerefMut for LockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl<T> Drop for LockGuard<'_, T> {
    /// 先清除持有者，随后字段 `guard` 被 drop，释放底层互斥锁。
    fn drop(&mut self) {
        self.release_owner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_acquire_tracks_owner() {
        let lock = Lock::new(5);
        assert!(!lock.is_held_by_current_thread());
        {
            let guard = lock.acquire();
            assert_eq!(*guard, 5);
            assert!(lock.is_held_by_current_thread());
        }
        assert!(!lock.is_held_by_current_thread());
    }

    #[test]
    #[should_panic(expected = "reentrant")]
    fn test_reentrant_acquire_panics() {
        let lock = Lock::new(());
        let _g1 = lock.acquire();
        let _g2 = lock.acquire();
    }

    #[test]
    fn test_try_acquire_fails_while_held_elsewhere() {
        let lock = Arc::new(Lock::new(0));
        let guard = lock.acquire();
        let other = lock.clone();
        let got = std::thread::spawn(move || other.try_acquire().is_some())
            .join()
            .unwrap();
        assert!(!got);
        drop(guard);
        assert!(lock.try_acquire().is_some());
    }

    #[test]
    fn test_owner_not_visible_to_other_threads() {
        let lock = Arc::new(Lock::new(0));
        let _guard = lock.acquire();
        let other = lock.clone();
        let held_there = std::thread::spawn(move || other.is_held_by_current_thread())
            .join()
            .unwrap();
        assert!(!held_there);
    }
}
