//! 自旋锁封装
//!
//! 提供对数据的互斥访问的自旋锁类型。

use crate::raw_spin_lock::RawSpinLock;

/// 提供对数据的互斥访问的自旋锁。
///
/// 由 [`RawSpinLock`] 和 [`lock_api::Mutex`] 组合而成。
///
/// # 注意
/// SpinLock 不是可重入的。当持有锁时，尝试再次获取锁将导致死锁。
/// 持有期间应避免长时间运行的操作（例如交换区 I/O 以外的任何阻塞）。
pub type SpinLock<T> = lock_api::Mutex<RawSpinLock, T>;

/// SpinLock 的 RAII 保护器，离开作用域时自动释放锁。
pub type SpinLockGuard<'a, T> = lock_api::MutexGuard<'a, RawSpinLock, T>;
