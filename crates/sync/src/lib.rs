//! 同步原语
//!
//! 向分页核心提供基本的锁和同步原语：
//! - [`SpinLock`]：基于 [`RawSpinLock`] 的自旋锁，用于很短的叶子临界区
//! - [`Lock`]：可睡眠的互斥锁，带持有者跟踪（可检测重入）
//! - [`Condition`]：与 [`Lock`] 配合使用的条件变量
//!
//! # 锁顺序（Lock Ordering）
//!
//! 本 crate 的原语本身不会"自动防死锁"。分页核心约定的层级（从高到低）：
//!
//! | 层级（高→低） | 锁 | 备注 |
//! |---|---|---|
//! | 1 | 进程锁（`Lock<ProcessState>`） | 覆盖一次完整的缺页处理或进程退出 |
//! | 2 | 内存锁（`Lock<MemoryState>`） | 帧表、空闲帧池、时钟指针、交换槽绑定 |
//! | 3 | 叶子 `SpinLock` | TLB 数组、帧内容、进程注册表、交换区空闲表 |
//!
//! 持有内存锁时绝不能再获取进程锁。

mod condition;
mod context;
mod raw_spin_lock;
mod sleep_lock;
mod spin_lock;

pub use condition::*;
pub use context::current_context_id;
pub use raw_spin_lock::*;
pub use sleep_lock::*;
pub use spin_lock::*;
