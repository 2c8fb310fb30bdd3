//! 执行上下文标识

use std::sync::atomic::{AtomicUsize, Ordering};

/// 下一个可分配的上下文 ID（0 保留为"无持有者"）
static NEXT_CONTEXT_ID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    static CONTEXT_ID: usize = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
}

/// 返回当前执行上下文（线程）的不透明 ID。
///
/// 同一线程内多次调用返回相同的值，且永远不为 0。
pub fn current_context_id() -> usize {
    CONTEXT_ID.with(|id| *id)
}
