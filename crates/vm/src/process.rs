//! 用户进程的虚拟内存状态
//!
//! 每个进程拥有一个扁平页表、一个进程锁以及在它上面运行的执行上下文列表。
//! 进程锁覆盖一次完整的缺页处理和进程退出；页表项本身是原子的，
//! 淘汰线程在不持有进程锁的情况下也能修改它们。

use crate::address::Vpn;
use crate::image::ExecutableImage;
use crate::loader::AddressLayout;
use crate::page_table::PageTable;
use crate::tlb::{ExecutionContext, SyncAction};
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use sync::{Lock, LockGuard, SpinLock};

/// 进程 ID
pub type Pid = u32;

/// 进程锁保护的状态
#[derive(Debug, Default)]
pub struct ProcessState {
    /// 退出状态（None 表示仍在运行）
    pub exit_status: Option<i32>,
    /// 在该进程上完成的缺页次数
    pub faults: u64,
}

/// 一个用户进程
pub struct VmProcess {
    pid: Pid,
    layout: AddressLayout,
    image: Arc<dyn ExecutableImage>,
    page_table: PageTable,
    state: Lock<ProcessState>,
    exited: AtomicBool,
    contexts: SpinLock<Vec<Weak<ExecutionContext>>>,
    page_size: usize,
    tlb_size: usize,
}

impl VmProcess {
    pub(crate) fn new(
        pid: Pid,
        layout: AddressLayout,
        image: Arc<dyn ExecutableImage>,
        page_size: usize,
        tlb_size: usize,
    ) -> Self {
        VmProcess {
            pid,
            page_table: PageTable::new(layout.num_pages),
            layout,
            image,
            state: Lock::new(ProcessState::default()),
            exited: AtomicBool::new(false),
            contexts: SpinLock::new(Vec::new()),
            page_size,
            tlb_size,
        }
    }

    /// 进程 ID
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// 地址空间布局
    pub fn layout(&self) -> &AddressLayout {
        &self.layout
    }

    /// 可执行映像
    pub fn image(&self) -> &dyn ExecutableImage {
        self.image.as_ref()
    }

    /// 页表
    pub fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    /// 页表长度
    pub fn num_pages(&self) -> usize {
        self.page_table.len()
    }

    /// 获取进程锁
    pub fn lock(&self) -> LockGuard<'_, ProcessState> {
        self.state.acquire()
    }

    /// 当前线程是否持有进程锁
    pub fn is_locked_by_current_thread(&self) -> bool {
        self.state.is_held_by_current_thread()
    }

    /// 是否已退出
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    pub(crate) fn mark_exited(&self, state: &mut ProcessState, status: i32) {
        state.exit_status = Some(status);
        self.exited.store(true, Ordering::Release);
    }

    /// 退出状态（仍在运行时为 None）
    pub fn exit_status(&self) -> Option<i32> {
        if !self.has_exited() {
            return None;
        }
        self.state.acquire().exit_status
    }

    /// 创建一个运行该进程的执行上下文（线程）
    pub fn create_context(&self) -> Arc<ExecutionContext> {
        let ctx = Arc::new(ExecutionContext::new(self.tlb_size, self.page_size));
        let mut contexts = self.contexts.lock();
        contexts.retain(|c| c.strong_count() > 0);
        contexts.push(Arc::downgrade(&ctx));
        ctx
    }

    fn live_contexts(&self) -> Vec<Arc<ExecutionContext>> {
        self.contexts.lock().iter().filter_map(Weak::upgrade).collect()
    }

    /// 在该进程的所有执行上下文中同步 `vpn` 的 TLB 条目
    pub fn sync_tlbs(&self, vpn: Vpn, action: SyncAction) {
        for ctx in self.live_contexts() {
            ctx.sync_vpn(vpn, &self.page_table, action);
        }
    }

    /// 合并并清空所有执行上下文的 TLB
    pub fn flush_tlbs(&self) {
        for ctx in self.live_contexts() {
            ctx.save_state(&self.page_table);
        }
    }

    /// 使所有执行上下文的 TLB 失效，不做同步
    pub(crate) fn invalidate_tlbs(&self) {
        for ctx in self.live_contexts() {
            ctx.invalidate_all();
        }
    }
}

impl core::fmt::Debug for VmProcess {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VmProcess")
            .field("pid", &self.pid)
            .field("num_pages", &self.layout.num_pages)
            .field("exited", &self.has_exited())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Ppn;
    use crate::image::StaticImage;
    use crate::tlb::AccessKind;

    fn process() -> VmProcess {
        let image = Arc::new(StaticImage::builder(64).section(".text", vec![0; 64], true).build());
        let layout = AddressLayout::new(image.as_ref(), &[], 64, 2).unwrap();
        VmProcess::new(7, layout, image, 64, 4)
    }

    #[test]
    fn test_new_process_all_invalid() {
        let p = process();
        assert_eq!(p.pid(), 7);
        assert_eq!(p.num_pages(), 1 + 2 + 1);
        assert_eq!(p.page_table().resident_pages(), 0);
        assert!(!p.has_exited());
        assert_eq!(p.exit_status(), None);
    }

    #[test]
    fn test_tlb_shootdown_reaches_all_contexts() {
        let p = process();
        let a = p.create_context();
        let b = p.create_context();
        let e = p.page_table().install(Vpn(1), Ppn(0), false, false);
        a.refill(e, p.page_table());
        b.refill(e, p.page_table());
        b.translate(64, AccessKind::Write).unwrap();

        p.sync_tlbs(Vpn(1), SyncAction::Invalidate);
        assert!(a.valid_entries().is_empty());
        assert!(b.valid_entries().is_empty());
        assert!(p.page_table().lookup(Vpn(1)).unwrap().is_dirty());
    }

    #[test]
    fn test_dropped_contexts_are_pruned() {
        let p = process();
        drop(p.create_context());
        let _kept = p.create_context();
        assert_eq!(p.live_contexts().len(), 1);
        assert_eq!(p.contexts.lock().len(), 1);
    }

    #[test]
    fn test_mark_exited() {
        let p = process();
        {
            let mut state = p.lock();
            assert!(p.is_locked_by_current_thread());
            p.mark_exited(&mut state, 3);
        }
        assert!(p.has_exited());
        assert_eq!(p.exit_status(), Some(3));
    }
}
