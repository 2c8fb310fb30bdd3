//! 进程 ID 分配与进程注册表
//!
//! 帧表只记录不透明的进程 ID；淘汰时通过注册表查到进程（弱引用）。

use crate::process::{Pid, VmProcess};
use core::sync::atomic::{AtomicU32, Ordering};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use sync::SpinLock;

/// 简单的进程ID分配器。
/// 每次调用 `allocate` 返回唯一的进程ID，从 0 开始递增。
#[derive(Debug, Default)]
pub struct PidAllocator {
    next_pid: AtomicU32,
}

impl PidAllocator {
    /// 创建一个新的PidAllocator实例。
    pub const fn new() -> Self {
        PidAllocator {
            next_pid: AtomicU32::new(0),
        }
    }

    /// 分配一个新的进程ID。
    pub fn allocate(&self) -> Pid {
        self.next_pid.fetch_add(1, Ordering::SeqCst)
    }
}

/// 进程注册表：pid → 进程的弱引用
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    pids: PidAllocator,
    processes: SpinLock<BTreeMap<Pid, Weak<VmProcess>>>,
}

impl ProcessRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 分配一个新的进程 ID
    pub fn allocate_pid(&self) -> Pid {
        self.pids.allocate()
    }

    /// 登记进程
    pub fn register(&self, process: &Arc<VmProcess>) {
        self.processes
            .lock()
            .insert(process.pid(), Arc::downgrade(process));
    }

    /// 注销进程
    pub fn unregister(&self, pid: Pid) -> bool {
        self.processes.lock().remove(&pid).is_some()
    }

    /// 查找仍然存活的进程
    pub fn lookup(&self, pid: Pid) -> Option<Arc<VmProcess>> {
        self.processes.lock().get(&pid).and_then(Weak::upgrade)
    }

    /// 已登记的进程数
    pub fn len(&self) -> usize {
        self.processes.lock().len()
    }

    /// 是否没有进程
    pub fn is_empty(&self) -> bool {
        self.processes.lock().is_empty()
    }

    /// 所有存活的进程
    pub fn live_processes(&self) -> Vec<Arc<VmProcess>> {
        self.processes
            .lock()
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::StaticImage;
    use crate::loader::AddressLayout;

    fn process(pid: Pid) -> Arc<VmProcess> {
        let image = Arc::new(StaticImage::builder(64).build());
        let layout = AddressLayout::new(image.as_ref(), &[], 64, 1).unwrap();
        Arc::new(VmProcess::new(pid, layout, image, 64, 2))
    }

    // 顺序分配测试：检查分配值从0开始并依次递增
    #[test]
    fn test_pid_allocate_sequence() {
        let alloc = PidAllocator::new();
        assert_eq!(alloc.allocate(), 0);
        assert_eq!(alloc.allocate(), 1);
        assert_eq!(alloc.allocate(), 2);
    }

    #[test]
    fn test_lookup_is_weak() {
        let registry = ProcessRegistry::new();
        let p = process(registry.allocate_pid());
        registry.register(&p);
        assert_eq!(registry.lookup(0).map(|p| p.pid()), Some(0));

        drop(p);
        assert!(registry.lookup(0).is_none());
        assert!(registry.unregister(0));
        assert!(registry.is_empty());
    }
}
