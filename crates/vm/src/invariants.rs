//! 全局一致性检查
//!
//! 在持有内存锁的情况下检查帧表、空闲帧池、各进程页表与交换槽绑定是否互相一致。
//! 正在处理中的缺页会让一帧"已归属但页表项尚未有效"，这样的帧一定被 pin。

use crate::address::Ppn;
use crate::frame_table::PageOwner;
use crate::kernel::VmKernel;
use crate::swap::SwapSlot;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// 违反的不变式
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// 空闲帧数与已拥有帧数之和不等于总帧数
    #[error("{free} free + {owned} owned != {total} frames")]
    FrameAccounting {
        /// 空闲帧数
        free: usize,
        /// 已拥有帧数
        owned: usize,
        /// 总帧数
        total: usize,
    },
    /// 空闲帧池中的帧有所有者
    #[error("{ppn} is in the free pool but owned by {owner:?}")]
    FreeFrameOwned {
        /// 帧号
        ppn: Ppn,
        /// 帧表记录的所有者
        owner: PageOwner,
    },
    /// 有效页表项映射的帧在帧表中记录的是别的所有者
    #[error("page table maps {expected:?} to {ppn}, frame table records {recorded:?}")]
    OwnerMismatch {
        /// 帧号
        ppn: Ppn,
        /// 页表所属的 (进程, vpn)
        expected: PageOwner,
        /// 帧表中的记录
        recorded: Option<PageOwner>,
    },
    /// 同一帧在两个页表项中有效
    #[error("{ppn} is mapped by both {first:?} and {second:?}")]
    SharedFrame {
        /// 帧号
        ppn: Ppn,
        /// 第一个映射
        first: PageOwner,
        /// 第二个映射
        second: PageOwner,
    },
    /// 已归属、未被 pin 的帧没有对应的有效页表项
    #[error("{ppn} is owned by {owner:?} but not mapped")]
    UnmappedFrame {
        /// 帧号
        ppn: Ppn,
        /// 所有者
        owner: PageOwner,
    },
    /// 同一交换槽被绑定了两次
    #[error("{slot} is bound to more than one page")]
    DuplicateSlot {
        /// 交换槽
        slot: SwapSlot,
    },
}

impl VmKernel {
    /// 检查全局不变式
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let processes = self.live_processes();
        let mem = self.lock_memory();
        let total = mem.frames.len();

        let free = mem.free.len();
        let owned = mem.frames.owned_count();
        if free + owned != total {
            return Err(InvariantViolation::FrameAccounting { free, owned, total });
        }
        for ppn in mem.free.iter() {
            if let Some(owner) = mem.frames.owner(ppn) {
                return Err(InvariantViolation::FreeFrameOwned { ppn, owner });
            }
        }

        let mut mapped: BTreeMap<Ppn, PageOwner> = BTreeMap::new();
        for process in &processes {
            for entry in process.page_table().valid_entries() {
                let expected = PageOwner::new(process.pid(), entry.vpn);
                let recorded = mem.frames.owner(entry.ppn);
                if recorded != Some(expected) {
                    return Err(InvariantViolation::OwnerMismatch {
                        ppn: entry.ppn,
                        expected,
                        recorded,
                    });
                }
                if let Some(first) = mapped.insert(entry.ppn, expected) {
                    return Err(InvariantViolation::SharedFrame {
                        ppn: entry.ppn,
                        first,
                        second: expected,
                    });
                }
            }
        }

        let live: BTreeSet<_> = processes.iter().map(|p| p.pid()).collect();
        for (ppn, entry) in mem.frames.iter() {
            let Some(owner) = entry.owner() else {
                continue;
            };
            // 已消失进程的帧等待时钟回收
            if !mapped.contains_key(&ppn) && !entry.is_pinned() && live.contains(&owner.pid) {
                return Err(InvariantViolation::UnmappedFrame { ppn, owner });
            }
        }

        let mut slots = BTreeSet::new();
        for (_, slot) in mem.bindings.iter() {
            if !slots.insert(slot) {
                return Err(InvariantViolation::DuplicateSlot { slot });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Vpn;
    use crate::config::VmConfig;
    use crate::image::StaticImage;
    use crate::tlb::AccessKind;
    use std::sync::Arc;

    #[test]
    fn test_in_transit_frame_is_allowed_but_leak_is_not() {
        let config = VmConfig::default().with_page_size(32).with_phys_pages(3);
        let k = VmKernel::with_ram_swap(config).unwrap();
        let p = k
            .spawn(Arc::new(StaticImage::builder(32).section(".text", vec![1; 32], true).build()), &[])
            .unwrap();
        let ctx = p.create_context();
        k.access(&p, &ctx, 0, AccessKind::Read).unwrap();
        assert_eq!(k.check_invariants(), Ok(()));

        // 预留中的帧：已归属、被 pin、页表项无效
        let owner = PageOwner::new(p.pid(), Vpn(1));
        let ppn = k.acquire_frame(owner).unwrap();
        assert_eq!(k.check_invariants(), Ok(()));

        // unpin 之后仍未映射，就是泄漏
        k.unpin(ppn);
        assert_eq!(
            k.check_invariants(),
            Err(InvariantViolation::UnmappedFrame { ppn, owner })
        );
        k.release_frame(ppn);
        assert_eq!(k.check_invariants(), Ok(()));
    }
}
