//! 交换槽存储
//!
//! 只负责"槽号 ↔ 块设备上的一页"。哪个 (进程, vpn) 占用哪个槽
//! 由 [`SwapBindings`](super::SwapBindings) 记录。

use super::BlockDevice;
use crate::error::{VmError, VmResult};
use core::fmt;
use std::collections::BTreeSet;
use std::sync::Arc;
use sync::SpinLock;

/// 交换槽号（交换区内的页序号）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SwapSlot(pub usize);

impl fmt::Display for SwapSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

/// 交换 I/O 的方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOp {
    /// 换入
    Read,
    /// 换出
    Write,
}

impl fmt::Display for SwapOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SwapOp::Read => "read",
            SwapOp::Write => "write",
        })
    }
}

/// 槽分配状态：已释放的槽号集合 + 高水位
#[derive(Debug, Default)]
struct SlotState {
    freed: BTreeSet<SwapSlot>,
    high_water: usize,
}

impl SlotState {
    /// 优先复用最小的已释放槽号，否则提升高水位
    fn allocate(&mut self, capacity: usize) -> Option<SwapSlot> {
        if let Some(slot) = self.freed.pop_first() {
            return Some(slot);
        }
        if self.high_water < capacity {
            let slot = SwapSlot(self.high_water);
            self.high_water += 1;
            return Some(slot);
        }
        None
    }

    fn release(&mut self, slot: SwapSlot) -> bool {
        if slot.0 >= self.high_water {
            return false;
        }
        self.freed.insert(slot)
    }

    fn allocated(&self) -> usize {
        self.high_water - self.freed.len()
    }
}

/// 交换区：建立在块设备上、每槽一页的存储
pub struct SwapStore {
    device: Arc<dyn BlockDevice>,
    page_size: usize,
    capacity: usize,
    slots: SpinLock<SlotState>,
}

impl SwapStore {
    /// 在 `device` 上建立交换区，最多使用 `max_slots` 个槽。
    ///
    /// 设备块大小必须等于页大小。
    pub fn new(device: Arc<dyn BlockDevice>, page_size: usize, max_slots: usize) -> VmResult<Self> {
        if device.block_size() != page_size {
            return Err(VmError::InvalidConfig(
                "swap device block size must equal the page size",
            ));
        }
        let capacity = max_slots.min(device.total_blocks());
        if capacity == 0 {
            return Err(VmError::InvalidConfig("swap device has no blocks"));
        }
        Ok(SwapStore {
            device,
            page_size,
            capacity,
            slots: SpinLock::new(SlotState::default()),
        })
    }

    /// 分配一个槽：复用已释放的最小槽号，否则使用新的槽号
    pub fn allocate_slot(&self) -> VmResult<SwapSlot> {
        self.slots
            .lock()
            .allocate(self.capacity)
            .ok_or(VmError::SwapFull {
                capacity: self.capacity,
            })
    }

    /// 释放一个槽
    pub fn free_slot(&self, slot: SwapSlot) {
        let released = self.slots.lock().release(slot);
        debug_assert!(released, "swap: free of unallocated {slot}");
    }

    /// 把一页写入槽
    pub fn write_slot(&self, slot: SwapSlot, page: &[u8]) -> VmResult<()> {
        debug_assert_eq!(page.len(), self.page_size);
        if !self.device.write_block(slot.0, page) {
            log::error!("swap: write of {} failed", slot);
            return Err(VmError::SwapIo {
                slot,
                op: SwapOp::Write,
            });
        }
        Ok(())
    }

    /// 从槽读出一页
    pub fn read_slot(&self, slot: SwapSlot, page: &mut [u8]) -> VmResult<()> {
        debug_assert_eq!(page.len(), self.page_size);
        if !self.device.read_block(slot.0, page) {
            log::error!("swap: read of {} failed", slot);
            return Err(VmError::SwapIo {
                slot,
                op: SwapOp::Read,
            });
        }
        Ok(())
    }

    /// 当前已分配（未释放）的槽数
    pub fn allocated_slots(&self) -> usize {
        self.slots.lock().allocated()
    }

    /// 交换区容量（槽数）
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 页大小
    pub fn page_size(&self) -> usize {
        self.page_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swap::RamDisk;

    fn store(slots: usize) -> SwapStore {
        SwapStore::new(Arc::new(RamDisk::new(slots, 64)), 64, slots).unwrap()
    }

    #[test]
    fn test_allocate_grows_then_reuses_lowest() {
        let swap = store(8);
        let a = swap.allocate_slot().unwrap();
        let b = swap.allocate_slot().unwrap();
        let c = swap.allocate_slot().unwrap();
        assert_eq!((a, b, c), (SwapSlot(0), SwapSlot(1), SwapSlot(2)));
        assert_eq!(swap.allocated_slots(), 3);

        swap.free_slot(c);
        swap.free_slot(a);
        assert_eq!(swap.allocated_slots(), 1);
        assert_eq!(swap.allocate_slot().unwrap(), SwapSlot(0));
        assert_eq!(swap.allocate_slot().unwrap(), SwapSlot(2));
        assert_eq!(swap.allocate_slot().unwrap(), SwapSlot(3));
    }

    #[test]
    fn test_full_swap_is_machine_error() {
        let swap = store(2);
        swap.allocate_slot().unwrap();
        swap.allocate_slot().unwrap();
        let err = swap.allocate_slot().unwrap_err();
        assert_eq!(err, VmError::SwapFull { capacity: 2 });
        assert!(!err.is_process_fatal());
    }

    #[test]
    fn test_slot_round_trip() {
        let swap = store(4);
        let slot = swap.allocate_slot().unwrap();
        let page: Vec<u8> = (0..64).map(|i| (i * 7) as u8).collect();
        swap.write_slot(slot, &page).unwrap();
        let mut back = vec![0u8; 64];
        swap.read_slot(slot, &mut back).unwrap();
        assert_eq!(back, page);
    }

    #[test]
    fn test_block_size_mismatch_rejected() {
        let res = SwapStore::new(Arc::new(RamDisk::new(4, 128)), 64, 4);
        assert!(matches!(res, Err(VmError::InvalidConfig(_))));
    }

    #[test]
    fn test_capacity_bounded_by_device() {
        let swap = SwapStore::new(Arc::new(RamDisk::new(3, 64)), 64, 100).unwrap();
        assert_eq!(swap.capacity(), 3);
    }
}
