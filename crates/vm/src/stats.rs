//! 分页统计计数器

use core::sync::atomic::{AtomicU64, Ordering};

/// 分页事件计数器
#[derive(Debug, Default)]
pub struct VmStats {
    page_faults: AtomicU64,
    tlb_only_misses: AtomicU64,
    evictions: AtomicU64,
    swap_outs: AtomicU64,
    swap_ins: AtomicU64,
    zero_fills: AtomicU64,
    image_loads: AtomicU64,
    blocked_sweeps: AtomicU64,
}

/// [`VmStats`] 在某一时刻的快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VmStatsSnapshot {
    /// 需要分配帧的缺页次数
    pub page_faults: u64,
    /// 页表项有效、只需重填 TLB 的缺失次数
    pub tlb_only_misses: u64,
    /// 淘汰次数
    pub evictions: u64,
    /// 写入交换区的页数
    pub swap_outs: u64,
    /// 从交换区读回的页数
    pub swap_ins: u64,
    /// 清零填充的页数
    pub zero_fills: u64,
    /// 从可执行映像装入的页数
    pub image_loads: u64,
    /// 因全部帧被 pin 而睡眠的次数
    pub blocked_sweeps: u64,
}

macro_rules! counters {
    ($($name:ident => $field:ident),* $(,)?) => {
        impl VmStats {
            $(
                pub(crate) fn $name(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                }
            )*

            /// 读取所有计数器
            pub fn snapshot(&self) -> VmStatsSnapshot {
                VmStatsSnapshot {
                    $($field: self.$field.load(Ordering::Relaxed),)*
                }
            }
        }
    };
}

counters! {
    record_page_fault => page_faults,
    record_tlb_only_miss => tlb_only_misses,
    record_eviction => evictions,
    record_swap_out => swap_outs,
    record_swap_in => swap_ins,
    record_zero_fill => zero_fills,
    record_image_load => image_loads,
    record_blocked_sweep => blocked_sweeps,
}
