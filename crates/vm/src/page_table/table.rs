//! 扁平页表实现
//!
//! ## 表项编码
//!
//! 每个表项打包进一个 `AtomicU64`：
//!
//! | 位 | 含义 |
//! |---|---|
//! | 0..8 | [`PteFlags`] |
//! | 32..64 | 物理页号 |
//!
//! 这样"读取 (ppn, flags)"与"按条件修改状态位"都是单个原子操作，
//! 淘汰线程无需获取进程锁就能清除 used 位或使表项失效。
//!
//! ## 修改者
//!
//! - 缺页处理（持有进程锁）：安装表项；
//! - 时钟算法 / 淘汰（持有内存锁）：清除 used 位、使表项失效；
//! - TLB 同步：把 TLB 中的 used/dirty 位合并回来（仅当表项仍映射同一帧）。

use super::{PteFlags, TranslationEntry};
use crate::address::{PageNum, Ppn, Vpn};
use core::sync::atomic::{AtomicU64, Ordering};

const FLAGS_MASK: u64 = 0xff;
const PPN_SHIFT: u32 = 32;

#[inline]
fn pack(ppn: Ppn, flags: PteFlags) -> u64 {
    ((ppn.as_usize() as u64) << PPN_SHIFT) | flags.bits() as u64
}

#[inline]
fn unpack(vpn: Vpn, raw: u64) -> TranslationEntry {
    TranslationEntry {
        vpn,
        ppn: Ppn((raw >> PPN_SHIFT) as usize),
        flags: PteFlags::from_bits_truncate((raw & FLAGS_MASK) as u8),
    }
}

/// 一个进程的扁平页表
#[derive(Debug)]
pub struct PageTable {
    entries: Box<[AtomicU64]>,
}

impl PageTable {
    /// 创建一个含 `num_pages` 个无效表项的页表
    pub fn new(num_pages: usize) -> Self {
        PageTable {
            entries: (0..num_pages).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// 页表长度（页数）
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 页表是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 读取表项。越界时返回 None。
    pub fn lookup(&self, vpn: Vpn) -> Option<TranslationEntry> {
        self.entries
            .get(vpn.as_usize())
            .map(|slot| unpack(vpn, slot.load(Ordering::Acquire)))
    }

    /// 以原子方式修改表项。
    ///
    /// `f` 返回 None 表示不修改。返回修改前的表项；越界或未修改时返回 None。
    fn update<F>(&self, vpn: Vpn, mut f: F) -> Option<TranslationEntry>
    where
        F: FnMut(TranslationEntry) -> Option<TranslationEntry>,
    {
        let slot = self.entries.get(vpn.as_usize())?;
        slot.fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
            f(unpack(vpn, raw)).map(|e| pack(e.ppn, e.flags))
        })
        .ok()
        .map(|raw| unpack(vpn, raw))
    }

    /// 安装一个有效映射：valid + used，脏位由 `dirty` 决定。
    ///
    /// 调用方必须已在帧表中为 (进程, vpn) 预留了 `ppn`。
    pub fn install(&self, vpn: Vpn, ppn: Ppn, read_only: bool, dirty: bool) -> TranslationEntry {
        let mut flags = PteFlags::VALID | PteFlags::USED;
        flags.set(PteFlags::READ_ONLY, read_only);
        flags.set(PteFlags::DIRTY, dirty);
        let entry = TranslationEntry::new(vpn, ppn, flags);
        self.entries[vpn.as_usize()].store(pack(ppn, flags), Ordering::Release);
        entry
    }

    /// 使表项失效，返回失效前的表项（越界时为 None）。
    pub fn invalidate(&self, vpn: Vpn) -> Option<TranslationEntry> {
        let slot = self.entries.get(vpn.as_usize())?;
        Some(unpack(vpn, slot.swap(0, Ordering::AcqRel)))
    }

    /// 使所有表项失效，返回此前有效的表项
    pub fn invalidate_all(&self) -> Vec<TranslationEntry> {
        (0..self.len())
            .filter_map(|i| self.invalidate(Vpn(i)))
            .filter(|e| e.is_valid())
            .collect()
    }

    /// 设置 used 位（仅对有效表项）
    pub fn mark_used(&self, vpn: Vpn) -> bool {
        self.set_bits(vpn, PteFlags::USED)
    }

    /// 设置 dirty 位（仅对有效表项）
    pub fn mark_dirty(&self, vpn: Vpn) -> bool {
        self.set_bits(vpn, PteFlags::DIRTY)
    }

    fn set_bits(&self, vpn: Vpn, bits: PteFlags) -> bool {
        self.update(vpn, |mut e| {
            if !e.is_valid() || e.flags.contains(bits) {
                return None;
            }
            e.flags |= bits;
            Some(e)
        })
        .is_some()
    }

    /// 清除 used 位，返回清除前 used 是否置位
    pub fn clear_used(&self, vpn: Vpn) -> bool {
        self.update(vpn, |mut e| {
            if !e.is_used() {
                return None;
            }
            e.flags.remove(PteFlags::USED);
            Some(e)
        })
        .is_some()
    }

    /// 把 TLB 表项中的 used/dirty 位合并回页表。
    ///
    /// 只有当页表项仍有效且映射到同一帧 `ppn` 时才合并；
    /// 返回是否确实合并（过期的 TLB 表项不会污染新映射）。
    pub fn merge_access_bits(&self, vpn: Vpn, ppn: Ppn, bits: PteFlags) -> bool {
        let bits = bits & PteFlags::ACCESS_BITS;
        let mut matched = false;
        self.update(vpn, |mut e| {
            if !e.is_valid() || e.ppn != ppn {
                return None;
            }
            matched = true;
            if e.flags.contains(bits) {
                return None;
            }
            e.flags |= bits;
            Some(e)
        });
        matched
    }

    /// 所有有效表项的快照
    pub fn valid_entries(&self) -> impl Iterator<Item = TranslationEntry> + '_ {
        (0..self.len())
            .filter_map(|i| self.lookup(Vpn(i)))
            .filter(|e| e.is_valid())
    }

    /// 有效（驻留）页数
    pub fn resident_pages(&self) -> usize {
        self.valid_entries().count()
    }
}
