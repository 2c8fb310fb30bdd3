//! 软件 TLB 与执行上下文
//!
//! 每个执行上下文（线程）拥有一个固定大小的 TLB 和一个"出错虚拟地址"寄存器。
//! TLB 中的 used/dirty 位由 [`ExecutionContext::translate`] 在命中时设置，
//! 是硬件可见的副本；它们在下列时机合并回页表（仅当页表项仍映射同一帧）：
//!
//! - 上下文切换（[`ExecutionContext::save_state`]）；
//! - refill 覆盖一个有效表项之前；
//! - 时钟算法检查该帧时（[`SyncAction::ClearUsed`]）；
//! - 淘汰时的 TLB shootdown（[`SyncAction::Invalidate`]）；
//! - 进程退出。
//!
//! TLB 替换：优先使用无效表项，否则均匀随机选择一个。

use crate::address::{Ppn, Vpn, page_offset};
use crate::page_table::{PageTable, PteFlags, TranslationEntry};
use core::sync::atomic::{AtomicUsize, Ordering};
use rand::Rng;
use sync::SpinLock;
use thiserror::Error;

/// 模拟硬件提供的 TLB 原语
pub trait TranslationCache: Send + Sync {
    /// 条目数
    fn size(&self) -> usize;

    /// 读取第 `index` 项
    fn read_entry(&self, index: usize) -> TranslationEntry;

    /// 写入第 `index` 项
    fn write_entry(&self, index: usize, entry: TranslationEntry);

    /// 在一个临界区内访问全部条目。
    ///
    /// 命中时设置状态位、同步与替换都是"读-改-写"，必须与其它线程的
    /// shootdown 互斥。
    fn with_entries(&self, f: &mut dyn FnMut(&mut [TranslationEntry]));
}

/// 软件实现的 TLB
pub struct SoftTlb {
    entries: SpinLock<Vec<TranslationEntry>>,
}

impl SoftTlb {
    /// 创建含 `size` 个无效条目的 TLB
    pub fn new(size: usize) -> Self {
        SoftTlb {
            entries: SpinLock::new(vec![TranslationEntry::invalid(Vpn(0)); size]),
        }
    }
}

impl TranslationCache for SoftTlb {
    fn size(&self) -> usize {
        self.entries.lock().len()
    }

    fn read_entry(&self, index: usize) -> TranslationEntry {
        self.entries.lock()[index]
    }

    fn write_entry(&self, index: usize, entry: TranslationEntry) {
        self.entries.lock()[index] = entry;
    }

    fn with_entries(&self, f: &mut dyn FnMut(&mut [TranslationEntry])) {
        let mut entries = self.entries.lock();
        f(&mut entries[..]);
    }
}

/// 访存类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    /// 读
    Read,
    /// 写
    Write,
}

/// 地址翻译时由"硬件"抛出的异常
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Exception {
    /// TLB 中没有该页的有效条目
    #[error("TLB miss at {vaddr:#x}")]
    TlbMiss {
        /// 出错的虚拟地址
        vaddr: usize,
    },
    /// 写只读页
    #[error("write to read-only {vpn} at {vaddr:#x}")]
    ReadOnly {
        /// 出错的虚拟地址
        vaddr: usize,
        /// 出错的虚拟页号
        vpn: Vpn,
    },
}

/// TLB 同步后对匹配条目的处理
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// 清除 used 位（时钟算法给第二次机会）
    ClearUsed,
    /// 使条目失效（淘汰 shootdown）
    Invalidate,
}

static NEXT_CONTEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// 一个执行上下文（模拟 CPU 线程）的 MMU 状态
pub struct ExecutionContext {
    id: usize,
    tlb: Box<dyn TranslationCache>,
    bad_vaddr: AtomicUsize,
    page_size: usize,
}

/// 把一个 TLB 条目的访问位合并回页表
fn write_back(entry: &TranslationEntry, page_table: &PageTable) {
    if entry.is_valid() {
        page_table.merge_access_bits(entry.vpn, entry.ppn, entry.flags & PteFlags::ACCESS_BITS);
    }
}

impl ExecutionContext {
    /// 使用软件 TLB 创建执行上下文
    pub fn new(tlb_size: usize, page_size: usize) -> Self {
        Self::with_cache(Box::new(SoftTlb::new(tlb_size)), page_size)
    }

    /// 使用给定的 TLB 实现创建执行上下文
    pub fn with_cache(tlb: Box<dyn TranslationCache>, page_size: usize) -> Self {
        ExecutionContext {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            tlb,
            bad_vaddr: AtomicUsize::new(0),
            page_size,
        }
    }

    /// 上下文编号
    pub fn id(&self) -> usize {
        self.id
    }

    /// 出错虚拟地址寄存器
    pub fn bad_vaddr(&self) -> usize {
        self.bad_vaddr.load(Ordering::Acquire)
    }

    /// 设置出错虚拟地址寄存器
    pub fn set_bad_vaddr(&self, vaddr: usize) {
        self.bad_vaddr.store(vaddr, Ordering::Release);
    }

    /// TLB 条目数
    pub fn tlb_size(&self) -> usize {
        self.tlb.size()
    }

    /// 读取第 `index` 个 TLB 条目
    pub fn tlb_entry(&self, index: usize) -> TranslationEntry {
        self.tlb.read_entry(index)
    }

    /// 当前所有有效的 TLB 条目
    pub fn valid_entries(&self) -> Vec<TranslationEntry> {
        let mut out = Vec::new();
        self.tlb.with_entries(&mut |entries| {
            out.extend(entries.iter().filter(|e| e.is_valid()).copied());
        });
        out
    }

    /// 通过 TLB 翻译虚拟地址。
    ///
    /// 命中时设置条目的 used 位，写访问还设置 dirty 位；返回 (帧号, 页内偏移)。
    /// 未命中或写只读页时锁存出错地址并抛出异常。
    pub fn translate(&self, vaddr: usize, access: AccessKind) -> Result<(Ppn, usize), Exception> {
        let vpn = Vpn::containing(vaddr, self.page_size);
        let mut result = Err(Exception::TlbMiss { vaddr });
        self.tlb.with_entries(&mut |entries| {
            let Some(entry) = entries.iter_mut().find(|e| e.is_valid() && e.vpn == vpn) else {
                return;
            };
            if access == AccessKind::Write && entry.is_read_only() {
                result = Err(Exception::ReadOnly { vaddr, vpn });
                return;
            }
            entry.flags |= PteFlags::USED;
            if access == AccessKind::Write {
                entry.flags |= PteFlags::DIRTY;
            }
            result = Ok((entry.ppn, page_offset(vaddr, self.page_size)));
        });
        if result.is_err() {
            self.set_bad_vaddr(vaddr);
        }
        result
    }

    /// 把页表项装入 TLB。
    ///
    /// 若已有同一 vpn 的条目则覆盖它；否则优先使用无效条目，再否则随机替换。
    /// 被覆盖的有效条目先把访问位合并回页表。
    pub fn refill(&self, entry: TranslationEntry, page_table: &PageTable) {
        self.tlb.with_entries(&mut |entries| {
            let index = match entries.iter().position(|e| e.is_valid() && e.vpn == entry.vpn) {
                Some(index) => index,
                None => choose_victim_slot(entries),
            };
            write_back(&entries[index], page_table);
            entries[index] = entry;
        });
    }

    /// 同步并处理所有映射 `vpn` 的条目，返回是否有条目匹配
    pub fn sync_vpn(&self, vpn: Vpn, page_table: &PageTable, action: SyncAction) -> bool {
        let mut matched = false;
        self.tlb.with_entries(&mut |entries| {
            for e in entries.iter_mut().filter(|e| e.is_valid() && e.vpn == vpn) {
                write_back(e, page_table);
                match action {
                    SyncAction::ClearUsed => e.flags.remove(PteFlags::USED),
                    SyncAction::Invalidate => *e = TranslationEntry::invalid(vpn),
                }
                matched = true;
            }
        });
        matched
    }

    /// 丢弃 `vpn` 的 TLB 条目（访问位先合并回页表）
    pub fn discard(&self, vpn: Vpn, page_table: &PageTable) {
        self.sync_vpn(vpn, page_table, SyncAction::Invalidate);
    }

    /// 上下文切换出去时调用：合并所有访问位并使全部条目失效
    pub fn save_state(&self, page_table: &PageTable) {
        self.tlb.with_entries(&mut |entries| {
            for e in entries.iter_mut() {
                write_back(e, page_table);
                *e = TranslationEntry::invalid(e.vpn);
            }
        });
    }

    /// 使全部条目失效，不做同步（进程退出后页表已作废）
    pub fn invalidate_all(&self) {
        self.tlb.with_entries(&mut |entries| {
            for e in entries.iter_mut() {
                *e = TranslationEntry::invalid(e.vpn);
            }
        });
    }
}

/// 选择 refill 要覆盖的 TLB 槽：优先无效条目，否则均匀随机
fn choose_victim_slot(entries: &[TranslationEntry]) -> usize {
    entries
        .iter()
        .position(|e| !e.is_valid())
        .unwrap_or_else(|| rand::thread_rng().gen_range(0..entries.len()))
}
