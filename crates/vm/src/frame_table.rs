//! 帧表模块
//!
//! 帧表是物理帧号到 (拥有进程, 虚拟页号) 的反向映射，外加 pin 计数。
//! 它是"此刻谁拥有这一帧"的唯一事实来源。
//!
//! ## 所有者的表示
//!
//! 帧表不持有进程的引用：[`PageOwner`] 只记录不透明的进程 ID 和虚拟页号，
//! 需要访问进程时通过进程注册表查找（弱引用）。进程退出后帧表中不会留下悬垂指针。
//!
//! ## 与空闲帧池的关系
//!
//! 任意时刻，每一帧要么在 [`FreeFramePool`](crate::free_pool::FreeFramePool) 中
//! （无所有者），要么恰好被一个 (进程, vpn) 拥有。两者由内存锁一起保护。

use crate::address::{PageNum, Ppn, Vpn};
use crate::process::Pid;

/// 一帧的所有者：(进程 ID, 虚拟页号)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageOwner {
    /// 进程 ID
    pub pid: Pid,
    /// 虚拟页号
    pub vpn: Vpn,
}

impl PageOwner {
    /// 创建所有者记录
    pub const fn new(pid: Pid, vpn: Vpn) -> Self {
        PageOwner { pid, vpn }
    }
}

/// 帧表中的一项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameEntry {
    /// 当前所有者（None 表示空闲）
    owner: Option<PageOwner>,
    /// pin 计数，大于 0 时不可被淘汰
    pins: u32,
}

impl FrameEntry {
    /// 当前所有者
    pub fn owner(&self) -> Option<PageOwner> {
        self.owner
    }

    /// 是否被 pin
    pub fn is_pinned(&self) -> bool {
        self.pins > 0
    }
}

/// 帧表：每个物理帧恰好一项，按帧号索引
#[derive(Debug)]
pub struct FrameTable {
    entries: Vec<FrameEntry>,
    /// 已拥有的帧数（用于快速统计）
    owned_count: usize,
}

impl FrameTable {
    /// 创建含 `num_frames` 个空闲帧的帧表
    pub fn new(num_frames: usize) -> Self {
        FrameTable {
            entries: vec![FrameEntry::default(); num_frames],
            owned_count: 0,
        }
    }

    /// 总帧数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 帧表是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 读取一项
    pub fn entry(&self, ppn: Ppn) -> FrameEntry {
        self.entries[ppn.as_usize()]
    }

    /// 帧的所有者
    pub fn owner(&self, ppn: Ppn) -> Option<PageOwner> {
        self.entries[ppn.as_usize()].owner
    }

    /// 帧是否被 pin
    pub fn is_pinned(&self, ppn: Ppn) -> bool {
        self.entries[ppn.as_usize()].is_pinned()
    }

    /// 把空闲帧分配给 `owner`
    pub fn assign(&mut self, ppn: Ppn, owner: PageOwner) {
        let entry = &mut self.entries[ppn.as_usize()];
        debug_assert!(
            entry.owner.is_none(),
            "assign: {ppn} already owned by {:?}",
            entry.owner
        );
        entry.owner = Some(owner);
        self.owned_count += 1;
    }

    /// 清除帧的所有者和 pin 计数，返回原所有者。
    ///
    /// 至多允许调用方自己的一次 pin 仍未释放。
    pub fn clear(&mut self, ppn: Ppn) -> Option<PageOwner> {
        let entry = &mut self.entries[ppn.as_usize()];
        debug_assert!(
            entry.pins <= 1,
            "clear: {ppn} still pinned by another holder ({} pins)",
            entry.pins
        );
        let owner = entry.owner.take();
        entry.pins = 0;
        if owner.is_some() {
            self.owned_count -= 1;
        }
        owner
    }

    /// pin 一帧
    pub fn pin(&mut self, ppn: Ppn) {
        self.entries[ppn.as_usize()].pins += 1;
    }

    /// unpin 一帧，返回该帧是否因此变为可淘汰
    pub fn unpin(&mut self, ppn: Ppn) -> bool {
        let entry = &mut self.entries[ppn.as_usize()];
        debug_assert!(entry.pins > 0, "unpin: {ppn} is not pinned");
        entry.pins = entry.pins.saturating_sub(1);
        entry.pins == 0
    }

    /// 已拥有的帧数
    pub fn owned_count(&self) -> usize {
        self.owned_count
    }

    /// 被 pin 的帧数
    pub fn pinned_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_pinned()).count()
    }

    /// 某进程拥有的所有帧
    pub fn frames_owned_by(&self, pid: Pid) -> Vec<(Ppn, PageOwner)> {
        self.iter()
            .filter_map(|(ppn, e)| e.owner.map(|o| (ppn, o)))
            .filter(|(_, o)| o.pid == pid)
            .collect()
    }

    /// 按帧号顺序遍历所有项
    pub fn iter(&self) -> impl Iterator<Item = (Ppn, FrameEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (Ppn::from_usize(i), *e))
    }
}
