//! 时钟（第二次机会）页面置换算法
//!
//! ## 扫描规则
//!
//! 指针 `cursor` 在多次调用之间保持，按帧号循环扫描帧表：
//!
//! 1. 被 pin 的帧（或没有所有者的帧）跳过；
//! 2. 最近被访问的帧：清除其 used 位，给它第二次机会，继续前进；
//! 3. 否则选中为牺牲帧，指针前进到它之后再返回。
//!
//! 若连续一整圈都没有可淘汰的帧（全部被 pin），返回 None，
//! 由调用方睡眠等待某帧被 unpin 后重新扫描。
//!
//! 扫描顺序完全由帧号和指针决定，相同的访问序列总得到相同的牺牲帧。

use crate::address::{PageNum, Ppn};
use crate::frame_table::{FrameTable, PageOwner};

/// 时钟置换算法状态
#[derive(Debug, Default)]
pub struct ClockPolicy {
    cursor: usize,
}

impl ClockPolicy {
    /// 创建一个指针位于帧 0 的时钟
    pub const fn new() -> Self {
        ClockPolicy { cursor: 0 }
    }

    /// 当前指针位置
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// 选择一个牺牲帧。
    ///
    /// `second_chance(ppn, owner)` 由调用方实现：若该页最近被访问过，
    /// 清除其引用位并返回 true；否则返回 false。
    pub fn select_victim<F>(&mut self, frames: &FrameTable, mut second_chance: F) -> Option<Ppn>
    where
        F: FnMut(Ppn, PageOwner) -> bool,
    {
        let n = frames.len();
        if n == 0 {
            return None;
        }
        self.cursor %= n;

        // 连续遇到的不可淘汰帧数，满一圈即放弃
        let mut ineligible_run = 0;
        loop {
            let ppn = Ppn::from_usize(self.cursor);
            self.cursor = (self.cursor + 1) % n;

            let entry = frames.entry(ppn);
            let owner = match entry.owner() {
                Some(owner) if !entry.is_pinned() => owner,
                _ => {
                    ineligible_run += 1;
                    if ineligible_run >= n {
                        return None;
                    }
                    continue;
                }
            };
            ineligible_run = 0;

            if second_chance(ppn, owner) {
                continue;
            }
            return Some(ppn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Vpn;
    use std::collections::HashSet;

    fn full_table(n: usize) -> FrameTable {
        let mut table = FrameTable::new(n);
        for i in 0..n {
            table.assign(Ppn(i), PageOwner::new(1, Vpn(i)));
        }
        table
    }

    #[test]
    fn test_all_used_picks_cursor_after_one_sweep() {
        let table = full_table(3);
        let mut used: HashSet<usize> = (0..3).collect();
        let mut clock = ClockPolicy::new();

        let victim = clock.select_victim(&table, |ppn, _| used.remove(&ppn.as_usize()));
        assert_eq!(victim, Some(Ppn(0)));
        assert_eq!(clock.cursor(), 1);
        assert!(used.is_empty());
    }

    #[test]
    fn test_skips_recently_used() {
        let table = full_table(4);
        let mut used: HashSet<usize> = [0, 1].into_iter().collect();
        let mut clock = ClockPolicy::new();

        let victim = clock.select_victim(&table, |ppn, _| used.remove(&ppn.as_usize()));
        assert_eq!(victim, Some(Ppn(2)));
        assert_eq!(clock.cursor(), 3);
    }

    #[test]
    fn test_skips_pinned_frames() {
        let mut table = full_table(3);
        table.pin(Ppn(0));
        table.pin(Ppn(1));
        let mut clock = ClockPolicy::new();
        assert_eq!(clock.select_victim(&table, |_, _| false), Some(Ppn(2)));
        // 下一次从帧 0 开始，仍然跳过被 pin 的帧
        assert_eq!(clock.select_victim(&table, |_, _| false), Some(Ppn(2)));
    }

    #[test]
    fn test_all_pinned_returns_none() {
        let mut table = full_table(3);
        for i in 0..3 {
            table.pin(Ppn(i));
        }
        let mut clock = ClockPolicy::new();
        let mut consulted = 0;
        assert_eq!(
            clock.select_victim(&table, |_, _| {
                consulted += 1;
                false
            }),
            None
        );
        assert_eq!(consulted, 0);
    }

    #[test]
    fn test_no_frame_evicted_twice_per_sweep() {
        // 均匀访问后重复：一圈之内每一帧都恰好被选中一次
        let table = full_table(5);
        let mut clock = ClockPolicy::new();
        let mut seen = HashSet::new();
        for _ in 0..5 {
            let victim = clock.select_victim(&table, |_, _| false).unwrap();
            assert!(seen.insert(victim), "{victim} evicted twice in one sweep");
        }
        assert_eq!(seen.len(), 5);
    }
}
