//! (进程, vpn) → 交换槽 绑定表
//!
//! 每个 (进程, vpn) 至多绑定一个槽。绑定表由内存锁保护。

use super::SwapSlot;
use crate::frame_table::PageOwner;
use crate::process::Pid;
use std::collections::BTreeMap;

/// 交换槽绑定表
#[derive(Debug, Default)]
pub struct SwapBindings {
    map: BTreeMap<PageOwner, SwapSlot>,
}

impl SwapBindings {
    /// 创建空绑定表
    pub fn new() -> Self {
        Self::default()
    }

    /// 绑定 (进程, vpn) 到槽
    pub fn bind(&mut self, owner: PageOwner, slot: SwapSlot) {
        let prev = self.map.insert(owner, slot);
        debug_assert!(
            prev.is_none() || prev == Some(slot),
            "swap binding: {owner:?} rebound from {prev:?} to {slot}"
        );
    }

    /// 查询绑定
    pub fn get(&self, owner: PageOwner) -> Option<SwapSlot> {
        self.map.get(&owner).copied()
    }

    /// 解除并返回绑定
    pub fn take(&mut self, owner: PageOwner) -> Option<SwapSlot> {
        self.map.remove(&owner)
    }

    /// 解除某进程的所有绑定
    pub fn take_all_for(&mut self, pid: Pid) -> Vec<(PageOwner, SwapSlot)> {
        let owners: Vec<PageOwner> = self
            .map
            .range(PageOwner::new(pid, crate::address::Vpn(0))..)
            .take_while(|(o, _)| o.pid == pid)
            .map(|(o, _)| *o)
            .collect();
        owners
            .into_iter()
            .filter_map(|o| self.map.remove(&o).map(|s| (o, s)))
            .collect()
    }

    /// 某进程持有的槽数
    pub fn count_for(&self, pid: Pid) -> usize {
        self.map.keys().filter(|o| o.pid == pid).count()
    }

    /// 绑定总数
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// 是否没有绑定
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// 遍历所有绑定
    pub fn iter(&self) -> impl Iterator<Item = (PageOwner, SwapSlot)> + '_ {
        self.map.iter().map(|(o, s)| (*o, *s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Vpn;

    #[test]
    fn test_take_all_for_only_that_process() {
        let mut bindings = SwapBindings::new();
        bindings.bind(PageOwner::new(1, Vpn(3)), SwapSlot(0));
        bindings.bind(PageOwner::new(2, Vpn(0)), SwapSlot(1));
        bindings.bind(PageOwner::new(2, Vpn(7)), SwapSlot(2));
        bindings.bind(PageOwner::new(3, Vpn(1)), SwapSlot(3));

        let taken = bindings.take_all_for(2);
        assert_eq!(
            taken,
            vec![
                (PageOwner::new(2, Vpn(0)), SwapSlot(1)),
                (PageOwner::new(2, Vpn(7)), SwapSlot(2)),
            ]
        );
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings.count_for(2), 0);
        assert_eq!(bindings.get(PageOwner::new(1, Vpn(3))), Some(SwapSlot(0)));
    }

    #[test]
    fn test_take_removes_binding() {
        let mut bindings = SwapBindings::new();
        let owner = PageOwner::new(5, Vpn(2));
        bindings.bind(owner, SwapSlot(4));
        assert_eq!(bindings.take(owner), Some(SwapSlot(4)));
        assert_eq!(bindings.take(owner), None);
        assert!(bindings.is_empty());
    }
}
