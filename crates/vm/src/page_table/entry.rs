//! 页表项（翻译表项）

use crate::address::{Ppn, Vpn};
use bitflags::bitflags;

bitflags! {
    /// 页表项状态位
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PteFlags: u8 {
        /// 有物理帧支撑
        const VALID = 1 << 0;
        /// 只读（来自可执行映像的只读段）
        const READ_ONLY = 1 << 1;
        /// 最近被访问（引用位）
        const USED = 1 << 2;
        /// 内容与最后一次已知的后备内容不同
        const DIRTY = 1 << 3;
        /// 硬件可见的访问位
        const ACCESS_BITS = Self::USED.bits() | Self::DIRTY.bits();
    }
}

/// 一个虚拟页到物理帧的映射及其状态位。
///
/// 这是一个值类型：页表、TLB 与调用方之间传递的都是它的副本。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TranslationEntry {
    /// 虚拟页号
    pub vpn: Vpn,
    /// 物理页号（仅在 valid 时有意义）
    pub ppn: Ppn,
    /// 状态位
    pub flags: PteFlags,
}

impl TranslationEntry {
    /// 创建一个无效表项
    pub const fn invalid(vpn: Vpn) -> Self {
        TranslationEntry {
            vpn,
            ppn: Ppn(0),
            flags: PteFlags::empty(),
        }
    }

    /// 创建一个表项
    pub const fn new(vpn: Vpn, ppn: Ppn, flags: PteFlags) -> Self {
        TranslationEntry { vpn, ppn, flags }
    }

    /// 是否有物理帧支撑
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.flags.contains(PteFlags::VALID)
    }

    /// 是否只读
    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.flags.contains(PteFlags::READ_ONLY)
    }

    /// 引用位
    #[inline]
    pub fn is_used(&self) -> bool {
        self.flags.contains(PteFlags::USED)
    }

    /// 脏位
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.flags.contains(PteFlags::DIRTY)
    }

    /// 淘汰时是否必须写回交换区
    #[inline]
    pub fn needs_writeback(&self) -> bool {
        self.is_valid() && self.is_dirty() && !self.is_read_only()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_entry() {
        let e = TranslationEntry::invalid(Vpn(4));
        assert!(!e.is_valid());
        assert!(!e.is_used());
        assert!(!e.needs_writeback());
        assert_eq!(e.vpn, Vpn(4));
    }

    #[test]
    fn test_writeback_rules() {
        let dirty = TranslationEntry::new(
            Vpn(1),
            Ppn(2),
            PteFlags::VALID | PteFlags::USED | PteFlags::DIRTY,
        );
        assert!(dirty.needs_writeback());

        let ro = TranslationEntry::new(
            Vpn(1),
            Ppn(2),
            PteFlags::VALID | PteFlags::DIRTY | PteFlags::READ_ONLY,
        );
        assert!(!ro.needs_writeback());

        let clean = TranslationEntry::new(Vpn(1), Ppn(2), PteFlags::VALID);
        assert!(!clean.needs_writeback());
    }
}
