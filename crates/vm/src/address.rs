//! 页号抽象模块
//!
//! 此模块定义了表示页码 (Page Number) 的 Trait 和具体的页码类型 ([`Ppn`], [`Vpn`])。
//!
//! 与内核中的地址类型不同，这里的页大小不是全局常量：它来自注入的
//! [`VmConfig`](crate::VmConfig)，因此所有与地址换算相关的函数都显式接收 `page_size`。

use core::fmt;
use core::ops::{Add, Sub};

/// [PageNum] Trait
/// ---------------------
/// 表示一个页码的 Trait。所有页码类型 (如 Ppn 和 Vpn) 必须实现此 Trait。
pub trait PageNum: Copy + Clone + PartialEq + Eq + PartialOrd + Ord + fmt::Debug {
    /// 从 usize 构造页码
    fn from_usize(value: usize) -> Self;

    /// 转换为 usize
    fn as_usize(self) -> usize;

    /// 该页的起始字节地址
    fn start_addr(self, page_size: usize) -> usize {
        self.as_usize() * page_size
    }

    /// 计算两个页码之间的页数差。
    fn diff(self, other: Self) -> isize {
        self.as_usize() as isize - other.as_usize() as isize
    }
}

/// `impl_page_num!` 宏
/// ---------------------
/// 快速为给定类型实现 `PageNum`、`Display` 以及与 usize 的加减运算。
macro_rules! impl_page_num {
    ($ty:ident, $prefix:literal) => {
        impl PageNum for $ty {
            #[inline]
            fn from_usize(value: usize) -> Self {
                $ty(value)
            }

            #[inline]
            fn as_usize(self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl Add<usize> for $ty {
            type Output = Self;

            fn add(self, rhs: usize) -> Self {
                $ty(self.0 + rhs)
            }
        }

        impl Sub<usize> for $ty {
            type Output = Self;

            fn sub(self, rhs: usize) -> Self {
                $ty(self.0 - rhs)
            }
        }
    };
}

/// 物理页号（帧号）
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct Ppn(pub usize);

/// 虚拟页号
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct Vpn(pub usize);

impl_page_num!(Ppn, "ppn#");
impl_page_num!(Vpn, "vpn#");

impl Vpn {
    /// 包含虚拟地址 `vaddr` 的虚拟页号
    #[inline]
    pub fn containing(vaddr: usize, page_size: usize) -> Self {
        Vpn(vaddr / page_size)
    }
}

/// 地址在页内的偏移
#[inline]
pub fn page_offset(addr: usize, page_size: usize) -> usize {
    addr % page_size
}

/// 由页号和页内偏移拼出地址
#[inline]
pub fn make_address<P: PageNum>(page: P, offset: usize, page_size: usize) -> usize {
    page.start_addr(page_size) + offset
}
