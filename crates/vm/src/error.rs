//! 虚拟内存管理中可能发生的错误
//!
//! 错误按影响范围分为三类（见 [`Severity`]）：
//! - 进程级：只终止出错的进程（例如访问越界的虚拟页）；
//! - 机器级：交换区损坏或耗尽，整个内存管理器停机；
//! - 配置级：只在启动时出现。

use crate::address::Vpn;
use crate::process::Pid;
use crate::swap::{SwapOp, SwapSlot};
use thiserror::Error;

/// 因进程级致命错误被终止的进程的退出状态
pub const FAULT_EXIT_STATUS: i32 = -1;

/// 错误的影响范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// 只影响出错的进程
    Process,
    /// 整个机器停机
    Machine,
    /// 启动时的配置错误
    Config,
}

/// 加载可执行映像时的错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// 段不连续或不从第 0 页开始
    #[error("fragmented executable: section {section} starts at {found}, expected {expected}")]
    Fragmented {
        /// 段序号
        section: usize,
        /// 期望的起始页
        expected: Vpn,
        /// 实际的起始页
        found: Vpn,
    },
    /// 参数放不进一页
    #[error("arguments too long: {size} bytes do not fit in a {page_size}-byte page")]
    ArgumentsTooLong {
        /// 参数总字节数
        size: usize,
        /// 页大小
        page_size: usize,
    },
    /// 映像无法提供某页的初始内容
    #[error("cannot read page {page} of section {section} from the executable")]
    ImageRead {
        /// 段序号
        section: usize,
        /// 段内页号
        page: usize,
    },
}

/// 虚拟内存操作中可能发生的错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    /// 虚拟页号超出进程页表范围
    #[error("{vpn} is outside the address space ({num_pages} pages)")]
    AddressOutOfRange {
        /// 出错的虚拟页号
        vpn: Vpn,
        /// 页表长度
        num_pages: usize,
    },
    /// 写只读页
    #[error("write to read-only page {vpn}")]
    ReadOnly {
        /// 出错的虚拟页号
        vpn: Vpn,
    },
    /// 进程已退出
    #[error("process {0} has exited")]
    ProcessExited(Pid),
    /// 可执行映像加载失败
    #[error(transparent)]
    Load(#[from] LoadError),
    /// 交换区读写失败
    #[error("swap {op} failed on {slot}")]
    SwapIo {
        /// 出错的交换槽
        slot: SwapSlot,
        /// 读或写
        op: SwapOp,
    },
    /// 交换区已满
    #[error("swap space exhausted ({capacity} slots)")]
    SwapFull {
        /// 交换区容量
        capacity: usize,
    },
    /// 机器已因致命错误停机
    #[error("machine halted after a fatal fault")]
    Halted,
    /// 配置无效
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// 没有物理帧
    #[error("no physical frames configured")]
    NoPhysicalFrames,
}

impl VmError {
    /// 错误的影响范围
    pub fn severity(&self) -> Severity {
        match self {
            VmError::AddressOutOfRange { .. }
            | VmError::ReadOnly { .. }
            | VmError::ProcessExited(_)
            | VmError::Load(_) => Severity::Process,
            VmError::SwapIo { .. } | VmError::SwapFull { .. } | VmError::Halted => {
                Severity::Machine
            }
            VmError::InvalidConfig(_) | VmError::NoPhysicalFrames => Severity::Config,
        }
    }

    /// 是否只影响单个进程
    pub fn is_process_fatal(&self) -> bool {
        self.severity() == Severity::Process
    }
}

/// 虚拟内存操作的结果类型
pub type VmResult<T> = Result<T, VmError>;
