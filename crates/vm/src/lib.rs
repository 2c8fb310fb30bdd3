//! 按需调页虚拟内存管理器
//!
//! 在软件模拟的机器上，用固定大小的物理帧池、缺页陷入和以块设备为后备的交换区，
//! 为每个进程提供比物理内存更大的虚拟地址空间。
//!
//! # 组成
//!
//! - [`PageTable`] / [`TranslationEntry`]：每进程的扁平页表
//! - [`FrameTable`] / [`FreeFramePool`]：帧到 (进程, vpn) 的反向映射与空闲帧
//! - [`ClockPolicy`]：时钟（第二次机会）置换
//! - [`SwapStore`] / [`SwapBindings`]：交换槽存储及其绑定
//! - [`ExecutionContext`]：每线程的软件 TLB 与出错地址寄存器
//! - [`VmKernel`]：把以上组件组合起来的管理器上下文，提供缺页处理、
//!   进程装入与退出、用户内存拷贝
//!
//! # 依赖注入
//!
//! 没有全局状态：页大小、帧数等都来自 [`VmConfig`]，可执行映像通过
//! [`ExecutableImage`] 提供，交换设备通过 [`BlockDevice`] 提供。

pub mod address;
pub mod page_table;
pub mod swap;

mod clock;
mod config;
mod error;
mod fault;
mod frame_table;
mod free_pool;
mod image;
mod invariants;
mod kernel;
mod loader;
mod physmem;
mod process;
mod registry;
mod stats;
mod tlb;
mod vmem;

pub use address::{PageNum, Ppn, Vpn};
pub use clock::ClockPolicy;
pub use config::VmConfig;
pub use error::{FAULT_EXIT_STATUS, LoadError, Severity, VmError, VmResult};
pub use fault::{ContentSource, FaultOutcome, FaultState};
pub use frame_table::{FrameEntry, FrameTable, PageOwner};
pub use free_pool::FreeFramePool;
pub use image::{ExecutableImage, Section, StaticImage, StaticImageBuilder};
pub use invariants::InvariantViolation;
pub use kernel::VmKernel;
pub use loader::{ARG_POINTER_SIZE, AddressLayout, arguments_size, encode_arguments};
pub use page_table::{PageTable, PteFlags, TranslationEntry};
pub use physmem::PhysicalMemory;
pub use process::{Pid, ProcessState, VmProcess};
pub use registry::{PidAllocator, ProcessRegistry};
pub use stats::{VmStats, VmStatsSnapshot};
pub use swap::{BlockDevice, FileDisk, RamDisk, SwapBindings, SwapOp, SwapSlot, SwapStore};
pub use tlb::{AccessKind, Exception, ExecutionContext, SoftTlb, SyncAction, TranslationCache};
