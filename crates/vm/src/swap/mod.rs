//! 交换区模块
//!
//! - [`BlockDevice`]：后备块设备接口（[`RamDisk`]、[`FileDisk`]）
//! - [`SwapStore`]：按槽号读写整页的"笨"块存储，带空闲槽池
//! - [`SwapBindings`]：(进程, vpn) → 交换槽 的绑定表，由淘汰与缺页处理维护
//!
//! 交换槽在脏页第一次被淘汰时惰性分配，在该页被重新调入时释放。

mod binding;
mod block;
mod store;

pub use binding::SwapBindings;
pub use block::{BlockDevice, FileDisk, RamDisk};
pub use store::{SwapOp, SwapSlot, SwapStore};
