//! 页表模块
//!
//! 每个进程一张扁平页表：按虚拟页号索引的 [`TranslationEntry`] 数组，
//! 长度在加载时确定（代码/数据段 + 栈 + 参数页）。
//!
//! 页表项的状态位可以被其它线程并发修改（时钟算法清除 used 位、淘汰时使表项失效），
//! 因此每个表项以原子字的形式存放，见 [`PageTable`]。
mod entry;
mod table;

pub use entry::*;
pub use table::*;
