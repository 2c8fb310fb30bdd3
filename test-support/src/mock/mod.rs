//! Mock 实现模块
//!
//! 提供被测子系统所需外部设备的 Mock 实现

mod disk;

pub use disk::MockDisk;
