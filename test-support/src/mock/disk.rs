//! 块设备的 Mock 实现
//!
//! 注意：这里不直接依赖 `vm` crate（避免循环依赖）。
//! `vm` crate 在 `cfg(test)` 下为这些类型实现其 trait（例如 `BlockDevice`）。

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// 可注入故障的内存块设备
pub struct MockDisk {
    data: Mutex<Vec<u8>>,
    block_size: usize,
    failing: AtomicBool,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MockDisk {
    /// 创建含 `total_blocks` 个块的设备
    pub fn new(total_blocks: usize, block_size: usize) -> Self {
        Self {
            data: Mutex::new(vec![0; total_blocks * block_size]),
            block_size,
            failing: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// 打开或关闭故障注入：打开后所有读写都失败
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// 读取一块
    pub fn read(&self, block_id: usize, buf: &mut [u8]) -> bool {
        self.reads.fetch_add(1, Ordering::Relaxed);
        if self.failing.load(Ordering::SeqCst) || buf.len() != self.block_size {
            return false;
        }
        let data = self.data.lock().unwrap();
        let start = block_id * self.block_size;
        match data.get(start..start + self.block_size) {
            Some(block) => {
                buf.copy_from_slice(block);
                true
            }
            None => false,
        }
    }

    /// 写入一块
    pub fn write(&self, block_id: usize, buf: &[u8]) -> bool {
        self.writes.fetch_add(1, Ordering::Relaxed);
        if self.failing.load(Ordering::SeqCst) || buf.len() != self.block_size {
            return false;
        }
        let mut data = self.data.lock().unwrap();
        let start = block_id * self.block_size;
        match data.get_mut(start..start + self.block_size) {
            Some(block) => {
                block.copy_from_slice(buf);
                true
            }
            None => false,
        }
    }

    /// 块大小
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// 总块数
    pub fn total_blocks(&self) -> usize {
        self.data.lock().unwrap().len() / self.block_size
    }

    /// 已发生的读次数（含失败）
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// 已发生的写次数（含失败）
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_injection() {
        let disk = MockDisk::new(2, 8);
        assert!(disk.write(1, &[7; 8]));
        disk.set_failing(true);
        let mut buf = [0u8; 8];
        assert!(!disk.read(1, &mut buf));
        disk.set_failing(false);
        assert!(disk.read(1, &mut buf));
        assert_eq!(buf, [7; 8]);
        assert_eq!(disk.read_count(), 2);
        assert_eq!(disk.write_count(), 1);
    }
}
