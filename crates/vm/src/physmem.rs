//! 模拟物理内存
//!
//! 每个物理帧是一块独立加锁的字节数组。帧内容的访问不需要内存锁：
//! 谁能访问哪一帧由帧表的所有权和 pin 保证，这里的锁只保护字节本身。

use crate::address::{PageNum, Ppn};
use sync::{SpinLock, SpinLockGuard};

/// 模拟物理内存
pub struct PhysicalMemory {
    page_size: usize,
    frames: Box<[SpinLock<Box<[u8]>>]>,
}

impl PhysicalMemory {
    /// 创建 `num_frames` 个全零帧
    pub fn new(num_frames: usize, page_size: usize) -> Self {
        PhysicalMemory {
            page_size,
            frames: (0..num_frames)
                .map(|_| SpinLock::new(vec![0u8; page_size].into_boxed_slice()))
                .collect(),
        }
    }

    /// 帧数
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// 页大小
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// 锁住一帧，直接访问其字节
    pub fn frame(&self, ppn: Ppn) -> SpinLockGuard<'_, Box<[u8]>> {
        self.frames[ppn.as_usize()].lock()
    }

    /// 从帧内 `offset` 处读取到 `buf`，返回读取的字节数（不跨帧）
    pub fn read(&self, ppn: Ppn, offset: usize, buf: &mut [u8]) -> usize {
        let frame = self.frame(ppn);
        let n = buf.len().min(self.page_size.saturating_sub(offset));
        buf[..n].copy_from_slice(&frame[offset..offset + n]);
        n
    }

    /// 把 `data` 写到帧内 `offset` 处，返回写入的字节数（不跨帧）
    pub fn write(&self, ppn: Ppn, offset: usize, data: &[u8]) -> usize {
        let mut frame = self.frame(ppn);
        let n = data.len().min(self.page_size.saturating_sub(offset));
        frame[offset..offset + n].copy_from_slice(&data[..n]);
        n
    }

    /// 清零一帧
    pub fn zero(&self, ppn: Ppn) {
        self.frame(ppn).fill(0);
    }

    /// 整页写入
    pub fn write_page(&self, ppn: Ppn, page: &[u8]) {
        self.frame(ppn).copy_from_slice(page);
    }

    /// 整页内容的副本
    pub fn snapshot(&self, ppn: Ppn) -> Vec<u8> {
        self.frame(ppn).to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_clamped_to_frame() {
        let mem = PhysicalMemory::new(2, 16);
        assert_eq!(mem.write(Ppn(1), 12, &[1, 2, 3, 4, 5, 6]), 4);
        let mut buf = [0u8; 8];
        assert_eq!(mem.read(Ppn(1), 10, &mut buf), 6);
        assert_eq!(&buf[..6], &[0, 0, 1, 2, 3, 4]);
        // 帧 0 未被触及
        assert!(mem.snapshot(Ppn(0)).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_zero_and_write_page() {
        let mem = PhysicalMemory::new(1, 8);
        mem.write_page(Ppn(0), &[9; 8]);
        assert_eq!(mem.snapshot(Ppn(0)), vec![9; 8]);
        mem.zero(Ppn(0));
        assert_eq!(mem.snapshot(Ppn(0)), vec![0; 8]);
    }
}
