//! 后备块设备
//!
//! 交换区建立在按块寻址的设备之上，块大小等于页大小。
//! 读写失败以 `false` 报告，由 [`SwapStore`](super::SwapStore) 转换为机器级错误。

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use sync::{Lock, SpinLock};

/// 块设备接口
pub trait BlockDevice: Send + Sync {
    /// 读取块设备数据
    /// # 参数：
    /// * `block_id` - 块号
    /// * `buf` - 用于存储读取数据的缓冲区，长度必须等于块大小
    /// # 返回值：
    /// 如果读取成功则返回 true，否则返回 false
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> bool;

    /// 写入块设备数据
    /// # 参数：
    /// * `block_id` - 块号
    /// * `buf` - 包含要写入数据的缓冲区，长度必须等于块大小
    /// # 返回值：
    /// 如果写入成功则返回 true，否则返回 false
    fn write_block(&self, block_id: usize, buf: &[u8]) -> bool;

    /// 刷新到介质
    fn flush(&self) -> bool {
        true
    }

    /// 块大小（字节）
    fn block_size(&self) -> usize;

    /// 总块数
    fn total_blocks(&self) -> usize;
}

/// 内存模拟的块设备
///
/// 用于测试和纯内存运行的模拟机器
pub struct RamDisk {
    /// 存储数据
    data: SpinLock<Vec<u8>>,
    /// 块大小
    block_size: usize,
}

impl RamDisk {
    /// 创建含 `total_blocks` 个块的内存磁盘
    pub fn new(total_blocks: usize, block_size: usize) -> Self {
        RamDisk {
            data: SpinLock::new(vec![0u8; total_blocks * block_size]),
            block_size,
        }
    }

    /// 获取原始数据（用于调试）
    pub fn raw_data(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    fn range(&self, block_id: usize, len: usize, disk_len: usize) -> Option<std::ops::Range<usize>> {
        if len != self.block_size {
            return None;
        }
        let offset = block_id.checked_mul(self.block_size)?;
        let end = offset.checked_add(self.block_size)?;
        (end <= disk_len).then_some(offset..end)
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> bool {
        let data = self.data.lock();
        match self.range(block_id, buf.len(), data.len()) {
            Some(range) => {
                buf.copy_from_slice(&data[range]);
                true
            }
            None => false,
        }
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> bool {
        let mut data = self.data.lock();
        let disk_len = data.len();
        match self.range(block_id, buf.len(), disk_len) {
            Some(range) => {
                data[range].copy_from_slice(buf);
                true
            }
            None => false,
        }
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn total_blocks(&self) -> usize {
        self.data.lock().len() / self.block_size
    }
}

/// 以宿主文件作为后备存储的块设备（交换文件）
pub struct FileDisk {
    /// 文件 I/O 可能较慢，使用可睡眠的锁
    file: Lock<File>,
    path: PathBuf,
    block_size: usize,
    total_blocks: usize,
}

impl FileDisk {
    /// 默认交换文件名
    pub const DEFAULT_NAME: &'static str = "swap.swap";

    /// 创建（或截断）交换文件，并预留 `total_blocks` 个块的空间
    pub fn create<P: AsRef<Path>>(path: P, total_blocks: usize, block_size: usize) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len((total_blocks * block_size) as u64)?;
        log::debug!(
            "swap file {} created: {} blocks of {} bytes",
            path.display(),
            total_blocks,
            block_size
        );
        Ok(FileDisk {
            file: Lock::new(file),
            path,
            block_size,
            total_blocks,
        })
    }

    /// 交换文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn offset(&self, block_id: usize, len: usize) -> Option<u64> {
        (len == self.block_size && block_id < self.total_blocks)
            .then(|| (block_id * self.block_size) as u64)
    }
}

impl BlockDevice for FileDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> bool {
        let Some(offset) = self.offset(block_id, buf.len()) else {
            return false;
        };
        let mut file = self.file.acquire();
        let result = file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| file.read_exact(buf));
        if let Err(e) = &result {
            log::error!("swap file {}: read of block {} failed: {}", self.path.display(), block_id, e);
        }
        result.is_ok()
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> bool {
        let Some(offset) = self.offset(block_id, buf.len()) else {
            return false;
        };
        let mut file = self.file.acquire();
        let result = file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| file.write_all(buf));
        if let Err(e) = &result {
            log::error!("swap file {}: write of block {} failed: {}", self.path.display(), block_id, e);
        }
        result.is_ok()
    }

    fn flush(&self) -> bool {
        self.file.acquire().sync_data().is_ok()
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn total_blocks(&self) -> usize {
        self.total_blocks
    }
}
