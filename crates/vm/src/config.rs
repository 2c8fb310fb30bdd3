//! 虚拟内存管理配置
//!
//! 与内核中全局注册的 `MmConfig` 不同，这里的配置是一个普通值，
//! 在构造 [`VmKernel`](crate::VmKernel) 时注入，因此同一进程内可以并存多个独立实例。

use crate::error::{VmError, VmResult};

/// 内存管理配置常量
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// 页大小（字节，必须是 2 的幂）
    pub page_size: usize,
    /// 物理帧数量
    pub num_phys_pages: usize,
    /// 每个执行上下文的 TLB 条目数
    pub tlb_size: usize,
    /// 每个进程的用户栈页数
    pub stack_pages: usize,
    /// 交换区容量（槽数，每槽一页）
    pub swap_slots: usize,
    /// 从用户内存读取字符串时的最大长度（不含结尾 NUL）
    pub max_string_length: usize,
}

/// 最小页大小：参数页至少要能容纳一个参数指针和结尾 NUL
const MIN_PAGE_SIZE: usize = 16;

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            page_size: 1024,
            num_phys_pages: 32,
            tlb_size: 4,
            stack_pages: 8,
            swap_slots: 1024,
            max_string_length: 256,
        }
    }
}

impl VmConfig {
    /// 设置页大小
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// 设置物理帧数量
    pub fn with_phys_pages(mut self, num_phys_pages: usize) -> Self {
        self.num_phys_pages = num_phys_pages;
        self
    }

    /// 设置 TLB 条目数
    pub fn with_tlb_size(mut self, tlb_size: usize) -> Self {
        self.tlb_size = tlb_size;
        self
    }

    /// 设置每个进程的栈页数
    pub fn with_stack_pages(mut self, stack_pages: usize) -> Self {
        self.stack_pages = stack_pages;
        self
    }

    /// 设置交换区容量
    pub fn with_swap_slots(mut self, swap_slots: usize) -> Self {
        self.swap_slots = swap_slots;
        self
    }

    /// 物理内存总字节数
    pub fn phys_mem_size(&self) -> usize {
        self.page_size * self.num_phys_pages
    }

    /// 检查配置是否可用。
    ///
    /// 所有配置错误都在启动时报告，运行期不会再出现。
    pub fn validate(&self) -> VmResult<()> {
        if self.num_phys_pages == 0 {
            return Err(VmError::NoPhysicalFrames);
        }
        if self.num_phys_pages > u32::MAX as usize {
            return Err(VmError::InvalidConfig("too many physical frames"));
        }
        if !self.page_size.is_power_of_two() || self.page_size < MIN_PAGE_SIZE {
            return Err(VmError::InvalidConfig(
                "page size must be a power of two and at least 16 bytes",
            ));
        }
        if self.tlb_size == 0 {
            return Err(VmError::InvalidConfig("TLB must have at least one entry"));
        }
        if self.swap_slots == 0 {
            return Err(VmError::InvalidConfig("swap space must have at least one slot"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Severity;

    #[test]
    fn test_default_config_is_valid() {
        let config = VmConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.phys_mem_size(), 32 * 1024);
    }

    #[test]
    fn test_zero_frames_is_config_error() {
        let err = VmConfig::default().with_phys_pages(0).validate().unwrap_err();
        assert_eq!(err, VmError::NoPhysicalFrames);
        assert_eq!(err.severity(), Severity::Config);
    }

    #[test]
    fn test_rejects_bad_page_size_and_tlb() {
        assert!(VmConfig::default().with_page_size(1000).validate().is_err());
        assert!(VmConfig::default().with_page_size(8).validate().is_err());
        assert!(VmConfig::default().with_tlb_size(0).validate().is_err());
        assert!(VmConfig::default().with_swap_slots(0).validate().is_err());
    }
}
