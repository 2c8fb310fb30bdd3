//! 缺页处理
//!
//! 一次 TLB 缺失按下面的状态机处理（全程持有进程锁）：
//!
//! ```text
//! MissDetected ──(页表项有效)──────────────────────────────┐
//!      │                                                    ▼
//!      └─> FrameAcquired ─> ContentRestored ─> Mapped ─> CacheRefilled
//! ```
//!
//! - `MissDetected`：读出错地址寄存器，算出 vpn 并做越界检查；
//! - `FrameAcquired`：从空闲帧池取帧或淘汰一帧，帧已归属 (进程, vpn) 且被 pin；
//! - `ContentRestored`：恰好一种来源：交换槽（读出后释放槽）→ 可执行映像 → 清零；
//! - `Mapped`：安装页表项；
//! - `CacheRefilled`：装入 TLB，然后 unpin。
//!
//! 帧在装入 TLB 之后才 unpin：在此之前淘汰者看不到它，
//! TLB 中也就不会留下指向已被淘汰帧的条目。

use crate::address::{Ppn, Vpn};
use crate::error::{LoadError, VmError, VmResult};
use crate::frame_table::PageOwner;
use crate::kernel::VmKernel;
use crate::process::VmProcess;
use crate::swap::SwapSlot;
use crate::tlb::ExecutionContext;

/// 缺页处理所处的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FaultState {
    /// 检测到缺失
    MissDetected,
    /// 已取得物理帧
    FrameAcquired,
    /// 帧内容已恢复
    ContentRestored,
    /// 页表项已安装
    Mapped,
    /// TLB 已重填
    CacheRefilled,
}

/// 缺页时帧内容的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSource {
    /// 从交换槽读回
    Swap(SwapSlot),
    /// 从可执行映像装入
    Image {
        /// 段序号
        section: usize,
        /// 段内页号
        page: usize,
    },
    /// 清零（栈页、参数页）
    ZeroFill,
}

/// 一次缺失处理的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
    /// 页表项本来就有效，只重填了 TLB
    TlbRefill {
        /// 页所在的帧
        ppn: Ppn,
    },
    /// 分配了新帧并恢复了内容
    PageIn {
        /// 新分配的帧
        ppn: Ppn,
        /// 内容来源
        source: ContentSource,
    },
}

/// 单次缺失的处理器
pub(crate) struct FaultHandler<'a> {
    kernel: &'a VmKernel,
    process: &'a VmProcess,
    ctx: &'a ExecutionContext,
    state: FaultState,
}

impl<'a> FaultHandler<'a> {
    pub(crate) fn new(kernel: &'a VmKernel, process: &'a VmProcess, ctx: &'a ExecutionContext) -> Self {
        FaultHandler {
            kernel,
            process,
            ctx,
            state: FaultState::MissDetected,
        }
    }

    fn advance(&mut self, vpn: Vpn, next: FaultState) {
        debug_assert!(next > self.state, "fault: {:?} -> {:?}", self.state, next);
        log::trace!("pid {} {}: {:?} -> {:?}", self.process.pid(), vpn, self.state, next);
        self.state = next;
    }

    /// 处理出错地址寄存器指向的缺失。调用方必须持有进程锁。
    pub(crate) fn run(mut self) -> VmResult<FaultOutcome> {
        let process = self.process;
        debug_assert!(process.is_locked_by_current_thread());
        let page_table = process.page_table();
        let vpn = Vpn::containing(self.ctx.bad_vaddr(), self.kernel.config().page_size);

        loop {
            let entry = page_table.lookup(vpn).ok_or(VmError::AddressOutOfRange {
                vpn,
                num_pages: page_table.len(),
            })?;
            if !entry.is_valid() {
                break;
            }
            // 页表项有效：只需重填 TLB。pin 失败说明该帧刚被淘汰，重新检查页表项。
            if self.kernel.pin_if_mapped(self.process, vpn, entry.ppn) {
                page_table.mark_used(vpn);
                if let Some(current) = page_table.lookup(vpn) {
                    self.ctx.refill(current, page_table);
                }
                self.advance(vpn, FaultState::CacheRefilled);
                self.kernel.unpin(entry.ppn);
                self.kernel.stats_ref().record_tlb_only_miss();
                log::trace!("pid {} {}: TLB refill from {}", self.process.pid(), vpn, entry.ppn);
                return Ok(FaultOutcome::TlbRefill { ppn: entry.ppn });
            }
        }

        let owner = PageOwner::new(self.process.pid(), vpn);
        let ppn = self.kernel.acquire_frame(owner)?;
        self.advance(vpn, FaultState::FrameAcquired);

        let source = match self.restore(owner, ppn) {
            Ok(source) => source,
            Err(e) => {
                self.kernel.release_frame(ppn);
                return Err(e);
            }
        };
        self.advance(vpn, FaultState::ContentRestored);

        // 从交换区读回的页：槽已释放，帧里是唯一的副本
        let dirty = matches!(source, ContentSource::Swap(_));
        let entry = page_table.install(vpn, ppn, self.process.layout().is_read_only(vpn), dirty);
        self.advance(vpn, FaultState::Mapped);

        self.ctx.refill(entry, page_table);
        self.advance(vpn, FaultState::CacheRefilled);
        self.kernel.unpin(ppn);

        self.kernel.stats_ref().record_page_fault();
        log::debug!(
            "pid {} {}: paged in to {} from {:?}",
            self.process.pid(),
            vpn,
            ppn,
            source
        );
        Ok(FaultOutcome::PageIn { ppn, source })
    }

    /// 按优先级选择内容来源并写入帧
    fn restore(&self, owner: PageOwner, ppn: Ppn) -> VmResult<ContentSource> {
        let phys = self.kernel.physical_memory();
        let stats = self.kernel.stats_ref();

        if let Some(slot) = self.kernel.take_swap_binding(owner) {
            let mut page = vec![0u8; phys.page_size()];
            let read = self.kernel.swap().read_slot(slot, &mut page);
            self.kernel.swap().free_slot(slot);
            read?;
            phys.write_page(ppn, &page);
            stats.record_swap_in();
            return Ok(ContentSource::Swap(slot));
        }

        if let Some((section, page)) = self.process.layout().section_for(owner.vpn) {
            let loaded = self
                .process
                .image()
                .load_page(section, page, &mut phys.frame(ppn));
            if !loaded {
                return Err(LoadError::ImageRead { section, page }.into());
            }
            stats.record_image_load();
            return Ok(ContentSource::Image { section, page });
        }

        phys.zero(ppn);
        stats.record_zero_fill();
        Ok(ContentSource::ZeroFill)
    }
}
