//! 虚拟内存管理器
//!
//! [`VmKernel`] 是注入式的管理器上下文：它持有物理内存、帧表、空闲帧池、
//! 时钟指针、交换区和进程注册表。同一宿主进程中可以并存多个实例。
//!
//! # 锁
//!
//! - 内存锁 `memory`：帧表、空闲帧池、时钟指针、交换槽绑定；
//! - 进程锁（见 [`VmProcess::lock`]）：覆盖一次缺页处理或一次退出；
//! - 顺序：进程锁 → 内存锁。淘汰者只持有内存锁，通过原子页表项修改别的进程。
//!
//! 唯一的阻塞点是所有帧都被 pin 时的淘汰扫描：释放内存锁，
//! 在 `frame_unpinned` 上睡眠，每次 unpin 或释放帧都会唤醒它。

use crate::address::{Ppn, Vpn};
use crate::clock::ClockPolicy;
use crate::config::VmConfig;
use crate::error::{FAULT_EXIT_STATUS, VmError, VmResult};
use crate::fault::{FaultHandler, FaultOutcome};
use crate::frame_table::{FrameTable, PageOwner};
use crate::free_pool::FreeFramePool;
use crate::image::ExecutableImage;
use crate::loader::{AddressLayout, encode_arguments};
use crate::physmem::PhysicalMemory;
use crate::process::{Pid, ProcessState, VmProcess};
use crate::registry::ProcessRegistry;
use crate::stats::{VmStats, VmStatsSnapshot};
use crate::swap::{BlockDevice, RamDisk, SwapBindings, SwapSlot, SwapStore};
use crate::tlb::{ExecutionContext, SyncAction};
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use sync::{Condition, Lock, LockGuard};

/// 内存锁保护的全局状态
pub(crate) struct MemoryState {
    pub(crate) frames: FrameTable,
    pub(crate) free: FreeFramePool,
    pub(crate) clock: ClockPolicy,
    pub(crate) bindings: SwapBindings,
}

/// 虚拟内存管理器
pub struct VmKernel {
    config: VmConfig,
    memory: Lock<MemoryState>,
    frame_unpinned: Condition,
    phys: PhysicalMemory,
    swap: SwapStore,
    processes: ProcessRegistry,
    stats: VmStats,
    halted: AtomicBool,
}

impl VmKernel {
    /// 以 `device` 作为交换设备创建管理器
    pub fn new(config: VmConfig, device: Arc<dyn BlockDevice>) -> VmResult<Self> {
        config.validate()?;
        let swap = SwapStore::new(device, config.page_size, config.swap_slots)?;
        log::info!(
            "vm: {} frames of {} bytes, TLB {} entries, swap {} slots",
            config.num_phys_pages,
            config.page_size,
            config.tlb_size,
            swap.capacity()
        );
        Ok(VmKernel {
            memory: Lock::new(MemoryState {
                frames: FrameTable::new(config.num_phys_pages),
                free: FreeFramePool::with_frames(config.num_phys_pages),
                clock: ClockPolicy::new(),
                bindings: SwapBindings::new(),
            }),
            frame_unpinned: Condition::new(),
            phys: PhysicalMemory::new(config.num_phys_pages, config.page_size),
            swap,
            processes: ProcessRegistry::new(),
            stats: VmStats::default(),
            halted: AtomicBool::new(false),
            config,
        })
    }

    /// 以内存磁盘作为交换设备创建管理器
    pub fn with_ram_swap(config: VmConfig) -> VmResult<Self> {
        config.validate()?;
        let disk = Arc::new(RamDisk::new(config.swap_slots, config.page_size));
        Self::new(config, disk)
    }

    /// 配置
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// 统计计数器快照
    pub fn stats(&self) -> VmStatsSnapshot {
        self.stats.snapshot()
    }

    pub(crate) fn stats_ref(&self) -> &VmStats {
        &self.stats
    }

    /// 物理内存
    pub fn physical_memory(&self) -> &PhysicalMemory {
        &self.phys
    }

    /// 交换区
    pub fn swap(&self) -> &SwapStore {
        &self.swap
    }

    /// 机器是否已停机
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    pub(crate) fn check_halted(&self) -> VmResult<()> {
        if self.is_halted() {
            return Err(VmError::Halted);
        }
        Ok(())
    }

    /// 机器级致命错误：停机，此后所有入口都返回 [`VmError::Halted`]
    pub(crate) fn halt(&self, cause: &VmError) {
        if !self.halted.swap(true, Ordering::AcqRel) {
            log::error!("vm: machine halted: {}", cause);
        }
        self.frame_unpinned.wake_all();
    }

    pub(crate) fn lock_memory(&self) -> LockGuard<'_, MemoryState> {
        self.memory.acquire()
    }

    /// 装入一个新进程。
    ///
    /// 页表初始全部无效；参数页通过按需调页写入。
    pub fn spawn(&self, image: Arc<dyn ExecutableImage>, args: &[&str]) -> VmResult<Arc<VmProcess>> {
        self.check_halted()?;
        let layout = AddressLayout::new(
            image.as_ref(),
            args,
            self.config.page_size,
            self.config.stack_pages,
        )?;
        let pid = self.processes.allocate_pid();
        let process = Arc::new(VmProcess::new(
            pid,
            layout,
            image,
            self.config.page_size,
            self.config.tlb_size,
        ));
        self.processes.register(&process);

        if !args.is_empty() {
            let argv = process.layout().argv;
            let bytes = encode_arguments(args, argv);
            let ctx = process.create_context();
            let written = self.write_virtual_memory(&process, &ctx, argv, &bytes);
            ctx.save_state(process.page_table());
            match written {
                Ok(n) if n == bytes.len() => {}
                Ok(_) => {
                    // 参数页总是可写且在范围内，写不满只可能是进程已被终止
                    return Err(VmError::ProcessExited(pid));
                }
                Err(e) => return Err(e),
            }
        }

        log::info!(
            "vm: spawned pid {} ({} pages, {} args)",
            pid,
            process.num_pages(),
            args.len()
        );
        Ok(process)
    }

    /// 按 pid 查找存活的进程
    pub fn process(&self, pid: Pid) -> Option<Arc<VmProcess>> {
        self.processes.lookup(pid)
    }

    /// 处理当前执行上下文的 TLB 缺失。
    ///
    /// 进程级错误会以 [`FAULT_EXIT_STATUS`] 终止该进程；机器级错误使机器停机。
    pub fn handle_tlb_miss(&self, process: &VmProcess, ctx: &ExecutionContext) -> VmResult<FaultOutcome> {
        self.check_halted()?;
        let mut state = process.lock();
        if process.has_exited() {
            return Err(VmError::ProcessExited(process.pid()));
        }
        match FaultHandler::new(self, process, ctx).run() {
            Ok(outcome) => {
                if matches!(outcome, FaultOutcome::PageIn { .. }) {
                    state.faults += 1;
                }
                Ok(outcome)
            }
            Err(e) if e.is_process_fatal() => {
                log::warn!("vm: pid {} killed by fault: {}", process.pid(), e);
                self.exit_locked(process, &mut state, FAULT_EXIT_STATUS);
                Err(e)
            }
            Err(e) => {
                self.halt(&e);
                Err(e)
            }
        }
    }

    /// 为 `owner` 取得一帧：空闲帧池优先，否则淘汰。
    ///
    /// 返回的帧已登记给 `owner` 并被 pin，调用方装好页表项后必须 unpin。
    /// 所有帧都被 pin 时睡眠等待。
    pub fn acquire_frame(&self, owner: PageOwner) -> VmResult<Ppn> {
        let mut mem = self.memory.acquire();
        loop {
            self.check_halted()?;
            if let Some(ppn) = mem.free.pop() {
                mem.frames.assign(ppn, owner);
                mem.frames.pin(ppn);
                return Ok(ppn);
            }
            match self.select_victim(&mut mem) {
                Some(ppn) => {
                    if let Err(e) = self.evict(&mut mem, ppn) {
                        drop(mem);
                        self.halt(&e);
                        return Err(e);
                    }
                    mem.frames.assign(ppn, owner);
                    mem.frames.pin(ppn);
                    return Ok(ppn);
                }
                None => {
                    self.stats.record_blocked_sweep();
                    log::warn!(
                        "vm: all {} frames pinned, pid {} {} waiting",
                        mem.frames.len(),
                        owner.pid,
                        owner.vpn
                    );
                    self.frame_unpinned.sleep(&mut mem);
                }
            }
        }
    }

    /// 把一帧还给空闲帧池。调用方已使对应页表项失效。
    ///
    /// 调用方至多持有 [`VmKernel::acquire_frame`] 留下的那一次 pin，释放时一并清除；
    /// 别的持有者的 pin 必须先 unpin。
    pub fn release_frame(&self, ppn: Ppn) {
        let mut mem = self.memory.acquire();
        if let Some(owner) = mem.frames.clear(ppn) {
            log::trace!("vm: {} released by pid {} {}", ppn, owner.pid, owner.vpn);
            mem.free.push(ppn);
        }
        drop(mem);
        self.frame_unpinned.wake_all();
    }

    /// pin 一帧（不可被淘汰）
    pub fn pin(&self, ppn: Ppn) {
        self.memory.acquire().frames.pin(ppn);
    }

    /// unpin 一帧；帧变为可淘汰时唤醒等待者
    pub fn unpin(&self, ppn: Ppn) {
        let became_unpinned = self.memory.acquire().frames.unpin(ppn);
        if became_unpinned {
            self.frame_unpinned.wake_all();
        }
    }

    /// 若 `ppn` 仍属于 (process, vpn) 且页表项有效地映射到它，pin 并返回 true
    pub fn pin_if_mapped(&self, process: &VmProcess, vpn: Vpn, ppn: Ppn) -> bool {
        if ppn.0 >= self.config.num_phys_pages {
            return false;
        }
        let mut mem = self.memory.acquire();
        let owned = mem.frames.owner(ppn) == Some(PageOwner::new(process.pid(), vpn));
        let mapped = process
            .page_table()
            .lookup(vpn)
            .is_some_and(|e| e.is_valid() && e.ppn == ppn);
        if owned && mapped {
            mem.frames.pin(ppn);
            return true;
        }
        false
    }

    /// 时钟扫描；返回 None 表示所有帧都被 pin
    fn select_victim(&self, mem: &mut MemoryState) -> Option<Ppn> {
        let MemoryState { frames, clock, .. } = mem;
        clock.select_victim(frames, |_, owner| match self.processes.lookup(owner.pid) {
            Some(process) => {
                process.sync_tlbs(owner.vpn, SyncAction::ClearUsed);
                process.page_table().clear_used(owner.vpn)
            }
            None => false,
        })
    }

    /// 淘汰一帧：TLB shootdown、使页表项失效、必要时写回交换区、清除帧表项
    fn evict(&self, mem: &mut MemoryState, ppn: Ppn) -> VmResult<()> {
        let Some(owner) = mem.frames.owner(ppn) else {
            return Ok(());
        };
        match self.processes.lookup(owner.pid) {
            Some(process) => {
                process.sync_tlbs(owner.vpn, SyncAction::Invalidate);
                let entry = process.page_table().invalidate(owner.vpn);
                if let Some(entry) = entry.filter(|e| e.needs_writeback() && e.ppn == ppn) {
                    let slot = match mem.bindings.get(owner) {
                        Some(slot) => slot,
                        None => {
                            let slot = self.swap.allocate_slot()?;
                            mem.bindings.bind(owner, slot);
                            slot
                        }
                    };
                    self.swap.write_slot(slot, &self.phys.snapshot(ppn))?;
                    self.stats.record_swap_out();
                    log::debug!("vm: evicted pid {} {} from {} to {}", owner.pid, owner.vpn, ppn, slot);
                } else {
                    log::debug!("vm: evicted clean pid {} {} from {}", owner.pid, owner.vpn, ppn);
                }
            }
            None => {
                log::warn!("vm: {} owned by vanished pid {}, reclaiming", ppn, owner.pid);
                if let Some(slot) = mem.bindings.take(owner) {
                    self.swap.free_slot(slot);
                }
            }
        }
        mem.frames.clear(ppn);
        self.stats.record_eviction();
        Ok(())
    }

    pub(crate) fn take_swap_binding(&self, owner: PageOwner) -> Option<SwapSlot> {
        self.memory.acquire().bindings.take(owner)
    }

    /// 进程退出：释放它的所有帧和交换槽。重复调用无副作用。
    pub fn exit(&self, process: &VmProcess, status: i32) -> VmResult<()> {
        self.check_halted()?;
        let mut state = process.lock();
        if process.has_exited() {
            return Ok(());
        }
        self.exit_locked(process, &mut state, status);
        Ok(())
    }

    fn exit_locked(&self, process: &VmProcess, state: &mut ProcessState, status: i32) {
        let pid = process.pid();
        process.mark_exited(state, status);
        process.invalidate_tlbs();

        let mut mem = self.memory.acquire();
        // 等待拷贝中的页 unpin
        while mem.frames.frames_owned_by(pid).iter().any(|(ppn, _)| mem.frames.is_pinned(*ppn)) {
            self.frame_unpinned.sleep(&mut mem);
        }
        let frames = mem.frames.frames_owned_by(pid);
        for (ppn, owner) in &frames {
            process.page_table().invalidate(owner.vpn);
            mem.frames.clear(*ppn);
            mem.free.push(*ppn);
        }
        let slots = mem.bindings.take_all_for(pid);
        for (_, slot) in &slots {
            self.swap.free_slot(*slot);
        }
        drop(mem);
        self.frame_unpinned.wake_all();

        process.page_table().invalidate_all();
        self.processes.unregister(pid);
        log::info!(
            "vm: pid {} exited with status {}, released {} frames and {} swap slots",
            pid,
            status,
            frames.len(),
            slots.len()
        );
    }

    /// 空闲帧数
    pub fn free_frame_count(&self) -> usize {
        self.memory.acquire().free.len()
    }

    /// 已被拥有的帧数
    pub fn owned_frame_count(&self) -> usize {
        self.memory.acquire().frames.owned_count()
    }

    /// 帧的当前所有者
    pub fn frame_owner(&self, ppn: Ppn) -> Option<PageOwner> {
        self.memory.acquire().frames.owner(ppn)
    }

    /// 某进程拥有的帧
    pub fn frames_owned_by(&self, pid: Pid) -> Vec<(Ppn, PageOwner)> {
        self.memory.acquire().frames.frames_owned_by(pid)
    }

    /// (pid, vpn) 绑定的交换槽
    pub fn swap_slot_of(&self, owner: PageOwner) -> Option<SwapSlot> {
        self.memory.acquire().bindings.get(owner)
    }

    /// 某进程持有的交换槽数
    pub fn swap_slots_of(&self, pid: Pid) -> usize {
        self.memory.acquire().bindings.count_for(pid)
    }

    pub(crate) fn live_processes(&self) -> Vec<Arc<VmProcess>> {
        self.processes.live_processes()
    }
}
