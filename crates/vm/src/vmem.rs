//! 用户内存访问
//!
//! 两条路径都经过执行上下文的 TLB：
//!
//! - 模拟 CPU 的单次访存（[`VmKernel::access`]、[`VmKernel::load_byte`]、
//!   [`VmKernel::store_byte`]）：缺失时处理缺页后重试，任何进程级错误都终止进程；
//! - 系统调用的批量拷贝（[`VmKernel::read_virtual_memory`] 等）：逐页拷贝，
//!   越界或写只读页时停止并返回已拷贝的字节数，不终止进程。
//!
//! 实际读写帧内容之前都会 pin 该帧，并验证它仍映射在 (进程, vpn) 上；
//! 验证失败说明 TLB 条目已过期，丢弃它并重新翻译。

use crate::address::{Ppn, Vpn, page_offset};
use crate::error::{FAULT_EXIT_STATUS, VmError, VmResult};
use crate::kernel::VmKernel;
use crate::process::VmProcess;
use crate::tlb::{AccessKind, ExecutionContext, Exception};

impl VmKernel {
    /// 翻译 `vaddr`，在帧被 pin 期间调用 `f(帧号, 页内偏移)`。
    ///
    /// 写只读页返回 [`VmError::ReadOnly`]（不终止进程）；
    /// 缺页处理中的错误已由 [`VmKernel::handle_tlb_miss`] 处置。
    fn with_page<R>(
        &self,
        process: &VmProcess,
        ctx: &ExecutionContext,
        vaddr: usize,
        access: AccessKind,
        f: impl FnOnce(Ppn, usize) -> R,
    ) -> VmResult<R> {
        let vpn = Vpn::containing(vaddr, self.config().page_size);
        loop {
            self.check_halted()?;
            if process.has_exited() {
                return Err(VmError::ProcessExited(process.pid()));
            }
            match ctx.translate(vaddr, access) {
                Ok((ppn, offset)) => {
                    if self.pin_if_mapped(process, vpn, ppn) {
                        let result = f(ppn, offset);
                        self.unpin(ppn);
                        return Ok(result);
                    }
                    ctx.discard(vpn, process.page_table());
                }
                Err(Exception::TlbMiss { .. }) => {
                    self.handle_tlb_miss(process, ctx)?;
                }
                Err(Exception::ReadOnly { vpn, .. }) => return Err(VmError::ReadOnly { vpn }),
            }
        }
    }

    /// 模拟一条用户指令对 `vaddr` 的访问。
    ///
    /// 进程级错误（越界、写只读页）以 [`FAULT_EXIT_STATUS`] 终止进程。
    pub fn access(
        &self,
        process: &VmProcess,
        ctx: &ExecutionContext,
        vaddr: usize,
        access: AccessKind,
    ) -> VmResult<()> {
        self.user_access(process, ctx, vaddr, access, |_, _| ())
    }

    /// 读取一个字节
    pub fn load_byte(&self, process: &VmProcess, ctx: &ExecutionContext, vaddr: usize) -> VmResult<u8> {
        self.user_access(process, ctx, vaddr, AccessKind::Read, |ppn, offset| {
            self.physical_memory().frame(ppn)[offset]
        })
    }

    /// 写入一个字节
    pub fn store_byte(
        &self,
        process: &VmProcess,
        ctx: &ExecutionContext,
        vaddr: usize,
        value: u8,
    ) -> VmResult<()> {
        self.user_access(process, ctx, vaddr, AccessKind::Write, |ppn, offset| {
            self.physical_memory().frame(ppn)[offset] = value;
        })
    }

    fn user_access<R>(
        &self,
        process: &VmProcess,
        ctx: &ExecutionContext,
        vaddr: usize,
        access: AccessKind,
        f: impl FnOnce(Ppn, usize) -> R,
    ) -> VmResult<R> {
        match self.with_page(process, ctx, vaddr, access, f) {
            Err(e @ VmError::ReadOnly { .. }) => {
                log::warn!("vm: pid {} killed: {}", process.pid(), e);
                // 进程可能已被别的线程终止，此时 exit 什么也不做
                self.exit(process, FAULT_EXIT_STATUS)?;
                Err(e)
            }
            other => other,
        }
    }

    /// 从用户内存 `vaddr` 读到 `buf`，返回读取的字节数。
    ///
    /// 遇到越界的页时停止；机器级错误向上传播。
    pub fn read_virtual_memory(
        &self,
        process: &VmProcess,
        ctx: &ExecutionContext,
        vaddr: usize,
        buf: &mut [u8],
    ) -> VmResult<usize> {
        let page_size = self.config().page_size;
        let mut done = 0;
        while done < buf.len() {
            let Some(addr) = vaddr.checked_add(done) else {
                break;
            };
            if Vpn::containing(addr, page_size).0 >= process.num_pages() {
                break;
            }
            let chunk = (page_size - page_offset(addr, page_size)).min(buf.len() - done);
            let dst = &mut buf[done..done + chunk];
            self.with_page(process, ctx, addr, AccessKind::Read, |ppn, offset| {
                self.physical_memory().read(ppn, offset, dst)
            })?;
            done += chunk;
        }
        Ok(done)
    }

    /// 把 `data` 写到用户内存 `vaddr`，返回写入的字节数。
    ///
    /// 遇到越界或只读的页时停止；机器级错误向上传播。
    pub fn write_virtual_memory(
        &self,
        process: &VmProcess,
        ctx: &ExecutionContext,
        vaddr: usize,
        data: &[u8],
    ) -> VmResult<usize> {
        let page_size = self.config().page_size;
        let mut done = 0;
        while done < data.len() {
            let Some(addr) = vaddr.checked_add(done) else {
                break;
            };
            if Vpn::containing(addr, page_size).0 >= process.num_pages() {
                break;
            }
            let chunk = (page_size - page_offset(addr, page_size)).min(data.len() - done);
            let src = &data[done..done + chunk];
            match self.with_page(process, ctx, addr, AccessKind::Write, |ppn, offset| {
                self.physical_memory().write(ppn, offset, src)
            }) {
                Ok(_) => done += chunk,
                Err(VmError::ReadOnly { vpn }) => {
                    log::debug!("vm: pid {} copy stopped at read-only {}", process.pid(), vpn);
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(done)
    }

    /// 从用户内存读取以 NUL 结尾的字符串。
    ///
    /// 最多读取 `max_len + 1` 字节；其中没有 NUL 或内容不是 UTF-8 时返回 None。
    pub fn read_virtual_string(
        &self,
        process: &VmProcess,
        ctx: &ExecutionContext,
        vaddr: usize,
        max_len: usize,
    ) -> VmResult<Option<String>> {
        let page_size = self.config().page_size;
        let limit = max_len.saturating_add(1);
        let mut bytes = Vec::new();
        let mut page = vec![0u8; page_size];
        // 逐页读取，遇到 NUL、地址空间末尾或 limit 即停
        while bytes.len() < limit {
            let Some(addr) = vaddr.checked_add(bytes.len()) else {
                return Ok(None);
            };
            let want = (page_size - page_offset(addr, page_size)).min(limit - bytes.len());
            let n = self.read_virtual_memory(process, ctx, addr, &mut page[..want])?;
            if let Some(end) = page[..n].iter().position(|&b| b == 0) {
                bytes.extend_from_slice(&page[..end]);
                return Ok(String::from_utf8(bytes).ok());
            }
            bytes.extend_from_slice(&page[..n]);
            if n < want {
                return Ok(None);
            }
        }
        Ok(None)
    }
}
