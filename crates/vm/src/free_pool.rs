//! 空闲帧池
//!
//! 当前未分配的物理帧列表。按 FIFO 顺序分配：启动时按帧号升序排列，
//! 释放的帧追加到队尾。

use crate::address::{PageNum, Ppn};
use std::collections::VecDeque;

/// 空闲帧池
#[derive(Debug, Default)]
pub struct FreeFramePool {
    frames: VecDeque<Ppn>,
}

impl FreeFramePool {
    /// 创建一个包含帧 `0..num_frames` 的池
    pub fn with_frames(num_frames: usize) -> Self {
        FreeFramePool {
            frames: (0..num_frames).map(Ppn::from_usize).collect(),
        }
    }

    /// 取出一个空闲帧
    pub fn pop(&mut self) -> Option<Ppn> {
        self.frames.pop_front()
    }

    /// 归还一个帧
    pub fn push(&mut self, ppn: Ppn) {
        debug_assert!(!self.contains(ppn), "free pool: double release of {ppn}");
        self.frames.push_back(ppn);
    }

    /// 空闲帧数
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// 是否没有空闲帧
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// 帧是否在池中
    pub fn contains(&self, ppn: Ppn) -> bool {
        self.frames.contains(&ppn)
    }

    /// 遍历池中的帧
    pub fn iter(&self) -> impl Iterator<Item = Ppn> + '_ {
        self.frames.iter().copied()
    }
}
