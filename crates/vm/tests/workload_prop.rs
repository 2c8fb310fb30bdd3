//! 随机访存序列下的一致性性质
//!
//! 两个进程在三个物理帧上随机读写、切换上下文并退出；每一步之后检查全局不变式，
//! 并且每次读到的字节都必须等于最后一次写入的值（没写过的页为 0）。

use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use vm::{StaticImage, VmConfig, VmKernel, VmProcess};

const PAGE: usize = 32;
const STACK_PAGES: usize = 5;

#[derive(Debug, Clone)]
enum Op {
    Write { proc: usize, addr: usize, value: u8 },
    Read { proc: usize, addr: usize },
    Switch { proc: usize },
    Exit { proc: usize },
}

fn arb_op() -> impl Strategy<Value = Op> {
    let addr = 0..STACK_PAGES * PAGE;
    prop_oneof![
        4 => (0usize..2, addr.clone(), any::<u8>())
            .prop_map(|(proc, addr, value)| Op::Write { proc, addr, value }),
        4 => (0usize..2, addr).prop_map(|(proc, addr)| Op::Read { proc, addr }),
        1 => (0usize..2).prop_map(|proc| Op::Switch { proc }),
        1 => (0usize..2).prop_map(|proc| Op::Exit { proc }),
    ]
}

struct Slot {
    process: Arc<VmProcess>,
    ctx: Arc<vm::ExecutionContext>,
    model: HashMap<usize, u8>,
}

fn spawn(k: &VmKernel) -> Slot {
    let process = k.spawn(Arc::new(StaticImage::builder(PAGE).build()), &[]).unwrap();
    let ctx = process.create_context();
    Slot {
        process,
        ctx,
        model: HashMap::new(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_workload_keeps_memory_consistent(ops in prop::collection::vec(arb_op(), 1..120)) {
        let config = VmConfig::default()
            .with_page_size(PAGE)
            .with_phys_pages(3)
            .with_tlb_size(2)
            .with_stack_pages(STACK_PAGES)
            .with_swap_slots(64);
        let k = VmKernel::with_ram_swap(config).unwrap();
        let mut slots = vec![spawn(&k), spawn(&k)];

        for op in ops {
            match op {
                Op::Write { proc, addr, value } => {
                    let s = &mut slots[proc];
                    k.store_byte(&s.process, &s.ctx, addr, value).unwrap();
                    s.model.insert(addr, value);
                }
                Op::Read { proc, addr } => {
                    let s = &slots[proc];
                    let got = k.load_byte(&s.process, &s.ctx, addr).unwrap();
                    prop_assert_eq!(got, s.model.get(&addr).copied().unwrap_or(0));
                }
                Op::Switch { proc } => {
                    let s = &slots[proc];
                    s.ctx.save_state(s.process.page_table());
                }
                Op::Exit { proc } => {
                    k.exit(&slots[proc].process, 0).unwrap();
                    prop_assert!(k.frames_owned_by(slots[proc].process.pid()).is_empty());
                    prop_assert_eq!(k.swap_slots_of(slots[proc].process.pid()), 0);
                    slots[proc] = spawn(&k);
                }
            }
            prop_assert_eq!(k.check_invariants(), Ok(()));
            prop_assert_eq!(k.free_frame_count() + k.owned_frame_count(), 3);
        }
    }
}
