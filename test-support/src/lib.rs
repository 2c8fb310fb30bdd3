//! 测试支持 crate
//!
//! 提供日志初始化、可复现的测试数据和 Mock 实现

pub mod mock;

use std::sync::Once;

static LOGGER: Once = Once::new();

/// 为测试安装 `env_logger`（可重复调用）。
///
/// 日志级别由 `RUST_LOG` 控制，输出交给测试框架捕获。
pub fn init_logger() {
    LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
        log::debug!("test logger initialised");
    });
}

/// 生成长度为 `len` 的确定性字节序列，不同 `seed` 得到不同内容
pub fn page_pattern(seed: u32, len: usize) -> Vec<u8> {
    let mut state = seed.wrapping_mul(0x9E37_79B9).wrapping_add(1);
    (0..len)
        .map(|_| {
            // xorshift32
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect()
}
