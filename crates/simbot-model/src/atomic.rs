//! 原子 f64 封装
//!
//! 标准库没有 `AtomicF64`，这里通过 `f64::to_bits` / `from_bits` 在
//! `AtomicU64` 上实现。用于舵机角度与全局速度倍率这类被多个线程
//! 并发读写的标量：写入是整字原子操作，不可能出现撕裂读。

use std::sync::atomic::{AtomicU64, Ordering};

/// 原子 f64（bit-cast 到 `AtomicU64`）
///
/// 所有操作使用 `Relaxed` 内存序：各角度字段之间不需要同步关系，
/// 观察者只要求读到某一次完整的写入值（last-writer-wins）。
#[derive(Debug)]
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    /// 创建新的原子 f64
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    /// 读取当前值
    #[inline]
    pub fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// 写入新值
    #[inline]
    pub fn store(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl From<f64> for AtomicF64 {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}
