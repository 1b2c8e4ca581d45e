//! 控制回路性能指标
//!
//! 提供零开销的原子计数器，用于监控控制线程的健康状态和周期抖动。
//! 所有计数器都使用原子操作，可以在任何线程安全地读取，不会引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// 控制回路实时指标
///
/// # 使用示例
///
/// ```rust
/// use cogwork_driver::LoopMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = LoopMetrics::new();
/// metrics.steps_total.fetch_add(1, Ordering::Relaxed);
///
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.steps_total, 1);
/// ```
#[derive(Debug, Default)]
pub struct LoopMetrics {
    /// 已执行的 step 总数（包括失败的）
    pub steps_total: AtomicU64,

    /// step 返回错误的次数（端口故障等）
    pub step_errors: AtomicU64,

    /// step panic 的次数
    pub step_panics: AtomicU64,

    /// step 耗时超过周期的次数
    ///
    /// 如果这个值快速增长，说明 step 相对周期太慢：
    /// FixedDelay 下周期被拉长，FixedRate 下会出现背靠背追赶。
    pub overruns: AtomicU64,

    /// FixedRate 下因落后于时间网格而立即开始的 step 次数
    pub catch_up_starts: AtomicU64,

    /// 最近一次 step 耗时（微秒）
    pub last_step_us: AtomicU64,

    /// 最大 step 耗时（微秒）
    pub max_step_us: AtomicU64,
}

impl LoopMetrics {
    /// 创建新的指标实例（所有计数器初始化为 0）
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次 step 耗时
    pub fn record_step_duration(&self, elapsed: Duration, period: Duration) {
        let us = elapsed.as_micros().min(u64::MAX as u128) as u64;
        self.last_step_us.store(us, Ordering::Relaxed);
        self.max_step_us.fetch_max(us, Ordering::Relaxed);
        if elapsed > period {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 获取指标快照
    pub fn snapshot(&self) -> LoopMetricsSnapshot {
        LoopMetricsSnapshot {
            steps_total: self.steps_total.load(Ordering::Relaxed),
            step_errors: self.step_errors.load(Ordering::Relaxed),
            step_panics: self.step_panics.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            catch_up_starts: self.catch_up_starts.load(Ordering::Relaxed),
            last_step_us: self.last_step_us.load(Ordering::Relaxed),
            max_step_us: self.max_step_us.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器（用于性能测试）
    pub fn reset(&self) {
        self.steps_total.store(0, Ordering::Relaxed);
        self.step_errors.store(0, Ordering::Relaxed);
        self.step_panics.store(0, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Relaxed);
        self.catch_up_starts.store(0, Ordering::Relaxed);
        self.last_step_us.store(0, Ordering::Relaxed);
        self.max_step_us.store(0, Ordering::Relaxed);
    }
}

/// 指标快照（不可变，用于读取）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopMetricsSnapshot {
    pub steps_total: u64,
    pub step_errors: u64,
    pub step_panics: u64,
    pub overruns: u64,
    pub catch_up_starts: u64,
    pub last_step_us: u64,
    pub max_step_us: u64,
}

impl LoopMetricsSnapshot {
    /// 计算 step 失败率（百分比）
    ///
    /// 返回 0.0 到 100.0 之间的值。如果 `steps_total` 为 0，返回 0.0。
    pub fn failure_rate(&self) -> f64 {
        if self.steps_total == 0 {
            return 0.0;
        }
        ((self.step_errors + self.step_panics) as f64 / self.steps_total as f64) * 100.0
    }
}
