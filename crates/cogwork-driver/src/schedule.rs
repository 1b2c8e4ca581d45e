//! 调度配置
//!
//! 控制周期、调度纪律（FixedDelay / FixedRate）、等待策略和线程命名。
//!
//! # 示例
//!
//! ```rust
//! use cogwork_driver::{Discipline, ScheduleConfig};
//! use std::time::Duration;
//!
//! // 默认配置：20ms（50Hz），FixedRate
//! let config = ScheduleConfig::default();
//!
//! // 自定义配置
//! let config = ScheduleConfig::new(Duration::from_millis(5))
//!     .with_discipline(Discipline::FixedDelay)
//!     .with_name("shooter-pid");
//! assert!(config.validate().is_ok());
//! ```

use crate::error::DriverError;
use std::time::Duration;

/// 周期调度纪律
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Discipline {
    /// 上一个 step **结束**后等待一个周期再开始下一个；
    /// step 超时会让整体节奏向后漂移。
    FixedDelay,
    /// 以第一次 step 的开始时间为原点对齐时间网格；
    /// step 超时后下一个 step 立即开始（不会出现负等待），可能背靠背追赶。
    #[default]
    FixedRate,
}

/// 周期间等待策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitStrategy {
    /// 阻塞在可取消的 channel 截止时间上，disable 时立即唤醒
    #[default]
    Park,
    /// 使用 `spin_sleep` 实现低抖动延时（占用更多 CPU）
    Spin,
}

/// 调度配置
///
/// `period` 与 `discipline` 在构造控制器时固定，之后不可修改。
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    /// 控制周期
    pub period: Duration,
    /// 调度纪律
    pub discipline: Discipline,
    /// 等待策略
    pub wait: WaitStrategy,
    /// 控制线程名称（便于调试和 tracing）
    pub name: String,
    /// disable 时等待控制线程退出的最长时间
    pub join_timeout: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(20), // 50Hz
            discipline: Discipline::FixedRate,
            wait: WaitStrategy::Park,
            name: "cogwork-loop".to_string(),
            join_timeout: Duration::from_secs(2),
        }
    }
}

impl ScheduleConfig {
    /// 以指定周期创建配置，其余字段取默认值
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            ..Default::default()
        }
    }

    /// 以控制频率（Hz）创建配置
    ///
    /// # 错误
    ///
    /// - `frequency_hz` 不是正的有限值
    pub fn from_frequency_hz(frequency_hz: f64) -> Result<Self, DriverError> {
        if !(frequency_hz.is_finite() && frequency_hz > 0.0) {
            return Err(DriverError::InvalidConfig(format!(
                "Invalid frequency_hz: {} (must be > 0)",
                frequency_hz
            )));
        }
        Ok(Self::new(Duration::from_secs_f64(1.0 / frequency_hz)))
    }

    pub fn with_discipline(mut self, discipline: Discipline) -> Self {
        self.discipline = discipline;
        self
    }

    pub fn with_wait(mut self, wait: WaitStrategy) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// 控制频率（Hz）
    pub fn frequency_hz(&self) -> f64 {
        1.0 / self.period.as_secs_f64()
    }

    /// 校验配置
    ///
    /// 周期必须大于 0。超过 10kHz 的频率只告警，不拒绝。
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.period.is_zero() {
            return Err(DriverError::InvalidConfig(
                "period must be greater than zero".to_string(),
            ));
        }
        if self.period < Duration::from_micros(100) {
            tracing::warn!(
                "Very high control frequency: {:.0} Hz ({}). This may cause performance issues.",
                self.frequency_hz(),
                self.name
            );
        }
        Ok(())
    }
}
