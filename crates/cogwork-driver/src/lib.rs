//! 驱动层模块
//!
//! 本模块提供控制器运行所需的生命周期和调度机制，包括：
//! - 可控单元契约（enable / disable / is_enabled）
//! - 周期调度器（每个控制器一个专用线程，FixedDelay / FixedRate 两种纪律）
//! - 控制回路指标（原子计数器，无锁读取）
//! - 单元注册表（代数校验句柄）
//!
//! # 使用场景
//!
//! 实现自定义控制器时直接使用 [`PeriodicScheduler`] + [`Step`]。
//! 大多数用户应该使用 `cogwork-control` 提供的现成控制器。

mod error;
pub mod lifecycle;
pub mod metrics;
pub mod registry;
pub mod schedule;
pub mod scheduler;

pub use error::{DriverError, check_range};
pub use lifecycle::{AtomicLifecycleState, Controllable, LifecycleState};
pub use metrics::{LoopMetrics, LoopMetricsSnapshot};
pub use registry::{UnitHandle, UnitRegistry};
pub use schedule::{Discipline, ScheduleConfig, WaitStrategy};
pub use scheduler::{ActiveLoop, PeriodicScheduler, Step};
