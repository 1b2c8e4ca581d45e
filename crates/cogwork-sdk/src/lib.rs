//! Cogwork SDK - 周期闭环控制核心
//!
//! 把传感器读数转换成执行器指令的周期控制器库，每个控制器运行在自己的
//! 调度线程上，调参可以在回路运行期间从任意线程安全修改。
//!
//! # 架构设计
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **端口层** (`port`): 数值输入/输出/两态传感器契约，Mock 端口
//! - **驱动层** (`driver`): 生命周期、周期调度器、回路指标、单元注册表
//! - **控制层** (`control`): PID、Bang-Bang、继电器控制器和 TOML 配置
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use cogwork_sdk::prelude::*;
//! # struct Encoder;
//! # impl Input for Encoder { fn get(&mut self) -> Result<f64, PortError> { Ok(0.0) } }
//! # struct Motor;
//! # impl Output for Motor { fn set(&mut self, _: f64) -> Result<(), PortError> { Ok(()) } }
//!
//! cogwork_sdk::init_logging();
//!
//! let pid = PidController::builder(Encoder, Motor)
//!     .gains(0.05, 0.001, 0.0)
//!     .schedule(ScheduleConfig::from_frequency_hz(100.0)?)
//!     .build()?;
//!
//! pid.set_setpoint(3000.0);
//! pid.enable();
//! # Ok::<(), ControlError>(())
//! ```

pub mod prelude;

pub use cogwork_control as control;
pub use cogwork_driver as driver;
pub use cogwork_port as port;

pub use cogwork_control::{
    BangBangController, ControlError, ControllerConfig, PidController, RelayController,
};
pub use cogwork_driver::{
    Controllable, Discipline, DriverError, PeriodicScheduler, ScheduleConfig, Step, UnitHandle,
    UnitRegistry, WaitStrategy,
};
pub use cogwork_port::{Input, Output, PortError, Position, RelayState};

use tracing_subscriber::EnvFilter;

/// 初始化日志
///
/// 安装 `tracing_subscriber::fmt` 订阅者（过滤规则来自 `RUST_LOG`，缺省为 `info`），
/// 并通过 `tracing-log` 把 `log` crate 的记录桥接进来。
///
/// 可重复调用：已经安装过全局订阅者时返回 `false`，不做任何事。
pub fn init_logging() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return false;
    }
    // log 桥接失败（其他 logger 已安装）不影响 tracing 输出
    let _ = tracing_log::LogTracer::init();
    true
}
