//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use cogwork_sdk::prelude::*;
//! ```

// 控制器
pub use cogwork_control::{
    BangBangBuilder, BangBangController, ControllerConfig, PidBuilder, PidController,
    RelayController,
};

// 生命周期与调度
pub use cogwork_driver::{
    Controllable, Discipline, LifecycleState, LoopMetricsSnapshot, ScheduleConfig, UnitHandle,
    UnitRegistry, WaitStrategy,
};

// 端口契约
pub use cogwork_port::{Input, Output, Position, RelayState};

// 错误类型
pub use cogwork_control::ControlError;
pub use cogwork_driver::DriverError;
pub use cogwork_port::PortError;
