//! # Cogwork Control
//!
//! 运行在独立调度线程上的闭环控制器：
//!
//! - [`PidController`]：PID + 前馈，积分抗饱和，输入/输出限幅
//! - [`BangBangController`]：开/关控制，可选分段加速和反向
//! - [`RelayController`]：两态传感器驱动的继电器（最小控制器模板）
//!
//! 所有控制器都实现 [`Controllable`](cogwork_driver::Controllable)，
//! 调参 setter 可以在回路运行期间从任意线程调用，下一个周期生效。
//!
//! 初始配置可以通过 [`ControllerConfig`] 从 TOML 加载。

mod error;

pub mod bang_bang;
pub mod config;
pub mod pid;
pub mod relay;

pub use bang_bang::{BangBangBuilder, BangBangController, BangBangSettings};
pub use config::{BangBangSection, ControllerConfig, PidSection, RelaySection, ScheduleSection};
pub use error::ControlError;
pub use pid::{PidBuilder, PidController, PidOutcome, PidTuning};
pub use relay::{RelayController, RelaySettings};

use cogwork_port::{Input, PortError};

/// 读取输入，非有限读数（NaN / ±∞）视为无效
pub(crate) fn read_finite<I: Input + ?Sized>(input: &mut I) -> Result<f64, PortError> {
    let value = input.get()?;
    if !value.is_finite() {
        return Err(PortError::InvalidReading(value));
    }
    Ok(value)
}
