//! # cogwork Port Layer
//!
//! 数值端口抽象层：控制器与硬件适配器之间的最小契约。
//!
//! - [`Input`]：产生当前读数（编码器、电位器、陀螺仪……）
//! - [`Output`]：接受一个数值指令（电机控制器、伺服……）
//! - [`Position`]：两态传感器（限位开关、压力开关……）
//!
//! 硬件适配器彼此之间没有共同基类，只需要实现这些小 trait，
//! 控制器对端口类型保持泛型。

use thiserror::Error;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

/// 端口层统一错误类型
#[derive(Error, Debug)]
pub enum PortError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] PortDeviceError),
    /// 传感器无法读取（断线、未上电……）
    #[error("Sensor unreachable: {0}")]
    Unreachable(String),
    /// 读数不是有限值（NaN / ±∞）
    #[error("Invalid reading: {0}")]
    InvalidReading(f64),
    #[error("Port timeout")]
    Timeout,
}

/// 设备错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDeviceErrorKind {
    Unknown,
    NotFound,
    Disconnected,
    Busy,
    Fault,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct PortDeviceError {
    pub kind: PortDeviceErrorKind,
    pub message: String,
}

impl PortDeviceError {
    pub fn new(kind: PortDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 设备不可恢复（需要人工介入）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            PortDeviceErrorKind::NotFound | PortDeviceErrorKind::Disconnected
        )
    }
}

impl From<String> for PortDeviceError {
    fn from(message: String) -> Self {
        Self::new(PortDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for PortDeviceError {
    fn from(message: &str) -> Self {
        Self::new(PortDeviceErrorKind::Unknown, message)
    }
}

/// 数值输入端口
///
/// 必须能够以控制器配置的频率被调用。
pub trait Input: Send {
    fn get(&mut self) -> Result<f64, PortError>;
}

/// 数值输出端口
///
/// 指令立即生效，重复写入同一值是幂等的。
pub trait Output: Send {
    fn set(&mut self, value: f64) -> Result<(), PortError>;
}

/// 两态位置传感器
pub trait Position: Send {
    fn get_position(&mut self) -> Result<bool, PortError>;
}

impl<T: Input + ?Sized> Input for Box<T> {
    fn get(&mut self) -> Result<f64, PortError> {
        (**self).get()
    }
}

impl<T: Output + ?Sized> Output for Box<T> {
    fn set(&mut self, value: f64) -> Result<(), PortError> {
        (**self).set(value)
    }
}

impl<T: Position + ?Sized> Position for Box<T> {
    fn get_position(&mut self) -> Result<bool, PortError> {
        (**self).get_position()
    }
}

/// 继电器状态
///
/// 继电器通过普通 [`Output`] 驱动：`Off` = 0.0，`Forward` = +1.0，`Reverse` = -1.0。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayState {
    #[default]
    Off,
    Forward,
    Reverse,
}

impl RelayState {
    /// 转换为数值指令
    pub fn as_command(self) -> f64 {
        match self {
            Self::Off => 0.0,
            Self::Forward => 1.0,
            Self::Reverse => -1.0,
        }
    }

    /// 从数值指令解析（按符号）
    pub fn from_command(value: f64) -> Self {
        if value > 0.0 {
            Self::Forward
        } else if value < 0.0 {
            Self::Reverse
        } else {
            Self::Off
        }
    }
}
