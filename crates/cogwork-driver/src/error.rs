//! 驱动层错误类型定义

use cogwork_port::PortError;
use std::time::Duration;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 端口（传感器/执行器）错误
    #[error("Port error: {0}")]
    Port(#[from] PortError),

    /// 访问需要运行中控制回路的句柄，但单元未启用
    #[error("Unit is not enabled")]
    NotEnabled,

    /// 范围下限大于上限
    #[error("Invalid range: min {min} > max {max}")]
    InvalidRange { min: f64, max: f64 },

    /// 参数无效（负数、NaN 等）
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// 调度配置无效
    #[error("Invalid schedule config: {0}")]
    InvalidConfig(String),

    /// 控制线程错误（创建失败、panic）
    #[error("Control thread error: {0}")]
    LoopThread(String),

    /// 控制线程未在超时内退出
    #[error("Control thread did not stop within {0:?}")]
    JoinTimeout(Duration),

    /// 注册表句柄已失效（单元已被移除）
    #[error("Stale unit handle")]
    StaleHandle,
}

/// 校验 `[min, max]` 区间
///
/// 拒绝 `min > max` 以及 NaN 边界；`min == max` 是合法的退化区间。
pub fn check_range(min: f64, max: f64) -> Result<(), DriverError> {
    if min.is_nan() || max.is_nan() || min > max {
        return Err(DriverError::InvalidRange { min, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::Port(PortError::Unreachable("gyro".to_string()));
        let msg = format!("{}", err);
        assert!(msg.contains("Port error") && msg.contains("gyro"), "{}", msg);

        assert_eq!(format!("{}", DriverError::NotEnabled), "Unit is not enabled");

        let msg = format!("{}", DriverError::InvalidRange { min: 2.0, max: 1.0 });
        assert_eq!(msg, "Invalid range: min 2 > max 1");

        let msg = format!("{}", DriverError::JoinTimeout(Duration::from_millis(5)));
        assert!(msg.contains("5ms"));
    }

    #[test]
    fn test_from_port_error() {
        let err: DriverError = PortError::Timeout.into();
        assert!(matches!(err, DriverError::Port(PortError::Timeout)));
    }

    #[test]
    fn test_check_range() {
        assert!(check_range(-1.0, 1.0).is_ok());
        assert!(check_range(3.0, 3.0).is_ok());
        assert!(check_range(f64::NEG_INFINITY, f64::INFINITY).is_ok());
        assert!(matches!(
            check_range(1.0, -1.0),
            Err(DriverError::InvalidRange { .. })
        ));
        assert!(check_range(f64::NAN, 1.0).is_err());
    }
}
